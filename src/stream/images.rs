use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::path::PathBuf;
use tracing::warn;
use uuid::Uuid;

/// Sidecar store for images that arrive as `inlineData` from the upstream
/// image models. The stream surfaces them as markdown links instead of
/// megabytes of base64.
#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    pub fn new(data_dir: &std::path::Path) -> Self {
        Self {
            dir: data_dir.join("images"),
        }
    }

    /// Decode and persist one image, returning its serving path. `None`
    /// means the caller should fall back to inline base64.
    pub fn save(&self, mime_type: &str, base64_data: &str) -> Option<String> {
        let bytes = match BASE64.decode(base64_data) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Discarding undecodable inline image: {e}");
                return None;
            }
        };

        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            warn!("Cannot create image dir {}: {e}", self.dir.display());
            return None;
        }

        let ext = match mime_type {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        };
        let name = format!("{}.{ext}", Uuid::new_v4().simple());
        let path = self.dir.join(&name);
        if let Err(e) = std::fs::write(&path, &bytes) {
            warn!("Cannot write image {}: {e}", path.display());
            return None;
        }

        Some(format!("/images/{name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_writes_file_and_returns_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        let url = store.save("image/png", &BASE64.encode(b"fake-png")).unwrap();
        assert!(url.starts_with("/images/"));
        assert!(url.ends_with(".png"));

        let file = dir.path().join("images").join(url.rsplit('/').next().unwrap());
        assert_eq!(std::fs::read(file).unwrap(), b"fake-png");
    }

    #[test]
    fn invalid_base64_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path());
        assert!(store.save("image/png", "!!not base64!!").is_none());
    }
}
