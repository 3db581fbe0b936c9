//! Account store: one JSON file per upstream variant, optionally encrypted
//! at rest.
//!
//! Writes go through a temp file and an atomic rename, and every mutation is
//! a full read-all → merge → write-all pass. The store itself takes no lock;
//! serialization comes from the owning account-manager actor being the only
//! writer.

use crate::accounts::Account;
use crate::error::CastorError;
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, info};

const NONCE_LEN: usize = 12;
const SALT_LEN: usize = 16;
const TOKEN_ID_HEX_LEN: usize = 16;

pub struct TokenStore {
    path: PathBuf,
    salt: String,
    key: Option<[u8; 32]>,
}

impl TokenStore {
    /// Opens (or initializes) the store at `<data_dir>/<file_name>`. The
    /// per-file salt lives in `<file_name>.salt` next to it and is created
    /// on first open.
    pub async fn open(
        data_dir: &std::path::Path,
        file_name: &str,
        password: Option<&str>,
    ) -> Result<Self, CastorError> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| CastorError::Store(format!("create data dir: {e}")))?;

        let path = data_dir.join(file_name);
        let salt_path = data_dir.join(format!("{file_name}.salt"));

        let salt = match tokio::fs::read_to_string(&salt_path).await {
            Ok(existing) => existing.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut bytes = [0u8; SALT_LEN];
                rand::rng().fill_bytes(&mut bytes);
                let fresh = BASE64.encode(bytes);
                tokio::fs::write(&salt_path, &fresh)
                    .await
                    .map_err(|e| CastorError::Store(format!("write salt file: {e}")))?;
                info!(path = %salt_path.display(), "Created store salt file");
                fresh
            }
            Err(e) => return Err(CastorError::Store(format!("read salt file: {e}"))),
        };

        let key = password.map(|password| derive_key(password, &salt));

        Ok(Self { path, salt, key })
    }

    /// Stable opaque id for an account; raw refresh tokens never appear on
    /// the admin surface.
    pub fn token_id(&self, refresh_token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(refresh_token.as_bytes());
        hasher.update(self.salt.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(TOKEN_ID_HEX_LEN);
        for byte in digest.iter().take(TOKEN_ID_HEX_LEN / 2) {
            hex.push_str(&format!("{byte:02x}"));
        }
        hex
    }

    pub async fn load_all(&self) -> Result<Vec<Account>, CastorError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CastorError::Store(format!("read store: {e}"))),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let json = match &self.key {
            Some(key) => {
                let blob = BASE64
                    .decode(raw.trim())
                    .map_err(|e| CastorError::Store(format!("decode store: {e}")))?;
                decrypt(key, &blob)?
            }
            None => raw.into_bytes(),
        };

        serde_json::from_slice(&json).map_err(|e| CastorError::Store(format!("parse store: {e}")))
    }

    pub async fn save_all(&self, accounts: &[Account]) -> Result<(), CastorError> {
        let payload = match &self.key {
            Some(key) => {
                let json = serde_json::to_vec(accounts)
                    .map_err(|e| CastorError::Store(format!("serialize store: {e}")))?;
                BASE64.encode(encrypt(key, &json)?).into_bytes()
            }
            None => serde_json::to_vec_pretty(accounts)
                .map_err(|e| CastorError::Store(format!("serialize store: {e}")))?,
        };

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &payload)
            .await
            .map_err(|e| CastorError::Store(format!("write store temp file: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| CastorError::Store(format!("rename store temp file: {e}")))?;

        debug!(path = %self.path.display(), count = accounts.len(), "Store written");
        Ok(())
    }

    /// Read-all, merge, write-all in one pass; returns the merged list.
    pub async fn merge_write<F>(&self, merge: F) -> Result<Vec<Account>, CastorError>
    where
        F: FnOnce(Vec<Account>) -> Vec<Account>,
    {
        let merged = merge(self.load_all().await?);
        self.save_all(&merged).await?;
        Ok(merged)
    }
}

fn derive_key(password: &str, salt: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    let digest = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest);
    key
}

fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CastorError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CastorError::Store(format!("create cipher: {e}")))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CastorError::Store(format!("encrypt store: {e}")))?;

    let mut blob = nonce_bytes.to_vec();
    blob.extend(ciphertext);
    Ok(blob)
}

fn decrypt(key: &[u8; 32], blob: &[u8]) -> Result<Vec<u8>, CastorError> {
    if blob.len() < NONCE_LEN {
        return Err(CastorError::Store("encrypted store too short".to_string()));
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CastorError::Store(format!("create cipher: {e}")))?;
    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| CastorError::Store(format!("decrypt store: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plaintext_roundtrip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::open(dir.path(), "accounts.json", None)
            .await
            .unwrap();

        assert!(store.load_all().await.unwrap().is_empty());

        let accounts = vec![Account::from_refresh_token("rt1")];
        store.save_all(&accounts).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].refresh_token, "rt1");
    }

    #[tokio::test]
    async fn encrypted_store_is_unreadable_without_password() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::open(dir.path(), "accounts.json", Some("hunter2"))
            .await
            .unwrap();
        store
            .save_all(&[Account::from_refresh_token("rt-secret")])
            .await
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("accounts.json")).unwrap();
        assert!(!raw.contains("rt-secret"));

        let reopened = TokenStore::open(dir.path(), "accounts.json", Some("hunter2"))
            .await
            .unwrap();
        let loaded = reopened.load_all().await.unwrap();
        assert_eq!(loaded[0].refresh_token, "rt-secret");
    }

    #[tokio::test]
    async fn token_id_is_stable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let a = TokenStore::open(dir.path(), "accounts.json", None)
            .await
            .unwrap();
        let first = a.token_id("rt1");

        let b = TokenStore::open(dir.path(), "accounts.json", None)
            .await
            .unwrap();
        assert_eq!(first, b.token_id("rt1"));
        assert_ne!(first, b.token_id("rt2"));
        assert_eq!(first.len(), TOKEN_ID_HEX_LEN);
    }

    #[tokio::test]
    async fn merge_write_returns_merged_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::open(dir.path(), "accounts.json", None)
            .await
            .unwrap();
        store
            .save_all(&[Account::from_refresh_token("rt1")])
            .await
            .unwrap();

        let merged = store
            .merge_write(|mut accounts| {
                accounts.push(Account::from_refresh_token("rt2"));
                accounts
            })
            .await
            .unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(store.load_all().await.unwrap().len(), 2);
    }
}
