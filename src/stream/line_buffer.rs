/// Reassembles arbitrary byte chunks into `\n`-terminated lines.
///
/// The unterminated tail is carried into the next `append`; bytes are only
/// decoded once a full line is available, so multi-byte characters split
/// across chunks survive.
#[derive(Debug, Default)]
pub struct LineBuffer {
    tail: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk, returning every line completed by it (without the
    /// terminating newline).
    pub fn append(&mut self, chunk: &[u8]) -> Vec<String> {
        self.tail.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = self.tail.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.tail.drain(..=newline).collect();
            line.pop();
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Hand back the unterminated tail, if any. Called at stream end.
    pub fn finish(&mut self) -> Option<String> {
        if self.tail.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.tail);
        Some(String::from_utf8_lossy(&tail).into_owned())
    }
}
