//! Shared capture buffer for process output.

use std::sync::{Arc, Mutex, MutexGuard};

/// Thread-safe byte buffer that process readers append to.
///
/// Clones share the same storage, so a daemon's reader task can keep writing
/// while the test reads a snapshot.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl Buffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer holding `bytes`.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bytes)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append raw bytes.
    pub fn write(&self, bytes: &[u8]) {
        self.lock().extend_from_slice(bytes);
    }

    /// Snapshot of the raw bytes.
    pub fn bytes(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Full text (lossy UTF-8).
    pub fn string(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Full text with surrounding whitespace removed.
    pub fn trimmed(&self) -> String {
        self.string().trim().to_string()
    }

    /// Output split into lines, after trimming; empty output has no lines.
    pub fn lines(&self) -> Vec<String> {
        let text = self.trimmed();
        if text.is_empty() {
            return Vec::new();
        }
        text.lines().map(str::to_string).collect()
    }

    /// Number of bytes captured so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
