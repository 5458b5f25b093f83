//! Per-handle transfer state.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::path::ResolvedPath;

/// A part accepted by the store in a multipart session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

impl CompletedPart {
    pub fn new(part_number: u32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Read,
    Write,
}

/// Bytes retained around the last read, starting at object offset `start`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadWindow {
    pub start: u64,
    pub data: Vec<u8>,
}

impl ReadWindow {
    pub fn end(&self) -> u64 {
        self.start + self.data.len() as u64
    }

    pub fn contains(&self, pos: u64) -> bool {
        pos >= self.start && pos < self.end()
    }

    /// Up to `len` bytes starting at `pos`, which must lie inside the window.
    pub fn slice(&self, pos: u64, len: usize) -> &[u8] {
        let from = (pos - self.start) as usize;
        let to = (from + len).min(self.data.len());
        &self.data[from..to]
    }
}

/// State of one read or write session, owned by a single handle.
///
/// The serializable part (key, upload id, completed parts) is what an
/// operator needs to find and abort an orphaned multipart upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSession {
    pub key: ResolvedPath,
    pub mode: SessionMode,
    /// Read cursor, or bytes accepted so far when writing
    pub position: u64,
    #[serde(skip)]
    pub window: Option<ReadWindow>,
    #[serde(skip)]
    pub buffer: Vec<u8>,
    pub upload_id: Option<String>,
    pub completed_parts: Vec<CompletedPart>,
    /// Unix timestamp when the session was opened
    pub created_at: i64,
}

impl TransferSession {
    pub fn new(key: ResolvedPath, mode: SessionMode) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Self {
            key,
            mode,
            position: 0,
            window: None,
            buffer: Vec::new(),
            upload_id: None,
            completed_parts: Vec::new(),
            created_at,
        }
    }

    pub fn is_multipart(&self) -> bool {
        self.upload_id.is_some()
    }

    pub fn next_part_number(&self) -> u32 {
        self.completed_parts
            .last()
            .map(|p| p.part_number + 1)
            .unwrap_or(1)
    }

    /// Drop the read window unless it covers `pos`.
    pub fn retain_window_for(&mut self, pos: u64) {
        if self.window.as_ref().is_some_and(|w| !w.contains(pos)) {
            self.window = None;
        }
    }

    /// Serialize the session state for logging or persistence.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds() {
        let w = ReadWindow {
            start: 10,
            data: b"abcdef".to_vec(),
        };
        assert!(w.contains(10));
        assert!(w.contains(15));
        assert!(!w.contains(16));
        assert!(!w.contains(9));
        assert_eq!(w.slice(12, 2), b"cd");
        assert_eq!(w.slice(14, 100), b"ef");
    }

    #[test]
    fn test_part_numbering() {
        let mut s = TransferSession::new(ResolvedPath::new("b", "ns", "k"), SessionMode::Write);
        assert_eq!(s.next_part_number(), 1);
        s.completed_parts.push(CompletedPart::new(1, "e1"));
        s.completed_parts.push(CompletedPart::new(2, "e2"));
        assert_eq!(s.next_part_number(), 3);
    }

    #[test]
    fn test_serialized_state_omits_buffers() {
        let mut s = TransferSession::new(ResolvedPath::new("b", "ns", "k"), SessionMode::Write);
        s.buffer = vec![0; 16];
        s.upload_id = Some("upload-1".into());
        let json = s.to_json().unwrap();
        assert!(json.contains("upload-1"));
        assert!(!json.contains("buffer"));

        let back: TransferSession = serde_json::from_str(&json).unwrap();
        assert!(back.buffer.is_empty());
        assert_eq!(back.mode, SessionMode::Write);
    }
}
