//! Listing entry types.

use serde::{Deserialize, Serialize};

use crate::api::{ObjectHead, ObjectSummary};
use crate::path::ResolvedPath;

/// Entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Backed by an object
    File,
    /// Synthesized from a common key prefix, a marker object, or a bucket
    Directory,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    /// Canonical path (`bucket@namespace/key`)
    pub path: String,
    pub kind: EntryKind,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Unix timestamp in seconds
    pub last_modified: Option<i64>,
    pub etag: Option<String>,
    pub storage_tier: Option<String>,
    pub content_type: Option<String>,
}

impl ListingEntry {
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            size: 0,
            last_modified: None,
            etag: None,
            storage_tier: None,
            content_type: None,
        }
    }

    pub(crate) fn from_summary(loc: &ResolvedPath, obj: &ObjectSummary) -> Self {
        Self {
            path: loc.with_key(&obj.key).to_path_string(),
            kind: EntryKind::File,
            size: obj.size,
            last_modified: obj.last_modified,
            etag: obj.etag.clone(),
            storage_tier: obj.storage_tier.clone(),
            content_type: None,
        }
    }

    pub(crate) fn from_head(loc: &ResolvedPath, head: ObjectHead) -> Self {
        Self {
            path: loc.to_path_string(),
            kind: EntryKind::File,
            size: head.size,
            last_modified: head.last_modified,
            etag: head.etag,
            storage_tier: head.storage_tier,
            content_type: head.content_type,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Last path component.
    pub fn name(&self) -> &str {
        let tail = self.path.rsplit('/').next().unwrap_or(self.path.as_str());
        match tail.split_once('@') {
            // bucket entry: "bucket@ns"
            Some((bucket, _)) if !bucket.is_empty() && !self.path.contains('/') => bucket,
            _ => tail,
        }
    }

    /// Copy of the entry without metadata.
    pub fn without_detail(&self) -> Self {
        Self {
            path: self.path.clone(),
            kind: self.kind,
            size: if self.is_file() { self.size } else { 0 },
            last_modified: None,
            etag: None,
            storage_tier: None,
            content_type: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_names() {
        assert_eq!(ListingEntry::directory("b@ns/a/dir").name(), "dir");
        assert_eq!(ListingEntry::directory("b@ns").name(), "b");
        assert_eq!(ListingEntry::directory("b@ns/x@y").name(), "x@y");
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ListingEntry::directory("b@ns/d")).unwrap();
        assert!(json.contains(r#""kind":"directory""#));
    }
}
