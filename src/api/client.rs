//! Collaborator interfaces consumed from the storage transport layer.
//!
//! Request signing, credentials, retries and timeouts belong to the
//! implementation of these traits. The filesystem layer only issues the
//! calls below, always from blocking worker threads.

use serde::{Deserialize, Serialize};

use super::error::StoreError;
use crate::fs::CompletedPart;
use crate::path::{MountDescriptor, ResolvedPath};

/// Result type for collaborator calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Object metadata returned by `head`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHead {
    pub size: u64,
    pub etag: Option<String>,
    /// Unix timestamp in seconds
    pub last_modified: Option<i64>,
    pub content_type: Option<String>,
    pub storage_tier: Option<String>,
}

/// One object key returned by a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<i64>,
    pub storage_tier: Option<String>,
}

/// Parameters of one paginated listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub bucket: String,
    pub namespace: String,
    pub prefix: String,
    /// Group keys by this character into common prefixes; `None` lists recursively
    pub delimiter: Option<char>,
    /// Continuation token from the previous page
    pub start: Option<String>,
    pub limit: Option<usize>,
}

impl ListRequest {
    pub fn new(bucket: &str, namespace: &str, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.to_string(),
            namespace: namespace.to_string(),
            prefix: prefix.into(),
            delimiter: None,
            start: None,
            limit: None,
        }
    }

    pub fn delimited(mut self, delimiter: char) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start(mut self, token: Option<String>) -> Self {
        self.start = token;
        self
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    /// Common prefixes, each ending with the delimiter
    pub prefixes: Vec<String>,
    /// Token for the next page, `None` when the listing is exhausted
    pub next_start: Option<String>,
}

/// Per-key outcome of a bulk delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteResult {
    pub key: String,
    pub error: Option<StoreError>,
}

impl DeleteResult {
    pub fn ok(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            error: None,
        }
    }

    pub fn failed(key: impl Into<String>, error: StoreError) -> Self {
        Self {
            key: key.into(),
            error: Some(error),
        }
    }
}

/// Blocking object-storage client.
///
/// Object calls take a [`ResolvedPath`] whose `key` names the object.
pub trait ObjectStore: Send + Sync {
    fn head(&self, loc: &ResolvedPath) -> StoreResult<ObjectHead>;

    fn list(&self, req: &ListRequest) -> StoreResult<ListPage>;

    /// Read bytes `start..end` (end exclusive, clamped to the object size).
    fn get_range(&self, loc: &ResolvedPath, start: u64, end: u64) -> StoreResult<Vec<u8>>;

    /// Store a whole object, returning its etag.
    fn put(&self, loc: &ResolvedPath, data: &[u8], content_type: &str) -> StoreResult<String>;

    /// Start a multipart session, returning the upload id.
    fn create_multipart_upload(&self, loc: &ResolvedPath, content_type: &str)
    -> StoreResult<String>;

    /// Upload one part. `checksum` is the base64 SHA-256 of `data`. Returns the part etag.
    fn upload_part(
        &self,
        loc: &ResolvedPath,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
        checksum: &str,
    ) -> StoreResult<String>;

    fn commit_multipart_upload(
        &self,
        loc: &ResolvedPath,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<()>;

    fn abort_multipart_upload(&self, loc: &ResolvedPath, upload_id: &str) -> StoreResult<()>;

    fn delete_objects(
        &self,
        bucket: &str,
        namespace: &str,
        keys: &[String],
    ) -> StoreResult<Vec<DeleteResult>>;

    fn list_buckets(&self, namespace: &str) -> StoreResult<Vec<String>>;

    fn create_bucket(&self, bucket: &str, namespace: &str) -> StoreResult<()>;

    fn delete_bucket(&self, bucket: &str, namespace: &str) -> StoreResult<()>;

    /// Server-side copy. The default reads the source and writes it back.
    fn copy_object(&self, src: &ResolvedPath, dst: &ResolvedPath) -> StoreResult<()> {
        let head = self.head(src)?;
        let data = self.get_range(src, 0, head.size)?;
        let content_type = head
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        self.put(dst, &data, content_type)?;
        Ok(())
    }

    /// Move one object to another key of the same bucket.
    ///
    /// Stores with a native rename do it atomically. The default copies and
    /// then deletes, so both keys exist for a moment.
    fn rename_object(&self, src: &ResolvedPath, dst: &ResolvedPath) -> StoreResult<()> {
        self.copy_object(src, dst)?;
        let keys = [src.key.clone()];
        let results = self.delete_objects(&src.bucket, &src.namespace, &keys)?;
        match results.into_iter().find_map(|r| r.error) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Metadata service mapping a mount to its bucket and namespace.
pub trait MountResolver: Send + Sync {
    /// Returns `Ok(None)` when the mount has no mapping.
    fn resolve_mount(&self, mount: &MountDescriptor) -> StoreResult<Option<(String, String)>>;
}
