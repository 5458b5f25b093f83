//! In-memory object store and mount resolver.
//!
//! Used by the test suite and the demos. Behaves like the remote service for
//! everything the filesystem layer relies on: delimiter listings with
//! pagination, multipart sessions with checksum validation, per-key bulk
//! delete results and bucket lifecycle.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use rand::Rng;
use sha2::{Digest, Sha256};

use super::client::{
    DeleteResult, ListPage, ListRequest, MountResolver, ObjectHead, ObjectStore, ObjectSummary,
    StoreResult,
};
use super::error::{StoreError, StoreErrorCode};
use crate::fs::CompletedPart;
use crate::path::{MountDescriptor, ResolvedPath};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// Operations that can be targeted by [`MemoryStore::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Head,
    List,
    GetRange,
    Put,
    CreateMultipart,
    UploadPart,
    Commit,
    Abort,
    DeleteObjects,
    ListBuckets,
    CreateBucket,
    DeleteBucket,
    Copy,
    Rename,
}

/// Number of calls issued per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub head: usize,
    pub list: usize,
    pub get_range: usize,
    pub put: usize,
    pub create_multipart: usize,
    pub upload_part: usize,
    pub commit: usize,
    pub abort: usize,
    pub delete_objects: usize,
    pub list_buckets: usize,
    pub create_bucket: usize,
    pub delete_bucket: usize,
    pub copy: usize,
    pub rename: usize,
}

impl CallCounts {
    /// Total number of calls that reached the store.
    pub fn total(&self) -> usize {
        self.head
            + self.list
            + self.get_range
            + self.put
            + self.create_multipart
            + self.upload_part
            + self.commit
            + self.abort
            + self.delete_objects
            + self.list_buckets
            + self.create_bucket
            + self.delete_bucket
            + self.copy
            + self.rename
    }

    fn bump(&mut self, op: StoreOp) {
        let slot = match op {
            StoreOp::Head => &mut self.head,
            StoreOp::List => &mut self.list,
            StoreOp::GetRange => &mut self.get_range,
            StoreOp::Put => &mut self.put,
            StoreOp::CreateMultipart => &mut self.create_multipart,
            StoreOp::UploadPart => &mut self.upload_part,
            StoreOp::Commit => &mut self.commit,
            StoreOp::Abort => &mut self.abort,
            StoreOp::DeleteObjects => &mut self.delete_objects,
            StoreOp::ListBuckets => &mut self.list_buckets,
            StoreOp::CreateBucket => &mut self.create_bucket,
            StoreOp::DeleteBucket => &mut self.delete_bucket,
            StoreOp::Copy => &mut self.copy,
            StoreOp::Rename => &mut self.rename,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    etag: String,
    content_type: String,
    last_modified: i64,
}

impl StoredObject {
    fn new(data: Vec<u8>, etag: String, content_type: &str) -> Self {
        Self {
            data,
            etag,
            content_type: content_type.to_string(),
            last_modified: now_secs(),
        }
    }
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    namespace: String,
    key: String,
    content_type: String,
    parts: BTreeMap<u32, (Vec<u8>, String)>,
}

type BucketId = (String, String);

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<BucketId, BTreeMap<String, StoredObject>>,
    uploads: HashMap<String, PendingUpload>,
    faults: Vec<(StoreOp, StoreErrorCode)>,
    fail_part: Option<u32>,
    calls: CallCounts,
    committed: Vec<Vec<CompletedPart>>,
}

impl State {
    /// Count the call and pop an injected fault for it, if any.
    fn enter(&mut self, op: StoreOp) -> StoreResult<()> {
        self.calls.bump(op);
        if let Some(idx) = self.faults.iter().position(|(o, _)| *o == op) {
            let (_, code) = self.faults.remove(idx);
            return Err(StoreError::new(code, status_for(code), "injected fault"));
        }
        Ok(())
    }

    fn bucket(&self, bucket: &str, namespace: &str) -> StoreResult<&BTreeMap<String, StoredObject>> {
        self.buckets
            .get(&(bucket.to_string(), namespace.to_string()))
            .ok_or_else(|| bucket_not_found(bucket, namespace))
    }

    fn bucket_mut(
        &mut self,
        bucket: &str,
        namespace: &str,
    ) -> StoreResult<&mut BTreeMap<String, StoredObject>> {
        self.buckets
            .get_mut(&(bucket.to_string(), namespace.to_string()))
            .ok_or_else(|| bucket_not_found(bucket, namespace))
    }

    fn object(&self, loc: &ResolvedPath) -> StoreResult<&StoredObject> {
        self.bucket(&loc.bucket, &loc.namespace)?
            .get(&loc.key)
            .ok_or_else(|| {
                StoreError::from_service("ObjectNotFound", 404, format!("{} not found", loc.key))
            })
    }
}

/// In-memory [`ObjectStore`] with call counters and fault injection.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Limit listing pages to `page_size` entries to exercise pagination.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Create an empty bucket.
    pub fn with_bucket(self, bucket: &str, namespace: &str) -> Self {
        self.state
            .lock()
            .buckets
            .entry((bucket.to_string(), namespace.to_string()))
            .or_default();
        self
    }

    /// Store an object directly, creating its bucket if needed. Not counted as a call.
    pub fn insert(&self, bucket: &str, namespace: &str, key: &str, data: impl Into<Vec<u8>>) {
        let data = data.into();
        let etag = etag_for(&data);
        let content_type = mime_guess::from_path(key)
            .first_or_octet_stream()
            .to_string();
        self.state
            .lock()
            .buckets
            .entry((bucket.to_string(), namespace.to_string()))
            .or_default()
            .insert(key.to_string(), StoredObject::new(data, etag, &content_type));
    }

    /// Contents of an object, if present.
    pub fn object(&self, bucket: &str, namespace: &str, key: &str) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state
            .buckets
            .get(&(bucket.to_string(), namespace.to_string()))?
            .get(key)
            .map(|o| o.data.clone())
    }

    /// Content type recorded for an object.
    pub fn content_type(&self, bucket: &str, namespace: &str, key: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .buckets
            .get(&(bucket.to_string(), namespace.to_string()))?
            .get(key)
            .map(|o| o.content_type.clone())
    }

    /// All keys of a bucket in order.
    pub fn keys(&self, bucket: &str, namespace: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .buckets
            .get(&(bucket.to_string(), namespace.to_string()))
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_bucket(&self, bucket: &str, namespace: &str) -> bool {
        self.state
            .lock()
            .buckets
            .contains_key(&(bucket.to_string(), namespace.to_string()))
    }

    /// Multipart sessions neither committed nor aborted.
    pub fn pending_uploads(&self) -> usize {
        self.state.lock().uploads.len()
    }

    /// Part lists of every successful commit, in commit order.
    pub fn committed_parts(&self) -> Vec<Vec<CompletedPart>> {
        self.state.lock().committed.clone()
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.state.lock().calls = CallCounts::default();
    }

    /// Make every upload of the given part number fail.
    pub fn fail_upload_part(&self, part_number: u32) {
        self.state.lock().fail_part = Some(part_number);
    }

    /// Make the next call of `op` fail with `code`.
    pub fn fail_next(&self, op: StoreOp, code: StoreErrorCode) {
        self.state.lock().faults.push((op, code));
    }
}

impl ObjectStore for MemoryStore {
    fn head(&self, loc: &ResolvedPath) -> StoreResult<ObjectHead> {
        let mut state = self.state.lock();
        state.enter(StoreOp::Head)?;
        let obj = state.object(loc)?;
        Ok(ObjectHead {
            size: obj.data.len() as u64,
            etag: Some(obj.etag.clone()),
            last_modified: Some(obj.last_modified),
            content_type: Some(obj.content_type.clone()),
            storage_tier: Some("Standard".to_string()),
        })
    }

    fn list(&self, req: &ListRequest) -> StoreResult<ListPage> {
        let mut state = self.state.lock();
        state.enter(StoreOp::List)?;
        let bucket = state.bucket(&req.bucket, &req.namespace)?;
        let limit = req.limit.unwrap_or(self.page_size).max(1);

        let mut page = ListPage::default();
        let mut emitted = 0usize;
        let start = req.start.as_deref().unwrap_or("");

        for (key, obj) in bucket.range::<str, _>((
            std::ops::Bound::Included(start),
            std::ops::Bound::Unbounded,
        )) {
            let Some(rest) = key.strip_prefix(req.prefix.as_str()) else {
                if key.as_str() > req.prefix.as_str() {
                    break;
                }
                continue;
            };

            let grouped = req
                .delimiter
                .and_then(|d| rest.find(d).map(|i| format!("{}{}", req.prefix, &rest[..=i])));

            if let Some(prefix) = &grouped {
                if page.prefixes.last() == Some(prefix) {
                    continue;
                }
            }

            if emitted == limit {
                page.next_start = Some(key.clone());
                break;
            }
            emitted += 1;

            match grouped {
                Some(prefix) => page.prefixes.push(prefix),
                None => page.objects.push(ObjectSummary {
                    key: key.clone(),
                    size: obj.data.len() as u64,
                    etag: Some(obj.etag.clone()),
                    last_modified: Some(obj.last_modified),
                    storage_tier: Some("Standard".to_string()),
                }),
            }
        }

        Ok(page)
    }

    fn get_range(&self, loc: &ResolvedPath, start: u64, end: u64) -> StoreResult<Vec<u8>> {
        let mut state = self.state.lock();
        state.enter(StoreOp::GetRange)?;
        let obj = state.object(loc)?;
        let len = obj.data.len() as u64;
        let start = start.min(len) as usize;
        let end = end.min(len) as usize;
        Ok(obj.data[start..end.max(start)].to_vec())
    }

    fn put(&self, loc: &ResolvedPath, data: &[u8], content_type: &str) -> StoreResult<String> {
        let mut state = self.state.lock();
        state.enter(StoreOp::Put)?;
        let etag = etag_for(data);
        state.bucket_mut(&loc.bucket, &loc.namespace)?.insert(
            loc.key.clone(),
            StoredObject::new(data.to_vec(), etag.clone(), content_type),
        );
        Ok(etag)
    }

    fn create_multipart_upload(
        &self,
        loc: &ResolvedPath,
        content_type: &str,
    ) -> StoreResult<String> {
        let mut state = self.state.lock();
        state.enter(StoreOp::CreateMultipart)?;
        state.bucket(&loc.bucket, &loc.namespace)?;
        let upload_id = hex::encode(rand::thread_rng().r#gen::<[u8; 16]>());
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: loc.bucket.clone(),
                namespace: loc.namespace.clone(),
                key: loc.key.clone(),
                content_type: content_type.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    fn upload_part(
        &self,
        _loc: &ResolvedPath,
        upload_id: &str,
        part_number: u32,
        data: &[u8],
        checksum: &str,
    ) -> StoreResult<String> {
        let mut state = self.state.lock();
        state.enter(StoreOp::UploadPart)?;
        if state.fail_part == Some(part_number) {
            return Err(StoreError::from_service(
                "InternalServerError",
                500,
                format!("part {} failed", part_number),
            ));
        }
        let expected = STANDARD.encode(Sha256::digest(data));
        if expected != checksum {
            return Err(StoreError::from_service(
                "InvalidParameter",
                400,
                "content checksum mismatch",
            ));
        }
        let upload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| StoreError::from_service("NoSuchUpload", 404, upload_id))?;
        let etag = etag_for(data);
        upload
            .parts
            .insert(part_number, (data.to_vec(), etag.clone()));
        Ok(etag)
    }

    fn commit_multipart_upload(
        &self,
        _loc: &ResolvedPath,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.enter(StoreOp::Commit)?;
        let upload = state
            .uploads
            .get(upload_id)
            .ok_or_else(|| StoreError::from_service("NoSuchUpload", 404, upload_id))?;

        let mut data = Vec::new();
        let mut last = 0;
        for part in parts {
            if part.part_number <= last {
                return Err(StoreError::from_service(
                    "InvalidParameter",
                    400,
                    "parts must be listed in ascending order",
                ));
            }
            last = part.part_number;
            match upload.parts.get(&part.part_number) {
                Some((bytes, etag)) if *etag == part.etag => data.extend_from_slice(bytes),
                _ => {
                    return Err(StoreError::from_service(
                        "InvalidParameter",
                        400,
                        format!("part {} missing or etag mismatch", part.part_number),
                    ));
                }
            }
        }

        let etag = format!("{}-{}", etag_for(&data), parts.len());
        let object = StoredObject::new(data, etag, &upload.content_type);
        let (bucket, namespace, key) = (
            upload.bucket.clone(),
            upload.namespace.clone(),
            upload.key.clone(),
        );
        state.bucket_mut(&bucket, &namespace)?.insert(key, object);
        state.uploads.remove(upload_id);
        state.committed.push(parts.to_vec());
        Ok(())
    }

    fn abort_multipart_upload(&self, _loc: &ResolvedPath, upload_id: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.enter(StoreOp::Abort)?;
        state
            .uploads
            .remove(upload_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::from_service("NoSuchUpload", 404, upload_id))
    }

    fn delete_objects(
        &self,
        bucket: &str,
        namespace: &str,
        keys: &[String],
    ) -> StoreResult<Vec<DeleteResult>> {
        let mut state = self.state.lock();
        state.enter(StoreOp::DeleteObjects)?;
        let objects = state.bucket_mut(bucket, namespace)?;
        Ok(keys
            .iter()
            .map(|key| match objects.remove(key) {
                Some(_) => DeleteResult::ok(key.as_str()),
                None => DeleteResult::failed(
                    key.as_str(),
                    StoreError::from_service("ObjectNotFound", 404, format!("{} not found", key)),
                ),
            })
            .collect())
    }

    fn list_buckets(&self, namespace: &str) -> StoreResult<Vec<String>> {
        let mut state = self.state.lock();
        state.enter(StoreOp::ListBuckets)?;
        Ok(state
            .buckets
            .keys()
            .filter(|(_, ns)| ns == namespace)
            .map(|(b, _)| b.clone())
            .collect())
    }

    fn create_bucket(&self, bucket: &str, namespace: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.enter(StoreOp::CreateBucket)?;
        let id = (bucket.to_string(), namespace.to_string());
        if state.buckets.contains_key(&id) {
            return Err(StoreError::from_service(
                "BucketAlreadyExists",
                409,
                format!("{}@{} exists", bucket, namespace),
            ));
        }
        state.buckets.insert(id, BTreeMap::new());
        Ok(())
    }

    fn delete_bucket(&self, bucket: &str, namespace: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.enter(StoreOp::DeleteBucket)?;
        if !state.bucket(bucket, namespace)?.is_empty() {
            return Err(StoreError::from_service(
                "BucketNotEmpty",
                409,
                format!("{}@{} is not empty", bucket, namespace),
            ));
        }
        state
            .buckets
            .remove(&(bucket.to_string(), namespace.to_string()));
        Ok(())
    }

    fn copy_object(&self, src: &ResolvedPath, dst: &ResolvedPath) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.enter(StoreOp::Copy)?;
        let mut object = state.object(src)?.clone();
        object.last_modified = now_secs();
        state
            .bucket_mut(&dst.bucket, &dst.namespace)?
            .insert(dst.key.clone(), object);
        Ok(())
    }

    fn rename_object(&self, src: &ResolvedPath, dst: &ResolvedPath) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.enter(StoreOp::Rename)?;
        if !src.same_bucket(dst) {
            return Err(StoreError::from_service(
                "InvalidParameter",
                400,
                "rename must stay within one bucket",
            ));
        }
        state.object(src)?;
        let bucket = state.bucket_mut(&src.bucket, &src.namespace)?;
        if let Some(mut object) = bucket.remove(&src.key) {
            object.last_modified = now_secs();
            bucket.insert(dst.key.clone(), object);
        }
        Ok(())
    }
}

/// In-memory [`MountResolver`] counting lookups.
#[derive(Debug, Default)]
pub struct MemoryMounts {
    mounts: Mutex<HashMap<String, (String, String)>>,
    lookups: AtomicUsize,
}

impl MemoryMounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a mount to a bucket and namespace.
    pub fn insert(&self, mount: &MountDescriptor, bucket: &str, namespace: &str) {
        self.mounts.lock().insert(
            mount.signature(),
            (bucket.to_string(), namespace.to_string()),
        );
    }

    /// Number of `resolve_mount` calls received.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl MountResolver for MemoryMounts {
    fn resolve_mount(&self, mount: &MountDescriptor) -> StoreResult<Option<(String, String)>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.mounts.lock().get(&mount.signature()).cloned())
    }
}

fn etag_for(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn bucket_not_found(bucket: &str, namespace: &str) -> StoreError {
    StoreError::from_service(
        "BucketNotFound",
        404,
        format!("bucket {}@{} does not exist", bucket, namespace),
    )
}

fn status_for(code: StoreErrorCode) -> u16 {
    match code {
        StoreErrorCode::InvalidParameter => 400,
        StoreErrorCode::NotAuthenticated => 401,
        StoreErrorCode::NotAuthorized => 403,
        StoreErrorCode::NotFound => 404,
        StoreErrorCode::MethodNotAllowed => 405,
        StoreErrorCode::Conflict => 409,
        StoreErrorCode::PreconditionFailed => 412,
        StoreErrorCode::TooManyRequests => 429,
        StoreErrorCode::NotImplemented => 501,
        StoreErrorCode::ServiceUnavailable => 503,
        StoreErrorCode::InternalServerError | StoreErrorCode::Unknown => 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(key: &str) -> ResolvedPath {
        ResolvedPath::new("bkt", "ns", key)
    }

    #[test]
    fn test_delimited_listing_groups_prefixes() {
        let store = MemoryStore::new();
        store.insert("bkt", "ns", "a.txt", "a");
        store.insert("bkt", "ns", "dir/x", "x");
        store.insert("bkt", "ns", "dir/y", "y");
        store.insert("bkt", "ns", "z.csv", "z");

        let page = store
            .list(&ListRequest::new("bkt", "ns", "").delimited('/'))
            .unwrap();
        let keys: Vec<_> = page.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a.txt", "z.csv"]);
        assert_eq!(page.prefixes, vec!["dir/".to_string()]);
        assert!(page.next_start.is_none());
    }

    #[test]
    fn test_listing_pagination() {
        let store = MemoryStore::new().with_page_size(2);
        for key in ["k1", "k2", "k3", "k4", "k5"] {
            store.insert("bkt", "ns", key, key);
        }

        let mut seen = Vec::new();
        let mut token = None;
        loop {
            let page = store
                .list(&ListRequest::new("bkt", "ns", "").start(token))
                .unwrap();
            seen.extend(page.objects.into_iter().map(|o| o.key));
            token = page.next_start;
            if token.is_none() {
                break;
            }
        }
        assert_eq!(seen, vec!["k1", "k2", "k3", "k4", "k5"]);
        assert_eq!(store.calls().list, 3);
    }

    #[test]
    fn test_multipart_checksum_and_commit() {
        let store = MemoryStore::new().with_bucket("bkt", "ns");
        let id = store.create_multipart_upload(&loc("big"), "text/plain").unwrap();

        let bad = store.upload_part(&loc("big"), &id, 1, b"abc", "bogus");
        assert_eq!(bad.unwrap_err().code, StoreErrorCode::InvalidParameter);

        let sum = STANDARD.encode(Sha256::digest(b"abc"));
        let etag = store.upload_part(&loc("big"), &id, 1, b"abc", &sum).unwrap();
        store
            .commit_multipart_upload(&loc("big"), &id, &[CompletedPart::new(1, etag)])
            .unwrap();

        assert_eq!(store.object("bkt", "ns", "big").unwrap(), b"abc");
        assert_eq!(store.pending_uploads(), 0);
    }

    #[test]
    fn test_delete_reports_missing_keys() {
        let store = MemoryStore::new();
        store.insert("bkt", "ns", "present", "p");
        let results = store
            .delete_objects("bkt", "ns", &["present".to_string(), "absent".to_string()])
            .unwrap();
        assert!(results[0].error.is_none());
        assert!(results[1].error.as_ref().unwrap().is_not_found());
    }

    #[test]
    fn test_fail_next_fires_once() {
        let store = MemoryStore::new().with_bucket("bkt", "ns");
        store.fail_next(StoreOp::Put, StoreErrorCode::ServiceUnavailable);
        let err = store.put(&loc("k"), b"v", "text/plain").unwrap_err();
        assert_eq!(err.status, 503);
        assert!(store.put(&loc("k"), b"v", "text/plain").is_ok());
        assert_eq!(store.calls().put, 2);
    }

    #[test]
    fn test_rename_moves_within_bucket() {
        let store = MemoryStore::new();
        store.insert("bkt", "ns", "old.txt", "data");
        store.rename_object(&loc("old.txt"), &loc("new/name.txt")).unwrap();
        assert_eq!(store.keys("bkt", "ns"), vec!["new/name.txt"]);
        assert_eq!(store.calls().rename, 1);

        assert!(store.rename_object(&loc("old.txt"), &loc("x")).unwrap_err().is_not_found());
        let err = store
            .rename_object(&loc("new/name.txt"), &ResolvedPath::new("other", "ns", "x"))
            .unwrap_err();
        assert_eq!(err.code, StoreErrorCode::InvalidParameter);
        assert_eq!(store.object("bkt", "ns", "new/name.txt").unwrap(), b"data");
    }
}
