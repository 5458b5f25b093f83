//! Ranged reads and single-shot or multipart writes.
//!
//! A write session keeps everything in memory until the buffer grows past
//! its spill threshold (`part_size` when streaming, `single_put_limit` in
//! single-shot mode). Up to that point `close` issues exactly one `put`.
//! Past it the session becomes a multipart upload: full parts are sent as
//! they fill, each with a base64 SHA-256 checksum, and `close` sends the
//! remainder as the last part and commits. Any failure after the upload was
//! created aborts it, so no partial object is ever committed.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::session::{CompletedPart, ReadWindow, SessionMode, TransferSession};
use crate::api::{ObjectHead, ObjectStore};
use crate::config::FsConfig;
use crate::error::{FsError, Result};
use crate::path::ResolvedPath;
use crate::pool::run_bounded;
use crate::progress::{ProgressCallback, TransferProgress};

/// Content type guessed from the key's extension.
pub fn guess_content_type(key: &str) -> String {
    mime_guess::from_path(key).first_or_octet_stream().to_string()
}

/// Base64 SHA-256 of a part, sent alongside it for integrity checking.
pub fn part_checksum(data: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(data))
}

/// Byte-level access to objects.
#[derive(Clone)]
pub struct TransferEngine {
    store: Arc<dyn ObjectStore>,
    config: FsConfig,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn ObjectStore>, config: FsConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn head(&self, loc: &ResolvedPath) -> Result<ObjectHead> {
        self.store
            .head(loc)
            .map_err(|e| FsError::from_store(&loc.to_path_string(), e))
    }

    /// Read up to `length` bytes at `offset`.
    ///
    /// Fails with `NotFound` if the object is absent and `Range` if `offset`
    /// lies past the end. Reading at exactly the end returns no bytes.
    pub fn read(&self, loc: &ResolvedPath, offset: u64, length: u64) -> Result<Vec<u8>> {
        let size = self.head(loc)?.size;
        self.read_known(loc, size, offset, length)
    }

    /// Same as [`read`](Self::read) when the object size is already known.
    pub fn read_known(
        &self,
        loc: &ResolvedPath,
        size: u64,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>> {
        if offset > size {
            return Err(FsError::Range {
                path: loc.to_path_string(),
                offset,
                size,
            });
        }
        let end = offset.saturating_add(length).min(size);
        if end == offset {
            return Ok(Vec::new());
        }
        debug!(bucket = %loc.bucket, key = %loc.key, offset, end, "get range");
        self.store
            .get_range(loc, offset, end)
            .map_err(|e| FsError::from_store(&loc.to_path_string(), e))
    }

    /// Read through the session's window, refilling it with `block_size`
    /// bytes from the cursor when the cursor falls outside it. Reads of at
    /// least one block go straight to the store.
    pub fn read_windowed(
        &self,
        session: &mut TransferSession,
        size: u64,
        block_size: u64,
        length: u64,
    ) -> Result<Vec<u8>> {
        let pos = session.position;
        if pos >= size || length == 0 {
            return Ok(Vec::new());
        }
        let length = length.min(size - pos);

        if length >= block_size {
            let data = self.read_known(&session.key, size, pos, length)?;
            session.position += data.len() as u64;
            return Ok(data);
        }

        let mut out = Vec::with_capacity(length as usize);
        while (out.len() as u64) < length {
            let cursor = session.position;
            if cursor >= size {
                break;
            }
            session.retain_window_for(cursor);
            if session.window.is_none() {
                let data = self.read_known(&session.key, size, cursor, block_size)?;
                session.window = Some(ReadWindow {
                    start: cursor,
                    data,
                });
            }
            let Some(window) = session.window.as_ref() else {
                break;
            };
            let want = (length as usize) - out.len();
            let chunk = window.slice(cursor, want);
            if chunk.is_empty() {
                break;
            }
            out.extend_from_slice(chunk);
            session.position += chunk.len() as u64;
        }
        Ok(out)
    }

    /// Start a write session for `loc`.
    pub fn start_upload(&self, loc: ResolvedPath, options: &WriteOptions) -> UploadSession {
        let content_type = options
            .content_type
            .clone()
            .unwrap_or_else(|| guess_content_type(&loc.key));
        UploadSession {
            engine: self.clone(),
            session: TransferSession::new(loc, SessionMode::Write),
            content_type,
            single_shot: options.single_shot,
            progress: options.progress.clone(),
            finished: false,
        }
    }

    /// Write a whole payload through one session.
    pub fn write_all(
        &self,
        loc: ResolvedPath,
        data: &[u8],
        options: &WriteOptions,
    ) -> Result<()> {
        let mut upload = self.start_upload(loc, options);
        upload.write(data)?;
        upload.close()
    }
}

/// Options for a write session.
#[derive(Clone, Default)]
pub struct WriteOptions {
    /// Explicit content type; guessed from the extension when `None`
    pub content_type: Option<String>,
    /// Hold up to `single_put_limit` bytes for one `put` instead of streaming parts
    pub single_shot: bool,
    pub progress: Option<ProgressCallback>,
}

impl WriteOptions {
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn single_shot(mut self, single_shot: bool) -> Self {
        self.single_shot = single_shot;
        self
    }
}

/// Buffered write session for one key.
pub struct UploadSession {
    engine: TransferEngine,
    session: TransferSession,
    content_type: String,
    single_shot: bool,
    progress: Option<ProgressCallback>,
    finished: bool,
}

impl UploadSession {
    pub fn location(&self) -> &ResolvedPath {
        &self.session.key
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.session.position
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn completed_parts(&self) -> &[CompletedPart] {
        &self.session.completed_parts
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.session.upload_id.as_deref()
    }

    fn part_size(&self) -> usize {
        self.engine.config.part_size as usize
    }

    fn spill_threshold(&self) -> usize {
        if self.single_shot {
            self.engine.config.single_put_limit as usize
        } else {
            self.part_size()
        }
    }

    fn path(&self) -> String {
        self.session.key.to_path_string()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(FsError::ClosedHandle(self.path()));
        }
        Ok(())
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.session.buffer.extend_from_slice(data);
        self.session.position += data.len() as u64;

        if self.session.is_multipart() || self.session.buffer.len() > self.spill_threshold() {
            self.upload_full_parts()?;
        }
        Ok(())
    }

    /// Upload every complete part without closing.
    ///
    /// In single-shot mode nothing is sent until the buffer outgrows the
    /// single-put limit.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.session.is_multipart() || !self.single_shot {
            self.upload_full_parts()?;
        }
        Ok(())
    }

    /// Commit the object: one `put` if no multipart upload was started,
    /// otherwise the final part followed by the commit.
    pub fn close(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let loc = self.session.key.clone();
        let Some(upload_id) = self.session.upload_id.clone() else {
            let data = std::mem::take(&mut self.session.buffer);
            debug!(bucket = %loc.bucket, key = %loc.key, size = data.len(), "single put");
            self.engine
                .store
                .put(&loc, &data, &self.content_type)
                .map_err(|e| FsError::transfer(&loc.to_path_string(), e))?;
            self.report(data.len() as u64);
            return Ok(());
        };

        if !self.session.buffer.is_empty() {
            let last = std::mem::take(&mut self.session.buffer);
            if let Err(e) = self.upload_parts(vec![last]) {
                self.abort();
                return Err(e);
            }
        }

        let parts = self.session.completed_parts.clone();
        match self
            .engine
            .store
            .commit_multipart_upload(&loc, &upload_id, &parts)
        {
            Ok(()) => {
                info!(bucket = %loc.bucket, key = %loc.key, parts = parts.len(), "multipart upload committed");
                self.session.upload_id = None;
                Ok(())
            }
            Err(e) => {
                self.abort();
                Err(FsError::transfer(&loc.to_path_string(), e))
            }
        }
    }

    /// Drop buffered data and abort any multipart upload.
    pub fn discard(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.session.buffer.clear();
        self.abort();
    }

    fn abort(&mut self) {
        let Some(upload_id) = self.session.upload_id.take() else {
            return;
        };
        let loc = &self.session.key;
        match self.engine.store.abort_multipart_upload(loc, &upload_id) {
            Ok(()) => warn!(bucket = %loc.bucket, key = %loc.key, upload_id = %upload_id, "multipart upload aborted"),
            Err(e) => warn!(
                bucket = %loc.bucket,
                key = %loc.key,
                upload_id = %upload_id,
                error = %e,
                "abort failed, upload left for the bucket lifecycle policy"
            ),
        }
        self.session.completed_parts.clear();
    }

    fn upload_full_parts(&mut self) -> Result<()> {
        let part_size = self.part_size();
        let full = self.session.buffer.len() / part_size;
        if full == 0 {
            return Ok(());
        }

        let rest = self.session.buffer.split_off(full * part_size);
        let ready = std::mem::replace(&mut self.session.buffer, rest);
        let chunks: Vec<Vec<u8>> = ready.chunks(part_size).map(|c| c.to_vec()).collect();

        if let Err(e) = self.upload_parts(chunks) {
            self.finished = true;
            self.session.buffer.clear();
            self.abort();
            return Err(e);
        }
        Ok(())
    }

    fn upload_parts(&mut self, chunks: Vec<Vec<u8>>) -> Result<()> {
        let path = self.path();
        let first = self.session.next_part_number();
        let last = first + chunks.len() as u32 - 1;
        if last > self.engine.config.max_parts {
            return Err(FsError::transfer(
                &path,
                format!("upload needs more than {} parts", self.engine.config.max_parts),
            ));
        }

        let upload_id = match &self.session.upload_id {
            Some(id) => id.clone(),
            None => {
                let id = self
                    .engine
                    .store
                    .create_multipart_upload(&self.session.key, &self.content_type)
                    .map_err(|e| FsError::transfer(&path, e))?;
                info!(bucket = %self.session.key.bucket, key = %self.session.key.key, upload_id = %id, "multipart upload created");
                self.session.upload_id = Some(id.clone());
                id
            }
        };

        let store = &self.engine.store;
        let loc = &self.session.key;
        let work: Vec<(u32, Vec<u8>)> = (first..).zip(chunks).collect();
        let sizes: Vec<u64> = work.iter().map(|(_, c)| c.len() as u64).collect();

        let results = run_bounded(work, self.engine.config.workers, |(number, chunk)| {
            let checksum = part_checksum(&chunk);
            debug!(key = %loc.key, part = number, size = chunk.len(), "uploading part");
            store
                .upload_part(loc, &upload_id, number, &chunk, &checksum)
                .map(|etag| CompletedPart::new(number, etag))
                .map_err(|e| (number, e))
        });

        let mut done = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(part) => done.push(part),
                Err((number, e)) => {
                    return Err(FsError::transfer(&path, format!("part {}: {}", number, e)));
                }
            }
        }
        self.session.completed_parts.extend(done);
        self.report(sizes.iter().sum());
        Ok(())
    }

    fn report(&self, bytes: u64) {
        if let Some(cb) = &self.progress {
            let done: u64 = if self.session.is_multipart() {
                self.session.position - self.session.buffer.len() as u64
            } else {
                bytes
            };
            cb(&TransferProgress::new(done, self.session.position, self.path()));
        }
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if !self.finished {
            warn!(key = %self.session.key.key, "write session dropped without close, aborting");
            self.discard();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MemoryStore, StoreErrorCode, StoreOp};

    const PART: u64 = 1024;

    fn engine(store: &Arc<MemoryStore>) -> TransferEngine {
        let config = FsConfig {
            part_size: PART,
            min_part_size: PART,
            block_size: 16,
            workers: 4,
            ..FsConfig::default()
        };
        TransferEngine::new(store.clone(), config)
    }

    fn loc(key: &str) -> ResolvedPath {
        ResolvedPath::new("bkt", "ns", key)
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_small_payload_is_one_put() {
        let store = Arc::new(MemoryStore::new().with_bucket("bkt", "ns"));
        let engine = engine(&store);

        for len in [0usize, 1, 100, PART as usize] {
            store.reset_calls();
            engine
                .write_all(loc("small.bin"), &payload(len), &WriteOptions::default())
                .unwrap();
            let calls = store.calls();
            assert_eq!(calls.put, 1, "len {}", len);
            assert_eq!(calls.create_multipart + calls.upload_part + calls.commit, 0);
            assert_eq!(store.object("bkt", "ns", "small.bin").unwrap().len(), len);
        }
    }

    #[test]
    fn test_single_shot_holds_large_payload() {
        let store = Arc::new(MemoryStore::new().with_bucket("bkt", "ns"));
        let engine = engine(&store);
        let options = WriteOptions::default().single_shot(true);

        let mut upload = engine.start_upload(loc("big.bin"), &options);
        for _ in 0..5 {
            upload.write(&payload(PART as usize)).unwrap();
            upload.flush().unwrap();
        }
        upload.close().unwrap();

        assert_eq!(store.calls().put, 1);
        assert_eq!(store.calls().upload_part, 0);
    }

    #[test]
    fn test_multipart_parts_in_order() {
        let store = Arc::new(MemoryStore::new().with_bucket("bkt", "ns"));
        let engine = engine(&store);
        let data = payload(4 * PART as usize);

        let mut upload = engine.start_upload(loc("multi.bin"), &WriteOptions::default());
        for chunk in data.chunks(300) {
            upload.write(chunk).unwrap();
        }
        upload.close().unwrap();

        let calls = store.calls();
        assert_eq!(calls.put, 0);
        assert_eq!(calls.create_multipart, 1);
        assert_eq!(calls.upload_part, 4);
        assert_eq!(calls.commit, 1);

        let committed = store.committed_parts();
        let numbers: Vec<u32> = committed[0].iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(store.object("bkt", "ns", "multi.bin").unwrap(), data);
    }

    #[test]
    fn test_final_short_part() {
        let store = Arc::new(MemoryStore::new().with_bucket("bkt", "ns"));
        let engine = engine(&store);
        let data = payload(2 * PART as usize + 10);

        engine
            .write_all(loc("odd.bin"), &data, &WriteOptions::default())
            .unwrap();

        assert_eq!(store.calls().upload_part, 3);
        assert_eq!(store.object("bkt", "ns", "odd.bin").unwrap(), data);
    }

    #[test]
    fn test_part_failure_aborts() {
        let store = Arc::new(MemoryStore::new().with_bucket("bkt", "ns"));
        store.fail_upload_part(3);
        let engine = engine(&store);

        let err = engine
            .write_all(loc("fail.bin"), &payload(5 * PART as usize), &WriteOptions::default())
            .unwrap_err();

        assert!(matches!(err, FsError::Transfer { .. }));
        let calls = store.calls();
        assert_eq!(calls.abort, 1);
        assert_eq!(calls.commit, 0);
        assert!(store.object("bkt", "ns", "fail.bin").is_none());
        assert_eq!(store.pending_uploads(), 0);
    }

    #[test]
    fn test_commit_failure_aborts() {
        let store = Arc::new(MemoryStore::new().with_bucket("bkt", "ns"));
        store.fail_next(StoreOp::Commit, StoreErrorCode::InternalServerError);
        let engine = engine(&store);

        let err = engine
            .write_all(loc("c.bin"), &payload(3 * PART as usize), &WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, FsError::Transfer { .. }));
        assert_eq!(store.calls().abort, 1);
        assert!(store.object("bkt", "ns", "c.bin").is_none());
    }

    #[test]
    fn test_too_many_parts() {
        let store = Arc::new(MemoryStore::new().with_bucket("bkt", "ns"));
        let mut engine = engine(&store);
        engine.config.max_parts = 2;

        let err = engine
            .write_all(loc("x.bin"), &payload(3 * PART as usize + 1), &WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, FsError::Transfer { .. }));
        assert_eq!(store.pending_uploads(), 0);
    }

    #[test]
    fn test_write_after_close() {
        let store = Arc::new(MemoryStore::new().with_bucket("bkt", "ns"));
        let engine = engine(&store);
        let mut upload = engine.start_upload(loc("a.txt"), &WriteOptions::default());
        upload.write(b"abc").unwrap();
        upload.close().unwrap();
        upload.close().unwrap();
        assert!(matches!(upload.write(b"x"), Err(FsError::ClosedHandle(_))));
        assert_eq!(store.calls().put, 1);
        assert_eq!(store.content_type("bkt", "ns", "a.txt").unwrap(), "text/plain");
    }

    #[test]
    fn test_drop_aborts_open_multipart() {
        let store = Arc::new(MemoryStore::new().with_bucket("bkt", "ns"));
        let engine = engine(&store);
        {
            let mut upload = engine.start_upload(loc("d.bin"), &WriteOptions::default());
            upload.write(&payload(2 * PART as usize)).unwrap();
            assert!(upload.upload_id().is_some());
        }
        assert_eq!(store.calls().abort, 1);
        assert_eq!(store.pending_uploads(), 0);
        assert!(store.object("bkt", "ns", "d.bin").is_none());
    }

    #[test]
    fn test_read_bounds() {
        let store = Arc::new(MemoryStore::new());
        store.insert("bkt", "ns", "r.txt", "hello world");
        let engine = engine(&store);

        assert_eq!(engine.read(&loc("r.txt"), 6, 100).unwrap(), b"world");
        assert!(engine.read(&loc("r.txt"), 11, 5).unwrap().is_empty());
        assert!(matches!(
            engine.read(&loc("r.txt"), 12, 1),
            Err(FsError::Range { size: 11, .. })
        ));
        assert!(matches!(
            engine.read(&loc("missing"), 0, 1),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_windowed_reads_reuse_block() {
        let store = Arc::new(MemoryStore::new());
        let data = payload(100);
        store.insert("bkt", "ns", "w.bin", data.clone());
        let engine = engine(&store);

        let mut session = TransferSession::new(loc("w.bin"), SessionMode::Read);
        let mut got = Vec::new();
        for _ in 0..4 {
            got.extend(engine.read_windowed(&mut session, 100, 16, 4).unwrap());
        }
        assert_eq!(got, &data[..16]);
        assert_eq!(store.calls().get_range, 1);

        session.position = 90;
        session.retain_window_for(90);
        let tail = engine.read_windowed(&mut session, 100, 16, 50).unwrap();
        assert_eq!(tail, &data[90..]);
        assert_eq!(store.calls().get_range, 2);
    }
}
