//! Writing objects from memory, readers and local files.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{FsError, Result};
use crate::fs::ObjectFileSystem;
use crate::fs::handle::{FileHandle, OpenMode, OpenOptions};

impl ObjectFileSystem {
    /// Store `data` as the whole content of `path`.
    ///
    /// Payloads up to the spill threshold go out in one `put`; larger ones as
    /// a multipart upload.
    pub fn pipe(&self, path: &str, data: &[u8]) -> Result<()> {
        let loc = self.resolve(path)?;
        if loc.key.is_empty() {
            return Err(FsError::invalid_path(path, "pipe needs an object key"));
        }
        let options = self.write_options(&OpenOptions::default());
        self.engine.write_all(loc.clone(), data, &options)?;
        self.invalidate(&loc);
        Ok(())
    }

    /// Upload a local file. Returns the number of bytes written.
    pub fn put<P: AsRef<Path>>(&self, local: P, path: &str) -> Result<u64> {
        let local = local.as_ref();
        let file = File::open(local)?;
        debug!(src = %local.display(), dst = path, "uploading file");
        self.put_reader(file, path)
    }

    /// Stream everything `reader` yields into `path`.
    pub fn put_reader<R: Read>(&self, mut reader: R, path: &str) -> Result<u64> {
        let chunk = self.config().part_size.max(1) as usize;
        let written = self.with_writer(path, |handle| {
            let mut buf = vec![0u8; chunk];
            let mut total = 0u64;
            loop {
                let n = match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                handle.write_bytes(&buf[..n])?;
                total += n as u64;
            }
            Ok(total)
        })?;
        info!(dst = path, bytes = written, "upload complete");
        Ok(written)
    }

    /// Run `f` with a write handle for `path`.
    ///
    /// The object is committed when `f` returns `Ok` and abandoned (any
    /// multipart upload aborted) when it returns `Err`.
    ///
    /// # Example
    /// ```
    /// # use std::sync::Arc;
    /// # use objfs::{MemoryStore, ObjectFileSystem};
    /// let fs = ObjectFileSystem::new(Arc::new(MemoryStore::new().with_bucket("bucket", "ns")));
    /// fs.with_writer("bucket@ns/log.txt", |h| {
    ///     h.write_bytes(b"line 1\n")?;
    ///     h.write_bytes(b"line 2\n")?;
    ///     Ok(())
    /// })
    /// .unwrap();
    /// assert_eq!(fs.cat("bucket@ns/log.txt").unwrap(), b"line 1\nline 2\n");
    /// ```
    pub fn with_writer<T, F>(&self, path: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut FileHandle) -> Result<T>,
    {
        let mut handle = self.open(path, OpenMode::Write)?;
        match f(&mut handle) {
            Ok(value) => {
                handle.close()?;
                Ok(value)
            }
            Err(e) => {
                handle.discard();
                Err(e)
            }
        }
    }
}
