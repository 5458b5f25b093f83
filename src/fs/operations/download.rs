//! Reading whole objects and downloading them to local files.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{FsError, Result};
use crate::fs::ObjectFileSystem;
use crate::path::ResolvedPath;
use crate::pool::run_bounded;
use crate::progress::TransferProgress;

impl ObjectFileSystem {
    /// Whole content of an object.
    pub fn cat(&self, path: &str) -> Result<Vec<u8>> {
        let loc = self.resolve(path)?;
        self.engine.read(&loc, 0, u64::MAX)
    }

    /// Bytes `start..end` of an object, or `start..` when `end` is `None`.
    ///
    /// `end` is clamped to the object size. Fails with `Range` when `start`
    /// lies past the end of the object.
    pub fn cat_range(&self, path: &str, start: u64, end: Option<u64>) -> Result<Vec<u8>> {
        let loc = self.resolve(path)?;
        let length = match end {
            Some(end) => end.saturating_sub(start),
            None => u64::MAX,
        };
        self.engine.read(&loc, start, length)
    }

    /// Download an object to a local file.
    ///
    /// Ranges of `part_size` bytes are fetched `workers` at a time and
    /// written to a hidden temporary file next to the target, which is
    /// renamed over the target once complete. If `local` is an existing
    /// directory the file is created inside it under the object's name.
    ///
    /// # Arguments
    /// * `path` - Object to download
    /// * `local` - Target file or directory
    ///
    /// Returns the path of the written file.
    pub fn get<P: AsRef<Path>>(&self, path: &str, local: P) -> Result<PathBuf> {
        let loc = self.resolve(path)?;
        if loc.key.is_empty() {
            return Err(FsError::invalid_path(path, "get needs an object key"));
        }
        let size = self.engine.head(&loc)?.size;

        let local = local.as_ref();
        let target = if local.is_dir() {
            local.join(loc.name())
        } else {
            local.to_path_buf()
        };
        let parent = target.parent().unwrap_or(Path::new("."));
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| loc.name().to_string());
        let temp = parent.join(format!(".objfs-tmp.{}", file_name));

        debug!(src = %loc, temp = %temp.display(), size, "downloading");
        match self.download_into(&loc, size, &temp) {
            Ok(()) => {
                fs::rename(&temp, &target)?;
                info!(src = %loc, dst = %target.display(), size, "download complete");
                Ok(target)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&temp) {
                    warn!(temp = %temp.display(), error = %cleanup, "could not remove temp file");
                }
                Err(e)
            }
        }
    }

    fn download_into(&self, loc: &ResolvedPath, size: u64, temp: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(temp)?);
        let chunk = self.config().part_size.max(1);
        let workers = self.config().workers;
        let label = loc.to_path_string();

        let ranges: Vec<(u64, u64)> = (0..size.div_ceil(chunk))
            .map(|i| (i * chunk, chunk.min(size - i * chunk)))
            .collect();

        let mut done = 0u64;
        for batch in ranges.chunks(workers) {
            let parts = run_bounded(batch.to_vec(), workers, |(offset, len)| {
                self.engine.read_known(loc, size, offset, len)
            });
            for part in parts {
                let data = part?;
                writer.write_all(&data)?;
                done += data.len() as u64;
                self.report_progress(&TransferProgress::new(done, size, label.as_str()));
            }
        }
        writer.flush()?;
        if done != size {
            return Err(FsError::transfer(
                &label,
                format!("expected {} bytes, received {}", size, done),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::api::{MemoryStore, StoreErrorCode, StoreOp};
    use crate::config::FsConfig;
    use crate::error::FsError;
    use crate::fs::ObjectFileSystem;

    fn small_parts(store: Arc<MemoryStore>) -> ObjectFileSystem {
        let config = FsConfig {
            part_size: 4,
            min_part_size: 4,
            workers: 2,
            ..FsConfig::default()
        };
        ObjectFileSystem::with_config(store, config).unwrap()
    }

    #[test]
    fn test_cat_and_ranges() {
        let store = Arc::new(MemoryStore::new());
        store.insert("bkt", "ns", "f", "0123456789");
        let fs = ObjectFileSystem::new(store);

        assert_eq!(fs.cat("bkt@ns/f").unwrap(), b"0123456789");
        assert_eq!(fs.cat_range("bkt@ns/f", 2, Some(5)).unwrap(), b"234");
        assert_eq!(fs.cat_range("bkt@ns/f", 7, None).unwrap(), b"789");
        assert_eq!(fs.cat_range("bkt@ns/f", 8, Some(100)).unwrap(), b"89");
        assert!(fs.cat_range("bkt@ns/f", 10, None).unwrap().is_empty());
        assert!(matches!(
            fs.cat_range("bkt@ns/f", 11, None),
            Err(FsError::Range { offset: 11, size: 10, .. })
        ));
        assert!(fs.cat("bkt@ns/missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_get_in_ranges() {
        let store = Arc::new(MemoryStore::new());
        store.insert("bkt", "ns", "dir/data.bin", "abcdefghijklmnopq");
        let fs = small_parts(store.clone());
        let dir = tempfile::tempdir().unwrap();

        let written = fs.get("bkt@ns/dir/data.bin", dir.path()).unwrap();
        assert_eq!(written, dir.path().join("data.bin"));
        assert_eq!(std::fs::read(&written).unwrap(), b"abcdefghijklmnopq");
        assert_eq!(store.calls().get_range, 5);

        let named = dir.path().join("copy.bin");
        fs.get("bkt@ns/dir/data.bin", &named).unwrap();
        assert_eq!(std::fs::read(&named).unwrap(), b"abcdefghijklmnopq");
        assert!(!dir.path().join(".objfs-tmp.copy.bin").exists());
    }

    #[test]
    fn test_get_failure_leaves_no_files() {
        let store = Arc::new(MemoryStore::new());
        store.insert("bkt", "ns", "f", "abcdefgh");
        let fs = small_parts(store.clone());
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("f");

        store.fail_next(StoreOp::GetRange, StoreErrorCode::ServiceUnavailable);
        assert!(fs.get("bkt@ns/f", &target).is_err());
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let empty = dir.path().join("none");
        assert!(fs.get("bkt@ns/missing", &empty).unwrap_err().is_not_found());
    }

    #[test]
    fn test_get_empty_object() {
        let store = Arc::new(MemoryStore::new());
        store.insert("bkt", "ns", "empty.txt", "");
        let fs = ObjectFileSystem::new(store);
        let dir = tempfile::tempdir().unwrap();

        let written = fs.get("bkt@ns/empty.txt", dir.path()).unwrap();
        assert_eq!(std::fs::read(written).unwrap(), b"");
    }
}
