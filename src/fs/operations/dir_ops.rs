//! Mutating operations: remove, make and remove directories, copy, move.

use tracing::{debug, info, warn};

use super::bulk::BulkReport;
use crate::api::StoreErrorCode;
use crate::error::{FsError, Result};
use crate::fs::ObjectFileSystem;
use crate::fs::handle::OpenOptions;
use crate::path::{ResolvedPath, SEP};

impl ObjectFileSystem {
    /// Remove a path.
    ///
    /// Without `recursive` exactly one object is removed, and a directory is
    /// refused. With `recursive` every key below the path is removed in
    /// bulk, together with the object at the path itself if there is one. A
    /// bucket path removes the bucket, after emptying it when `recursive`.
    pub fn rm(&self, path: &str, recursive: bool) -> Result<()> {
        let loc = self.resolve(path)?;
        if loc.is_root() {
            return Err(FsError::invalid_path(path, "cannot remove the storage root"));
        }

        if loc.is_bucket() {
            if recursive {
                let keys = self.emulator.keys(&loc)?;
                self.delete_keys(&loc.bucket, &loc.namespace, keys)
                    .into_result()?;
            }
            return self.remove_bucket(&loc);
        }

        if recursive {
            let keys = self.tree_keys(&loc)?;
            self.delete_keys(&loc.bucket, &loc.namespace, keys)
                .into_result()?;
            self.invalidate(&loc);
            return Ok(());
        }

        match self.engine.head(&loc) {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                if self.emulator.has_children(&loc)? {
                    return Err(FsError::invalid_path(
                        path,
                        "is a directory, remove it recursively",
                    ));
                }
                return Err(e);
            }
            Err(e) => return Err(e),
        }
        self.delete_keys(&loc.bucket, &loc.namespace, vec![loc.key.clone()])
            .into_result()?;
        Ok(())
    }

    /// Create the bucket of `path`. Succeeds if it already exists.
    ///
    /// Directories below a bucket need no object of their own; they exist as
    /// soon as a key is written under them.
    pub fn mkdir(&self, path: &str) -> Result<()> {
        let loc = self.resolve(path)?;
        if loc.is_root() {
            return Err(FsError::invalid_path(path, "cannot create the storage root"));
        }
        match self.store().create_bucket(&loc.bucket, &loc.namespace) {
            Ok(()) => info!(bucket = %loc.bucket, namespace = %loc.namespace, "bucket created"),
            Err(e) if e.code == StoreErrorCode::Conflict => {
                debug!(bucket = %loc.bucket, namespace = %loc.namespace, "bucket already exists");
            }
            Err(e) => return Err(FsError::Store(e)),
        }
        self.invalidate(&loc);
        Ok(())
    }

    /// Remove an empty directory: an empty bucket, or a prefix holding only
    /// its directory marker.
    pub fn rmdir(&self, path: &str) -> Result<()> {
        let loc = self.resolve(path)?;
        if loc.is_root() {
            return Err(FsError::invalid_path(path, "cannot remove the storage root"));
        }
        if loc.is_bucket() {
            if self.emulator.has_children(&loc)? {
                return Err(not_empty(&loc));
            }
            return self.remove_bucket(&loc);
        }

        let keys = self.emulator.keys(&loc)?;
        let marker = loc.dir_prefix();
        match keys.as_slice() {
            [] => Err(FsError::NotFound(loc.to_path_string())),
            [only] if *only == marker => {
                self.delete_keys(&loc.bucket, &loc.namespace, keys)
                    .into_result()?;
                self.invalidate(&loc);
                Ok(())
            }
            _ => Err(not_empty(&loc)),
        }
    }

    /// Create an empty object, replacing any existing content.
    pub fn touch(&self, path: &str) -> Result<()> {
        let loc = self.resolve(path)?;
        if loc.key.is_empty() {
            return Err(FsError::invalid_path(path, "touch needs an object key"));
        }
        let options = self.write_options(&OpenOptions::default());
        self.engine.write_all(loc.clone(), &[], &options)?;
        self.invalidate(&loc);
        Ok(())
    }

    /// Copy one object.
    pub fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let src_loc = self.resolve(src)?;
        let dst_loc = self.resolve(dst)?;
        if src_loc.key.is_empty() || dst_loc.key.is_empty() {
            return Err(FsError::invalid_path(src, "copy needs object keys on both sides"));
        }
        self.store()
            .copy_object(&src_loc, &dst_loc)
            .map_err(|e| FsError::from_store(&src_loc.to_path_string(), e))?;
        debug!(src = %src_loc, dst = %dst_loc, "copied");
        self.invalidate(&dst_loc);
        Ok(())
    }

    /// Copy every object below `src` to the same relative path below `dst`.
    ///
    /// If `src` itself names an object it is copied to `dst`. Directory
    /// markers are not copied. Copies run on the worker pool and failures
    /// are collected in the report.
    pub fn copy_recursive(&self, src: &str, dst: &str) -> Result<BulkReport> {
        let src_loc = self.resolve(src)?;
        let dst_loc = self.resolve(dst)?;
        if src_loc.is_root() || dst_loc.is_root() {
            return Err(FsError::invalid_path(src, "cannot copy the storage root"));
        }
        let keys = self.tree_keys(&src_loc)?;
        Ok(self.copy_tree(&src_loc, &dst_loc, &keys))
    }

    /// Move a file or directory.
    ///
    /// A single object moved within its bucket uses the store's rename. Any
    /// other move is a copy followed by a delete and is not atomic. A
    /// directory is copied key by key and the originals are deleted only if
    /// every copy succeeded; otherwise the copies made so far stay in place
    /// and the failures are returned. A failure while deleting leaves keys
    /// under both paths.
    pub fn mv(&self, src: &str, dst: &str) -> Result<()> {
        let src_loc = self.resolve(src)?;
        let dst_loc = self.resolve(dst)?;
        if src_loc.key.is_empty() {
            return Err(FsError::invalid_path(src, "cannot move a bucket or the storage root"));
        }
        if dst_loc.is_root() {
            return Err(FsError::invalid_path(dst, "cannot move onto the storage root"));
        }
        if src_loc == dst_loc {
            return Ok(());
        }

        let keys = self.tree_keys(&src_loc)?;
        if keys == [src_loc.key.as_str()] && src_loc.same_bucket(&dst_loc) {
            let target = if dst_loc.key.is_empty() {
                dst_loc.join(src_loc.name())
            } else {
                dst_loc.clone()
            };
            self.store()
                .rename_object(&src_loc, &target)
                .map_err(|e| FsError::from_store(&src_loc.to_path_string(), e))?;
            self.invalidate(&src_loc);
            self.invalidate(&target);
            info!(src = %src_loc, dst = %target, "renamed");
            return Ok(());
        }

        let copied = self.copy_tree(&src_loc, &dst_loc, &keys);
        if !copied.is_complete() {
            warn!(
                src = %src_loc,
                dst = %dst_loc,
                failed = copied.failed.len(),
                "move aborted before deleting the source"
            );
            return copied.into_result().map(|_| ());
        }

        self.delete_keys(&src_loc.bucket, &src_loc.namespace, keys)
            .into_result()?;
        self.invalidate(&src_loc);
        info!(src = %src_loc, dst = %dst_loc, "moved");
        Ok(())
    }

    /// Alias of [`mv`](Self::mv).
    pub fn rename(&self, src: &str, dst: &str) -> Result<()> {
        self.mv(src, dst)
    }

    /// Raw keys below `loc` plus `loc` itself when it names an object.
    fn tree_keys(&self, loc: &ResolvedPath) -> Result<Vec<String>> {
        let mut keys = self.emulator.keys(loc)?;
        if !loc.key.is_empty() {
            match self.engine.head(loc) {
                Ok(_) => keys.insert(0, loc.key.clone()),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        if keys.is_empty() {
            return Err(FsError::NotFound(loc.to_path_string()));
        }
        Ok(keys)
    }

    fn copy_tree(&self, src: &ResolvedPath, dst: &ResolvedPath, keys: &[String]) -> BulkReport {
        let prefix = src.dir_prefix();
        let pairs = keys
            .iter()
            .filter(|key| !key.ends_with(SEP))
            .map(|key| {
                let target = if *key == src.key {
                    if dst.key.is_empty() {
                        dst.join(src.name())
                    } else {
                        dst.clone()
                    }
                } else {
                    dst.join(key.strip_prefix(prefix.as_str()).unwrap_or(key))
                };
                (src.with_key(key), target)
            })
            .collect();
        let report = self.copy_pairs(pairs, &format!("copy {}", dst));
        self.invalidate(dst);
        report
    }

    fn remove_bucket(&self, loc: &ResolvedPath) -> Result<()> {
        self.store()
            .delete_bucket(&loc.bucket, &loc.namespace)
            .map_err(|e| FsError::from_store(&loc.to_path_string(), e))?;
        info!(bucket = %loc.bucket, namespace = %loc.namespace, "bucket removed");
        self.invalidate(loc);
        Ok(())
    }
}

fn not_empty(loc: &ResolvedPath) -> FsError {
    FsError::Custom(format!("Directory not empty: {}", loc))
}
