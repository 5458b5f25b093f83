//! Multi-key operations: bulk delete, recursive copy and sync.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, info, warn};

use crate::error::{FsError, KeyFailure, Result};
use crate::fs::ObjectFileSystem;
use crate::fs::entry::ListingEntry;
use crate::path::{PathResolver, ResolvedPath, SEP, parent_path};
use crate::pool::run_bounded;
use crate::progress::ProgressCounter;

/// Outcome of an operation over many keys.
///
/// Per-key failures are collected instead of stopping the operation.
#[derive(Debug, Clone, Default)]
pub struct BulkReport {
    /// Canonical paths processed successfully
    pub succeeded: Vec<String>,
    pub failed: Vec<KeyFailure>,
}

impl BulkReport {
    /// True when no key failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Number of succeeded keys, or `PartialBulkFailure` if any key failed.
    pub fn into_result(self) -> Result<usize> {
        if self.failed.is_empty() {
            Ok(self.succeeded.len())
        } else {
            Err(FsError::PartialBulkFailure {
                succeeded: self.succeeded.len(),
                failures: self.failed,
            })
        }
    }

    fn merge(&mut self, other: BulkReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }
}

impl ObjectFileSystem {
    /// Delete many objects, batching calls per bucket.
    ///
    /// Keys are grouped by bucket and namespace and sent `bulk_delete_batch`
    /// at a time, batches running on the worker pool. A key that cannot be
    /// resolved or deleted is recorded in the report; the other keys are
    /// still deleted.
    ///
    /// # Example
    /// ```
    /// # use std::sync::Arc;
    /// # use objfs::{MemoryStore, ObjectFileSystem};
    /// let store = Arc::new(MemoryStore::new());
    /// store.insert("bucket", "ns", "a", "1");
    /// store.insert("bucket", "ns", "b", "2");
    /// let fs = ObjectFileSystem::new(store);
    ///
    /// let report = fs.bulk_delete(&["bucket@ns/a", "bucket@ns/b", "bucket@ns/gone"]).unwrap();
    /// assert_eq!(report.succeeded.len(), 2);
    /// assert_eq!(report.failed[0].path, "bucket@ns/gone");
    /// ```
    pub fn bulk_delete<S: AsRef<str>>(&self, paths: &[S]) -> Result<BulkReport> {
        let mut report = BulkReport::default();
        let mut groups: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();

        for path in paths {
            let path = path.as_ref();
            match self.resolve(path) {
                Ok(loc) if loc.key.is_empty() => {
                    report.failed.push(KeyFailure::new(path, "not an object path"));
                }
                Ok(loc) => groups
                    .entry((loc.bucket, loc.namespace))
                    .or_default()
                    .push(loc.key),
                Err(e) => report.failed.push(KeyFailure::new(path, e.to_string())),
            }
        }

        for ((bucket, namespace), keys) in groups {
            report.merge(self.delete_keys(&bucket, &namespace, keys));
        }
        Ok(report)
    }

    /// Delete raw keys of one bucket. Keys are not normalized, so directory
    /// markers can be removed too.
    pub(crate) fn delete_keys(&self, bucket: &str, namespace: &str, keys: Vec<String>) -> BulkReport {
        let mut report = BulkReport::default();
        if keys.is_empty() {
            return report;
        }

        let total = keys.len() as u64;
        let progress = ProgressCounter::new(
            total,
            format!("delete {}@{}", bucket, namespace),
            self.progress_callback(),
        );
        let batches: Vec<Vec<String>> = keys
            .chunks(self.config().bulk_delete_batch)
            .map(<[String]>::to_vec)
            .collect();
        debug!(bucket, namespace, keys = total, batches = batches.len(), "bulk delete");

        let outcomes = run_bounded(batches, self.config().workers, |batch| {
            let outcome = self.store().delete_objects(bucket, namespace, &batch);
            progress.advance(batch.len() as u64);
            (batch, outcome)
        });

        let mut parents = BTreeSet::new();
        for (batch, outcome) in outcomes {
            match outcome {
                Ok(results) => {
                    for result in results {
                        let path = PathResolver::to_path_string(bucket, namespace, &result.key);
                        match result.error {
                            None => report.succeeded.push(path),
                            Some(e) => report.failed.push(KeyFailure::new(path, e.to_string())),
                        }
                    }
                }
                Err(e) => {
                    warn!(bucket, namespace, keys = batch.len(), error = %e, "delete batch failed");
                    for key in &batch {
                        let path = PathResolver::to_path_string(bucket, namespace, key);
                        report.failed.push(KeyFailure::new(path, e.to_string()));
                    }
                }
            }
            for key in &batch {
                let path = PathResolver::to_path_string(bucket, namespace, key);
                if let Some(parent) = parent_path(&path) {
                    parents.insert(parent);
                }
            }
        }

        for parent in parents {
            self.cache.invalidate(&parent);
        }
        info!(
            bucket,
            namespace,
            deleted = report.succeeded.len(),
            failed = report.failed.len(),
            "bulk delete finished"
        );
        report
    }

    /// Copy `(source, destination)` pairs on the worker pool.
    pub(crate) fn copy_pairs(&self, pairs: Vec<(ResolvedPath, ResolvedPath)>, label: &str) -> BulkReport {
        let progress = ProgressCounter::new(pairs.len() as u64, label, self.progress_callback());

        let outcomes = run_bounded(pairs, self.config().workers, |(src, dst)| {
            let outcome = self.store().copy_object(&src, &dst);
            progress.advance(1);
            (src, dst, outcome)
        });

        let mut report = BulkReport::default();
        for (src, dst, outcome) in outcomes {
            match outcome {
                Ok(()) => report.succeeded.push(dst.to_path_string()),
                Err(e) => {
                    warn!(src = %src, dst = %dst, error = %e, "copy failed");
                    report
                        .failed
                        .push(KeyFailure::new(src.to_path_string(), e.to_string()));
                }
            }
        }
        report
    }

    /// Make `dst` hold every file of `src`.
    ///
    /// Files are matched by their path relative to `src` and copied when the
    /// destination is missing or differs in size or etag. Without
    /// `recursive`, only the direct children of `src` are considered. A
    /// `src` naming a single object is synced onto `dst` itself.
    pub fn sync(&self, src: &str, dst: &str, recursive: bool) -> Result<BulkReport> {
        let src_loc = self.resolve(src)?;
        let dst_loc = self.resolve(dst)?;
        if src_loc.is_root() || dst_loc.is_root() {
            return Err(FsError::invalid_path(src, "cannot sync the storage root"));
        }

        let sources = self.files_under(&src_loc, recursive)?;
        if sources.is_empty() && !self.exists(src)? {
            return Err(FsError::NotFound(src_loc.to_path_string()));
        }

        let existing: HashMap<String, ListingEntry> = match self.files_under(&dst_loc, recursive) {
            Ok(entries) => entries.into_iter().map(|e| (e.path.clone(), e)).collect(),
            Err(e) if e.is_not_found() => HashMap::new(),
            Err(e) => return Err(e),
        };

        let base = src_loc.to_path_string();
        let mut pairs = Vec::new();
        let mut unchanged = 0usize;
        for entry in &sources {
            let rel = entry
                .path
                .strip_prefix(&base)
                .unwrap_or(&entry.path)
                .trim_start_matches(SEP);
            let target = if rel.is_empty() {
                dst_loc.clone()
            } else {
                dst_loc.join(rel)
            };
            if existing
                .get(&target.to_path_string())
                .is_some_and(|current| same_content(entry, current))
            {
                unchanged += 1;
                continue;
            }
            pairs.push((src_loc.join(rel), target));
        }

        info!(src = %src_loc, dst = %dst_loc, copy = pairs.len(), unchanged, "sync");
        let report = self.copy_pairs(pairs, &format!("sync {}", dst_loc));
        self.invalidate(&dst_loc);
        Ok(report)
    }

    fn files_under(&self, loc: &ResolvedPath, recursive: bool) -> Result<Vec<ListingEntry>> {
        if recursive {
            return self.find_resolved(loc, false, true);
        }
        match self.ls_resolved(loc, true) {
            Ok(entries) => Ok(entries.into_iter().filter(ListingEntry::is_file).collect()),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

fn same_content(a: &ListingEntry, b: &ListingEntry) -> bool {
    if a.size != b.size {
        return false;
    }
    match (&a.etag, &b.etag) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}
