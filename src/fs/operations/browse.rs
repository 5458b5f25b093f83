//! Listing and metadata lookups.

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::api::ListRequest;
use crate::error::{FsError, Result};
use crate::fs::ObjectFileSystem;
use crate::fs::entry::ListingEntry;
use crate::path::ResolvedPath;

impl ObjectFileSystem {
    /// List a directory.
    ///
    /// Served from the listing cache unless `refresh` is set, in which case
    /// the store is listed again and the cached entry replaced. A path naming
    /// an object lists as that single file. A directory that exists only as
    /// a marker object lists as empty.
    ///
    /// # Arguments
    /// * `path` - Directory path (e.g. "bucket@ns/dir", "bucket@ns", "@ns")
    /// * `refresh` - Bypass and overwrite the cached listing
    pub fn ls(&self, path: &str, refresh: bool) -> Result<Vec<ListingEntry>> {
        let loc = self.resolve(path)?;
        self.ls_resolved(&loc, refresh)
    }

    pub(crate) fn ls_resolved(&self, loc: &ResolvedPath, refresh: bool) -> Result<Vec<ListingEntry>> {
        let key = loc.to_path_string();
        if !refresh {
            if let Some(entries) = self.cache.get(&key) {
                debug!(path = %key, "listing cache hit");
                return Ok(entries);
            }
        }

        debug!(path = %key, refresh, "listing from store");
        let generation = self.cache.generation();
        let entries = match self.fetch_listing(loc) {
            Ok(entries) => entries,
            Err(e) => {
                if refresh && e.is_not_found() {
                    self.cache.invalidate(&key);
                }
                return Err(e);
            }
        };
        self.cache.put_if_current(&key, entries.clone(), generation);
        Ok(entries)
    }

    fn fetch_listing(&self, loc: &ResolvedPath) -> Result<Vec<ListingEntry>> {
        let entries = self.emulator.list(loc, false, true)?;
        if !entries.is_empty() || loc.key.is_empty() {
            return Ok(entries);
        }
        match self.engine.head(loc) {
            Ok(head) => Ok(vec![ListingEntry::from_head(loc, head)]),
            Err(e) if e.is_not_found() => {
                if self.emulator.has_children(loc)? {
                    Ok(entries)
                } else {
                    Err(FsError::NotFound(loc.to_path_string()))
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Sorted names of a directory's entries.
    pub fn ls_names(&self, path: &str, refresh: bool) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .ls(path, refresh)?
            .into_iter()
            .map(|e| e.path)
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Metadata of one path. Never served from the listing cache.
    ///
    /// Objects yield a file entry from `head`. A key with no object but
    /// with children, a bucket, or the storage root yields a directory entry.
    pub fn info(&self, path: &str) -> Result<ListingEntry> {
        let loc = self.resolve(path)?;
        self.info_resolved(&loc)
    }

    pub(crate) fn info_resolved(&self, loc: &ResolvedPath) -> Result<ListingEntry> {
        if loc.is_root() {
            return Ok(ListingEntry::directory(loc.to_path_string()));
        }
        if loc.is_bucket() {
            self.check_bucket(loc)?;
            return Ok(ListingEntry::directory(loc.to_path_string()));
        }

        match self.engine.head(loc) {
            Ok(head) => Ok(ListingEntry::from_head(loc, head)),
            Err(e) if e.is_not_found() => {
                if self.emulator.has_children(loc)? {
                    Ok(ListingEntry::directory(loc.to_path_string()))
                } else {
                    Err(e)
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the path exists as an object, a directory or a bucket.
    pub fn exists(&self, path: &str) -> Result<bool> {
        let loc = self.resolve(path)?;
        missing_as_false(self.info_resolved(&loc).map(|_| true))
    }

    /// Whether the path is a directory: the storage root, a bucket, or a key
    /// prefix with at least one key below it.
    pub fn isdir(&self, path: &str) -> Result<bool> {
        let loc = self.resolve(path)?;
        if loc.is_root() {
            return Ok(true);
        }
        if loc.is_bucket() {
            return missing_as_false(self.check_bucket(&loc).map(|_| true));
        }
        missing_as_false(self.emulator.has_children(&loc))
    }

    /// Whether an object exists at exactly this key.
    pub fn isfile(&self, path: &str) -> Result<bool> {
        let loc = self.resolve(path)?;
        if loc.key.is_empty() {
            return Ok(false);
        }
        missing_as_false(self.engine.head(&loc).map(|_| true))
    }

    /// Size of an object in bytes.
    pub fn size(&self, path: &str) -> Result<u64> {
        let loc = self.resolve(path)?;
        Ok(self.engine.head(&loc)?.size)
    }

    /// Content fingerprint of an object.
    ///
    /// The store's etag when it reports one, otherwise a SHA-256 over size
    /// and modification time. Changes whenever the object is rewritten.
    pub fn checksum(&self, path: &str) -> Result<String> {
        let loc = self.resolve(path)?;
        let head = self.engine.head(&loc)?;
        if let Some(etag) = head.etag {
            return Ok(etag);
        }
        let mut hasher = Sha256::new();
        hasher.update(head.size.to_be_bytes());
        hasher.update(head.last_modified.unwrap_or_default().to_be_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    fn check_bucket(&self, loc: &ResolvedPath) -> Result<()> {
        let req = ListRequest::new(&loc.bucket, &loc.namespace, "").limit(1);
        self.store()
            .list(&req)
            .map(|_| ())
            .map_err(|e| FsError::from_store(&loc.to_path_string(), e))
    }
}

fn missing_as_false(result: Result<bool>) -> Result<bool> {
    match result {
        Err(e) if e.is_not_found() => Ok(false),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::api::{MemoryStore, ObjectStore};
    use crate::error::FsError;
    use crate::fs::ObjectFileSystem;
    use crate::fs::cache::testing::RecordingCache;
    use crate::fs::entry::EntryKind;

    fn fixture() -> (Arc<MemoryStore>, ObjectFileSystem) {
        let store = Arc::new(MemoryStore::new());
        for (key, data) in [
            ("dir/a.txt", "aaaa"),
            ("dir/b.csv", "bb"),
            ("dir/sub/c.txt", "c"),
            ("empty/", ""),
            ("top.txt", "top"),
        ] {
            store.insert("bkt", "ns", key, data);
        }
        let fs = ObjectFileSystem::new(store.clone());
        (store, fs)
    }

    #[test]
    fn test_cached_listing_skips_store() {
        let (store, fs) = fixture();
        let first = fs.ls("bkt@ns/dir", false).unwrap();
        assert_eq!(first.len(), 3);

        store.reset_calls();
        let second = fs.ls("bkt@ns/dir", false).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.calls().total(), 0);

        store.insert("bkt", "ns", "dir/new.txt", "n");
        let refreshed = fs.ls("bkt@ns/dir", true).unwrap();
        assert_eq!(refreshed.len(), 4);
        assert!(store.calls().list >= 1);

        store.reset_calls();
        assert_eq!(fs.ls("bkt@ns/dir", false).unwrap().len(), 4);
        assert_eq!(store.calls().total(), 0);
    }

    #[test]
    fn test_ls_file_and_missing() {
        let (_, fs) = fixture();
        let entries = fs.ls("bkt@ns/top.txt", false).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[0].size, 3);

        assert!(fs.ls("bkt@ns/empty", false).unwrap().is_empty());
        assert!(matches!(fs.ls("bkt@ns/nothing", false), Err(FsError::NotFound(_))));
        assert!(fs.cache().get("bkt@ns/nothing").is_none());
    }

    #[test]
    fn test_refresh_drops_vanished_listing() {
        let (store, fs) = fixture();
        store.insert("bkt", "ns", "gone/a.txt", "a");
        assert_eq!(fs.ls("bkt@ns/gone", false).unwrap().len(), 1);

        store
            .delete_objects("bkt", "ns", &["gone/a.txt".to_string()])
            .unwrap();
        assert!(fs.ls("bkt@ns/gone", true).unwrap_err().is_not_found());
        assert!(fs.cache().get("bkt@ns/gone").is_none());
        assert!(fs.ls("bkt@ns/gone", false).unwrap_err().is_not_found());
    }

    #[test]
    fn test_checksum_follows_content() {
        let (store, fs) = fixture();
        let before = fs.checksum("bkt@ns/top.txt").unwrap();
        assert_eq!(fs.info("bkt@ns/top.txt").unwrap().etag.as_deref(), Some(before.as_str()));

        store.insert("bkt", "ns", "top.txt", "changed");
        assert_ne!(fs.checksum("bkt@ns/top.txt").unwrap(), before);
        assert!(fs.checksum("bkt@ns/ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn test_ls_names_and_root() {
        let (store, fs) = fixture();
        store.insert("zed", "ns", "k", "v");
        assert_eq!(
            fs.ls_names("bkt@ns", false).unwrap(),
            vec!["bkt@ns/dir", "bkt@ns/empty", "bkt@ns/top.txt"]
        );
        assert_eq!(fs.ls_names("@ns", false).unwrap(), vec!["bkt@ns", "zed@ns"]);
    }

    #[test]
    fn test_info_bypasses_cache() {
        let (store, fs) = fixture();
        fs.ls("bkt@ns/dir", false).unwrap();
        store.reset_calls();

        let info = fs.info("bkt@ns/dir/a.txt").unwrap();
        assert_eq!(info.size, 4);
        assert_eq!(info.content_type.as_deref(), Some("text/plain"));
        assert_eq!(store.calls().head, 1);

        let dir = fs.info("bkt@ns/dir/sub").unwrap();
        assert!(dir.is_dir());
        assert!(fs.info("bkt@ns").unwrap().is_dir());
        assert!(fs.info("bkt@ns/ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn test_predicates_never_fail_on_missing() {
        let (_, fs) = fixture();
        assert!(fs.exists("bkt@ns/top.txt").unwrap());
        assert!(fs.exists("bkt@ns/dir").unwrap());
        assert!(!fs.exists("bkt@ns/ghost").unwrap());
        assert!(!fs.exists("nobucket@ns/x").unwrap());

        assert!(fs.isdir("bkt@ns/dir").unwrap());
        assert!(fs.isdir("bkt@ns/empty").unwrap());
        assert!(fs.isdir("bkt@ns").unwrap());
        assert!(!fs.isdir("bkt@ns/top.txt").unwrap());
        assert!(!fs.isdir("nobucket@ns").unwrap());

        assert!(fs.isfile("bkt@ns/top.txt").unwrap());
        assert!(!fs.isfile("bkt@ns/dir").unwrap());
        assert!(!fs.isfile("bkt@ns").unwrap());

        assert!(matches!(fs.exists("no-at-sign"), Err(FsError::InvalidPath { .. })));
    }

    #[test]
    fn test_listing_uses_injected_cache() {
        let store = Arc::new(MemoryStore::new());
        store.insert("bkt", "ns", "d/f", "x");
        let cache = Arc::new(RecordingCache::default());
        let fs = ObjectFileSystem::new(store).with_cache(cache.clone());

        fs.ls("bkt@ns/d", false).unwrap();
        fs.ls("bkt@ns/d", false).unwrap();
        assert_eq!(*cache.gets.lock(), vec!["bkt@ns/d", "bkt@ns/d"]);
        assert_eq!(*cache.puts.lock(), vec!["bkt@ns/d"]);
    }
}
