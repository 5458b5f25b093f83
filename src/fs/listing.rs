//! Directory emulation over flat key listings.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::entry::ListingEntry;
use crate::api::{ListRequest, ObjectStore};
use crate::error::{FsError, Result};
use crate::path::{ResolvedPath, SEP};

/// Builds directory listings from paginated prefix listings.
#[derive(Clone)]
pub struct DirectoryEmulator {
    store: Arc<dyn ObjectStore>,
}

impl DirectoryEmulator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// List the children of `dir`, or every descendant when `recursive`.
    ///
    /// Common prefixes become directory entries. Recursive listings also
    /// synthesize every intermediate directory. A zero-length key ending in
    /// the separator is a directory marker: it is dropped when the listing
    /// already has a directory entry for that path, and listed as a
    /// directory otherwise. The storage root lists the namespace's buckets.
    /// Entries are sorted by path; `detail = false` strips metadata.
    pub fn list(
        &self,
        dir: &ResolvedPath,
        recursive: bool,
        detail: bool,
    ) -> Result<Vec<ListingEntry>> {
        if dir.is_root() {
            return self.list_buckets(&dir.namespace);
        }

        let prefix = dir.dir_prefix();
        let mut dirs: BTreeMap<String, ListingEntry> = BTreeMap::new();
        let mut files: Vec<ListingEntry> = Vec::new();
        let mut markers: Vec<String> = Vec::new();

        let mut token = None;
        let mut pages = 0usize;
        loop {
            let mut req = ListRequest::new(&dir.bucket, &dir.namespace, prefix.clone()).start(token);
            if !recursive {
                req = req.delimited(SEP);
            }
            let page = self
                .store
                .list(&req)
                .map_err(|e| FsError::from_store(&dir.to_path_string(), e))?;
            pages += 1;

            for common in &page.prefixes {
                let rel = common
                    .strip_prefix(prefix.as_str())
                    .unwrap_or(common)
                    .trim_end_matches(SEP);
                if rel.is_empty() {
                    continue;
                }
                let path = dir.with_key(common).to_path_string();
                dirs.entry(path.clone())
                    .or_insert_with(|| ListingEntry::directory(path));
            }

            for obj in &page.objects {
                let rel = obj.key.strip_prefix(prefix.as_str()).unwrap_or(&obj.key);
                if rel.trim_end_matches(SEP).is_empty() {
                    continue;
                }
                if obj.key.ends_with(SEP) && obj.size == 0 {
                    markers.push(dir.with_key(&obj.key).to_path_string());
                    continue;
                }
                if recursive {
                    add_parents(dir, rel, &mut dirs);
                }
                files.push(ListingEntry::from_summary(dir, obj));
            }

            token = page.next_start;
            if token.is_none() {
                break;
            }
        }

        for marker in markers {
            if recursive {
                let rel = marker_rel(dir, &marker);
                add_parents(dir, &rel, &mut dirs);
            }
            dirs.entry(marker.clone())
                .or_insert_with(|| ListingEntry::directory(marker));
        }

        debug!(
            path = %dir,
            recursive,
            pages,
            dirs = dirs.len(),
            files = files.len(),
            "listed prefix"
        );

        let mut entries: Vec<ListingEntry> = dirs.into_values().chain(files).collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        if !detail {
            entries = entries.iter().map(ListingEntry::without_detail).collect();
        }
        Ok(entries)
    }

    /// Buckets of a namespace as directory entries.
    pub fn list_buckets(&self, namespace: &str) -> Result<Vec<ListingEntry>> {
        let mut buckets = self
            .store
            .list_buckets(namespace)
            .map_err(|e| FsError::from_store(&format!("@{}", namespace), e))?;
        buckets.sort();
        debug!(namespace, count = buckets.len(), "listed buckets");
        Ok(buckets
            .into_iter()
            .map(|b| ListingEntry::directory(format!("{}@{}", b, namespace)))
            .collect())
    }

    /// Every raw key under `dir`, directory markers included.
    pub fn keys(&self, dir: &ResolvedPath) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token = None;
        loop {
            let req = ListRequest::new(&dir.bucket, &dir.namespace, dir.dir_prefix()).start(token);
            let page = self
                .store
                .list(&req)
                .map_err(|e| FsError::from_store(&dir.to_path_string(), e))?;
            keys.extend(page.objects.into_iter().map(|o| o.key));
            token = page.next_start;
            if token.is_none() {
                break;
            }
        }
        Ok(keys)
    }

    /// Whether any key lives under `dir`, using a one-entry listing.
    pub fn has_children(&self, dir: &ResolvedPath) -> Result<bool> {
        let req = ListRequest::new(&dir.bucket, &dir.namespace, dir.dir_prefix()).limit(1);
        let page = self
            .store
            .list(&req)
            .map_err(|e| FsError::from_store(&dir.to_path_string(), e))?;
        Ok(!page.objects.is_empty() || !page.prefixes.is_empty())
    }
}

/// Add a directory entry for every proper ancestor of `rel` below `dir`.
fn add_parents(dir: &ResolvedPath, rel: &str, dirs: &mut BTreeMap<String, ListingEntry>) {
    let segments: Vec<&str> = rel.split(SEP).filter(|s| !s.is_empty()).collect();
    let mut acc = String::new();
    for seg in segments.iter().take(segments.len().saturating_sub(1)) {
        if !acc.is_empty() {
            acc.push(SEP);
        }
        acc.push_str(seg);
        let path = dir.join(&acc).to_path_string();
        dirs.entry(path.clone())
            .or_insert_with(|| ListingEntry::directory(path));
    }
}

fn marker_rel(dir: &ResolvedPath, marker: &str) -> String {
    let base = dir.to_path_string();
    marker
        .strip_prefix(&base)
        .unwrap_or(marker)
        .trim_start_matches(SEP)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DeleteResult, ListPage, MemoryStore, ObjectHead, StoreResult};
    use crate::fs::CompletedPart;
    use crate::fs::entry::EntryKind;

    fn paths(entries: &[ListingEntry]) -> Vec<(&str, EntryKind)> {
        entries.iter().map(|e| (e.path.as_str(), e.kind)).collect()
    }

    fn store() -> Arc<MemoryStore> {
        let store = MemoryStore::new().with_page_size(2);
        for (key, data) in [
            ("a.txt", "aa"),
            ("b.csv", "bbb"),
            ("dir/", ""),
            ("dir/x.txt", "x"),
            ("dir/sub/y.txt", "y"),
            ("empty/", ""),
        ] {
            store.insert("bkt", "ns", key, data);
        }
        Arc::new(store)
    }

    #[test]
    fn test_list_top_level() {
        let store = store();
        let emu = DirectoryEmulator::new(store.clone());
        let entries = emu.list(&ResolvedPath::new("bkt", "ns", ""), false, true).unwrap();
        assert_eq!(
            paths(&entries),
            vec![
                ("bkt@ns/a.txt", EntryKind::File),
                ("bkt@ns/b.csv", EntryKind::File),
                ("bkt@ns/dir", EntryKind::Directory),
                ("bkt@ns/empty", EntryKind::Directory),
            ]
        );
        assert_eq!(entries[1].size, 3);
        assert!(store.calls().list > 1);
    }

    #[test]
    fn test_marker_for_listed_dir_is_suppressed() {
        let emu = DirectoryEmulator::new(store());
        let entries = emu.list(&ResolvedPath::new("bkt", "ns", "dir"), false, true).unwrap();
        assert_eq!(
            paths(&entries),
            vec![
                ("bkt@ns/dir/sub", EntryKind::Directory),
                ("bkt@ns/dir/x.txt", EntryKind::File),
            ]
        );

        assert!(emu.list(&ResolvedPath::new("bkt", "ns", "empty"), false, true).unwrap().is_empty());
    }

    #[test]
    fn test_recursive_listing() {
        let emu = DirectoryEmulator::new(store());
        let entries = emu.list(&ResolvedPath::new("bkt", "ns", ""), true, false).unwrap();
        assert_eq!(
            paths(&entries),
            vec![
                ("bkt@ns/a.txt", EntryKind::File),
                ("bkt@ns/b.csv", EntryKind::File),
                ("bkt@ns/dir", EntryKind::Directory),
                ("bkt@ns/dir/sub", EntryKind::Directory),
                ("bkt@ns/dir/sub/y.txt", EntryKind::File),
                ("bkt@ns/dir/x.txt", EntryKind::File),
                ("bkt@ns/empty", EntryKind::Directory),
            ]
        );
        assert!(entries.iter().all(|e| e.etag.is_none()));
    }

    #[test]
    fn test_buckets_at_root() {
        let store = store();
        store.insert("other", "ns", "k", "v");
        store.insert("elsewhere", "ns2", "k", "v");
        let emu = DirectoryEmulator::new(store);
        let entries = emu.list(&ResolvedPath::root("ns"), false, true).unwrap();
        assert_eq!(
            paths(&entries),
            vec![
                ("bkt@ns", EntryKind::Directory),
                ("other@ns", EntryKind::Directory),
            ]
        );
    }

    #[test]
    fn test_missing_bucket() {
        let emu = DirectoryEmulator::new(store());
        let err = emu
            .list(&ResolvedPath::new("nope", "ns", "x"), false, true)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_has_children() {
        let emu = DirectoryEmulator::new(store());
        assert!(emu.has_children(&ResolvedPath::new("bkt", "ns", "dir")).unwrap());
        assert!(emu.has_children(&ResolvedPath::new("bkt", "ns", "empty")).unwrap());
        assert!(!emu.has_children(&ResolvedPath::new("bkt", "ns", "a.txt")).unwrap());
    }

    /// Store returning one extra common prefix outside the requested prefix.
    struct StrayPrefixStore(Arc<MemoryStore>);

    impl ObjectStore for StrayPrefixStore {
        fn head(&self, loc: &ResolvedPath) -> StoreResult<ObjectHead> {
            self.0.head(loc)
        }

        fn list(&self, req: &ListRequest) -> StoreResult<ListPage> {
            let mut page = self.0.list(req)?;
            page.prefixes.push("d/".to_string());
            Ok(page)
        }

        fn get_range(&self, loc: &ResolvedPath, start: u64, end: u64) -> StoreResult<Vec<u8>> {
            self.0.get_range(loc, start, end)
        }

        fn put(&self, loc: &ResolvedPath, data: &[u8], content_type: &str) -> StoreResult<String> {
            self.0.put(loc, data, content_type)
        }

        fn create_multipart_upload(
            &self,
            loc: &ResolvedPath,
            content_type: &str,
        ) -> StoreResult<String> {
            self.0.create_multipart_upload(loc, content_type)
        }

        fn upload_part(
            &self,
            loc: &ResolvedPath,
            upload_id: &str,
            part_number: u32,
            data: &[u8],
            checksum: &str,
        ) -> StoreResult<String> {
            self.0.upload_part(loc, upload_id, part_number, data, checksum)
        }

        fn commit_multipart_upload(
            &self,
            loc: &ResolvedPath,
            upload_id: &str,
            parts: &[CompletedPart],
        ) -> StoreResult<()> {
            self.0.commit_multipart_upload(loc, upload_id, parts)
        }

        fn abort_multipart_upload(&self, loc: &ResolvedPath, upload_id: &str) -> StoreResult<()> {
            self.0.abort_multipart_upload(loc, upload_id)
        }

        fn delete_objects(
            &self,
            bucket: &str,
            namespace: &str,
            keys: &[String],
        ) -> StoreResult<Vec<DeleteResult>> {
            self.0.delete_objects(bucket, namespace, keys)
        }

        fn list_buckets(&self, namespace: &str) -> StoreResult<Vec<String>> {
            self.0.list_buckets(namespace)
        }

        fn create_bucket(&self, bucket: &str, namespace: &str) -> StoreResult<()> {
            self.0.create_bucket(bucket, namespace)
        }

        fn delete_bucket(&self, bucket: &str, namespace: &str) -> StoreResult<()> {
            self.0.delete_bucket(bucket, namespace)
        }
    }

    #[test]
    fn test_short_common_prefix_does_not_panic() {
        let emu = DirectoryEmulator::new(Arc::new(StrayPrefixStore(store())));
        let entries = emu
            .list(&ResolvedPath::new("bkt", "ns", "dir/sub"), false, true)
            .unwrap();
        assert!(entries.iter().any(|e| e.path == "bkt@ns/dir/sub/y.txt"));
    }
}
