//! Recursive listing, disk usage and globbing.

use tracing::debug;

use crate::error::Result;
use crate::fs::ObjectFileSystem;
use crate::fs::cache::deep_key;
use crate::fs::entry::ListingEntry;
use crate::fs::glob;
use crate::path::ResolvedPath;
use crate::pool::run_bounded;

impl ObjectFileSystem {
    /// Every file below `path`, fully materialized.
    ///
    /// With `withdirs`, synthesized directories are included too. A path
    /// naming an object yields just that object. At the storage root all
    /// buckets are walked in parallel. Recursive listings are cached like
    /// [`ls`](Self::ls) results; `refresh` lists the store again.
    pub fn find(&self, path: &str, withdirs: bool, refresh: bool) -> Result<Vec<ListingEntry>> {
        let loc = self.resolve(path)?;
        self.find_resolved(&loc, withdirs, refresh)
    }

    pub(crate) fn find_resolved(
        &self,
        loc: &ResolvedPath,
        withdirs: bool,
        refresh: bool,
    ) -> Result<Vec<ListingEntry>> {
        let mut entries = if loc.is_root() {
            let buckets = self.ls_resolved(loc, refresh)?;
            let names: Vec<ResolvedPath> = buckets
                .iter()
                .map(|b| ResolvedPath::new(b.name(), loc.namespace.clone(), ""))
                .collect();
            let listed = run_bounded(names, self.config().workers, |bucket| {
                self.walk_resolved(&bucket, refresh)
            });
            let mut all = if withdirs { buckets } else { Vec::new() };
            for result in listed {
                all.extend(result?);
            }
            all
        } else {
            self.walk_resolved(loc, refresh)?
        };

        if entries.is_empty() && !loc.key.is_empty() {
            match self.engine.head(loc) {
                Ok(head) => entries.push(ListingEntry::from_head(loc, head)),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        if !withdirs {
            entries.retain(|e| e.is_file());
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Recursive listing of `loc` with directories, through the cache.
    pub(crate) fn walk_resolved(&self, loc: &ResolvedPath, refresh: bool) -> Result<Vec<ListingEntry>> {
        let path = loc.to_path_string();
        let key = deep_key(&path);
        if !refresh {
            if let Some(entries) = self.cache.get(&key) {
                debug!(path = %path, "recursive listing cache hit");
                return Ok(entries);
            }
        }

        let generation = self.cache.generation();
        let entries = match self.emulator.list(loc, true, true) {
            Ok(entries) => entries,
            Err(e) => {
                if refresh && e.is_not_found() {
                    self.cache.invalidate(&path);
                }
                return Err(e);
            }
        };
        self.cache.put_if_current(&key, entries.clone(), generation);
        Ok(entries)
    }

    /// Total size in bytes of the files below `path`.
    pub fn du(&self, path: &str) -> Result<u64> {
        Ok(self.find(path, false, false)?.iter().map(|e| e.size).sum())
    }

    /// Paths matching a pattern over keys.
    ///
    /// `*` and `?` match within one path segment, `**` across segments.
    /// Wildcards apply to the key only, not to bucket or namespace.
    /// Candidates come from the listing cache when it holds them.
    ///
    /// # Example
    /// ```
    /// # use std::sync::Arc;
    /// # use objfs::{MemoryStore, ObjectFileSystem};
    /// let store = Arc::new(MemoryStore::new());
    /// for key in ["a.txt", "b.csv", "sub/c.txt"] {
    ///     store.insert("bucket", "ns", key, "x");
    /// }
    /// let fs = ObjectFileSystem::new(store);
    /// assert_eq!(fs.glob("bucket@ns/*.txt").unwrap(), vec!["bucket@ns/a.txt"]);
    /// assert_eq!(
    ///     fs.glob("bucket@ns/**/*.txt").unwrap(),
    ///     vec!["bucket@ns/a.txt", "bucket@ns/sub/c.txt"]
    /// );
    /// ```
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let loc = self.resolve(pattern)?;
        if !glob::has_magic(&loc.key) {
            let found = match self.info_resolved(&loc) {
                Ok(_) => vec![loc.to_path_string()],
                Err(e) if e.is_not_found() => Vec::new(),
                Err(e) => return Err(e),
            };
            return Ok(found);
        }

        let (literal, rest) = glob::split_literal(&loc.key);
        let base = loc.with_key(&literal);
        let matcher = glob::compile(&loc.key)?;

        let listed = if glob::is_deep(&rest) {
            self.walk_resolved(&base, false)
        } else {
            self.ls_resolved(&base, false)
        };
        let candidates = match listed {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let bucket_root = format!("{}/", loc.with_key("").to_path_string());
        let mut matched: Vec<String> = candidates
            .into_iter()
            .filter(|e| {
                e.path
                    .strip_prefix(&bucket_root)
                    .is_some_and(|key| matcher.is_match(key))
            })
            .map(|e| e.path)
            .collect();
        matched.sort();
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::api::MemoryStore;
    use crate::fs::ObjectFileSystem;

    fn fs_with(keys: &[(&str, &str)]) -> ObjectFileSystem {
        let store = Arc::new(MemoryStore::new());
        for (key, data) in keys {
            store.insert("bkt", "ns", key, *data);
        }
        ObjectFileSystem::new(store)
    }

    #[test]
    fn test_glob_depth() {
        let fs = fs_with(&[("a.txt", "a"), ("b.csv", "b"), ("sub/c.txt", "c")]);
        assert_eq!(fs.glob("bkt@ns/*.txt").unwrap(), vec!["bkt@ns/a.txt"]);
        assert_eq!(
            fs.glob("bkt@ns/**/*.txt").unwrap(),
            vec!["bkt@ns/a.txt", "bkt@ns/sub/c.txt"]
        );
        assert_eq!(fs.glob("bkt@ns/sub/*").unwrap(), vec!["bkt@ns/sub/c.txt"]);
        assert_eq!(fs.glob("bkt@ns/*").unwrap().len(), 3);
    }

    #[test]
    fn test_glob_literal_and_missing() {
        let fs = fs_with(&[("a.txt", "a")]);
        assert_eq!(fs.glob("bkt@ns/a.txt").unwrap(), vec!["bkt@ns/a.txt"]);
        assert!(fs.glob("bkt@ns/zzz.txt").unwrap().is_empty());
        assert!(fs.glob("bkt@ns/nodir/*.txt").unwrap().is_empty());
        assert!(fs.glob("gone@ns/*.txt").unwrap().is_empty());
    }

    #[test]
    fn test_find_and_du() {
        let fs = fs_with(&[
            ("d/a", "1234"),
            ("d/e/b", "12"),
            ("d/e/f/c", "1"),
            ("x", "123456789"),
        ]);
        let files: Vec<String> = fs
            .find("bkt@ns/d", false, false)
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(files, vec!["bkt@ns/d/a", "bkt@ns/d/e/b", "bkt@ns/d/e/f/c"]);

        let with_dirs = fs.find("bkt@ns/d", true, false).unwrap();
        assert_eq!(with_dirs.len(), 5);

        assert_eq!(fs.du("bkt@ns/d").unwrap(), 7);
        assert_eq!(fs.du("bkt@ns/x").unwrap(), 9);
        assert_eq!(fs.du("bkt@ns").unwrap(), 16);
    }

    #[test]
    fn test_warm_cache_serves_find_and_glob() {
        let store = Arc::new(MemoryStore::new());
        for (key, data) in [("a.txt", "a"), ("b.csv", "b"), ("sub/c.txt", "c")] {
            store.insert("bkt", "ns", key, data);
        }
        let fs = ObjectFileSystem::new(store.clone());
        fs.ls("bkt@ns", false).unwrap();
        fs.find("bkt@ns", false, false).unwrap();

        store.reset_calls();
        assert_eq!(fs.glob("bkt@ns/*.txt").unwrap(), vec!["bkt@ns/a.txt"]);
        assert_eq!(fs.glob("bkt@ns/**/*.txt").unwrap().len(), 2);
        assert_eq!(fs.find("bkt@ns", false, false).unwrap().len(), 3);
        assert_eq!(store.calls().list, 0);

        fs.pipe("bkt@ns/sub/d.txt", b"d").unwrap();
        store.reset_calls();
        assert_eq!(fs.find("bkt@ns", false, false).unwrap().len(), 4);
        assert_eq!(store.calls().list, 1);

        store.insert("bkt", "ns", "sub/e.txt", "e");
        assert_eq!(fs.find("bkt@ns", false, false).unwrap().len(), 4);
        assert_eq!(fs.find("bkt@ns", false, true).unwrap().len(), 5);
        assert_eq!(fs.du("bkt@ns").unwrap(), 5);
    }

    #[test]
    fn test_find_from_root() {
        let store = Arc::new(MemoryStore::new());
        store.insert("one", "ns", "a/b", "x");
        store.insert("two", "ns", "c", "yy");
        let fs = ObjectFileSystem::new(store);

        let files: Vec<String> = fs
            .find("@ns", false, false)
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(files, vec!["one@ns/a/b", "two@ns/c"]);
        assert_eq!(fs.find("@ns", true, false).unwrap().len(), 5);
    }
}
