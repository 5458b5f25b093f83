//! Listing cache.
//!
//! Entries never expire on their own. They live until a mutation touching
//! the same directory chain invalidates them, until the caller lists with
//! `refresh`, or until the cache is cleared.
//!
//! Recursive listings are stored next to the plain ones under
//! [`deep_key`] of their directory and are invalidated with it.

use std::collections::HashMap;
use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::debug;

use super::entry::ListingEntry;
use crate::path::{SEP, ancestor_chain};

const DEEP_SUFFIX: &str = "\u{0}**";

/// Cache key of the recursive listing of `path`.
pub fn deep_key(path: &str) -> String {
    format!("{}{}", path, DEEP_SUFFIX)
}

/// Directory a cache key lists, for plain and recursive keys alike.
pub fn listing_path(key: &str) -> &str {
    key.strip_suffix(DEEP_SUFFIX).unwrap_or(key)
}

/// Cache of directory listings keyed by canonical path.
pub trait ListingCache: Send + Sync {
    fn get(&self, path: &str) -> Option<Vec<ListingEntry>>;

    fn put(&self, path: &str, entries: Vec<ListingEntry>);

    /// Drop `path`, every cached listing below it, and its ancestor chain,
    /// recursive listings included.
    fn invalidate(&self, path: &str);

    fn clear(&self);

    /// Counter bumped by every invalidation. Read it before listing and pass
    /// it to [`put_if_current`](ListingCache::put_if_current).
    fn generation(&self) -> u64 {
        0
    }

    /// Insert only if no invalidation happened since `generation` was read.
    fn put_if_current(&self, path: &str, entries: Vec<ListingEntry>, generation: u64) -> bool {
        let _ = generation;
        self.put(path, entries);
        true
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub entries: Vec<ListingEntry>,
    pub fetched_at: SystemTime,
}

#[derive(Debug, Default)]
struct Inner {
    map: HashMap<String, CacheEntry>,
    generation: u64,
}

/// Default in-process [`ListingCache`].
#[derive(Debug, Default)]
pub struct DirCache {
    inner: RwLock<Inner>,
}

impl DirCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When the listing for `path` was fetched.
    pub fn fetched_at(&self, path: &str) -> Option<SystemTime> {
        self.inner.read().map.get(path).map(|e| e.fetched_at)
    }

    fn insert(inner: &mut Inner, path: &str, entries: Vec<ListingEntry>) {
        inner.map.insert(
            path.to_string(),
            CacheEntry {
                entries,
                fetched_at: SystemTime::now(),
            },
        );
    }
}

impl ListingCache for DirCache {
    fn get(&self, path: &str) -> Option<Vec<ListingEntry>> {
        self.inner.read().map.get(path).map(|e| e.entries.clone())
    }

    fn put(&self, path: &str, entries: Vec<ListingEntry>) {
        Self::insert(&mut self.inner.write(), path, entries);
    }

    fn invalidate(&self, path: &str) {
        let chain = ancestor_chain(path);
        let below = format!("{}{}", path, SEP);

        // the storage root "@ns" covers every bucket of the namespace
        let root_ns = path.strip_prefix('@');

        let mut inner = self.inner.write();
        inner.generation += 1;
        let before = inner.map.len();
        inner.map.retain(|k, _| {
            let dir = listing_path(k);
            if dir.starts_with(&below) || chain.iter().any(|p| p == dir) {
                return false;
            }
            match root_ns {
                Some(ns) => namespace_of(dir) != Some(ns),
                None => true,
            }
        });
        let removed = before - inner.map.len();
        debug!(path, removed, "listing cache invalidated");
    }

    fn clear(&self) {
        let mut inner = self.inner.write();
        inner.generation += 1;
        inner.map.clear();
        debug!("listing cache cleared");
    }

    fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    fn put_if_current(&self, path: &str, entries: Vec<ListingEntry>, generation: u64) -> bool {
        let mut inner = self.inner.write();
        if inner.generation != generation {
            debug!(path, "listing raced with a mutation, not cached");
            return false;
        }
        Self::insert(&mut inner, path, entries);
        true
    }
}

fn namespace_of(path: &str) -> Option<&str> {
    let head = path.split(SEP).next()?;
    head.split_once('@').map(|(_, ns)| ns)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn listing(path: &str) -> Vec<ListingEntry> {
        vec![ListingEntry::directory(path)]
    }

    #[test]
    fn test_invalidate_ancestor_chain() {
        let cache = DirCache::new();
        for p in ["@ns", "b@ns", "b@ns/a", "b@ns/a/b", "b@ns/a/b/deep", "b@ns/other", "c@ns/a"] {
            cache.put(p, listing(p));
        }

        cache.invalidate("b@ns/a/b");

        assert!(cache.get("b@ns/a/b").is_none());
        assert!(cache.get("b@ns/a/b/deep").is_none());
        assert!(cache.get("b@ns/a").is_none());
        assert!(cache.get("b@ns").is_none());
        assert!(cache.get("@ns").is_none());
        assert!(cache.get("b@ns/other").is_some());
        assert!(cache.get("c@ns/a").is_some());
    }

    #[test]
    fn test_invalidate_drops_recursive_listings() {
        let cache = DirCache::new();
        for p in ["b@ns", "b@ns/a", "b@ns/a/b", "b@ns/ab", "c@ns"] {
            cache.put(&deep_key(p), listing(p));
        }
        assert_eq!(listing_path(&deep_key("b@ns/a")), "b@ns/a");

        cache.invalidate("b@ns/a/x");
        assert!(cache.get(&deep_key("b@ns")).is_none());
        assert!(cache.get(&deep_key("b@ns/a")).is_none());
        assert!(cache.get(&deep_key("b@ns/a/b")).is_some());
        assert!(cache.get(&deep_key("b@ns/ab")).is_some());

        cache.invalidate("b@ns/a");
        assert!(cache.get(&deep_key("b@ns/a/b")).is_none());
        assert!(cache.get(&deep_key("b@ns/ab")).is_some());
        assert!(cache.get(&deep_key("c@ns")).is_some());
    }

    #[test]
    fn test_invalidating_root_drops_namespace() {
        let cache = DirCache::new();
        for p in ["@ns", "b@ns", "b@ns/a", "b@other"] {
            cache.put(p, listing(p));
        }
        cache.invalidate("@ns");
        assert_eq!(cache.len(), 1);
        assert!(cache.get("b@other").is_some());
    }

    #[test]
    fn test_stale_insert_rejected() {
        let cache = DirCache::new();
        let generation = cache.generation();
        cache.invalidate("b@ns/dir/file");
        assert!(!cache.put_if_current("b@ns/dir", listing("b@ns/dir"), generation));
        assert!(cache.get("b@ns/dir").is_none());

        let generation = cache.generation();
        assert!(cache.put_if_current("b@ns/dir", listing("b@ns/dir"), generation));
        assert!(cache.fetched_at("b@ns/dir").is_some());
    }

    #[test]
    fn test_concurrent_readers_and_invalidations() {
        let cache = DirCache::new();
        std::thread::scope(|s| {
            for i in 0..4 {
                let cache = &cache;
                s.spawn(move || {
                    for j in 0..200 {
                        let p = format!("b@ns/d{}", (i + j) % 8);
                        let generation = cache.generation();
                        cache.put_if_current(&p, listing(&p), generation);
                        if let Some(entries) = cache.get(&p) {
                            assert_eq!(entries[0].path, p);
                        }
                        cache.invalidate(&format!("b@ns/d{}/x", j % 8));
                    }
                });
            }
        });
    }
}
