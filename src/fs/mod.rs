//! Filesystem layer over an object store.

pub(crate) mod cache;
pub(crate) mod entry;
pub(crate) mod glob;
pub(crate) mod handle;
pub(crate) mod listing;
mod operations;
pub(crate) mod session;
pub(crate) mod transfer;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::api::{MountResolver, ObjectStore};
use crate::config::FsConfig;
use crate::error::Result;
use crate::path::{PathResolver, ResolvedPath};
use crate::progress::{ProgressCallback, TransferProgress};

pub use cache::{CacheEntry, DirCache, ListingCache};
pub use entry::{EntryKind, ListingEntry};
pub use handle::{Closed, FileHandle, HandleState, OpenMode, OpenOptions};
pub use listing::DirectoryEmulator;
pub use operations::BulkReport;
pub use session::{CompletedPart, ReadWindow, SessionMode, TransferSession};
pub use transfer::{TransferEngine, UploadSession, WriteOptions, guess_content_type, part_checksum};

/// Hierarchical filesystem view of an object store.
///
/// Listings are cached per directory until a mutation touching the same
/// directory chain invalidates them. Single-object lookups (`info`,
/// `exists`, `isfile`) always ask the store.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use objfs::{MemoryStore, ObjectFileSystem};
///
/// # fn main() -> objfs::Result<()> {
/// let store = Arc::new(MemoryStore::new().with_bucket("bucket", "ns"));
/// let fs = ObjectFileSystem::new(store);
///
/// fs.pipe("bucket@ns/dir/file.txt", b"hello")?;
/// let entries = fs.ls("bucket@ns/dir", false)?;
/// assert_eq!(entries.len(), 1);
/// assert_eq!(fs.cat("bucket@ns/dir/file.txt")?, b"hello");
/// # Ok(())
/// # }
/// ```
pub struct ObjectFileSystem {
    pub(crate) resolver: PathResolver,
    pub(crate) cache: Arc<dyn ListingCache>,
    pub(crate) emulator: DirectoryEmulator,
    pub(crate) engine: TransferEngine,
    progress: RwLock<Option<ProgressCallback>>,
}

impl ObjectFileSystem {
    /// Filesystem with the default configuration and a fresh [`DirCache`].
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::build(store, FsConfig::default())
    }

    pub fn with_config(store: Arc<dyn ObjectStore>, config: FsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(store, config))
    }

    fn build(store: Arc<dyn ObjectStore>, config: FsConfig) -> Self {
        Self {
            resolver: PathResolver::new(),
            cache: Arc::new(DirCache::new()),
            emulator: DirectoryEmulator::new(store.clone()),
            engine: TransferEngine::new(store, config),
            progress: RwLock::new(None),
        }
    }

    /// Enable mount paths, resolved through `mounts`.
    pub fn with_mounts(mut self, mounts: Arc<dyn MountResolver>) -> Self {
        self.resolver = PathResolver::with_mounts(mounts);
        self
    }

    /// Replace the listing cache, e.g. to share one between instances.
    pub fn with_cache(mut self, cache: Arc<dyn ListingCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &FsConfig {
        self.engine.config()
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        self.engine.store()
    }

    pub fn cache(&self) -> &Arc<dyn ListingCache> {
        &self.cache
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn resolve(&self, path: &str) -> Result<ResolvedPath> {
        self.resolver.resolve(path)
    }

    /// Register a progress callback for transfers and bulk operations.
    ///
    /// # Example
    /// ```
    /// # use std::sync::Arc;
    /// # use objfs::{MemoryStore, ObjectFileSystem, TransferProgress};
    /// let fs = ObjectFileSystem::new(Arc::new(MemoryStore::new()));
    /// fs.watch_status(Arc::new(|p: &TransferProgress| {
    ///     println!("{}: {:.1}%", p.label, p.percent());
    /// }));
    /// ```
    pub fn watch_status(&self, callback: ProgressCallback) {
        *self.progress.write() = Some(callback);
    }

    pub fn clear_status(&self) {
        *self.progress.write() = None;
    }

    pub(crate) fn progress_callback(&self) -> Option<ProgressCallback> {
        self.progress.read().clone()
    }

    pub(crate) fn report_progress(&self, progress: &TransferProgress) {
        if let Some(cb) = self.progress_callback() {
            cb(progress);
        }
    }

    /// Open a file with default options for `mode`.
    pub fn open(&self, path: &str, mode: OpenMode) -> Result<FileHandle> {
        self.open_with(path, OpenOptions::new(mode))
    }

    pub fn open_with(&self, path: &str, options: OpenOptions) -> Result<FileHandle> {
        let loc = self.resolve(path)?;
        match options.mode {
            OpenMode::Read => FileHandle::open_read(
                self.engine.clone(),
                self.cache.clone(),
                loc,
                options.block_size.unwrap_or(self.config().block_size),
            ),
            OpenMode::Write | OpenMode::Append => {
                let initial = if options.mode == OpenMode::Append {
                    match self.engine.read(&loc, 0, u64::MAX) {
                        Ok(existing) => Some(existing),
                        Err(e) if e.is_not_found() => None,
                        Err(e) => return Err(e),
                    }
                } else {
                    None
                };
                let write_options = self.write_options(&options);
                FileHandle::open_write(
                    self.engine.clone(),
                    self.cache.clone(),
                    loc,
                    &write_options,
                    initial,
                )
            }
        }
    }

    pub(crate) fn write_options(&self, options: &OpenOptions) -> WriteOptions {
        WriteOptions {
            content_type: options.content_type.clone(),
            single_shot: options
                .single_shot
                .unwrap_or(self.config().single_shot_writes),
            progress: self.progress_callback(),
        }
    }

    /// Forget cached listings for `path` and its directory chain, or everything.
    pub fn invalidate_cache(&self, path: Option<&str>) -> Result<()> {
        match path {
            Some(p) => {
                let loc = self.resolve(p)?;
                self.cache.invalidate(&loc.to_path_string());
            }
            None => self.cache.clear(),
        }
        Ok(())
    }

    /// Forget cached mount mappings.
    pub fn clear_mount_cache(&self) {
        self.resolver.clear_mounts();
    }

    pub(crate) fn invalidate(&self, loc: &ResolvedPath) {
        self.cache.invalidate(&loc.to_path_string());
    }
}
