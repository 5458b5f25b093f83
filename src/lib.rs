//! # objfs
//!
//! Hierarchical filesystem interface over flat object storage.
//!
//! ## Features
//!
//! - **Paths**: `bucket@namespace/key` addressing, the `@namespace` storage
//!   root, and mount paths (`mount:table:db:tbl@lake/key`) resolved through a
//!   [`MountResolver`] and cached per mount.
//! - **Directories**: listings synthesized from prefix/delimiter listings,
//!   with directory marker objects folded into directory entries.
//!   - Per-directory listing cache, refreshed on demand and invalidated along
//!     the directory chain of every mutation.
//! - **Transfers**:
//!   - Windowed reads through file handles.
//!   - Single `put` for small payloads, checksummed multipart uploads past
//!     the spill threshold, aborted on any failure.
//!   - Parallel ranged downloads to local files.
//! - **Bulk operations**: batched deletes with per-key failure reporting,
//!   recursive copy, move and sync on a bounded worker pool.
//!
//! The store itself is a trait ([`ObjectStore`]); [`MemoryStore`] is a
//! complete in-memory implementation used for tests and demos.
//!
//! ## Example
//!
//! ```
//! use std::io::Read;
//! use std::sync::Arc;
//!
//! use objfs::{MemoryStore, ObjectFileSystem, OpenMode};
//!
//! # fn main() -> objfs::Result<()> {
//! let store = Arc::new(MemoryStore::new().with_bucket("bucket", "ns"));
//! let fs = ObjectFileSystem::new(store);
//!
//! fs.pipe("bucket@ns/reports/2024.csv", b"id,total\n1,42\n")?;
//! for entry in fs.ls("bucket@ns/reports", false)? {
//!     println!("{} ({} bytes)", entry.path, entry.size);
//! }
//!
//! let mut handle = fs.open("bucket@ns/reports/2024.csv", OpenMode::Read)?;
//! let mut header = [0u8; 8];
//! handle.read_exact(&mut header)?;
//! assert_eq!(&header, b"id,total");
//!
//! fs.rm("bucket@ns/reports", true)?;
//! assert!(!fs.exists("bucket@ns/reports")?);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod fs;
pub mod path;
pub mod pool;
pub mod progress;

// Re-export commonly used types
pub use api::{MemoryMounts, MemoryStore, MountResolver, ObjectStore, StoreError, StoreErrorCode};
pub use config::FsConfig;
pub use error::{FsError, KeyFailure, Result};
pub use fs::{
    BulkReport, DirCache, EntryKind, FileHandle, ListingCache, ListingEntry, ObjectFileSystem,
    OpenMode, OpenOptions,
};
pub use path::{MountDescriptor, MountType, PathResolver, ResolvedPath};
pub use progress::{ProgressCallback, TransferProgress};
