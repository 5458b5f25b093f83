//! File handles bound to a single key.
//!
//! A handle is either reading or writing. Reading handles serve bytes from
//! the session's read window; writing handles feed an [`UploadSession`].
//! Closing a writer commits the object and invalidates the cached listings
//! along its directory chain. A writer dropped without `close` aborts.

use std::io::{self, SeekFrom};
use std::sync::Arc;

use tracing::debug;

use super::cache::ListingCache;
use super::session::{SessionMode, TransferSession};
use super::transfer::{TransferEngine, UploadSession, WriteOptions};
use crate::error::{FsError, Result};
use crate::path::ResolvedPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    #[default]
    Read,
    /// Create or replace the object
    Write,
    /// Replace the object with its current content followed by new writes
    Append,
}

/// Options for [`ObjectFileSystem::open_with`](crate::ObjectFileSystem::open_with).
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub mode: OpenMode,
    /// Override the configured write strategy
    pub single_shot: Option<bool>,
    pub content_type: Option<String>,
    /// Override the configured read window size
    pub block_size: Option<u64>,
}

impl OpenOptions {
    pub fn new(mode: OpenMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn single_shot(mut self, single_shot: bool) -> Self {
        self.single_shot = Some(single_shot);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn block_size(mut self, block_size: u64) -> Self {
        self.block_size = Some(block_size);
        self
    }
}

/// How a handle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closed {
    /// Write handle whose object was stored
    Committed,
    /// Write handle discarded or failed; nothing was stored
    Aborted,
    /// Read handle
    Released,
}

pub enum HandleState {
    Reading {
        session: TransferSession,
        size: u64,
        block_size: u64,
    },
    Writing(UploadSession),
    Closed(Closed),
}

/// File-like access to one object.
pub struct FileHandle {
    path: String,
    engine: TransferEngine,
    cache: Arc<dyn ListingCache>,
    state: HandleState,
}

impl FileHandle {
    pub(crate) fn open_read(
        engine: TransferEngine,
        cache: Arc<dyn ListingCache>,
        loc: ResolvedPath,
        block_size: u64,
    ) -> Result<Self> {
        let size = engine.head(&loc)?.size;
        Ok(Self {
            path: loc.to_path_string(),
            engine,
            cache,
            state: HandleState::Reading {
                session: TransferSession::new(loc, SessionMode::Read),
                size,
                block_size: block_size.max(1),
            },
        })
    }

    pub(crate) fn open_write(
        engine: TransferEngine,
        cache: Arc<dyn ListingCache>,
        loc: ResolvedPath,
        options: &WriteOptions,
        initial: Option<Vec<u8>>,
    ) -> Result<Self> {
        let path = loc.to_path_string();
        let mut upload = engine.start_upload(loc, options);
        if let Some(data) = initial {
            upload.write(&data)?;
        }
        Ok(Self {
            path,
            engine,
            cache,
            state: HandleState::Writing(upload),
        })
    }

    /// Canonical path of the object.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> &HandleState {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, HandleState::Closed(_))
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.state, HandleState::Writing(_))
    }

    /// Object size for readers, bytes written so far for writers.
    pub fn size(&self) -> u64 {
        match &self.state {
            HandleState::Reading { size, .. } => *size,
            HandleState::Writing(upload) => upload.written(),
            HandleState::Closed(_) => 0,
        }
    }

    pub fn tell(&self) -> Result<u64> {
        match &self.state {
            HandleState::Reading { session, .. } => Ok(session.position),
            HandleState::Writing(upload) => Ok(upload.written()),
            HandleState::Closed(_) => Err(FsError::ClosedHandle(self.path.clone())),
        }
    }

    /// Read up to `len` bytes from the cursor. Returns no bytes at end of file.
    pub fn read_chunk(&mut self, len: usize) -> Result<Vec<u8>> {
        match &mut self.state {
            HandleState::Reading {
                session,
                size,
                block_size,
            } => self
                .engine
                .read_windowed(session, *size, *block_size, len as u64),
            HandleState::Writing(_) => Err(FsError::Custom(format!(
                "{} is not open for reading",
                self.path
            ))),
            HandleState::Closed(_) => Err(FsError::ClosedHandle(self.path.clone())),
        }
    }

    /// Read from the cursor to the end.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let remaining = match &self.state {
            HandleState::Reading { session, size, .. } => size.saturating_sub(session.position),
            _ => 0,
        };
        self.read_chunk(remaining as usize)
    }

    /// Move the read cursor. The read window survives if it still covers the new position.
    pub fn seek_to(&mut self, pos: u64) -> Result<u64> {
        match &mut self.state {
            HandleState::Reading { session, .. } => {
                session.position = pos;
                session.retain_window_for(pos);
                Ok(pos)
            }
            HandleState::Writing(_) => Err(FsError::Custom(format!(
                "{} does not support seeking while writing",
                self.path
            ))),
            HandleState::Closed(_) => Err(FsError::ClosedHandle(self.path.clone())),
        }
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<usize> {
        let result = match &mut self.state {
            HandleState::Writing(upload) => upload.write(data),
            HandleState::Reading { .. } => {
                return Err(FsError::Custom(format!(
                    "{} is not open for writing",
                    self.path
                )));
            }
            HandleState::Closed(_) => return Err(FsError::ClosedHandle(self.path.clone())),
        };
        self.settle_failure(&result);
        result.map(|_| data.len())
    }

    /// Upload complete parts without closing.
    pub fn flush_parts(&mut self) -> Result<()> {
        let result = match &mut self.state {
            HandleState::Writing(upload) => upload.flush(),
            HandleState::Reading { .. } => return Ok(()),
            HandleState::Closed(_) => return Err(FsError::ClosedHandle(self.path.clone())),
        };
        self.settle_failure(&result);
        result
    }

    /// Commit a writer or release a reader. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let state = std::mem::replace(&mut self.state, HandleState::Closed(Closed::Released));
        match state {
            HandleState::Closed(closed) => {
                self.state = HandleState::Closed(closed);
                Ok(())
            }
            HandleState::Reading { .. } => {
                debug!(path = %self.path, "read handle released");
                Ok(())
            }
            HandleState::Writing(mut upload) => match upload.close() {
                Ok(()) => {
                    self.state = HandleState::Closed(Closed::Committed);
                    self.cache.invalidate(&self.path);
                    debug!(path = %self.path, "write handle committed");
                    Ok(())
                }
                Err(e) => {
                    self.state = HandleState::Closed(Closed::Aborted);
                    Err(e)
                }
            },
        }
    }

    /// Abandon a writer without storing anything.
    pub fn discard(&mut self) {
        match std::mem::replace(&mut self.state, HandleState::Closed(Closed::Aborted)) {
            HandleState::Writing(mut upload) => upload.discard(),
            HandleState::Reading { .. } => self.state = HandleState::Closed(Closed::Released),
            HandleState::Closed(closed) => self.state = HandleState::Closed(closed),
        }
    }

    fn settle_failure(&mut self, result: &Result<()>) {
        if result.is_err()
            && matches!(&self.state, HandleState::Writing(upload) if upload.is_finished())
        {
            self.state = HandleState::Closed(Closed::Aborted);
        }
    }
}

impl io::Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.read_chunk(buf.len())?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl io::Write for FileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_bytes(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_parts()?)
    }
}

impl io::Seek for FileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(delta) => self.size().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.tell()?.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of file")
        })?;
        Ok(self.seek_to(target)?)
    }
}
