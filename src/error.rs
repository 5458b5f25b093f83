//! Error types for the objfs library.

use thiserror::Error;

use crate::api::StoreError;

/// A single key that could not be processed by a bulk operation.
#[derive(Debug, Clone)]
pub struct KeyFailure {
    /// Canonical path of the failed key
    pub path: String,
    /// Why it failed
    pub reason: String,
}

impl KeyFailure {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Main error type for objfs operations.
#[derive(Error, Debug)]
pub enum FsError {
    /// Path does not follow the direct or mount grammar.
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// A mount path could not be mapped to a bucket and namespace.
    #[error("Cannot resolve mount: {0}")]
    MountResolution(String),

    /// Object or prefix does not exist.
    #[error("No such file or directory: {0}")]
    NotFound(String),

    /// Read offset lies beyond the end of the object.
    #[error("Offset {offset} is beyond the end of {path} ({size} bytes)")]
    Range { path: String, offset: u64, size: u64 },

    /// Upload or download failed. Multipart sessions are aborted before this is returned.
    #[error("Transfer failed for {path}: {reason}")]
    Transfer { path: String, reason: String },

    /// Handle was used after close.
    #[error("I/O operation on closed file: {0}")]
    ClosedHandle(String),

    /// Some keys of a bulk operation failed while others succeeded.
    #[error("{} key(s) failed, {succeeded} succeeded", failures.len())]
    PartialBulkFailure {
        succeeded: usize,
        failures: Vec<KeyFailure>,
    },

    /// Error reported by the storage service.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Custom error message.
    #[error("{0}")]
    Custom(String),
}

impl FsError {
    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        FsError::InvalidPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn transfer(path: &str, reason: impl std::fmt::Display) -> Self {
        FsError::Transfer {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Map a store error on a single-object call, turning NotFound into `FsError::NotFound`.
    pub(crate) fn from_store(path: &str, err: StoreError) -> Self {
        if err.is_not_found() {
            FsError::NotFound(path.to_string())
        } else {
            FsError::Store(err)
        }
    }

    /// Check if this error means the path does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::NotFound(_) => true,
            FsError::Store(e) => e.is_not_found(),
            _ => false,
        }
    }
}

impl From<FsError> for std::io::Error {
    fn from(err: FsError) -> Self {
        use std::io::ErrorKind;

        match err {
            FsError::Io(e) => e,
            FsError::NotFound(_) => std::io::Error::new(ErrorKind::NotFound, err),
            FsError::Range { .. } | FsError::InvalidPath { .. } => {
                std::io::Error::new(ErrorKind::InvalidInput, err)
            }
            other => std::io::Error::other(other),
        }
    }
}

/// Result type alias for objfs operations.
pub type Result<T> = std::result::Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StoreErrorCode;

    #[test]
    fn test_from_store_maps_not_found() {
        let err = FsError::from_store(
            "b@ns/missing",
            StoreError::new(StoreErrorCode::NotFound, 404, "gone"),
        );
        assert!(matches!(err, FsError::NotFound(ref p) if p == "b@ns/missing"));

        let err = FsError::from_store(
            "b@ns/key",
            StoreError::new(StoreErrorCode::TooManyRequests, 429, "slow down"),
        );
        assert!(matches!(err, FsError::Store(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_io_error_kinds() {
        let io: std::io::Error = FsError::NotFound("b@ns/x".into()).into();
        assert_eq!(io.kind(), std::io::ErrorKind::NotFound);

        let io: std::io::Error = FsError::Range {
            path: "b@ns/x".into(),
            offset: 10,
            size: 5,
        }
        .into();
        assert_eq!(io.kind(), std::io::ErrorKind::InvalidInput);

        let io: std::io::Error = FsError::ClosedHandle("b@ns/x".into()).into();
        assert_eq!(io.kind(), std::io::ErrorKind::Other);
    }

    #[test]
    fn test_partial_failure_message() {
        let err = FsError::PartialBulkFailure {
            succeeded: 3,
            failures: vec![KeyFailure::new("b@ns/a", "not found")],
        };
        assert_eq!(err.to_string(), "1 key(s) failed, 3 succeeded");
    }
}
