//! Filesystem configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FsError, Result};

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

/// Smallest part the store accepts for a non-final part.
pub const MINIMUM_PART_SIZE: u64 = 5 * MIB;
/// Largest single part or single-shot put.
pub const MAXIMUM_PART_SIZE: u64 = 5 * GIB;

/// Tunables for transfers, listings and fan-out.
///
/// Every field has a default, so a JSON document only needs the fields it changes:
///
/// ```
/// use objfs::FsConfig;
///
/// let config = FsConfig::from_json(r#"{ "workers": 4 }"#).unwrap();
/// assert_eq!(config.workers, 4);
/// assert_eq!(config.part_size, 5 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Read window size for cached reads
    pub block_size: u64,
    /// Multipart chunk size; also the spill threshold for streaming writes
    pub part_size: u64,
    /// Lower bound enforced on `part_size`
    pub min_part_size: u64,
    /// Largest payload sent with one `put`
    pub single_put_limit: u64,
    /// Maximum number of parts in one multipart session
    pub max_parts: u32,
    /// Keys per bulk delete call
    pub bulk_delete_batch: usize,
    /// Worker threads for fan-out operations (1-64)
    pub workers: usize,
    /// Default write strategy for handles opened without explicit options
    pub single_shot_writes: bool,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            block_size: 5 * MIB,
            part_size: 5 * MIB,
            min_part_size: MINIMUM_PART_SIZE,
            single_put_limit: MAXIMUM_PART_SIZE,
            max_parts: 10_000,
            bulk_delete_batch: 1000,
            workers: 8,
            single_shot_writes: false,
        }
    }
}

impl FsConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: FsConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Set the worker count, clamped to 1-64.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, 64);
        self
    }

    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(FsError::Config("block_size must be positive".into()));
        }
        if self.min_part_size == 0 {
            return Err(FsError::Config("min_part_size must be positive".into()));
        }
        if self.part_size < self.min_part_size {
            return Err(FsError::Config(format!(
                "part_size {} is below min_part_size {}",
                self.part_size, self.min_part_size
            )));
        }
        if self.part_size > MAXIMUM_PART_SIZE {
            return Err(FsError::Config(format!(
                "part_size {} exceeds {}",
                self.part_size, MAXIMUM_PART_SIZE
            )));
        }
        if self.single_put_limit == 0 || self.single_put_limit > MAXIMUM_PART_SIZE {
            return Err(FsError::Config(format!(
                "single_put_limit must be between 1 and {}",
                MAXIMUM_PART_SIZE
            )));
        }
        if self.max_parts == 0 {
            return Err(FsError::Config("max_parts must be positive".into()));
        }
        if self.bulk_delete_batch == 0 {
            return Err(FsError::Config("bulk_delete_batch must be positive".into()));
        }
        if !(1..=64).contains(&self.workers) {
            return Err(FsError::Config(format!(
                "workers must be between 1 and 64, got {}",
                self.workers
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = FsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.single_put_limit, 5 * GIB);
        assert_eq!(config.max_parts, 10_000);
    }

    #[test]
    fn test_rejects_small_parts() {
        let err = FsConfig::from_json(r#"{ "part_size": 1024 }"#).unwrap_err();
        assert!(matches!(err, FsError::Config(_)));

        // lowering the floor is allowed, for stores with smaller minimums
        let config =
            FsConfig::from_json(r#"{ "part_size": 1024, "min_part_size": 1024 }"#).unwrap();
        assert_eq!(config.part_size, 1024);
    }

    #[test]
    fn test_workers_configuration() {
        assert_eq!(FsConfig::default().with_workers(0).workers, 1);
        assert_eq!(FsConfig::default().with_workers(100).workers, 64);
        assert!(FsConfig::from_json(r#"{ "workers": 0 }"#).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "bulk_delete_batch": 50, "single_shot_writes": true }}"#).unwrap();
        let config = FsConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bulk_delete_batch, 50);
        assert!(config.single_shot_writes);
    }
}
