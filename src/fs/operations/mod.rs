//! Filesystem operations split into focused modules.

mod browse;
mod bulk;
mod dir_ops;
mod download;
mod tree;
mod upload;

pub use bulk::BulkReport;
