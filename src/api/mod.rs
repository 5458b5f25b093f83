//! Object-store client interface, its errors, and an in-memory implementation.

pub mod client;
pub mod error;
pub mod memory;

pub use client::{
    DeleteResult, ListPage, ListRequest, MountResolver, ObjectHead, ObjectStore, ObjectSummary,
    StoreResult,
};
pub use error::{StoreError, StoreErrorCode};
pub use memory::{CallCounts, MemoryMounts, MemoryStore, StoreOp};
