//! Storage primitives for the persisted stores.

mod document_store;
mod snapshot_file;

pub use document_store::DocumentStore;
pub use snapshot_file::{SnapshotError, SnapshotFile};
