//! Append-only in-memory store backend for the IronFHIR server.
//!
//! Every entity carries an immutable timeline of states stamped with the
//! transaction number that produced them, so a snapshot is nothing more
//! than a basis-t watermark. Writes are funneled through a bounded worker
//! pool and serialized; readers never block writers.
//!
//! # Example
//!
//! ```ignore
//! use ironfhir_db_memory::MemoryStore;
//! use ironfhir_storage::ResourceStore;
//!
//! let store = MemoryStore::new();
//! let snapshot = store.snapshot().await;
//! let patient = snapshot.resource("Patient", "0").await?;
//! ```

mod materialize;
pub mod oracle;
pub mod store;
pub mod writer;

pub use oracle::NaiveSearchOracle;
pub use store::{MemoryStore, StoreStats};
pub use writer::StoreConfig;

// Re-export the storage traits for convenience.
pub use ironfhir_storage::{ResourceStore, SearchOracle, Snapshot, StorageError};

/// Creates a new in-memory store with default pool settings.
pub fn create_store() -> std::sync::Arc<MemoryStore> {
    std::sync::Arc::new(MemoryStore::new())
}
