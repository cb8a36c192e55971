//! Batch/transaction processing for the IronFHIR server.
//!
//! The processor turns a batch or transaction bundle into a response
//! bundle: entries are validated and classified, intra-bundle references
//! resolve through a per-bundle tempid table, the upsert engine diffs each
//! write against the stored entity graph, and a transaction commits the
//! accumulated mutation set in one CAS-guarded write.

pub mod context;
pub mod processor;
mod response;
pub mod schema;
pub mod upsert;

pub use context::TransactionContext;
pub use processor::{BundleProcessor, ReadDispatcher};
pub use schema::{ElementDef, ElementKind, ElementView, SchemaRegistry, TypeSchema};
pub use upsert::Upserter;

// Re-exports for downstream convenience.
pub use ironfhir_api::ReturnPreference;
