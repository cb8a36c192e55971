//! The IronFHIR server: an axum HTTP surface over the batch/transaction
//! processor and the versioned in-memory store.

pub mod config;
pub mod handlers;
pub mod observability;
pub mod server;

pub use config::{AppConfig, StoreSettings};
pub use observability::init_tracing;
pub use server::{AppState, Server, ServerBuilder};
