//! Storage abstraction for the IronFHIR server.
//!
//! Defines the mutation/CAS write vocabulary and the traits every store
//! backend implements. Backends live in their own crates.

pub mod error;
pub mod traits;
pub mod types;

pub use error::StorageError;
pub use traits::{ConditionalMatches, ResourceStore, SearchOracle, Snapshot};
pub use types::{
    AttrSlot, Cardinality, CasGuard, CodeKey, EntityAttrs, EntityId, EntityRef, Mutation,
    ResourceHead, ResourceVersion, StoreValue, TempId, WriteRequest, WriteResult,
};

/// Type alias for a shareable store instance.
pub type DynResourceStore = std::sync::Arc<dyn ResourceStore>;

/// Type alias for a shareable search oracle.
pub type DynSearchOracle = std::sync::Arc<dyn SearchOracle>;
