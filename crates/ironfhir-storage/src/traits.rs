//! Storage traits implemented by store backends.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::StorageError;
use crate::types::{EntityAttrs, EntityId, ResourceHead, ResourceVersion, WriteRequest, WriteResult};

/// A consistent, immutable view of the store at one basis-t.
///
/// Snapshots are cheap handles; everything read through one snapshot
/// reflects a single point in the transaction log.
#[async_trait]
pub trait Snapshot: Send + Sync {
    /// The transaction number this snapshot is anchored to.
    fn basis_t(&self) -> u64;

    /// The current head (root entity + version token) of a resource,
    /// including tombstones. `None` when the resource never existed.
    async fn resource_head(&self, resource_type: &str, id: &str) -> Option<ResourceHead>;

    /// Attribute view of an entity, for diffing.
    async fn entity(&self, entity: EntityId) -> Option<EntityAttrs>;

    /// Canonical JSON of any entity (composite child, contained resource),
    /// used for value-identity matching of repeated elements.
    async fn materialize_entity(&self, entity: EntityId) -> Option<serde_json::Value>;

    /// The `(resource_type, id)` identity of a resource root entity.
    async fn resource_ident(&self, entity: EntityId) -> Option<(String, String)>;

    /// The full resource at this snapshot, content materialized to FHIR
    /// JSON. Returns the tombstone (content `None`) when deleted.
    async fn resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<ResourceVersion>, StorageError>;
}

/// The resource store: snapshots for reading, serialized CAS writes.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// A snapshot of the latest committed state.
    async fn snapshot(&self) -> Arc<dyn Snapshot>;

    /// A snapshot anchored at transaction `t`.
    async fn as_of(&self, t: u64) -> Arc<dyn Snapshot>;

    /// Applies a write atomically. All CAS guards are checked against the
    /// current state; any mismatch aborts the whole write with `Conflict`.
    async fn transact(&self, request: WriteRequest) -> Result<WriteResult, StorageError>;

    /// Version history of a resource, newest first. `since` excludes
    /// versions at or before that transaction number.
    async fn history(
        &self,
        resource_type: &str,
        id: &str,
        since: Option<u64>,
    ) -> Result<Vec<ResourceVersion>, StorageError>;
}

/// First matches of a conditional-create search.
#[derive(Debug, Clone, Default)]
pub struct ConditionalMatches {
    pub total: usize,
    pub first: Option<ResourceVersion>,
    pub second: Option<ResourceVersion>,
}

impl ConditionalMatches {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(first: ResourceVersion) -> Self {
        Self {
            total: 1,
            first: Some(first),
            second: None,
        }
    }
}

/// Predicate oracle over the search index, consumed by conditional create.
///
/// The interface is deliberately narrow: a match count plus the first two
/// matches, which is all that `If-None-Exist` evaluation needs.
#[async_trait]
pub trait SearchOracle: Send + Sync {
    async fn conditional_matches(
        &self,
        snapshot: &dyn Snapshot,
        resource_type: &str,
        query: &str,
    ) -> Result<ConditionalMatches, StorageError>;
}
