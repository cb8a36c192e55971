use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use ironfhir_core::{FhirInstant, version};
use ironfhir_storage::{
    AttrSlot, Cardinality, CodeKey, EntityAttrs, EntityId, EntityRef, Mutation, ResourceHead,
    ResourceStore, ResourceVersion, Snapshot, StorageError, StoreValue, TempId, WriteRequest,
    WriteResult,
};

use crate::materialize;
use crate::writer::{self, StoreConfig, WriterHandle};

pub(crate) type IdentKey = (String, String);

/// A value as stored: all entity addresses resolved.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StoredValue {
    Scalar(Value),
    Child(EntityId),
    Resource(EntityId),
    Code(EntityId),
}

#[derive(Debug, Clone)]
pub(crate) struct StoredSlot {
    pub cardinality: Cardinality,
    pub values: Vec<StoredValue>,
}

/// One immutable state of an entity, stamped with the transaction that
/// produced it.
#[derive(Debug, Clone, Default)]
pub(crate) struct EntityState {
    pub t: u64,
    pub attrs: HashMap<String, StoredSlot>,
    /// Version token; present only on resource roots.
    pub version: Option<i64>,
}

/// Append-only per-entity version timeline, ascending by t.
#[derive(Debug, Default)]
pub(crate) struct EntityTimeline {
    pub states: Vec<EntityState>,
}

impl EntityTimeline {
    pub fn state_at(&self, basis_t: u64) -> Option<&EntityState> {
        self.states.iter().rev().find(|s| s.t <= basis_t)
    }

    pub fn head(&self) -> Option<&EntityState> {
        self.states.last()
    }
}

/// Shared store state. Readers take the read lock; the writer pool
/// serializes all mutation behind the write lock, so states with
/// `t <= basis_t` never change and snapshots stay consistent.
#[derive(Debug)]
pub(crate) struct StoreInner {
    next_entity: EntityId,
    next_t: u64,
    pub(crate) entities: HashMap<EntityId, EntityTimeline>,
    pub(crate) idents: HashMap<IdentKey, EntityId>,
    pub(crate) reverse_idents: HashMap<EntityId, IdentKey>,
    pub(crate) codes: HashMap<String, EntityId>,
    pub(crate) code_keys: HashMap<EntityId, CodeKey>,
    pub(crate) log: BTreeMap<u64, FhirInstant>,
}

impl StoreInner {
    fn new() -> Self {
        Self {
            next_entity: 1,
            next_t: 1,
            entities: HashMap::new(),
            idents: HashMap::new(),
            reverse_idents: HashMap::new(),
            codes: HashMap::new(),
            code_keys: HashMap::new(),
            log: BTreeMap::new(),
        }
    }

    pub(crate) fn basis_t(&self) -> u64 {
        self.next_t - 1
    }

    pub(crate) fn state_at(&self, entity: EntityId, basis_t: u64) -> Option<&EntityState> {
        self.entities.get(&entity)?.state_at(basis_t)
    }

    fn target_name(&self, entity: EntityId) -> String {
        match self.reverse_idents.get(&entity) {
            Some((resource_type, id)) => format!("{resource_type}/{id}"),
            None => format!("entity {entity}"),
        }
    }

    /// Applies one write atomically. Nothing is committed until every
    /// guard has been checked and every mutation staged.
    pub(crate) fn apply(
        &mut self,
        request: WriteRequest,
        instant: FhirInstant,
    ) -> Result<WriteResult, StorageError> {
        let t = self.next_t;
        let mut next_entity = self.next_entity;
        let mut resolved: HashMap<TempId, EntityId> = HashMap::new();
        let mut staged_idents: Vec<(IdentKey, EntityId)> = Vec::new();
        let mut staged_codes: Vec<(CodeKey, EntityId)> = Vec::new();

        // Resolve resource-root tempids. An existing ident continues its
        // lineage (recreate after delete); anything else is a fresh entity.
        for (tempid, resource_type, id) in &request.new_resources {
            let key = (resource_type.clone(), id.clone());
            let entity = match self.idents.get(&key) {
                Some(existing) => *existing,
                None => {
                    let entity = next_entity;
                    next_entity += 1;
                    staged_idents.push((key, entity));
                    entity
                }
            };
            resolved.insert(*tempid, entity);
        }

        // Resolve code entities referenced by this write.
        let resolve_code = |inner: &Self,
                                staged: &mut Vec<(CodeKey, EntityId)>,
                                next: &mut EntityId,
                                key: &CodeKey|
         -> EntityId {
            if let Some(existing) = inner.codes.get(&key.ident()) {
                return *existing;
            }
            if let Some((_, entity)) = staged.iter().find(|(k, _)| k == key) {
                return *entity;
            }
            let entity = *next;
            *next += 1;
            staged.push((key.clone(), entity));
            entity
        };

        // Remaining tempids in mutations are plain child entities.
        for mutation in &request.mutations {
            let (entity, value) = match mutation {
                Mutation::Add { entity, value, .. } | Mutation::Retract { entity, value, .. } => {
                    (*entity, Some(value))
                }
                Mutation::EnsureCode { key } => {
                    resolve_code(self, &mut staged_codes, &mut next_entity, key);
                    continue;
                }
            };
            let mut candidates = vec![entity];
            if let Some(StoreValue::Child(r) | StoreValue::Resource(r)) = value {
                candidates.push(*r);
            }
            for candidate in candidates {
                if let EntityRef::Temp(tempid) = candidate {
                    resolved.entry(tempid).or_insert_with(|| {
                        let entity = next_entity;
                        next_entity += 1;
                        entity
                    });
                }
            }
        }

        let resolve = |entity: EntityRef| -> Result<EntityId, StorageError> {
            match entity {
                EntityRef::Id(id) => Ok(id),
                EntityRef::Temp(tempid) => resolved
                    .get(&tempid)
                    .copied()
                    .ok_or_else(|| StorageError::fault(format!("unresolved tempid {tempid}"))),
            }
        };

        // Check every CAS guard before touching anything.
        for guard in &request.guards {
            let entity = resolve(guard.entity)?;
            let actual = self
                .entities
                .get(&entity)
                .and_then(|timeline| timeline.head())
                .and_then(|state| state.version);
            if actual != guard.expected {
                return Err(StorageError::conflict(
                    self.target_name(entity),
                    guard.expected,
                    actual,
                ));
            }
        }

        // Stage new states per touched entity, starting from the current
        // head so untouched attributes carry over.
        let mut touched: HashMap<EntityId, EntityState> = HashMap::new();

        for mutation in &request.mutations {
            match mutation {
                Mutation::Add {
                    entity,
                    attribute,
                    value,
                    cardinality,
                } => {
                    let entity = resolve(*entity)?;
                    let value = self.resolve_value(value, &resolve, &staged_codes)?;
                    let state = stage(&self.entities, &mut touched, entity, t);
                    let slot = state
                        .attrs
                        .entry(attribute.clone())
                        .or_insert_with(|| StoredSlot {
                            cardinality: *cardinality,
                            values: Vec::new(),
                        });
                    match cardinality {
                        Cardinality::One => slot.values = vec![value],
                        Cardinality::Many => slot.values.push(value),
                    }
                }
                Mutation::Retract {
                    entity,
                    attribute,
                    value,
                } => {
                    let entity = resolve(*entity)?;
                    let value = self.resolve_value(value, &resolve, &staged_codes)?;
                    let target = self.target_name(entity);
                    let state = stage(&self.entities, &mut touched, entity, t);
                    let Some(slot) = state.attrs.get_mut(attribute) else {
                        return Err(StorageError::fault(format!(
                            "retract of absent attribute {attribute:?} on {target}"
                        )));
                    };
                    let Some(position) = slot.values.iter().position(|v| *v == value) else {
                        return Err(StorageError::fault(format!(
                            "retract of absent value for {attribute:?} on {target}"
                        )));
                    };
                    slot.values.remove(position);
                    if slot.values.is_empty() {
                        state.attrs.remove(attribute);
                    }
                }
                Mutation::EnsureCode { .. } => {}
            }
        }

        // Version transitions from the guards.
        for guard in &request.guards {
            let entity = resolve(guard.entity)?;
            let state = stage(&self.entities, &mut touched, entity, t);
            state.version = Some(guard.desired);
        }

        // Commit.
        self.next_entity = next_entity;
        for (key, entity) in staged_idents {
            self.reverse_idents.insert(entity, key.clone());
            self.idents.insert(key, entity);
        }
        for (key, entity) in staged_codes {
            let mut state = EntityState {
                t,
                ..Default::default()
            };
            if let Some(system) = &key.system {
                state.attrs.insert(
                    "system".to_string(),
                    StoredSlot {
                        cardinality: Cardinality::One,
                        values: vec![StoredValue::Scalar(Value::String(system.clone()))],
                    },
                );
            }
            if let Some(code_version) = &key.version {
                state.attrs.insert(
                    "version".to_string(),
                    StoredSlot {
                        cardinality: Cardinality::One,
                        values: vec![StoredValue::Scalar(Value::String(code_version.clone()))],
                    },
                );
            }
            state.attrs.insert(
                "code".to_string(),
                StoredSlot {
                    cardinality: Cardinality::One,
                    values: vec![StoredValue::Scalar(Value::String(key.code.clone()))],
                },
            );
            self.entities.entry(entity).or_default().states.push(state);
            self.codes.insert(key.ident(), entity);
            self.code_keys.insert(entity, key);
        }
        for (entity, state) in touched {
            self.entities.entry(entity).or_default().states.push(state);
        }
        self.log.insert(t, instant);
        self.next_t = t + 1;

        Ok(WriteResult {
            t,
            instant,
            resolved,
        })
    }

    fn resolve_value(
        &self,
        value: &StoreValue,
        resolve: &impl Fn(EntityRef) -> Result<EntityId, StorageError>,
        staged_codes: &[(CodeKey, EntityId)],
    ) -> Result<StoredValue, StorageError> {
        Ok(match value {
            StoreValue::Scalar(v) => StoredValue::Scalar(v.clone()),
            StoreValue::Child(r) => StoredValue::Child(resolve(*r)?),
            StoreValue::Resource(r) => StoredValue::Resource(resolve(*r)?),
            StoreValue::Code(key) => {
                let entity = self
                    .codes
                    .get(&key.ident())
                    .copied()
                    .or_else(|| {
                        staged_codes
                            .iter()
                            .find(|(k, _)| k == key)
                            .map(|(_, e)| *e)
                    })
                    .ok_or_else(|| {
                        StorageError::fault(format!("code {:?} not interned", key.ident()))
                    })?;
                StoredValue::Code(entity)
            }
        })
    }
}

/// Fetches (or initializes from the current head) the staged state for an
/// entity touched by the write in progress.
fn stage<'a>(
    entities: &HashMap<EntityId, EntityTimeline>,
    touched: &'a mut HashMap<EntityId, EntityState>,
    entity: EntityId,
    t: u64,
) -> &'a mut EntityState {
    touched.entry(entity).or_insert_with(|| {
        let mut state = entities
            .get(&entity)
            .and_then(|timeline| timeline.head())
            .cloned()
            .unwrap_or_default();
        state.t = t;
        state
    })
}

/// Aggregate counters for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Resources whose head version is live.
    pub resources: usize,
    /// Last committed transaction number.
    pub last_t: u64,
}

/// Append-only in-memory store.
///
/// Reads go through basis-t snapshots; writes are funneled through a
/// bounded worker pool and serialized behind the write lock. Must be
/// created inside a Tokio runtime.
pub struct MemoryStore {
    inner: Arc<RwLock<StoreInner>>,
    writer: WriterHandle,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        let inner = Arc::new(RwLock::new(StoreInner::new()));
        let writer = writer::spawn(Arc::clone(&inner), config);
        Self { inner, writer }
    }

    pub(crate) fn inner(&self) -> Arc<RwLock<StoreInner>> {
        Arc::clone(&self.inner)
    }

    pub async fn stats(&self) -> StoreStats {
        let inner = self.inner.read().await;
        let basis_t = inner.basis_t();
        let resources = inner
            .idents
            .values()
            .filter(|entity| {
                inner
                    .state_at(**entity, basis_t)
                    .and_then(|state| state.version)
                    .is_some_and(|v| !version::is_deleted(v))
            })
            .count();
        StoreStats {
            resources,
            last_t: basis_t,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn snapshot(&self) -> Arc<dyn Snapshot> {
        let basis_t = self.inner.read().await.basis_t();
        Arc::new(MemorySnapshot {
            inner: Arc::clone(&self.inner),
            basis_t,
        })
    }

    async fn as_of(&self, t: u64) -> Arc<dyn Snapshot> {
        Arc::new(MemorySnapshot {
            inner: Arc::clone(&self.inner),
            basis_t: t,
        })
    }

    async fn transact(&self, request: WriteRequest) -> Result<WriteResult, StorageError> {
        self.writer.submit(request).await
    }

    async fn history(
        &self,
        resource_type: &str,
        id: &str,
        since: Option<u64>,
    ) -> Result<Vec<ResourceVersion>, StorageError> {
        let inner = self.inner.read().await;
        let key = (resource_type.to_string(), id.to_string());
        let Some(entity) = inner.idents.get(&key).copied() else {
            return Err(StorageError::not_found(resource_type, id));
        };
        let Some(timeline) = inner.entities.get(&entity) else {
            return Err(StorageError::not_found(resource_type, id));
        };
        let mut versions = Vec::new();
        for state in timeline.states.iter().rev() {
            if since.is_some_and(|s| state.t <= s) {
                continue;
            }
            if let Some(v) = materialize::resource_at(&inner, entity, state.t) {
                versions.push(v);
            }
        }
        Ok(versions)
    }
}

pub(crate) struct MemorySnapshot {
    pub(crate) inner: Arc<RwLock<StoreInner>>,
    pub(crate) basis_t: u64,
}

#[async_trait]
impl Snapshot for MemorySnapshot {
    fn basis_t(&self) -> u64 {
        self.basis_t
    }

    async fn resource_head(&self, resource_type: &str, id: &str) -> Option<ResourceHead> {
        let inner = self.inner.read().await;
        let key = (resource_type.to_string(), id.to_string());
        let entity = inner.idents.get(&key).copied()?;
        let state = inner.state_at(entity, self.basis_t)?;
        Some(ResourceHead {
            entity,
            version: state.version?,
            t: state.t,
        })
    }

    async fn entity(&self, entity: EntityId) -> Option<EntityAttrs> {
        let inner = self.inner.read().await;
        let state = inner.state_at(entity, self.basis_t)?;
        let mut attrs = HashMap::new();
        for (attribute, slot) in &state.attrs {
            let values = slot
                .values
                .iter()
                .map(|v| match v {
                    StoredValue::Scalar(x) => StoreValue::Scalar(x.clone()),
                    StoredValue::Child(e) => StoreValue::Child(EntityRef::Id(*e)),
                    StoredValue::Resource(e) => StoreValue::Resource(EntityRef::Id(*e)),
                    StoredValue::Code(e) => StoreValue::Code(
                        inner
                            .code_keys
                            .get(e)
                            .cloned()
                            .unwrap_or_else(|| CodeKey::new(None::<String>, None::<String>, "")),
                    ),
                })
                .collect();
            attrs.insert(
                attribute.clone(),
                AttrSlot {
                    cardinality: slot.cardinality,
                    values,
                },
            );
        }
        Some(EntityAttrs { attrs })
    }

    async fn materialize_entity(&self, entity: EntityId) -> Option<Value> {
        let inner = self.inner.read().await;
        materialize::entity_at(&inner, entity, self.basis_t)
    }

    async fn resource_ident(&self, entity: EntityId) -> Option<(String, String)> {
        let inner = self.inner.read().await;
        inner.reverse_idents.get(&entity).cloned()
    }

    async fn resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Option<ResourceVersion>, StorageError> {
        let inner = self.inner.read().await;
        let key = (resource_type.to_string(), id.to_string());
        let Some(entity) = inner.idents.get(&key).copied() else {
            return Ok(None);
        };
        Ok(materialize::resource_at(&inner, entity, self.basis_t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironfhir_core::version::{CreationMode, delete_next, initial, upsert_next};
    use serde_json::json;

    fn create_patient_request(id: &str, gender: &str) -> WriteRequest {
        let tempid = TempId(1);
        let root = EntityRef::Temp(tempid);
        let mut request = WriteRequest::new();
        request.declare_resource(tempid, "Patient", id);
        request.add(
            root,
            "resourceType",
            StoreValue::Scalar(json!("Patient")),
            Cardinality::One,
        );
        request.add(root, "id", StoreValue::Scalar(json!(id)), Cardinality::One);
        request.add(
            root,
            "gender",
            StoreValue::Scalar(json!(gender)),
            Cardinality::One,
        );
        request.guard(root, None, initial(CreationMode::ClientAssigned));
        request
    }

    #[tokio::test]
    async fn create_read_round_trip() {
        let store = MemoryStore::new();
        let result = store
            .transact(create_patient_request("0", "female"))
            .await
            .unwrap();
        assert_eq!(result.t, 1);

        let snapshot = store.snapshot().await;
        let resource = snapshot.resource("Patient", "0").await.unwrap().unwrap();
        assert_eq!(resource.ordinal(), 1);
        assert!(!resource.is_deleted());

        let content = resource.content.unwrap();
        assert_eq!(content["resourceType"], "Patient");
        assert_eq!(content["id"], "0");
        assert_eq!(content["gender"], "female");
        assert_eq!(content["meta"]["versionId"], "1");
        assert!(content["meta"]["lastUpdated"].is_string());
    }

    #[tokio::test]
    async fn cas_mismatch_aborts_the_whole_write() {
        let store = MemoryStore::new();
        store
            .transact(create_patient_request("0", "female"))
            .await
            .unwrap();

        let snapshot = store.snapshot().await;
        let head = snapshot.resource_head("Patient", "0").await.unwrap();

        // Stale expectation: pretend the resource is still unwritten.
        let mut request = WriteRequest::new();
        request.add(
            EntityRef::Id(head.entity),
            "gender",
            StoreValue::Scalar(json!("male")),
            Cardinality::One,
        );
        request.guard(EntityRef::Id(head.entity), None, initial(CreationMode::ClientAssigned));

        let err = store.transact(request).await.unwrap_err();
        assert!(err.is_conflict());

        // Nothing committed.
        let resource = store
            .snapshot()
            .await
            .resource("Patient", "0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resource.ordinal(), 1);
        assert_eq!(resource.content.unwrap()["gender"], "female");
    }

    #[tokio::test]
    async fn update_advances_the_version() {
        let store = MemoryStore::new();
        store
            .transact(create_patient_request("0", "female"))
            .await
            .unwrap();

        let head = store
            .snapshot()
            .await
            .resource_head("Patient", "0")
            .await
            .unwrap();
        let mut request = WriteRequest::new();
        request.add(
            EntityRef::Id(head.entity),
            "gender",
            StoreValue::Scalar(json!("male")),
            Cardinality::One,
        );
        request.guard(
            EntityRef::Id(head.entity),
            Some(head.version),
            upsert_next(head.version),
        );
        store.transact(request).await.unwrap();

        let resource = store
            .snapshot()
            .await
            .resource("Patient", "0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resource.ordinal(), 2);
        assert_eq!(resource.content.unwrap()["gender"], "male");
    }

    #[tokio::test]
    async fn tombstones_keep_their_lineage() {
        let store = MemoryStore::new();
        store
            .transact(create_patient_request("0", "female"))
            .await
            .unwrap();

        let head = store
            .snapshot()
            .await
            .resource_head("Patient", "0")
            .await
            .unwrap();
        let mut request = WriteRequest::new();
        request.guard(
            EntityRef::Id(head.entity),
            Some(head.version),
            delete_next(head.version),
        );
        store.transact(request).await.unwrap();

        let snapshot = store.snapshot().await;
        let tombstone = snapshot.resource("Patient", "0").await.unwrap().unwrap();
        assert!(tombstone.is_deleted());
        assert_eq!(tombstone.ordinal(), 2);
        assert!(tombstone.content.is_none());

        // Recreate through the same ident: the version keeps counting.
        let head = snapshot.resource_head("Patient", "0").await.unwrap();
        let tempid = TempId(9);
        let mut request = WriteRequest::new();
        request.declare_resource(tempid, "Patient", "0");
        request.add(
            EntityRef::Temp(tempid),
            "gender",
            StoreValue::Scalar(json!("other")),
            Cardinality::One,
        );
        request.guard(
            EntityRef::Temp(tempid),
            Some(head.version),
            upsert_next(head.version),
        );
        let result = store.transact(request).await.unwrap();
        assert_eq!(result.resolved[&tempid], head.entity);

        let recreated = store
            .snapshot()
            .await
            .resource("Patient", "0")
            .await
            .unwrap()
            .unwrap();
        assert!(!recreated.is_deleted());
        assert_eq!(recreated.ordinal(), 3);

        let history = store.history("Patient", "0", None).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].ordinal(), 3);
        assert!(history[1].is_deleted());
        assert_eq!(history[2].ordinal(), 1);
    }

    #[tokio::test]
    async fn snapshots_are_anchored_to_their_basis() {
        let store = MemoryStore::new();
        store
            .transact(create_patient_request("0", "female"))
            .await
            .unwrap();
        let before = store.snapshot().await;

        let head = before.resource_head("Patient", "0").await.unwrap();
        let mut request = WriteRequest::new();
        request.add(
            EntityRef::Id(head.entity),
            "gender",
            StoreValue::Scalar(json!("male")),
            Cardinality::One,
        );
        request.guard(
            EntityRef::Id(head.entity),
            Some(head.version),
            upsert_next(head.version),
        );
        store.transact(request).await.unwrap();

        // The old snapshot still sees version 1.
        let old = before.resource("Patient", "0").await.unwrap().unwrap();
        assert_eq!(old.ordinal(), 1);
        assert_eq!(old.content.unwrap()["gender"], "female");

        let as_of = store.as_of(1).await;
        let replay = as_of.resource("Patient", "0").await.unwrap().unwrap();
        assert_eq!(replay.ordinal(), 1);
    }

    #[tokio::test]
    async fn codes_are_interned_once() {
        let store = MemoryStore::new();
        let key = CodeKey::new(Some("http://loinc.org"), None::<String>, "8480-6");

        let tempid = TempId(1);
        let root = EntityRef::Temp(tempid);
        let mut request = WriteRequest::new();
        request.declare_resource(tempid, "Observation", "obs-1");
        request.ensure_code(key.clone());
        request.add(
            root,
            "resourceType",
            StoreValue::Scalar(json!("Observation")),
            Cardinality::One,
        );
        request.add(root, "id", StoreValue::Scalar(json!("obs-1")), Cardinality::One);
        request.guard(root, None, initial(CreationMode::ClientAssigned));
        store.transact(request).await.unwrap();

        let mut request = WriteRequest::new();
        let tempid = TempId(2);
        let root = EntityRef::Temp(tempid);
        request.declare_resource(tempid, "Observation", "obs-2");
        request.ensure_code(key.clone());
        request.add(
            root,
            "resourceType",
            StoreValue::Scalar(json!("Observation")),
            Cardinality::One,
        );
        request.add(root, "id", StoreValue::Scalar(json!("obs-2")), Cardinality::One);
        request.guard(root, None, initial(CreationMode::ClientAssigned));
        store.transact(request).await.unwrap();

        let inner = store.inner();
        let inner = inner.read().await;
        assert_eq!(inner.codes.len(), 1);
        assert!(inner.codes.contains_key(&key.ident()));
    }

    #[tokio::test]
    async fn atomicity_across_resources() {
        let store = MemoryStore::new();
        store
            .transact(create_patient_request("0", "female"))
            .await
            .unwrap();

        // Two creates, the second guarded against an id that already
        // exists: neither may land.
        let mut request = WriteRequest::new();
        let first = TempId(1);
        request.declare_resource(first, "Patient", "1");
        request.add(
            EntityRef::Temp(first),
            "resourceType",
            StoreValue::Scalar(json!("Patient")),
            Cardinality::One,
        );
        request.guard(EntityRef::Temp(first), None, initial(CreationMode::ClientAssigned));

        let second = TempId(2);
        request.declare_resource(second, "Patient", "0");
        request.guard(EntityRef::Temp(second), None, initial(CreationMode::ClientAssigned));

        let err = store.transact(request).await.unwrap_err();
        assert!(err.is_conflict());

        let snapshot = store.snapshot().await;
        assert!(snapshot.resource("Patient", "1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stats_count_live_resources() {
        let store = MemoryStore::new();
        store
            .transact(create_patient_request("0", "female"))
            .await
            .unwrap();
        // Tempid numbers are write-scoped, so reuse across writes is fine.
        store
            .transact(create_patient_request("1", "male"))
            .await
            .unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.resources, 2);
        assert_eq!(stats.last_t, 2);
    }
}
