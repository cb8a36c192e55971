//! Rebuilds FHIR JSON from the entity graph at a basis-t.

use serde_json::{Map, Value};

use ironfhir_core::version;
use ironfhir_storage::{Cardinality, EntityId, ResourceVersion};

use crate::store::{StoreInner, StoredValue};

/// Materializes a resource root at `basis_t`, injecting the server-managed
/// `meta.versionId` / `meta.lastUpdated`. Tombstones carry no content.
pub(crate) fn resource_at(
    inner: &StoreInner,
    entity: EntityId,
    basis_t: u64,
) -> Option<ResourceVersion> {
    let state = inner.state_at(entity, basis_t)?;
    let token = state.version?;
    let (resource_type, id) = inner.reverse_idents.get(&entity)?.clone();
    let last_updated = *inner.log.get(&state.t)?;

    let content = if version::is_deleted(token) {
        None
    } else {
        let mut content = entity_at(inner, entity, basis_t)?;
        if let Value::Object(map) = &mut content {
            let meta = map
                .entry("meta".to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(meta) = meta {
                meta.insert(
                    "versionId".to_string(),
                    Value::String(version::ordinal(token).to_string()),
                );
                meta.insert(
                    "lastUpdated".to_string(),
                    Value::String(last_updated.to_string()),
                );
            }
        }
        Some(content)
    };

    Some(ResourceVersion {
        entity,
        resource_type,
        id,
        version: token,
        t: state.t,
        last_updated,
        content,
    })
}

/// Materializes any entity (root, composite child, contained resource) to
/// a JSON object at `basis_t`.
pub(crate) fn entity_at(inner: &StoreInner, entity: EntityId, basis_t: u64) -> Option<Value> {
    let state = inner.state_at(entity, basis_t)?;
    let mut map = Map::new();
    for (attribute, slot) in &state.attrs {
        let values: Vec<Value> = slot
            .values
            .iter()
            .filter_map(|value| value_at(inner, value, basis_t))
            .collect();
        match slot.cardinality {
            Cardinality::One => {
                if let Some(value) = values.into_iter().next() {
                    map.insert(attribute.clone(), value);
                }
            }
            Cardinality::Many => {
                if !values.is_empty() {
                    map.insert(attribute.clone(), Value::Array(values));
                }
            }
        }
    }
    Some(Value::Object(map))
}

fn value_at(inner: &StoreInner, value: &StoredValue, basis_t: u64) -> Option<Value> {
    match value {
        StoredValue::Scalar(v) => Some(v.clone()),
        StoredValue::Child(entity) => entity_at(inner, *entity, basis_t),
        StoredValue::Resource(entity) => inner
            .reverse_idents
            .get(entity)
            .map(|(resource_type, id)| Value::String(format!("{resource_type}/{id}"))),
        StoredValue::Code(entity) => inner
            .code_keys
            .get(entity)
            .map(|key| Value::String(key.code.clone())),
    }
}
