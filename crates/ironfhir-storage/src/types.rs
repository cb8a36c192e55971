//! Data types shared between the store and the transaction layer.
//!
//! A write is a set of add/retract mutations over entities plus CAS guards
//! on resource version tokens. Entities are addressed either by their store
//! id or by a transaction-local tempid that the store resolves at commit.

use ironfhir_core::{FhirInstant, version};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Store-assigned entity identifier.
pub type EntityId = u64;

/// Placeholder identity for an entity created within the current write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TempId(pub u64);

impl std::fmt::Display for TempId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tmp-{}", self.0)
    }
}

/// An entity address: already stored, or pending creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Id(EntityId),
    Temp(TempId),
}

/// Whether an element holds a single value or a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

/// Identity of an interned terminology code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeKey {
    pub system: Option<String>,
    pub version: Option<String>,
    pub code: String,
}

impl CodeKey {
    pub fn new(
        system: Option<impl Into<String>>,
        version: Option<impl Into<String>>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            system: system.map(Into::into),
            version: version.map(Into::into),
            code: code.into(),
        }
    }

    /// Canonical `system|version|code` identity string.
    pub fn ident(&self) -> String {
        format!(
            "{}|{}|{}",
            self.system.as_deref().unwrap_or(""),
            self.version.as_deref().unwrap_or(""),
            self.code
        )
    }
}

/// A value slot in a mutation or an entity view.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    /// A primitive JSON value.
    Scalar(Value),
    /// An owned composite child entity.
    Child(EntityRef),
    /// A non-owning link to another resource's root entity.
    Resource(EntityRef),
    /// A link to an interned code entity.
    Code(CodeKey),
}

/// One mutation of the entity graph.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Add {
        entity: EntityRef,
        attribute: String,
        value: StoreValue,
        cardinality: Cardinality,
    },
    Retract {
        entity: EntityRef,
        attribute: String,
        value: StoreValue,
    },
    /// Idempotent creation of the interned entity for a code triple.
    EnsureCode { key: CodeKey },
}

/// Optimistic guard on a resource's version token. `expected == None`
/// asserts the resource has no version yet (fresh create).
#[derive(Debug, Clone, PartialEq)]
pub struct CasGuard {
    pub entity: EntityRef,
    pub expected: Option<i64>,
    pub desired: i64,
}

/// A complete atomic write: mutations, guards, and the identities of the
/// resource roots being created in this write.
#[derive(Debug, Clone, Default)]
pub struct WriteRequest {
    pub mutations: Vec<Mutation>,
    pub guards: Vec<CasGuard>,
    /// `(tempid, resource_type, id)` for each new resource root.
    pub new_resources: Vec<(TempId, String, String)>,
}

impl WriteRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        entity: EntityRef,
        attribute: impl Into<String>,
        value: StoreValue,
        cardinality: Cardinality,
    ) {
        self.mutations.push(Mutation::Add {
            entity,
            attribute: attribute.into(),
            value,
            cardinality,
        });
    }

    pub fn retract(&mut self, entity: EntityRef, attribute: impl Into<String>, value: StoreValue) {
        self.mutations.push(Mutation::Retract {
            entity,
            attribute: attribute.into(),
            value,
        });
    }

    pub fn ensure_code(&mut self, key: CodeKey) {
        self.mutations.push(Mutation::EnsureCode { key });
    }

    pub fn guard(&mut self, entity: EntityRef, expected: Option<i64>, desired: i64) {
        self.guards.push(CasGuard {
            entity,
            expected,
            desired,
        });
    }

    pub fn declare_resource(
        &mut self,
        tempid: TempId,
        resource_type: impl Into<String>,
        id: impl Into<String>,
    ) {
        self.new_resources
            .push((tempid, resource_type.into(), id.into()));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty() && self.guards.is_empty()
    }

    /// Number of retract mutations, the cost measure for reuse pairing.
    #[must_use]
    pub fn retract_count(&self) -> usize {
        self.mutations
            .iter()
            .filter(|m| matches!(m, Mutation::Retract { .. }))
            .count()
    }
}

/// Outcome of a committed write.
#[derive(Debug, Clone)]
pub struct WriteResult {
    /// Transaction number, strictly increasing per store.
    pub t: u64,
    /// Wall-clock transaction instant, shared by every entry of the write.
    pub instant: FhirInstant,
    /// Store ids assigned to the write's tempids.
    pub resolved: HashMap<TempId, EntityId>,
}

/// The current head of a resource: its root entity and version token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceHead {
    pub entity: EntityId,
    pub version: i64,
    pub t: u64,
}

impl ResourceHead {
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        version::is_deleted(self.version)
    }

    #[must_use]
    pub fn ordinal(&self) -> i64 {
        version::ordinal(self.version)
    }
}

/// One stored version of a resource as seen by readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceVersion {
    pub entity: EntityId,
    pub resource_type: String,
    pub id: String,
    /// The raw version token.
    pub version: i64,
    pub t: u64,
    pub last_updated: FhirInstant,
    /// Materialized content; `None` for tombstones.
    pub content: Option<Value>,
}

impl ResourceVersion {
    #[must_use]
    pub fn ordinal(&self) -> i64 {
        version::ordinal(self.version)
    }

    #[must_use]
    pub fn is_deleted(&self) -> bool {
        version::is_deleted(self.version)
    }

    #[must_use]
    pub fn etag(&self) -> String {
        version::etag(self.version)
    }

    /// `Type/id/_history/ordinal` relative URL for this version.
    #[must_use]
    pub fn versioned_url(&self) -> String {
        format!(
            "{}/{}/_history/{}",
            self.resource_type,
            self.id,
            self.ordinal()
        )
    }
}

/// An attribute slot on an entity view.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrSlot {
    pub cardinality: Cardinality,
    pub values: Vec<StoreValue>,
}

impl AttrSlot {
    #[must_use]
    pub fn one(value: StoreValue) -> Self {
        Self {
            cardinality: Cardinality::One,
            values: vec![value],
        }
    }

    #[must_use]
    pub fn many(values: Vec<StoreValue>) -> Self {
        Self {
            cardinality: Cardinality::Many,
            values,
        }
    }

    #[must_use]
    pub fn single(&self) -> Option<&StoreValue> {
        match self.cardinality {
            Cardinality::One => self.values.first(),
            Cardinality::Many => None,
        }
    }
}

/// A snapshot view of one entity's attributes, used by the diff engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityAttrs {
    pub attrs: HashMap<String, AttrSlot>,
}

impl EntityAttrs {
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&AttrSlot> {
        self.attrs.get(attribute)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn code_key_ident_joins_with_pipes() {
        let key = CodeKey::new(Some("http://loinc.org"), None::<String>, "8480-6");
        assert_eq!(key.ident(), "http://loinc.org||8480-6");

        let bare = CodeKey::new(None::<String>, None::<String>, "final");
        assert_eq!(bare.ident(), "||final");
    }

    #[test]
    fn write_request_builder_accumulates() {
        let mut request = WriteRequest::new();
        assert!(request.is_empty());

        let root = EntityRef::Temp(TempId(1));
        request.declare_resource(TempId(1), "Patient", "0");
        request.add(
            root,
            "gender",
            StoreValue::Scalar(json!("female")),
            Cardinality::One,
        );
        request.retract(root, "gender", StoreValue::Scalar(json!("male")));
        request.guard(root, None, -4);

        assert!(!request.is_empty());
        assert_eq!(request.mutations.len(), 2);
        assert_eq!(request.retract_count(), 1);
        assert_eq!(request.guards.len(), 1);
    }

    #[test]
    fn resource_version_urls_and_etags() {
        let v = ResourceVersion {
            entity: 7,
            resource_type: "Patient".into(),
            id: "0".into(),
            version: -7,
            t: 3,
            last_updated: ironfhir_core::now_utc(),
            content: Some(json!({"resourceType": "Patient", "id": "0"})),
        };
        assert_eq!(v.ordinal(), 2);
        assert_eq!(v.etag(), "W/\"2\"");
        assert_eq!(v.versioned_url(), "Patient/0/_history/2");
        assert!(!v.is_deleted());
    }

    #[test]
    fn attr_slot_single_only_for_card_one() {
        let one = AttrSlot::one(StoreValue::Scalar(json!("x")));
        assert!(one.single().is_some());

        let many = AttrSlot::many(vec![StoreValue::Scalar(json!("x"))]);
        assert!(many.single().is_none());
    }
}
