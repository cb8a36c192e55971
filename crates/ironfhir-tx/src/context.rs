//! Per-bundle transaction context.
//!
//! Holds the tempid table that lets entries of the same bundle reference
//! each other before anything is committed, plus the set of code triples
//! already scheduled for interning in this write.

use std::collections::{HashMap, HashSet};

use ironfhir_storage::{CodeKey, EntityRef, TempId};

#[derive(Debug, Default)]
pub struct TransactionContext {
    next_tempid: u64,
    /// `(resource_type, id)` to the planned entity for that resource.
    targets: HashMap<(String, String), EntityRef>,
    /// Entry `fullUrl` to the `(resource_type, id)` it names.
    full_urls: HashMap<String, (String, String)>,
    interned: HashSet<CodeKey>,
}

impl TransactionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_tempid(&mut self) -> TempId {
        self.next_tempid += 1;
        TempId(self.next_tempid)
    }

    pub fn register_target(
        &mut self,
        resource_type: impl Into<String>,
        id: impl Into<String>,
        entity: EntityRef,
    ) {
        self.targets
            .insert((resource_type.into(), id.into()), entity);
    }

    pub fn register_full_url(
        &mut self,
        full_url: impl Into<String>,
        resource_type: impl Into<String>,
        id: impl Into<String>,
    ) {
        self.full_urls
            .insert(full_url.into(), (resource_type.into(), id.into()));
    }

    pub fn resolve_target(&self, resource_type: &str, id: &str) -> Option<EntityRef> {
        self.targets
            .get(&(resource_type.to_string(), id.to_string()))
            .copied()
    }

    pub fn resolve_full_url(&self, full_url: &str) -> Option<EntityRef> {
        let (resource_type, id) = self.full_urls.get(full_url)?;
        self.resolve_target(resource_type, id)
    }

    /// Returns `true` the first time a code triple is seen in this bundle.
    pub fn intern_once(&mut self, key: &CodeKey) -> bool {
        self.interned.insert(key.clone())
    }

    pub(crate) fn interned_snapshot(&self) -> HashSet<CodeKey> {
        self.interned.clone()
    }

    pub(crate) fn restore_interned(&mut self, interned: HashSet<CodeKey>) {
        self.interned = interned;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tempids_are_sequential() {
        let mut ctx = TransactionContext::new();
        assert_eq!(ctx.new_tempid(), TempId(1));
        assert_eq!(ctx.new_tempid(), TempId(2));
    }

    #[test]
    fn targets_resolve_by_type_and_id() {
        let mut ctx = TransactionContext::new();
        let tempid = ctx.new_tempid();
        ctx.register_target("Patient", "0", EntityRef::Temp(tempid));

        assert_eq!(
            ctx.resolve_target("Patient", "0"),
            Some(EntityRef::Temp(tempid))
        );
        assert_eq!(ctx.resolve_target("Patient", "1"), None);
        assert_eq!(ctx.resolve_target("Observation", "0"), None);
    }

    #[test]
    fn full_urls_resolve_through_targets() {
        let mut ctx = TransactionContext::new();
        let tempid = ctx.new_tempid();
        ctx.register_target("Patient", "0", EntityRef::Temp(tempid));
        ctx.register_full_url("urn:uuid:3bc44de3", "Patient", "0");

        assert_eq!(
            ctx.resolve_full_url("urn:uuid:3bc44de3"),
            Some(EntityRef::Temp(tempid))
        );
        assert_eq!(ctx.resolve_full_url("urn:uuid:other"), None);
    }

    #[test]
    fn interning_is_once_per_triple() {
        let mut ctx = TransactionContext::new();
        let key = CodeKey::new(Some("http://loinc.org"), None::<String>, "8480-6");
        assert!(ctx.intern_once(&key));
        assert!(!ctx.intern_once(&key));
    }
}
