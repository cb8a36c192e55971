//! The upsert engine.
//!
//! Diffs an incoming resource document against the stored entity graph and
//! emits a minimal set of add/retract mutations plus the CAS guard for the
//! version transition. Repeated composite elements are matched by value
//! identity first, then paired old-to-new by ascending retract cost so
//! nested entities keep their identity across updates.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

use ironfhir_core::{
    CoreError, Result, is_valid_id, is_valid_resource_type_name,
    version::{self, CreationMode},
};
use ironfhir_storage::{
    AttrSlot, Cardinality, CodeKey, EntityAttrs, EntityId, EntityRef, ResourceHead, Snapshot,
    StoreValue, WriteRequest,
};

use crate::context::TransactionContext;
use crate::schema::{ElementKind, ElementView, SchemaRegistry, infer_element};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Code-system context inherited by `code` elements from their enclosing
/// composite (`Coding.system`, `CodeSystem.url`, ...).
#[derive(Debug, Clone, Default)]
pub(crate) struct CodeContext {
    pub system: Option<String>,
    pub version: Option<String>,
}

/// Local ids of the contained resources carried by the document being
/// upserted; `#local` references must resolve against this.
#[derive(Debug, Default)]
pub(crate) struct ContainedIndex {
    ids: HashSet<String>,
}

impl ContainedIndex {
    pub fn from_value(contained: Option<&Value>) -> Self {
        let mut ids = HashSet::new();
        if let Some(Value::Array(items)) = contained {
            for item in items {
                if let Some(id) = item.get("id").and_then(Value::as_str) {
                    ids.insert(id.to_string());
                }
            }
        }
        Self { ids }
    }

    pub fn has(&self, local_id: &str) -> bool {
        self.ids.contains(local_id)
    }
}

/// One upsert pass over a resource, writing into a shared mutation set.
pub struct Upserter<'a> {
    pub schemas: &'a SchemaRegistry,
    pub snapshot: &'a dyn Snapshot,
    pub ctx: &'a mut TransactionContext,
    pub request: &'a mut WriteRequest,
}

impl<'a> Upserter<'a> {
    /// Diffs `resource` against the stored state (or an empty placeholder
    /// for a create) and emits mutations plus the version CAS. Returns the
    /// version token the resource will carry after commit.
    pub async fn upsert_resource(
        &mut self,
        resource_type: &str,
        id: &str,
        target: EntityRef,
        existing: Option<ResourceHead>,
        resource: &Map<String, Value>,
        mode: CreationMode,
    ) -> Result<i64> {
        // Server-managed meta fields never participate in the diff.
        let mut doc = resource.clone();
        doc.remove("resourceType");
        doc.remove("id");
        let mut drop_meta = false;
        if let Some(Value::Object(meta)) = doc.get_mut("meta") {
            meta.remove("versionId");
            meta.remove("lastUpdated");
            drop_meta = meta.is_empty();
        }
        if drop_meta {
            doc.remove("meta");
        }

        let contained_index = ContainedIndex::from_value(doc.get("contained"));

        let old = match &existing {
            Some(head) => self.snapshot.entity(head.entity).await,
            None => None,
        };
        let old = old.as_ref();

        self.sync_scalar(target, "resourceType", Value::String(resource_type.into()), old);
        self.sync_scalar(target, "id", Value::String(id.into()), old);

        let new_contained = match doc.get("contained") {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        };
        self.diff_contained(
            target,
            old.and_then(|o| o.get("contained")),
            &new_contained,
            &contained_index,
        )
        .await?;

        self.diff_body(
            target,
            Some(resource_type),
            old,
            &doc,
            &CodeContext::default(),
            &contained_index,
            &["resourceType", "id", "contained"],
        )
        .await?;

        let desired = match &existing {
            Some(head) => version::upsert_next(head.version),
            None => version::initial(mode),
        };
        self.request
            .guard(target, existing.as_ref().map(|h| h.version), desired);
        Ok(desired)
    }

    /// Emits the tombstone transition for a resource.
    pub fn delete_resource(&mut self, head: &ResourceHead) -> i64 {
        let desired = version::delete_next(head.version);
        self.request
            .guard(EntityRef::Id(head.entity), Some(head.version), desired);
        desired
    }

    /// Card-one scalar attribute kept in sync with a fixed value.
    fn sync_scalar(
        &mut self,
        entity: EntityRef,
        attribute: &str,
        value: Value,
        old: Option<&EntityAttrs>,
    ) {
        let current = old
            .and_then(|o| o.get(attribute))
            .and_then(AttrSlot::single);
        if current != Some(&StoreValue::Scalar(value.clone())) {
            self.request
                .add(entity, attribute, StoreValue::Scalar(value), Cardinality::One);
        }
    }

    /// Walks one object body: declared elements in schema order, inferred
    /// elements for undeclared keys, then retraction of vanished
    /// attributes.
    fn diff_body<'b>(
        &'b mut self,
        entity: EntityRef,
        type_name: Option<&'b str>,
        old: Option<&'b EntityAttrs>,
        new_obj: &'b Map<String, Value>,
        inherited: &'b CodeContext,
        contained: &'b ContainedIndex,
        skip: &'b [&'b str],
    ) -> BoxFuture<'b, Result<()>> {
        Box::pin(async move {
            let schema = type_name.and_then(|name| self.schemas.type_schema(name));

            let code_ctx = match schema.and_then(|s| s.system_key) {
                Some(system_key) => CodeContext {
                    system: scalar_str(new_obj, old, system_key),
                    version: scalar_str(new_obj, old, "version"),
                },
                None => inherited.clone(),
            };

            let mut handled: HashSet<String> = skip.iter().map(|s| s.to_string()).collect();

            if let Some(schema) = schema {
                for def in schema.elements {
                    if def.is_choice() {
                        let mut chosen: Option<(ElementView, &Value)> = None;
                        for choice in def.choices {
                            let view = def.choice_view(choice);
                            let present = new_obj.get(&view.name);
                            if chosen.is_none()
                                && let Some(value) = present
                            {
                                handled.insert(view.name.clone());
                                chosen = Some((view, value));
                                continue;
                            }
                            // Variant not chosen: any stored value of it
                            // goes away.
                            if let Some(old_slot) = old.and_then(|o| o.get(&view.name)) {
                                self.retract_slot(entity, &view.name, old_slot).await?;
                            }
                            handled.insert(view.name);
                        }
                        if let Some((view, value)) = chosen {
                            let old_slot = old.and_then(|o| o.get(&view.name));
                            self.diff_element(
                                entity,
                                &view,
                                old_slot,
                                Some(value),
                                &code_ctx,
                                contained,
                            )
                            .await?;
                        }
                    } else {
                        handled.insert(def.name.to_string());
                        let old_slot = old.and_then(|o| o.get(def.name));
                        let new_value = new_obj.get(def.name);
                        if old_slot.is_none() && new_value.is_none() {
                            continue;
                        }
                        let view = def.view();
                        self.diff_element(entity, &view, old_slot, new_value, &code_ctx, contained)
                            .await?;
                    }
                }
            }

            for (key, value) in new_obj {
                if handled.contains(key) {
                    continue;
                }
                handled.insert(key.clone());
                let view = infer_element(key, value);
                let old_slot = old.and_then(|o| o.get(key));
                self.diff_element(entity, &view, old_slot, Some(value), &code_ctx, contained)
                    .await?;
            }

            if let Some(old) = old {
                let mut removed: Vec<(&String, &AttrSlot)> = old
                    .attrs
                    .iter()
                    .filter(|(key, _)| !handled.contains(*key) && !new_obj.contains_key(*key))
                    .collect();
                removed.sort_by(|a, b| a.0.cmp(b.0));
                for (attribute, slot) in removed {
                    self.retract_slot(entity, attribute, slot).await?;
                }
            }
            Ok(())
        })
    }

    fn diff_element<'b>(
        &'b mut self,
        entity: EntityRef,
        view: &'b ElementView,
        old: Option<&'b AttrSlot>,
        new: Option<&'b Value>,
        code_ctx: &'b CodeContext,
        contained: &'b ContainedIndex,
    ) -> BoxFuture<'b, Result<()>> {
        Box::pin(async move {
            let Some(new) = new else {
                if let Some(old) = old {
                    self.retract_slot(entity, &view.name, old).await?;
                }
                return Ok(());
            };
            match view.kind {
                ElementKind::Primitive => self.diff_primitive(entity, view, old, new),
                ElementKind::Code => self.diff_code(entity, view, old, new, code_ctx),
                ElementKind::Composite | ElementKind::Reference | ElementKind::Coding => {
                    match view.card {
                        Cardinality::One => {
                            self.diff_composite_one(entity, view, old, new, code_ctx, contained)
                                .await
                        }
                        Cardinality::Many => {
                            self.diff_composite_many(entity, view, old, new, code_ctx, contained)
                                .await
                        }
                    }
                }
                ElementKind::Contained => {
                    let items = match new {
                        Value::Array(items) => items.clone(),
                        other => vec![other.clone()],
                    };
                    self.diff_contained(entity, old, &items, contained).await
                }
            }
        })
    }

    fn diff_primitive(
        &mut self,
        entity: EntityRef,
        view: &ElementView,
        old: Option<&AttrSlot>,
        new: &Value,
    ) -> Result<()> {
        match view.card {
            Cardinality::One => {
                let current = old.and_then(AttrSlot::single);
                if current != Some(&StoreValue::Scalar(new.clone())) {
                    self.request.add(
                        entity,
                        view.name.clone(),
                        StoreValue::Scalar(new.clone()),
                        Cardinality::One,
                    );
                }
            }
            Cardinality::Many => {
                let new_items: Vec<&Value> = match new {
                    Value::Array(items) => items.iter().collect(),
                    other => vec![other],
                };
                let mut remaining_old: Vec<&StoreValue> =
                    old.map(|slot| slot.values.iter().collect()).unwrap_or_default();
                let mut additions: Vec<&Value> = Vec::new();
                for item in new_items {
                    let matching = remaining_old
                        .iter()
                        .position(|value| **value == StoreValue::Scalar((*item).clone()));
                    match matching {
                        Some(position) => {
                            remaining_old.remove(position);
                        }
                        None => additions.push(item),
                    }
                }
                for value in remaining_old {
                    self.request
                        .retract(entity, view.name.clone(), value.clone());
                }
                for item in additions {
                    self.request.add(
                        entity,
                        view.name.clone(),
                        StoreValue::Scalar(item.clone()),
                        Cardinality::Many,
                    );
                }
            }
        }
        Ok(())
    }

    fn diff_code(
        &mut self,
        entity: EntityRef,
        view: &ElementView,
        old: Option<&AttrSlot>,
        new: &Value,
        code_ctx: &CodeContext,
    ) -> Result<()> {
        let Some(code) = new.as_str() else {
            return self.diff_primitive(entity, view, old, new);
        };
        let key = CodeKey::new(code_ctx.system.clone(), code_ctx.version.clone(), code);
        if self.ctx.intern_once(&key) {
            self.request.ensure_code(key.clone());
        }
        let current = old.and_then(AttrSlot::single);
        if current != Some(&StoreValue::Code(key.clone())) {
            self.request
                .add(entity, view.name.clone(), StoreValue::Code(key), Cardinality::One);
        }
        Ok(())
    }

    async fn diff_composite_one(
        &mut self,
        entity: EntityRef,
        view: &ElementView,
        old: Option<&AttrSlot>,
        new: &Value,
        code_ctx: &CodeContext,
        contained: &ContainedIndex,
    ) -> Result<()> {
        let Some(new_obj) = new.as_object() else {
            // Shape mismatch with the schema: store as a plain value.
            return self.diff_primitive(entity, view, old, new);
        };

        let old_child = old.and_then(AttrSlot::single).and_then(|value| match value {
            StoreValue::Child(EntityRef::Id(child)) => Some(*child),
            _ => None,
        });

        match old_child {
            Some(child) => {
                let old_attrs = self.snapshot.entity(child).await.unwrap_or_default();
                self.diff_object(
                    EntityRef::Id(child),
                    view,
                    Some(&old_attrs),
                    new_obj,
                    code_ctx,
                    contained,
                )
                .await
            }
            None => {
                // A stored non-child value (shape change) is replaced.
                if let Some(slot) = old
                    && slot
                        .values
                        .iter()
                        .any(|v| !matches!(v, StoreValue::Child(_)))
                {
                    self.retract_slot(entity, &view.name, slot).await?;
                }
                self.create_child(entity, view, Cardinality::One, new_obj, code_ctx, contained)
                    .await?;
                Ok(())
            }
        }
    }

    /// Repeated composites: exact-value matches pair first, then old and
    /// new items pair greedily by ascending retract cost. Reused pairs
    /// diff in place; the rest retract or add wholesale.
    async fn diff_composite_many(
        &mut self,
        entity: EntityRef,
        view: &ElementView,
        old: Option<&AttrSlot>,
        new: &Value,
        code_ctx: &CodeContext,
        contained: &ContainedIndex,
    ) -> Result<()> {
        let new_items: Vec<&Value> = match new {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        if new_items.iter().all(|item| !item.is_object()) && !new_items.is_empty() {
            return self.diff_primitive(entity, view, old, new);
        }

        let old_children: Vec<EntityId> = old
            .map(|slot| {
                slot.values
                    .iter()
                    .filter_map(|value| match value {
                        StoreValue::Child(EntityRef::Id(child)) => Some(*child),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut remaining_old: Vec<(EntityId, Value)> = Vec::new();
        for child in old_children {
            let canonical = self
                .snapshot
                .materialize_entity(child)
                .await
                .unwrap_or(Value::Null);
            remaining_old.push((child, canonical));
        }

        // Identical values drop out of both sets (multiset semantics).
        let mut unmatched_new: Vec<&Value> = Vec::new();
        for item in new_items {
            match remaining_old.iter().position(|(_, canon)| canon == item) {
                Some(position) => {
                    remaining_old.remove(position);
                }
                None => unmatched_new.push(item),
            }
        }

        // Pair survivors by how little of the old entity a reuse would
        // tear down.
        let mut pairs: Vec<(usize, usize, usize)> = Vec::new();
        for (old_index, (child, _)) in remaining_old.iter().enumerate() {
            for (new_index, item) in unmatched_new.iter().enumerate() {
                let cost = self
                    .reuse_cost(*child, view, *item, code_ctx, contained)
                    .await;
                if cost != usize::MAX {
                    pairs.push((old_index, new_index, cost));
                }
            }
        }
        pairs.sort_by_key(|(old_index, new_index, cost)| (*cost, *old_index, *new_index));

        let mut used_old = vec![false; remaining_old.len()];
        let mut used_new = vec![false; unmatched_new.len()];
        let mut reused: Vec<(EntityId, &Value)> = Vec::new();
        for (old_index, new_index, _) in pairs {
            if !used_old[old_index] && !used_new[new_index] {
                used_old[old_index] = true;
                used_new[new_index] = true;
                reused.push((remaining_old[old_index].0, unmatched_new[new_index]));
            }
        }

        for (child, item) in reused {
            let new_obj = item
                .as_object()
                .ok_or_else(|| CoreError::fault("non-object paired for reuse"))?;
            let old_attrs = self.snapshot.entity(child).await.unwrap_or_default();
            self.diff_object(
                EntityRef::Id(child),
                view,
                Some(&old_attrs),
                new_obj,
                code_ctx,
                contained,
            )
            .await?;
        }
        for (old_index, (child, _)) in remaining_old.iter().enumerate() {
            if !used_old[old_index] {
                self.retract_child_contents(*child).await?;
                self.request.retract(
                    entity,
                    view.name.clone(),
                    StoreValue::Child(EntityRef::Id(*child)),
                );
            }
        }
        for (new_index, item) in unmatched_new.iter().enumerate() {
            if used_new[new_index] {
                continue;
            }
            match item.as_object() {
                Some(new_obj) => {
                    self.create_child(entity, view, Cardinality::Many, new_obj, code_ctx, contained)
                        .await?;
                }
                None => {
                    self.request.add(
                        entity,
                        view.name.clone(),
                        StoreValue::Scalar((*item).clone()),
                        Cardinality::Many,
                    );
                }
            }
        }
        Ok(())
    }

    /// Retract count of a hypothetical in-place diff; `usize::MAX` when the
    /// diff would fail. Runs against a scratch mutation set so nothing
    /// leaks into the real write.
    fn reuse_cost<'b>(
        &'b mut self,
        child: EntityId,
        view: &'b ElementView,
        item: &'b Value,
        code_ctx: &'b CodeContext,
        contained: &'b ContainedIndex,
    ) -> BoxFuture<'b, usize> {
        Box::pin(async move {
            let Some(new_obj) = item.as_object() else {
                return usize::MAX;
            };
            let saved_interned = self.ctx.interned_snapshot();
            let real = std::mem::take(self.request);
            let old_attrs = self.snapshot.entity(child).await.unwrap_or_default();
            let outcome = self
                .diff_object(
                    EntityRef::Id(child),
                    view,
                    Some(&old_attrs),
                    new_obj,
                    code_ctx,
                    contained,
                )
                .await;
            let scratch = std::mem::replace(self.request, real);
            self.ctx.restore_interned(saved_interned);
            match outcome {
                Ok(()) => scratch.retract_count(),
                Err(_) => usize::MAX,
            }
        })
    }

    /// Dispatches an object diff according to the element kind.
    fn diff_object<'b>(
        &'b mut self,
        child: EntityRef,
        view: &'b ElementView,
        old: Option<&'b EntityAttrs>,
        new_obj: &'b Map<String, Value>,
        code_ctx: &'b CodeContext,
        contained: &'b ContainedIndex,
    ) -> BoxFuture<'b, Result<()>> {
        Box::pin(async move {
            if view.kind == ElementKind::Reference {
                self.diff_reference_object(child, old, new_obj, code_ctx, contained)
                    .await
            } else {
                self.diff_body(child, view.type_name, old, new_obj, code_ctx, contained, &[])
                    .await
            }
        })
    }

    async fn diff_reference_object(
        &mut self,
        child: EntityRef,
        old: Option<&EntityAttrs>,
        new_obj: &Map<String, Value>,
        code_ctx: &CodeContext,
        contained: &ContainedIndex,
    ) -> Result<()> {
        let current = old.and_then(|o| o.get("reference")).and_then(AttrSlot::single);
        match new_obj.get("reference") {
            Some(Value::String(raw)) => {
                let value = match self.resolve_reference(raw, contained).await? {
                    Some(resolved) => resolved,
                    None => StoreValue::Scalar(Value::String(raw.clone())),
                };
                if current != Some(&value) {
                    self.request
                        .add(child, "reference", value, Cardinality::One);
                }
            }
            Some(other) => {
                if current != Some(&StoreValue::Scalar(other.clone())) {
                    self.request.add(
                        child,
                        "reference",
                        StoreValue::Scalar(other.clone()),
                        Cardinality::One,
                    );
                }
            }
            None => {
                if let Some(slot) = old.and_then(|o| o.get("reference")) {
                    self.retract_slot(child, "reference", slot).await?;
                }
                if new_obj.get("identifier").is_some() {
                    tracing::warn!("Skipping logical reference without a literal target");
                }
            }
        }
        self.diff_body(
            child,
            Some("Reference"),
            old,
            new_obj,
            code_ctx,
            contained,
            &["reference"],
        )
        .await
    }

    /// Classifies and resolves a reference string. `Ok(None)` means the
    /// reference is kept verbatim without a referential link.
    async fn resolve_reference(
        &mut self,
        raw: &str,
        contained: &ContainedIndex,
    ) -> Result<Option<StoreValue>> {
        if let Some(local) = raw.strip_prefix('#') {
            if contained.has(local) {
                return Ok(Some(StoreValue::Scalar(Value::String(raw.to_string()))));
            }
            return Err(CoreError::incorrect(format!(
                "Contained resource \"#{local}\" not found."
            )));
        }
        if let Some((resource_type, id)) = raw.split_once('/')
            && is_valid_resource_type_name(resource_type)
            && is_valid_id(id)
        {
            if let Some(target) = self.ctx.resolve_target(resource_type, id) {
                return Ok(Some(StoreValue::Resource(target)));
            }
            if let Some(head) = self.snapshot.resource_head(resource_type, id).await
                && !head.is_deleted()
            {
                return Ok(Some(StoreValue::Resource(EntityRef::Id(head.entity))));
            }
            return Err(CoreError::referential(format!(
                "Referential integrity violated. Resource \"{resource_type}/{id}\" doesn't exist."
            )));
        }
        if let Some(target) = self.ctx.resolve_full_url(raw) {
            return Ok(Some(StoreValue::Resource(target)));
        }
        tracing::warn!(reference = %raw, "Skipping non-literal reference");
        Ok(None)
    }

    /// Creates a child entity for a composite value and fills it.
    fn create_child<'b>(
        &'b mut self,
        parent: EntityRef,
        view: &'b ElementView,
        card: Cardinality,
        new_obj: &'b Map<String, Value>,
        code_ctx: &'b CodeContext,
        contained: &'b ContainedIndex,
    ) -> BoxFuture<'b, Result<EntityRef>> {
        Box::pin(async move {
            let child = EntityRef::Temp(self.ctx.new_tempid());
            self.request
                .add(parent, view.name.clone(), StoreValue::Child(child), card);
            self.diff_object(child, view, None, new_obj, code_ctx, contained)
                .await?;
            Ok(child)
        })
    }

    /// Contained resources pair by local id and resource type; everything
    /// else is torn down or built fresh.
    async fn diff_contained(
        &mut self,
        entity: EntityRef,
        old: Option<&AttrSlot>,
        new_items: &[Value],
        contained: &ContainedIndex,
    ) -> Result<()> {
        let mut old_entries: Vec<(EntityId, Option<(String, String)>)> = Vec::new();
        if let Some(slot) = old {
            for value in &slot.values {
                if let StoreValue::Child(EntityRef::Id(child)) = value {
                    let attrs = self.snapshot.entity(*child).await.unwrap_or_default();
                    let ident = contained_ident_of(&attrs);
                    old_entries.push((*child, ident));
                }
            }
        }

        let mut used_old = vec![false; old_entries.len()];
        for item in new_items {
            let new_obj = item.as_object();
            let new_ident = new_obj.and_then(|o| {
                Some((
                    o.get("resourceType")?.as_str()?.to_string(),
                    o.get("id")?.as_str()?.to_string(),
                ))
            });
            let matched = new_ident.as_ref().and_then(|ident| {
                old_entries
                    .iter()
                    .position(|(_, old_ident)| old_ident.as_ref() == Some(ident))
                    .filter(|position| !used_old[*position])
            });
            match (matched, new_obj) {
                (Some(position), Some(new_obj)) => {
                    used_old[position] = true;
                    let child = old_entries[position].0;
                    let type_name = new_ident
                        .as_ref()
                        .map(|(resource_type, _)| resource_type.clone());
                    let old_attrs = self.snapshot.entity(child).await.unwrap_or_default();
                    self.diff_body(
                        EntityRef::Id(child),
                        type_name.as_deref(),
                        Some(&old_attrs),
                        new_obj,
                        &CodeContext::default(),
                        contained,
                        &[],
                    )
                    .await?;
                }
                (None, Some(new_obj)) => {
                    let child = EntityRef::Temp(self.ctx.new_tempid());
                    self.request.add(
                        entity,
                        "contained",
                        StoreValue::Child(child),
                        Cardinality::Many,
                    );
                    let type_name = new_obj
                        .get("resourceType")
                        .and_then(Value::as_str)
                        .map(String::from);
                    self.diff_body(
                        child,
                        type_name.as_deref(),
                        None,
                        new_obj,
                        &CodeContext::default(),
                        contained,
                        &[],
                    )
                    .await?;
                }
                (_, None) => {
                    let already_stored = old.is_some_and(|slot| {
                        slot.values.contains(&StoreValue::Scalar(item.clone()))
                    });
                    if !already_stored {
                        self.request.add(
                            entity,
                            "contained",
                            StoreValue::Scalar(item.clone()),
                            Cardinality::Many,
                        );
                    }
                }
            }
        }

        for (position, (child, _)) in old_entries.iter().enumerate() {
            if !used_old[position] {
                self.retract_child_contents(*child).await?;
                self.request.retract(
                    entity,
                    "contained",
                    StoreValue::Child(EntityRef::Id(*child)),
                );
            }
        }
        Ok(())
    }

    /// Retracts every value of an attribute, tearing down owned children.
    fn retract_slot<'b>(
        &'b mut self,
        entity: EntityRef,
        attribute: &'b str,
        slot: &'b AttrSlot,
    ) -> BoxFuture<'b, Result<()>> {
        Box::pin(async move {
            for value in &slot.values {
                if let StoreValue::Child(EntityRef::Id(child)) = value {
                    self.retract_child_contents(*child).await?;
                }
                self.request
                    .retract(entity, attribute.to_string(), value.clone());
            }
            Ok(())
        })
    }

    fn retract_child_contents<'b>(&'b mut self, child: EntityId) -> BoxFuture<'b, Result<()>> {
        Box::pin(async move {
            let Some(attrs) = self.snapshot.entity(child).await else {
                return Ok(());
            };
            let mut sorted: Vec<(&String, &AttrSlot)> = attrs.attrs.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            for (attribute, slot) in sorted {
                self.retract_slot(EntityRef::Id(child), attribute, slot)
                    .await?;
            }
            Ok(())
        })
    }
}

fn contained_ident_of(attrs: &EntityAttrs) -> Option<(String, String)> {
    let resource_type = match attrs.get("resourceType")?.single()? {
        StoreValue::Scalar(Value::String(s)) => s.clone(),
        _ => return None,
    };
    let id = match attrs.get("id")?.single()? {
        StoreValue::Scalar(Value::String(s)) => s.clone(),
        _ => return None,
    };
    Some((resource_type, id))
}

/// A card-one scalar as a string, preferring the incoming document.
fn scalar_str(
    new_obj: &Map<String, Value>,
    old: Option<&EntityAttrs>,
    key: &str,
) -> Option<String> {
    if let Some(value) = new_obj.get(key).and_then(Value::as_str) {
        return Some(value.to_string());
    }
    match old.and_then(|o| o.get(key)).and_then(AttrSlot::single) {
        Some(StoreValue::Scalar(Value::String(s))) => Some(s.clone()),
        _ => None,
    }
}
