//! The batch/transaction processor.
//!
//! A `transaction` bundle is planned, conditionally resolved, diffed into
//! one mutation set, and committed in a single CAS-guarded write, so its
//! entries land atomically with one shared instant. A `batch` bundle runs
//! the same machinery per entry, each with its own commit and failure
//! isolation.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use ironfhir_api::{Bundle, BundleEntry, ReturnPreference};
use ironfhir_core::{
    CoreError, LuidGenerator, Result, is_valid_id, is_valid_resource_type_name,
    version::{self, CreationMode},
};
use ironfhir_storage::{
    DynResourceStore, DynSearchOracle, EntityRef, ResourceHead, ResourceVersion, Snapshot,
    WriteRequest, WriteResult,
};

use crate::context::TransactionContext;
use crate::response;
use crate::schema::SchemaRegistry;
use crate::upsert::Upserter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// A validated bundle entry, ready for planning.
#[derive(Debug, Clone)]
pub(crate) struct EntryPlan {
    pub method: Method,
    pub resource_type: String,
    pub id: Option<String>,
    pub vid: Option<String>,
    pub query: Option<String>,
    pub url: String,
    pub resource: Option<Map<String, Value>>,
    pub if_match: Option<String>,
    pub if_none_exist: Option<String>,
    pub full_url: Option<String>,
}

/// The planned effect of one entry, fixed before commit.
#[derive(Debug, Clone)]
pub(crate) enum EntryAction {
    Create {
        resource_type: String,
        id: String,
        version: i64,
    },
    Update {
        resource_type: String,
        id: String,
        version: i64,
        created: bool,
    },
    Delete {
        version: Option<i64>,
    },
    Matched {
        existing: ResourceVersion,
    },
    Read {
        resource_type: String,
        id: Option<String>,
        vid: Option<String>,
        query: Option<String>,
        url: String,
    },
}

/// Injectable handler for `GET` entries the processor cannot answer from
/// the store alone (type-level searches). Decouples the processor from
/// HTTP routing.
#[async_trait]
pub trait ReadDispatcher: Send + Sync {
    /// Returns `(status, body)` for the given request URL.
    async fn dispatch(&self, url: &str) -> Result<(String, Option<Value>)>;
}

pub struct BundleProcessor {
    store: DynResourceStore,
    oracle: DynSearchOracle,
    schemas: SchemaRegistry,
    luids: Arc<Mutex<LuidGenerator>>,
    base_url: String,
    dispatcher: Option<Arc<dyn ReadDispatcher>>,
}

impl BundleProcessor {
    pub fn new(
        store: DynResourceStore,
        oracle: DynSearchOracle,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            oracle,
            schemas: SchemaRegistry::new(),
            luids: Arc::new(Mutex::new(LuidGenerator::new())),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dispatcher: None,
        }
    }

    /// Replaces the id generator; tests seed it for exact ids.
    pub fn with_luid_generator(mut self, generator: LuidGenerator) -> Self {
        self.luids = Arc::new(Mutex::new(generator));
        self
    }

    pub fn with_read_dispatcher(mut self, dispatcher: Arc<dyn ReadDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Processes a batch or transaction bundle into its response bundle.
    /// Bundle-level failures (always, for transactions) surface as the
    /// returned error.
    pub async fn process(&self, bundle: &Value, prefer: ReturnPreference) -> Result<Bundle> {
        let bundle: Bundle = serde_json::from_value(bundle.clone())
            .map_err(|err| CoreError::incorrect(format!("Invalid bundle: {err}")))?;
        if bundle.resource_type != "Bundle" {
            return Err(CoreError::incorrect_value(
                format!("Expected a Bundle but got a \"{}\".", bundle.resource_type),
                "resourceType",
            ));
        }
        match bundle.bundle_type.as_str() {
            "transaction" => self.transaction(&bundle, prefer).await,
            "batch" => self.batch(&bundle, prefer).await,
            other => Err(CoreError::incorrect_value(
                format!("Unsupported bundle type \"{other}\"."),
                "Bundle.type",
            )),
        }
    }

    async fn transaction(&self, bundle: &Bundle, prefer: ReturnPreference) -> Result<Bundle> {
        tracing::debug!(entries = bundle.entry.len(), "processing transaction bundle");

        let mut plans = Vec::with_capacity(bundle.entry.len());
        for (index, entry) in bundle.entry.iter().enumerate() {
            plans.push(validate_entry(index, entry)?);
        }
        check_duplicates(&plans)?;

        let snapshot = self.store.snapshot().await;
        let mut ctx = TransactionContext::new();
        let mut request = WriteRequest::new();

        let actions = self
            .plan_and_generate(snapshot.as_ref(), &mut ctx, &mut request, &plans)
            .await?;

        let write = if request.is_empty() {
            None
        } else {
            let result = self.store.transact(request).await.map_err(CoreError::from)?;
            tracing::debug!(t = result.t, "transaction committed");
            Some(result)
        };

        self.assemble("transaction-response", &actions, write.as_ref(), prefer)
            .await
    }

    async fn batch(&self, bundle: &Bundle, prefer: ReturnPreference) -> Result<Bundle> {
        tracing::debug!(entries = bundle.entry.len(), "processing batch bundle");

        let mut entries = Vec::with_capacity(bundle.entry.len());
        for (index, entry) in bundle.entry.iter().enumerate() {
            match self.batch_entry(index, entry, prefer).await {
                Ok(entry) => entries.push(entry),
                Err(err) => entries.push(response::error_entry(&err)),
            }
        }
        Ok(Bundle::response(
            "batch-response",
            uuid::Uuid::new_v4().to_string(),
            entries,
        ))
    }

    /// One batch entry: its own context, its own commit.
    async fn batch_entry(
        &self,
        index: usize,
        entry: &BundleEntry,
        prefer: ReturnPreference,
    ) -> Result<BundleEntry> {
        let plan = validate_entry(index, entry)?;
        let snapshot = self.store.snapshot().await;
        let mut ctx = TransactionContext::new();
        let mut request = WriteRequest::new();
        let plans = vec![plan];
        let actions = self
            .plan_and_generate(snapshot.as_ref(), &mut ctx, &mut request, &plans)
            .await?;

        let write = if request.is_empty() {
            None
        } else {
            Some(self.store.transact(request).await.map_err(CoreError::from)?)
        };

        let post = self.store.snapshot().await;
        response::entry_for(
            &actions[0],
            write.as_ref(),
            post.as_ref(),
            &self.base_url,
            prefer,
            self.dispatcher.as_deref(),
        )
        .await
    }

    /// Plan + conditional-create resolution + mutation generation over a
    /// slice of validated entries, accumulating into one write.
    async fn plan_and_generate(
        &self,
        snapshot: &dyn Snapshot,
        ctx: &mut TransactionContext,
        request: &mut WriteRequest,
        plans: &[EntryPlan],
    ) -> Result<Vec<EntryAction>> {
        #[derive(Debug)]
        enum Decision {
            Post {
                target: EntityRef,
                id: String,
            },
            Put {
                target: EntityRef,
                head: Option<ResourceHead>,
                id: String,
            },
            Matched(ResourceVersion),
            Other,
        }

        // Plan: allocate server ids and register every name an entry is
        // known by, so later entries can reference earlier ones.
        let mut decisions = Vec::with_capacity(plans.len());
        {
            let mut luids = self.luids.lock().await;
            for plan in plans {
                match plan.method {
                    Method::Post => {
                        let id = luids.next_id();
                        let target = EntityRef::Temp(ctx.new_tempid());
                        ctx.register_target(&plan.resource_type, &id, target);
                        if let Some(body_id) = plan
                            .resource
                            .as_ref()
                            .and_then(|r| r.get("id"))
                            .and_then(Value::as_str)
                        {
                            ctx.register_target(&plan.resource_type, body_id, target);
                        }
                        if let Some(full_url) = &plan.full_url {
                            ctx.register_full_url(full_url, &plan.resource_type, &id);
                        }
                        decisions.push(Decision::Post { target, id });
                    }
                    Method::Put => {
                        let id = plan
                            .id
                            .clone()
                            .ok_or_else(|| CoreError::fault("PUT entry without an id"))?;
                        let head = snapshot.resource_head(&plan.resource_type, &id).await;
                        let target = match &head {
                            Some(head) => EntityRef::Id(head.entity),
                            None => EntityRef::Temp(ctx.new_tempid()),
                        };
                        ctx.register_target(&plan.resource_type, &id, target);
                        if let Some(full_url) = &plan.full_url {
                            ctx.register_full_url(full_url, &plan.resource_type, &id);
                        }
                        decisions.push(Decision::Put { target, head, id });
                    }
                    Method::Delete | Method::Get => decisions.push(Decision::Other),
                }
            }
        }

        // Conditional creates consult the search oracle against the same
        // snapshot the writes will be guarded on.
        for (plan, decision) in plans.iter().zip(decisions.iter_mut()) {
            if plan.method != Method::Post {
                continue;
            }
            let Some(query) = &plan.if_none_exist else {
                continue;
            };
            let matches = self
                .oracle
                .conditional_matches(snapshot, &plan.resource_type, query)
                .await
                .map_err(CoreError::from)?;
            match matches.total {
                0 => {}
                1 => {
                    let existing = matches
                        .first
                        .ok_or_else(|| CoreError::fault("oracle reported a match it didn't return"))?;
                    // Intra-bundle references to this entry now point at
                    // the existing resource.
                    let target = EntityRef::Id(existing.entity);
                    if let Decision::Post { id, .. } = decision {
                        ctx.register_target(&plan.resource_type, id.as_str(), target);
                    }
                    if let Some(body_id) = plan
                        .resource
                        .as_ref()
                        .and_then(|r| r.get("id"))
                        .and_then(Value::as_str)
                    {
                        ctx.register_target(&plan.resource_type, body_id, target);
                    }
                    if let Some(full_url) = &plan.full_url {
                        ctx.register_full_url(full_url, &existing.resource_type, &existing.id);
                        ctx.register_target(&existing.resource_type, &existing.id, target);
                    }
                    *decision = Decision::Matched(existing);
                }
                _ => {
                    let first = matches
                        .first
                        .ok_or_else(|| CoreError::fault("oracle match missing"))?;
                    let second = matches
                        .second
                        .ok_or_else(|| CoreError::fault("oracle match missing"))?;
                    return Err(CoreError::precondition_failed(format!(
                        "Conditional create of a {} with query \"{}\" failed because at least the two matches \"{}\" and \"{}\" were found.",
                        plan.resource_type,
                        query,
                        first.versioned_url(),
                        second.versioned_url()
                    )));
                }
            }
        }

        // Generate mutations entry by entry.
        let mut actions = Vec::with_capacity(plans.len());
        for (plan, decision) in plans.iter().zip(decisions.into_iter()) {
            match decision {
                Decision::Post { target, id } => {
                    let resource = plan
                        .resource
                        .as_ref()
                        .ok_or_else(|| CoreError::fault("POST entry without a body"))?;
                    if let EntityRef::Temp(tempid) = target {
                        request.declare_resource(tempid, &plan.resource_type, &id);
                    }
                    let mut upserter = Upserter {
                        schemas: &self.schemas,
                        snapshot,
                        ctx: &mut *ctx,
                        request: &mut *request,
                    };
                    let version = upserter
                        .upsert_resource(
                            &plan.resource_type,
                            &id,
                            target,
                            None,
                            resource,
                            CreationMode::ServerAssigned,
                        )
                        .await?;
                    actions.push(EntryAction::Create {
                        resource_type: plan.resource_type.clone(),
                        id,
                        version,
                    });
                }
                Decision::Put { target, head, id } => {
                    if let Some(if_match) = &plan.if_match {
                        let expected = parse_etag(if_match);
                        let actual = head.as_ref().map(|h| version::ordinal(h.version));
                        if expected.is_none() || expected != actual {
                            // The raw header value is quoted into the
                            // diagnostic, so its own quotes get escaped.
                            let quoted = if_match.replace('"', "\\\"");
                            return Err(CoreError::precondition_failed(format!(
                                "Precondition \"{quoted}\" failed on \"{}/{}\".",
                                plan.resource_type, id
                            )));
                        }
                    }
                    let resource = plan
                        .resource
                        .as_ref()
                        .ok_or_else(|| CoreError::fault("PUT entry without a body"))?;
                    if let EntityRef::Temp(tempid) = target {
                        request.declare_resource(tempid, &plan.resource_type, &id);
                    }
                    let created = head.as_ref().is_none_or(ResourceHead::is_deleted);
                    let mut upserter = Upserter {
                        schemas: &self.schemas,
                        snapshot,
                        ctx: &mut *ctx,
                        request: &mut *request,
                    };
                    let version = upserter
                        .upsert_resource(
                            &plan.resource_type,
                            &id,
                            target,
                            head,
                            resource,
                            CreationMode::ClientAssigned,
                        )
                        .await?;
                    actions.push(EntryAction::Update {
                        resource_type: plan.resource_type.clone(),
                        id,
                        version,
                        created,
                    });
                }
                Decision::Matched(existing) => {
                    actions.push(EntryAction::Matched { existing });
                }
                Decision::Other => match plan.method {
                    Method::Delete => {
                        let id = plan
                            .id
                            .clone()
                            .ok_or_else(|| CoreError::fault("DELETE entry without an id"))?;
                        let head = snapshot.resource_head(&plan.resource_type, &id).await;
                        match head {
                            Some(head) if !head.is_deleted() => {
                                let mut upserter = Upserter {
                                    schemas: &self.schemas,
                                    snapshot,
                                    ctx: &mut *ctx,
                                    request: &mut *request,
                                };
                                let version = upserter.delete_resource(&head);
                                actions.push(EntryAction::Delete {
                                    version: Some(version),
                                });
                            }
                            // Deleting what is already gone succeeds.
                            _ => actions.push(EntryAction::Delete { version: None }),
                        }
                    }
                    Method::Get => {
                        actions.push(EntryAction::Read {
                            resource_type: plan.resource_type.clone(),
                            id: plan.id.clone(),
                            vid: plan.vid.clone(),
                            query: plan.query.clone(),
                            url: plan.url.clone(),
                        });
                    }
                    Method::Post | Method::Put => {
                        return Err(CoreError::fault("entry decision out of sync"));
                    }
                },
            }
        }
        Ok(actions)
    }

    async fn assemble(
        &self,
        response_type: &str,
        actions: &[EntryAction],
        write: Option<&WriteResult>,
        prefer: ReturnPreference,
    ) -> Result<Bundle> {
        let post = self.store.snapshot().await;
        let mut entries = Vec::with_capacity(actions.len());
        for action in actions {
            entries.push(
                response::entry_for(
                    action,
                    write,
                    post.as_ref(),
                    &self.base_url,
                    prefer,
                    self.dispatcher.as_deref(),
                )
                .await?,
            );
        }
        Ok(Bundle::response(
            response_type,
            uuid::Uuid::new_v4().to_string(),
            entries,
        ))
    }
}

fn check_duplicates(plans: &[EntryPlan]) -> Result<()> {
    let mut seen = HashSet::new();
    for plan in plans {
        if !matches!(plan.method, Method::Put | Method::Delete) {
            continue;
        }
        let Some(id) = &plan.id else { continue };
        if !seen.insert((plan.resource_type.clone(), id.clone())) {
            return Err(CoreError::incorrect(format!(
                "Duplicate resource \"{}/{}\".",
                plan.resource_type, id
            )));
        }
    }
    Ok(())
}

pub(crate) fn parse_etag(raw: &str) -> Option<i64> {
    raw.strip_prefix("W/\"")?.strip_suffix('"')?.parse().ok()
}

/// Structural validation of one entry, with expressions pointing at the
/// offending input.
pub(crate) fn validate_entry(index: usize, entry: &BundleEntry) -> Result<EntryPlan> {
    let expr = format!("Bundle.entry[{index}]");
    let Some(request) = &entry.request else {
        return Err(CoreError::required("Missing request.", expr));
    };
    let Some(url) = request.url.as_deref().filter(|u| !u.is_empty()) else {
        return Err(CoreError::required(
            "Missing request URL.",
            format!("{expr}.request"),
        ));
    };
    let Some(method_raw) = request.method.as_deref().filter(|m| !m.is_empty()) else {
        return Err(CoreError::required(
            "Missing request method.",
            format!("{expr}.request"),
        ));
    };

    let method = match method_raw {
        "GET" => Method::Get,
        "POST" => Method::Post,
        "PUT" => Method::Put,
        "DELETE" => Method::Delete,
        "HEAD" | "PATCH" => {
            return Err(CoreError::not_supported(format!(
                "Unsupported method \"{method_raw}\"."
            ))
            .with_expression(format!("{expr}.request.method")));
        }
        other => {
            return Err(CoreError::incorrect_value(
                format!("Unknown method \"{other}\"."),
                format!("{expr}.request.method"),
            ));
        }
    };

    let trimmed = url.trim_start_matches('/');
    let (path, query) = match trimmed.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (trimmed, None),
    };
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let url_expr = format!("{expr}.request.url");
    let (resource_type, id, vid) = match segments.as_slice() {
        [resource_type] => (*resource_type, None, None),
        [resource_type, id] => (*resource_type, Some(*id), None),
        [resource_type, id, "_history", vid] => (*resource_type, Some(*id), Some(*vid)),
        _ => {
            return Err(CoreError::incorrect_value(
                format!("Invalid request URL \"{url}\"."),
                url_expr,
            ));
        }
    };
    if !is_valid_resource_type_name(resource_type) {
        return Err(CoreError::incorrect_value(
            format!("Invalid resource type \"{resource_type}\"."),
            url_expr,
        ));
    }
    if let Some(id) = id
        && !is_valid_id(id)
    {
        return Err(CoreError::coded(
            format!("Resource id \"{id}\" is invalid."),
            "MSG_ID_INVALID",
        )
        .with_expression(url_expr.clone()));
    }
    if vid.is_some() && method != Method::Get {
        return Err(CoreError::incorrect_value(
            format!("Invalid request URL \"{url}\"."),
            url_expr,
        ));
    }

    let resource = match &entry.resource {
        Some(Value::Object(map)) => Some(map.clone()),
        Some(_) => {
            return Err(CoreError::incorrect("Resource is not a JSON object.")
                .with_expression(format!("{expr}.resource")));
        }
        None => None,
    };

    match method {
        Method::Put => {
            let Some(id) = id else {
                if query.is_some() {
                    return Err(CoreError::not_supported(
                        "Conditional update is not supported.",
                    )
                    .with_expression(url_expr));
                }
                return Err(CoreError::required("Missing resource id in URL.", url_expr));
            };
            let Some(resource) = &resource else {
                return Err(CoreError::required(
                    "Missing resource body.",
                    format!("{expr}.resource"),
                ));
            };
            let body_type = resource
                .get("resourceType")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if body_type != resource_type {
                return Err(CoreError::coded(
                    format!(
                        "Resource type \"{body_type}\" doesn't match the resource type \"{resource_type}\" in the URL."
                    ),
                    "MSG_RESOURCE_TYPE_MISMATCH",
                )
                .with_expression(format!("{expr}.resource.resourceType")));
            }
            let Some(body_id) = resource.get("id").and_then(Value::as_str) else {
                return Err(CoreError::coded(
                    "Resource id is missing.",
                    "MSG_RESOURCE_ID_MISSING",
                )
                .with_expression(format!("{expr}.resource.id")));
            };
            if !is_valid_id(body_id) {
                return Err(CoreError::coded(
                    format!("Resource id \"{body_id}\" is invalid."),
                    "MSG_ID_INVALID",
                )
                .with_expression(format!("{expr}.resource.id")));
            }
            if body_id != id {
                return Err(CoreError::coded(
                    format!("Resource id \"{body_id}\" doesn't match the id \"{id}\" in the URL."),
                    "MSG_RESOURCE_ID_MISMATCH",
                )
                .with_expression(format!("{expr}.resource.id")));
            }
        }
        Method::Post => {
            if let Some(id) = id {
                return Err(CoreError::method_not_allowed(format!(
                    "Method POST not allowed on \"{resource_type}/{id}\"."
                ))
                .with_expression(url_expr));
            }
            let Some(resource) = &resource else {
                return Err(CoreError::required(
                    "Missing resource body.",
                    format!("{expr}.resource"),
                ));
            };
            let body_type = resource
                .get("resourceType")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if body_type != resource_type {
                return Err(CoreError::coded(
                    format!(
                        "Resource type \"{body_type}\" doesn't match the resource type \"{resource_type}\" in the URL."
                    ),
                    "MSG_RESOURCE_TYPE_MISMATCH",
                )
                .with_expression(format!("{expr}.resource.resourceType")));
            }
        }
        Method::Delete => {
            if id.is_none() {
                return Err(CoreError::required("Missing resource id in URL.", url_expr));
            }
        }
        Method::Get => {}
    }

    Ok(EntryPlan {
        method,
        resource_type: resource_type.to_string(),
        id: id.map(String::from),
        vid: vid.map(String::from),
        query,
        url: url.to_string(),
        resource,
        if_match: request.if_match.clone(),
        if_none_exist: request.if_none_exist.clone(),
        full_url: entry.full_url.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironfhir_api::BundleEntryRequest;
    use serde_json::json;

    fn entry(method: &str, url: &str, resource: Option<Value>) -> BundleEntry {
        BundleEntry {
            full_url: None,
            resource,
            request: Some(BundleEntryRequest {
                method: Some(method.to_string()),
                url: Some(url.to_string()),
                if_match: None,
                if_none_exist: None,
            }),
            response: None,
        }
    }

    #[test]
    fn etag_parsing() {
        assert_eq!(parse_etag("W/\"1\""), Some(1));
        assert_eq!(parse_etag("W/\"213\""), Some(213));
        assert_eq!(parse_etag("\"1\""), None);
        assert_eq!(parse_etag("W/\"x\""), None);
    }

    #[test]
    fn entry_without_request_is_rejected() {
        let err = validate_entry(0, &BundleEntry::default()).unwrap_err();
        assert_eq!(err.to_string(), "Missing request.");
        assert_eq!(err.expressions(), ["Bundle.entry[0]"]);
    }

    #[test]
    fn unknown_and_unsupported_methods() {
        let err = validate_entry(0, &entry("FOO", "Patient/0", None)).unwrap_err();
        assert_eq!(err.to_string(), "Unknown method \"FOO\".");
        assert!(matches!(err, CoreError::Incorrect { .. }));

        let err = validate_entry(1, &entry("PATCH", "Patient/0", None)).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported method \"PATCH\".");
        assert!(matches!(err, CoreError::NotSupported { .. }));
        assert_eq!(err.expressions(), ["Bundle.entry[1].request.method"]);
    }

    #[test]
    fn put_body_checks() {
        let err = validate_entry(
            0,
            &entry(
                "PUT",
                "Patient/0",
                Some(json!({"resourceType": "Observation", "id": "0"})),
            ),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Resource type \"Observation\" doesn't match the resource type \"Patient\" in the URL."
        );

        let err = validate_entry(
            0,
            &entry("PUT", "Patient/0", Some(json!({"resourceType": "Patient"}))),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Resource id is missing.");

        let err = validate_entry(
            0,
            &entry(
                "PUT",
                "Patient/0",
                Some(json!({"resourceType": "Patient", "id": "1"})),
            ),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Resource id \"1\" doesn't match the id \"0\" in the URL."
        );
    }

    #[test]
    fn post_with_id_is_not_allowed() {
        let err = validate_entry(
            0,
            &entry(
                "POST",
                "Patient/0",
                Some(json!({"resourceType": "Patient"})),
            ),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::NotSupported {
                kind: ironfhir_core::NotSupportedKind::MethodNotAllowed,
                ..
            }
        ));
    }

    #[test]
    fn urls_parse_into_segments() {
        let plan = validate_entry(0, &entry("GET", "Patient?birthdate=2020", None)).unwrap();
        assert_eq!(plan.resource_type, "Patient");
        assert_eq!(plan.id, None);
        assert_eq!(plan.query.as_deref(), Some("birthdate=2020"));

        let plan = validate_entry(0, &entry("GET", "/Patient/0/_history/2", None)).unwrap();
        assert_eq!(plan.id.as_deref(), Some("0"));

        let err = validate_entry(0, &entry("GET", "Patient/0/extra/bits/x", None)).unwrap_err();
        assert!(err.to_string().starts_with("Invalid request URL"));
    }

    #[test]
    fn duplicate_write_targets_are_rejected() {
        let a = validate_entry(
            0,
            &entry(
                "PUT",
                "Patient/0",
                Some(json!({"resourceType": "Patient", "id": "0"})),
            ),
        )
        .unwrap();
        let b = a.clone();
        let err = check_duplicates(&[a, b]).unwrap_err();
        assert_eq!(err.to_string(), "Duplicate resource \"Patient/0\".");
    }
}
