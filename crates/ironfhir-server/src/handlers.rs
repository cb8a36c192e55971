//! HTTP handlers over the bundle processor and the store.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::Instrument;

use ironfhir_api::{ApiError, Bundle, BundleEntry, BundleEntryRequest, BundleEntryResponse, ReturnPreference};
use ironfhir_core::{CoreError, FhirInstant};
use ironfhir_storage::{ResourceStore, ResourceVersion};

use crate::server::AppState;

const FHIR_JSON: &str = "application/fhir+json";

fn fhir_content_type() -> (header::HeaderName, HeaderValue) {
    (header::CONTENT_TYPE, HeaderValue::from_static(FHIR_JSON))
}

fn last_modified_value(instant: &FhirInstant) -> Option<HeaderValue> {
    let timestamp = u64::try_from(instant.timestamp()).ok()?;
    let time = std::time::UNIX_EPOCH + std::time::Duration::from_secs(timestamp);
    HeaderValue::from_str(&httpdate::fmt_http_date(time)).ok()
}

fn prefer(headers: &HeaderMap) -> ReturnPreference {
    ReturnPreference::from_header(headers.get("Prefer").and_then(|v| v.to_str().ok()))
}

/// `POST /` — batch/transaction endpoint.
pub async fn process_bundle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let span = tracing::info_span!("fhir.bundle");
    async move {
        let response = state.processor.process(&body, prefer(&headers)).await?;
        let mut response_headers = HeaderMap::new();
        let (name, value) = fhir_content_type();
        response_headers.insert(name, value);
        Ok((StatusCode::OK, response_headers, Json(response)))
    }
    .instrument(span)
    .await
}

fn version_headers(version: &ResourceVersion) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let (name, value) = fhir_content_type();
    headers.insert(name, value);
    if let Ok(value) = HeaderValue::from_str(&version.etag()) {
        headers.insert(header::ETAG, value);
    }
    if let Some(value) = last_modified_value(&version.last_updated) {
        headers.insert(header::LAST_MODIFIED, value);
    }
    headers
}

/// `GET /{type}/{id}` — current version.
pub async fn read_resource(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let snapshot = state.store.snapshot().await;
    let found = snapshot
        .resource(&resource_type, &id)
        .await
        .map_err(CoreError::from)?;
    match found {
        Some(version) => match &version.content {
            Some(content) => {
                let headers = version_headers(&version);
                Ok((StatusCode::OK, headers, Json(content.clone())).into_response())
            }
            None => Err(CoreError::not_found(format!(
                "Resource \"{resource_type}/{id}\" was deleted."
            ))
            .into()),
        },
        None => Err(CoreError::not_found(format!(
            "Resource \"{resource_type}/{id}\" not found."
        ))
        .into()),
    }
}

/// `PUT /{type}/{id}` — update through a one-entry transaction, so the
/// HTTP surface and the bundle surface share one write path.
pub async fn update_resource(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Result<Response, ApiError> {
    let span = tracing::info_span!("fhir.update", resource_type = %resource_type, id = %id);
    async move {
        let if_match = headers
            .get(header::IF_MATCH)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bundle = json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [{
                "resource": payload,
                "request": {
                    "method": "PUT",
                    "url": format!("{resource_type}/{id}"),
                    "ifMatch": if_match
                }
            }]
        });
        let response = state.processor.process(&bundle, prefer(&headers)).await?;
        entry_response(response.entry.into_iter().next())
    }
    .instrument(span)
    .await
}

/// `DELETE /{type}/{id}`.
pub async fn delete_resource(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let span = tracing::info_span!("fhir.delete", resource_type = %resource_type, id = %id);
    async move {
        let bundle = json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [{
                "request": {"method": "DELETE", "url": format!("{resource_type}/{id}")}
            }]
        });
        let response = state.processor.process(&bundle, ReturnPreference::Minimal).await?;
        entry_response(response.entry.into_iter().next())
    }
    .instrument(span)
    .await
}

/// Translates a bundle response entry into a standalone HTTP response.
fn entry_response(entry: Option<BundleEntry>) -> Result<Response, ApiError> {
    let Some(entry) = entry else {
        return Err(CoreError::fault("empty response bundle").into());
    };
    let Some(outcome) = entry.response else {
        return Err(CoreError::fault("response entry without a response").into());
    };
    let status = outcome
        .status
        .parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK);

    let mut headers = HeaderMap::new();
    let (name, value) = fhir_content_type();
    headers.insert(name, value);
    if let Some(etag) = &outcome.etag
        && let Ok(value) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, value);
    }
    if let Some(location) = &outcome.location
        && let Ok(value) = HeaderValue::from_str(location)
    {
        headers.insert(header::LOCATION, value);
    }
    match entry.resource {
        Some(resource) => Ok((status, headers, Json(resource)).into_response()),
        None => Ok((status, headers).into_response()),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct HistoryParams {
    #[serde(rename = "_since")]
    pub since: Option<String>,
    #[serde(rename = "_count")]
    pub count: Option<usize>,
}

/// `GET /{type}/{id}/_history` — instance history, newest first.
pub async fn resource_history(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let since = match &params.since {
        Some(raw) => Some(raw.parse::<FhirInstant>().map_err(ApiError::from)?),
        None => None,
    };
    let versions = state
        .store
        .history(&resource_type, &id, None)
        .await
        .map_err(CoreError::from)?;

    let entries: Vec<BundleEntry> = versions
        .into_iter()
        .filter(|v| since.is_none_or(|s| v.last_updated > s))
        .take(params.count.unwrap_or(usize::MAX))
        .map(|version| history_entry(&state.base_url, version))
        .collect();

    let bundle = Bundle {
        resource_type: "Bundle".to_string(),
        id: None,
        bundle_type: "history".to_string(),
        entry: entries,
    };
    let mut headers = HeaderMap::new();
    let (name, value) = fhir_content_type();
    headers.insert(name, value);
    Ok((StatusCode::OK, headers, Json(bundle)))
}

fn history_entry(base_url: &str, version: ResourceVersion) -> BundleEntry {
    let method = if version.is_deleted() { "DELETE" } else { "PUT" };
    let status = if version.is_deleted() { "204" } else { "200" };
    BundleEntry {
        full_url: Some(format!(
            "{base_url}/{}/{}",
            version.resource_type, version.id
        )),
        request: Some(BundleEntryRequest {
            method: Some(method.to_string()),
            url: Some(format!("{}/{}", version.resource_type, version.id)),
            if_match: None,
            if_none_exist: None,
        }),
        response: Some(BundleEntryResponse {
            status: status.to_string(),
            etag: Some(version.etag()),
            last_modified: Some(version.last_updated.to_string()),
            ..Default::default()
        }),
        resource: version.content,
    }
}

/// `GET /{type}/{id}/_history/{vid}` — version read.
pub async fn read_version(
    State(state): State<AppState>,
    Path((resource_type, id, vid)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let wanted: i64 = vid
        .parse()
        .map_err(|_| CoreError::incorrect(format!("Invalid version id \"{vid}\".")))?;
    let versions = state
        .store
        .history(&resource_type, &id, None)
        .await
        .map_err(CoreError::from)?;
    let found = versions.into_iter().find(|v| v.ordinal() == wanted);
    match found {
        Some(version) => match &version.content {
            Some(content) => {
                let headers = version_headers(&version);
                Ok((StatusCode::OK, headers, Json(content.clone())).into_response())
            }
            None => Err(CoreError::not_found(format!(
                "Version {wanted} of \"{resource_type}/{id}\" is a deletion."
            ))
            .into()),
        },
        None => Err(CoreError::not_found(format!(
            "Version {wanted} of \"{resource_type}/{id}\" not found."
        ))
        .into()),
    }
}

/// `GET /health` — store statistics.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.store.stats().await;
    Json(json!({
        "status": "up",
        "resources": stats.resources,
        "lastTransaction": stats.last_t
    }))
}
