//! FHIR API surface types shared by the processor and the HTTP layer:
//! bundle shapes for batch/transaction processing, OperationOutcome, and
//! the mapping from core error kinds onto HTTP responses.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use ironfhir_core::{ConflictCause, CoreError, NotSupportedKind};

/// Minimal FHIR OperationOutcome representation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationOutcome {
    #[serde(rename = "resourceType")]
    pub resource_type: &'static str, // always "OperationOutcome"
    pub issue: Vec<OperationOutcomeIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationOutcomeIssue {
    /// FHIR issue severity: fatal | error | warning | information
    pub severity: &'static str,
    /// FHIR issue type code: invalid | value | required | invariant |
    /// conflict | not-supported | processing | not-found
    pub code: String,
    /// Message-code details (e.g. MSG_RESOURCE_ID_MISSING).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<IssueDetails>,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
    /// FHIRPath expressions locating the offending input.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub expression: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueDetails {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub coding: Vec<IssueCoding>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssueCoding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub code: String,
}

impl OperationOutcome {
    pub fn single(
        severity: &'static str,
        code: impl Into<String>,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: "OperationOutcome",
            issue: vec![OperationOutcomeIssue {
                severity,
                code: code.into(),
                details: None,
                diagnostics: Some(diagnostics.into()),
                expression: Vec::new(),
            }],
        }
    }

    /// Builds the outcome for a core error, carrying issue code, optional
    /// message-code details, and input expressions.
    pub fn from_error(err: &CoreError) -> Self {
        let mut issue = OperationOutcomeIssue {
            severity: if err.is_client_error() {
                "error"
            } else {
                "fatal"
            },
            code: err.issue_code().as_str().to_string(),
            details: None,
            diagnostics: Some(err.to_string()),
            expression: err.expressions().to_vec(),
        };
        if let CoreError::Incorrect {
            detail_code: Some(code),
            ..
        } = err
        {
            issue.details = Some(IssueDetails {
                coding: vec![IssueCoding {
                    system: Some("http://terminology.hl7.org/CodeSystem/operation-outcome".into()),
                    code: (*code).to_string(),
                }],
            });
        }
        Self {
            resource_type: "OperationOutcome",
            issue: vec![issue],
        }
    }

    pub fn has_issues(&self) -> bool {
        !self.issue.is_empty()
    }
}

/// High-level API error mapped to an HTTP response with an
/// OperationOutcome body.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct ApiError {
    #[source]
    pub source: CoreError,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.source {
            CoreError::Incorrect { .. } => StatusCode::BAD_REQUEST,
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::Conflict { cause, .. } => match cause {
                ConflictCause::Precondition => StatusCode::PRECONDITION_FAILED,
                ConflictCause::Referential => StatusCode::CONFLICT,
            },
            CoreError::NotSupported { kind, .. } => match kind {
                NotSupportedKind::Feature => StatusCode::UNPROCESSABLE_ENTITY,
                NotSupportedKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            },
            CoreError::Busy { .. } => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Fault { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn to_operation_outcome(&self) -> OperationOutcome {
        OperationOutcome::from_error(&self.source)
    }
}

impl From<CoreError> for ApiError {
    fn from(source: CoreError) -> Self {
        Self { source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let outcome = self.to_operation_outcome();
        let body = serde_json::to_vec(&outcome).unwrap_or_else(|_| {
            let fallback = OperationOutcome::single("fatal", "processing", "Serialization failure");
            serde_json::to_vec(&fallback).unwrap_or_else(|_| b"{}".to_vec())
        });

        let mut builder = axum::http::Response::builder().status(status);
        builder = builder.header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/fhir+json"),
        );
        builder
            .body(axum::body::Body::from(body))
            .unwrap_or_else(|_| {
                axum::http::Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .body(axum::body::Body::from("{}"))
                    .expect("build fallback response")
            })
    }
}

// -------------------------
// FHIR Bundle types
// -------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Bundle {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub bundle_type: String,
    /// Always serialized, so an empty transaction yields `"entry": []`.
    #[serde(default)]
    pub entry: Vec<BundleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BundleEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "fullUrl")]
    pub full_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<BundleEntryRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<BundleEntryResponse>,
}

/// Request component of a batch/transaction entry. Method and URL stay
/// optional at the serde layer so their absence surfaces as a coded
/// validation error instead of a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BundleEntryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "ifMatch")]
    pub if_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "ifNoneExist")]
    pub if_none_exist: Option<String>,
}

/// Response component of a batch/transaction entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BundleEntryResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "lastModified")]
    pub last_modified: Option<String>,
    /// OperationOutcome for failed batch entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Value>,
}

impl Bundle {
    pub fn response(bundle_type: impl Into<String>, id: String, entries: Vec<BundleEntry>) -> Self {
        Self {
            resource_type: "Bundle".to_string(),
            id: Some(id),
            bundle_type: bundle_type.into(),
            entry: entries,
        }
    }
}

/// `Prefer: return=...` handling on write interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnPreference {
    #[default]
    Minimal,
    Representation,
}

impl ReturnPreference {
    /// Parses a `Prefer` header value; unknown values fall back to minimal.
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.split(',').any(|p| p.trim() == "return=representation") => {
                Self::Representation
            }
            _ => Self::Minimal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironfhir_core::CoreError;

    #[test]
    fn status_codes_follow_error_kinds() {
        let cases: Vec<(CoreError, StatusCode)> = vec![
            (CoreError::incorrect("x"), StatusCode::BAD_REQUEST),
            (CoreError::not_found("x"), StatusCode::NOT_FOUND),
            (
                CoreError::precondition_failed("x"),
                StatusCode::PRECONDITION_FAILED,
            ),
            (CoreError::referential("x"), StatusCode::CONFLICT),
            (
                CoreError::not_supported("x"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                CoreError::method_not_allowed("x"),
                StatusCode::METHOD_NOT_ALLOWED,
            ),
            (CoreError::busy("x"), StatusCode::SERVICE_UNAVAILABLE),
            (CoreError::fault("x"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn outcome_carries_code_and_diagnostics() {
        let err = ApiError::from(CoreError::referential(
            "Referential integrity violated. Resource \"Patient/0\" doesn't exist.",
        ));
        let outcome = err.to_operation_outcome();
        assert_eq!(outcome.resource_type, "OperationOutcome");
        assert_eq!(outcome.issue[0].code, "conflict");
        assert_eq!(
            outcome.issue[0].diagnostics.as_deref(),
            Some("Referential integrity violated. Resource \"Patient/0\" doesn't exist.")
        );
    }

    #[test]
    fn outcome_carries_detail_codes_and_expressions() {
        let err = CoreError::coded("Resource id is missing.", "MSG_RESOURCE_ID_MISSING")
            .with_expression("Bundle.entry[0].resource.id");
        let outcome = OperationOutcome::from_error(&err);
        let issue = &outcome.issue[0];
        assert_eq!(
            issue.details.as_ref().unwrap().coding[0].code,
            "MSG_RESOURCE_ID_MISSING"
        );
        assert_eq!(issue.expression, ["Bundle.entry[0].resource.id"]);
    }

    #[test]
    fn into_response_sets_status_and_content_type() {
        let resp = ApiError::from(CoreError::incorrect("bad")).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            &HeaderValue::from_static("application/fhir+json")
        );
    }

    #[test]
    fn bundle_serialization_shape() {
        let bundle = Bundle::response(
            "transaction-response",
            "b-1".to_string(),
            vec![BundleEntry {
                full_url: None,
                resource: None,
                request: None,
                response: Some(BundleEntryResponse {
                    status: "201".into(),
                    location: Some("Patient/0/_history/1".into()),
                    etag: Some("W/\"1\"".into()),
                    last_modified: Some("2023-01-15T10:30:00Z".into()),
                    outcome: None,
                }),
            }],
        );
        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["resourceType"], "Bundle");
        assert_eq!(json["type"], "transaction-response");
        assert_eq!(json["entry"][0]["response"]["status"], "201");
        assert!(json["entry"][0].get("resource").is_none());
    }

    #[test]
    fn request_entries_deserialize_condition_fields() {
        let entry: BundleEntry = serde_json::from_value(serde_json::json!({
            "request": {
                "method": "POST",
                "url": "Patient",
                "ifNoneExist": "identifier=095156"
            }
        }))
        .unwrap();
        let request = entry.request.unwrap();
        assert_eq!(request.method.as_deref(), Some("POST"));
        assert_eq!(request.if_none_exist.as_deref(), Some("identifier=095156"));
    }

    #[test]
    fn prefer_header_parsing() {
        assert_eq!(
            ReturnPreference::from_header(Some("return=representation")),
            ReturnPreference::Representation
        );
        assert_eq!(
            ReturnPreference::from_header(Some("return=minimal")),
            ReturnPreference::Minimal
        );
        assert_eq!(
            ReturnPreference::from_header(Some("respond-async, return=representation")),
            ReturnPreference::Representation
        );
        assert_eq!(ReturnPreference::from_header(None), ReturnPreference::Minimal);
    }

    #[test]
    fn empty_bundle_round_trips() {
        let bundle: Bundle = serde_json::from_value(serde_json::json!({
            "resourceType": "Bundle",
            "type": "transaction"
        }))
        .unwrap();
        assert!(bundle.entry.is_empty());
        let json = serde_json::to_value(&bundle).unwrap();
        assert_eq!(json["entry"], serde_json::json!([]));
    }
}
