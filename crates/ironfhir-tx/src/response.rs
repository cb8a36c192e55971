//! Builds per-entry responses for batch/transaction bundles.

use serde_json::Value;

use ironfhir_api::{ApiError, BundleEntry, BundleEntryResponse, OperationOutcome, ReturnPreference};
use ironfhir_core::{CoreError, Result, version};
use ironfhir_storage::{Snapshot, WriteResult};

use crate::processor::{EntryAction, ReadDispatcher};

/// Builds the response entry for one planned action. Used after commit for
/// transactions and per entry for batches; errors bubble up to the caller,
/// which decides whether they abort the bundle.
pub(crate) async fn entry_for(
    action: &EntryAction,
    write: Option<&WriteResult>,
    post: &dyn Snapshot,
    base_url: &str,
    prefer: ReturnPreference,
    dispatcher: Option<&dyn ReadDispatcher>,
) -> Result<BundleEntry> {
    match action {
        EntryAction::Create {
            resource_type,
            id,
            version,
        } => write_entry(resource_type, id, *version, "201", write, post, base_url, prefer).await,
        EntryAction::Update {
            resource_type,
            id,
            version,
            created,
        } => {
            let status = if *created { "201" } else { "200" };
            write_entry(resource_type, id, *version, status, write, post, base_url, prefer).await
        }
        EntryAction::Delete { version } => {
            let mut response = BundleEntryResponse {
                status: "204".to_string(),
                ..Default::default()
            };
            if let Some(version) = version {
                response.etag = Some(version::etag(*version));
                response.last_modified = write.map(|w| w.instant.to_string());
            }
            Ok(BundleEntry {
                response: Some(response),
                ..Default::default()
            })
        }
        EntryAction::Matched { existing } => {
            let resource = match prefer {
                ReturnPreference::Representation => existing.content.clone(),
                ReturnPreference::Minimal => None,
            };
            Ok(BundleEntry {
                resource,
                response: Some(BundleEntryResponse {
                    status: "200".to_string(),
                    etag: Some(existing.etag()),
                    last_modified: Some(existing.last_updated.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            })
        }
        EntryAction::Read {
            resource_type,
            id,
            vid,
            query,
            url,
        } => read_entry(resource_type, id.as_deref(), vid.as_deref(), query.as_deref(), url, post, dispatcher).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn write_entry(
    resource_type: &str,
    id: &str,
    version: i64,
    status: &str,
    write: Option<&WriteResult>,
    post: &dyn Snapshot,
    base_url: &str,
    prefer: ReturnPreference,
) -> Result<BundleEntry> {
    let ordinal = version::ordinal(version);
    let resource = match prefer {
        ReturnPreference::Representation => post
            .resource(resource_type, id)
            .await
            .map_err(CoreError::from)?
            .and_then(|r| r.content),
        ReturnPreference::Minimal => None,
    };
    Ok(BundleEntry {
        resource,
        response: Some(BundleEntryResponse {
            status: status.to_string(),
            location: Some(format!(
                "{base_url}/{resource_type}/{id}/_history/{ordinal}"
            )),
            etag: Some(version::etag(version)),
            last_modified: write.map(|w| w.instant.to_string()),
            outcome: None,
        }),
        ..Default::default()
    })
}

async fn read_entry(
    resource_type: &str,
    id: Option<&str>,
    vid: Option<&str>,
    query: Option<&str>,
    url: &str,
    post: &dyn Snapshot,
    dispatcher: Option<&dyn ReadDispatcher>,
) -> Result<BundleEntry> {
    // Searches and version reads need the outer read handlers.
    if query.is_some() || vid.is_some() || id.is_none() {
        let Some(dispatcher) = dispatcher else {
            return Err(CoreError::not_supported(format!(
                "GET \"{url}\" is not supported inside bundles."
            )));
        };
        let (status, body) = dispatcher.dispatch(url).await?;
        return Ok(BundleEntry {
            resource: body,
            response: Some(BundleEntryResponse {
                status,
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    let id = id.unwrap_or_default();
    let resource = post
        .resource(resource_type, id)
        .await
        .map_err(CoreError::from)?;
    match resource {
        Some(found) if !found.is_deleted() => Ok(BundleEntry {
            resource: found.content.clone(),
            response: Some(BundleEntryResponse {
                status: "200".to_string(),
                etag: Some(found.etag()),
                last_modified: Some(found.last_updated.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        Some(_) => Err(CoreError::not_found(format!(
            "Resource \"{resource_type}/{id}\" was deleted."
        ))),
        None => Err(CoreError::not_found(format!(
            "Resource \"{resource_type}/{id}\" not found."
        ))),
    }
}

/// A failed batch entry: its status plus an OperationOutcome payload.
pub(crate) fn error_entry(err: &CoreError) -> BundleEntry {
    let status = ApiError::from(err.clone())
        .status_code()
        .as_u16()
        .to_string();
    let outcome = serde_json::to_value(OperationOutcome::from_error(err))
        .unwrap_or_else(|_| Value::Object(Default::default()));
    BundleEntry {
        response: Some(BundleEntryResponse {
            status,
            outcome: Some(outcome),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_entries_carry_status_and_outcome() {
        let err = CoreError::precondition_failed(
            "Precondition \"W/\\\"1\\\"\" failed on \"Patient/0\".",
        );
        let entry = error_entry(&err);
        let response = entry.response.unwrap();
        assert_eq!(response.status, "412");
        let outcome = response.outcome.unwrap();
        assert_eq!(outcome["resourceType"], "OperationOutcome");
        assert_eq!(outcome["issue"][0]["code"], "conflict");
    }

    #[test]
    fn not_found_errors_map_to_404_entries() {
        let entry = error_entry(&CoreError::not_found("Resource \"Patient/9\" not found."));
        assert_eq!(entry.response.unwrap().status, "404");
    }
}
