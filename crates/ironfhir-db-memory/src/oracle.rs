//! A naive search oracle over the in-memory store.
//!
//! Conditional create only needs a match count and the first two matches,
//! so this walks every resource of the type and applies simple parameter
//! matching: `_id`, `identifier` (with optional `system|value` form), and
//! plain field equality with prefix matching for date-valued fields.
//! A real deployment injects the full search engine here instead.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use ironfhir_core::version;
use ironfhir_storage::{ConditionalMatches, SearchOracle, Snapshot, StorageError};

use crate::materialize;
use crate::store::{MemoryStore, StoreInner};

pub struct NaiveSearchOracle {
    inner: Arc<RwLock<StoreInner>>,
}

impl NaiveSearchOracle {
    pub fn new(store: &MemoryStore) -> Self {
        Self {
            inner: store.inner(),
        }
    }
}

#[async_trait]
impl SearchOracle for NaiveSearchOracle {
    async fn conditional_matches(
        &self,
        snapshot: &dyn Snapshot,
        resource_type: &str,
        query: &str,
    ) -> Result<ConditionalMatches, StorageError> {
        let clauses = parse_query(query)?;
        let basis_t = snapshot.basis_t();
        let inner = self.inner.read().await;

        let mut entities: Vec<_> = inner
            .idents
            .iter()
            .filter(|((candidate_type, _), _)| candidate_type == resource_type)
            .map(|(_, entity)| *entity)
            .collect();
        // Entity ids are allocated in creation order; keep matches stable.
        entities.sort_unstable();

        let mut matches = ConditionalMatches::none();
        for entity in entities {
            let Some(state) = inner.state_at(entity, basis_t) else {
                continue;
            };
            if state.version.is_none_or(version::is_deleted) {
                continue;
            }
            let Some(resource) = materialize::resource_at(&inner, entity, basis_t) else {
                continue;
            };
            let Some(content) = &resource.content else {
                continue;
            };
            if clauses.iter().all(|(param, value)| {
                matches_param(content, param, value)
            }) {
                matches.total += 1;
                if matches.first.is_none() {
                    matches.first = Some(resource);
                } else if matches.second.is_none() {
                    matches.second = Some(resource);
                }
            }
        }
        Ok(matches)
    }
}

fn parse_query(query: &str) -> Result<Vec<(String, String)>, StorageError> {
    let mut clauses = Vec::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let Some((param, value)) = pair.split_once('=') else {
            return Err(StorageError::fault(format!(
                "malformed query clause {pair:?}"
            )));
        };
        clauses.push((param.to_string(), value.to_string()));
    }
    Ok(clauses)
}

fn matches_param(content: &Value, param: &str, value: &str) -> bool {
    match param {
        "_id" => content.get("id").and_then(Value::as_str) == Some(value),
        "identifier" => matches_identifier(content, value),
        _ => {
            let Some(field) = find_field(content, param) else {
                return false;
            };
            let date_like = param.to_ascii_lowercase().contains("date");
            matches_value(field, value, date_like)
        }
    }
}

/// Search parameter names are lowercase; element names are camelCase
/// (`birthdate` -> `birthDate`).
fn find_field<'a>(content: &'a Value, param: &str) -> Option<&'a Value> {
    let object = content.as_object()?;
    if let Some(field) = object.get(param) {
        return Some(field);
    }
    object
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(param))
        .map(|(_, field)| field)
}

fn matches_value(field: &Value, value: &str, prefix: bool) -> bool {
    match field {
        Value::String(s) => {
            if prefix {
                s.starts_with(value)
            } else {
                s == value
            }
        }
        Value::Number(n) => n.to_string() == value,
        Value::Bool(b) => b.to_string() == value,
        Value::Array(items) => items.iter().any(|item| matches_value(item, value, prefix)),
        Value::Object(object) => object
            .get("value")
            .is_some_and(|v| matches_value(v, value, prefix)),
        Value::Null => false,
    }
}

fn matches_identifier(content: &Value, value: &str) -> bool {
    let Some(identifiers) = content.get("identifier").and_then(Value::as_array) else {
        return false;
    };
    let (system, wanted) = match value.split_once('|') {
        Some((system, wanted)) => (Some(system), wanted),
        None => (None, value),
    };
    identifiers.iter().any(|identifier| {
        let value_matches =
            identifier.get("value").and_then(Value::as_str) == Some(wanted);
        let system_matches = match system {
            Some(system) => identifier.get("system").and_then(Value::as_str) == Some(system),
            None => true,
        };
        value_matches && system_matches
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_parsing() {
        assert_eq!(
            parse_query("identifier=095156").unwrap(),
            vec![("identifier".to_string(), "095156".to_string())]
        );
        assert_eq!(parse_query("a=1&b=2").unwrap().len(), 2);
        assert!(parse_query("nonsense").is_err());
    }

    #[test]
    fn identifier_matching() {
        let patient = json!({
            "resourceType": "Patient",
            "identifier": [
                {"system": "http://acme.org/mrn", "value": "095156"}
            ]
        });
        assert!(matches_param(&patient, "identifier", "095156"));
        assert!(matches_param(
            &patient,
            "identifier",
            "http://acme.org/mrn|095156"
        ));
        assert!(!matches_param(&patient, "identifier", "150015"));
        assert!(!matches_param(
            &patient,
            "identifier",
            "http://other.org|095156"
        ));
    }

    #[test]
    fn date_params_match_by_prefix() {
        let patient = json!({"resourceType": "Patient", "birthDate": "2020-05-12"});
        assert!(matches_param(&patient, "birthdate", "2020"));
        assert!(matches_param(&patient, "birthdate", "2020-05"));
        assert!(!matches_param(&patient, "birthdate", "2021"));
    }

    #[test]
    fn plain_fields_match_exactly() {
        let patient = json!({"resourceType": "Patient", "gender": "female"});
        assert!(matches_param(&patient, "gender", "female"));
        assert!(!matches_param(&patient, "gender", "fem"));
    }
}
