use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Common FHIR resource types, with an open-world fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Patient,
    Practitioner,
    Organization,
    Encounter,
    Observation,
    Condition,
    DiagnosticReport,
    Medication,
    MedicationRequest,
    Procedure,
    Specimen,
    Bundle,
    ValueSet,
    CodeSystem,
    OperationOutcome,
    #[serde(untagged)]
    Custom(String),
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Patient => write!(f, "Patient"),
            ResourceType::Practitioner => write!(f, "Practitioner"),
            ResourceType::Organization => write!(f, "Organization"),
            ResourceType::Encounter => write!(f, "Encounter"),
            ResourceType::Observation => write!(f, "Observation"),
            ResourceType::Condition => write!(f, "Condition"),
            ResourceType::DiagnosticReport => write!(f, "DiagnosticReport"),
            ResourceType::Medication => write!(f, "Medication"),
            ResourceType::MedicationRequest => write!(f, "MedicationRequest"),
            ResourceType::Procedure => write!(f, "Procedure"),
            ResourceType::Specimen => write!(f, "Specimen"),
            ResourceType::Bundle => write!(f, "Bundle"),
            ResourceType::ValueSet => write!(f, "ValueSet"),
            ResourceType::CodeSystem => write!(f, "CodeSystem"),
            ResourceType::OperationOutcome => write!(f, "OperationOutcome"),
            ResourceType::Custom(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for ResourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Patient" => Ok(ResourceType::Patient),
            "Practitioner" => Ok(ResourceType::Practitioner),
            "Organization" => Ok(ResourceType::Organization),
            "Encounter" => Ok(ResourceType::Encounter),
            "Observation" => Ok(ResourceType::Observation),
            "Condition" => Ok(ResourceType::Condition),
            "DiagnosticReport" => Ok(ResourceType::DiagnosticReport),
            "Medication" => Ok(ResourceType::Medication),
            "MedicationRequest" => Ok(ResourceType::MedicationRequest),
            "Procedure" => Ok(ResourceType::Procedure),
            "Specimen" => Ok(ResourceType::Specimen),
            "Bundle" => Ok(ResourceType::Bundle),
            "ValueSet" => Ok(ResourceType::ValueSet),
            "CodeSystem" => Ok(ResourceType::CodeSystem),
            "OperationOutcome" => Ok(ResourceType::OperationOutcome),
            name => {
                if is_valid_resource_type_name(name) {
                    Ok(ResourceType::Custom(name.to_string()))
                } else {
                    Err(CoreError::incorrect(format!(
                        "Invalid resource type \"{name}\"."
                    )))
                }
            }
        }
    }
}

/// FHIR resource type names start with an uppercase letter and contain only
/// ASCII letters.
pub fn is_valid_resource_type_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_uppercase())
        && name.chars().all(|c| c.is_ascii_alphabetic())
}

/// FHIR logical ids: `[A-Za-z0-9\-\.]{1,64}`.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_types_round_trip() {
        for name in [
            "Patient",
            "Observation",
            "ValueSet",
            "CodeSystem",
            "OperationOutcome",
        ] {
            let parsed = ResourceType::from_str(name).unwrap();
            assert_eq!(parsed.to_string(), name);
        }
    }

    #[test]
    fn custom_types_require_valid_names() {
        assert_eq!(
            ResourceType::from_str("CarePlan").unwrap(),
            ResourceType::Custom("CarePlan".to_string())
        );
        assert!(ResourceType::from_str("carePlan").is_err());
        assert!(ResourceType::from_str("Care-Plan").is_err());
        assert!(ResourceType::from_str("").is_err());
    }

    #[test]
    fn id_validation() {
        assert!(is_valid_id("0"));
        assert!(is_valid_id("AAAAAGEP4AAADCIB"));
        assert!(is_valid_id("a-b.c"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("has space"));
        assert!(!is_valid_id("slash/y"));
        assert!(!is_valid_id(&"x".repeat(65)));
    }

    #[test]
    fn serde_uses_plain_names() {
        let json = serde_json::to_string(&ResourceType::Patient).unwrap();
        assert_eq!(json, "\"Patient\"");
        let custom: ResourceType = serde_json::from_str("\"CarePlan\"").unwrap();
        assert_eq!(custom, ResourceType::Custom("CarePlan".to_string()));
    }
}
