use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// A FHIR instant: an RFC3339 timestamp with offset.
///
/// Used for `meta.lastUpdated` and transaction instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FhirInstant(pub OffsetDateTime);

impl FhirInstant {
    pub fn new(datetime: OffsetDateTime) -> Self {
        Self(datetime)
    }

    pub fn inner(&self) -> &OffsetDateTime {
        &self.0
    }

    pub fn timestamp(&self) -> i64 {
        self.0.unix_timestamp()
    }
}

impl fmt::Display for FhirInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self
            .0
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|_| fmt::Error)?;
        write!(f, "{formatted}")
    }
}

impl FromStr for FhirInstant {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let datetime = OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339)
            .map_err(|e| CoreError::incorrect(format!("Failed to parse instant '{s}': {e}")))?;
        Ok(FhirInstant(datetime))
    }
}

impl Serialize for FhirInstant {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = self
            .0
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }
}

impl<'de> Deserialize<'de> for FhirInstant {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FhirInstant::from_str(&s).map_err(serde::de::Error::custom)
    }
}

pub fn now_utc() -> FhirInstant {
    FhirInstant(OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let instant = FhirInstant::from_str("2023-05-15T14:30:00Z").unwrap();
        assert_eq!(instant.to_string(), "2023-05-15T14:30:00Z");
    }

    #[test]
    fn rejects_garbage() {
        assert!(FhirInstant::from_str("not a date").is_err());
        assert!(FhirInstant::from_str("2023-13-45T99:00:00Z").is_err());
    }

    #[test]
    fn serde_round_trip() {
        let instant = FhirInstant::from_str("2023-05-15T14:30:00Z").unwrap();
        let json = serde_json::to_string(&instant).unwrap();
        assert_eq!(json, "\"2023-05-15T14:30:00Z\"");
        let back: FhirInstant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, instant);
    }

    #[test]
    fn ordering_follows_time() {
        let a = FhirInstant::from_str("2023-05-15T14:30:00Z").unwrap();
        let b = FhirInstant::from_str("2023-05-15T14:30:01Z").unwrap();
        assert!(a < b);
    }
}
