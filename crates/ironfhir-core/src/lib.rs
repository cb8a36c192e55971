pub mod error;
pub mod fhir;
pub mod luid;
pub mod time;
pub mod version;

pub use error::{ConflictCause, CoreError, ErrorCategory, IssueType, NotSupportedKind, Result};
pub use fhir::{ResourceType, is_valid_id, is_valid_resource_type_name};
pub use luid::LuidGenerator;
pub use time::{FhirInstant, now_utc};
pub use version::CreationMode;
