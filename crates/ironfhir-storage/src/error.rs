//! Error types for store operations.

use ironfhir_core::CoreError;

/// Errors surfaced by a resource store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// A CAS guard did not match the current state.
    #[error("Version conflict on {target}: expected {expected:?}, found {actual:?}")]
    Conflict {
        /// `Type/id` of the guarded resource.
        target: String,
        expected: Option<i64>,
        actual: Option<i64>,
    },

    /// The submission queue is full or the write timed out.
    #[error("Store busy: {message}")]
    Busy { message: String },

    /// The requested resource does not exist.
    #[error("Resource not found: {resource_type}/{id}")]
    NotFound { resource_type: String, id: String },

    /// A store invariant was violated.
    #[error("Store fault: {message}")]
    Fault { message: String },
}

impl StorageError {
    #[must_use]
    pub fn conflict(target: impl Into<String>, expected: Option<i64>, actual: Option<i64>) -> Self {
        Self::Conflict {
            target: target.into(),
            expected,
            actual,
        }
    }

    #[must_use]
    pub fn busy(message: impl Into<String>) -> Self {
        Self::Busy {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    #[must_use]
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { .. } => CoreError::precondition_failed(err.to_string()),
            StorageError::Busy { message } => CoreError::busy(message),
            StorageError::NotFound { resource_type, id } => {
                CoreError::not_found(format!("Resource \"{resource_type}/{id}\" not found."))
            }
            StorageError::Fault { message } => CoreError::fault(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ironfhir_core::ErrorCategory;

    #[test]
    fn display_formats() {
        let err = StorageError::conflict("Patient/0", Some(-3), Some(-7));
        assert_eq!(
            err.to_string(),
            "Version conflict on Patient/0: expected Some(-3), found Some(-7)"
        );
        assert!(err.is_conflict());

        let err = StorageError::busy("queue full");
        assert_eq!(err.to_string(), "Store busy: queue full");
        assert!(err.is_busy());
    }

    #[test]
    fn converts_into_core_categories() {
        let conflict: CoreError = StorageError::conflict("Patient/0", None, Some(-3)).into();
        assert_eq!(conflict.category(), ErrorCategory::Conflict);

        let busy: CoreError = StorageError::busy("timeout").into();
        assert_eq!(busy.category(), ErrorCategory::Busy);

        let missing: CoreError = StorageError::not_found("Patient", "0").into();
        assert_eq!(missing.category(), ErrorCategory::NotFound);
        assert_eq!(missing.to_string(), "Resource \"Patient/0\" not found.");
    }
}
