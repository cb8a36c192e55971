use thiserror::Error;

/// FHIR issue type codes surfaced in OperationOutcome responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueType {
    Invalid,
    Value,
    Required,
    Invariant,
    Conflict,
    NotSupported,
    Processing,
    NotFound,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Value => "value",
            Self::Required => "required",
            Self::Invariant => "invariant",
            Self::Conflict => "conflict",
            Self::NotSupported => "not-supported",
            Self::Processing => "processing",
            Self::NotFound => "not-found",
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distinguishes the two HTTP faces of a conflict: stale preconditions and
/// conditional-create ambiguity surface as 412, broken references as 409.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictCause {
    Precondition,
    Referential,
}

/// Distinguishes a FHIR-defined but unimplemented method (422) from a method
/// the target simply does not accept (405).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotSupportedKind {
    Feature,
    MethodNotAllowed,
}

/// Error kinds shared across all IronFHIR crates.
///
/// Every failure in the system collapses into one of these categories; the
/// API layer maps them onto HTTP status codes and OperationOutcome issues.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Malformed input (400).
    #[error("{message}")]
    Incorrect {
        message: String,
        issue: IssueType,
        /// Optional message-code carried in OperationOutcome.issue.details.
        detail_code: Option<&'static str>,
        /// FHIRPath-ish expressions locating the offending input.
        expressions: Vec<String>,
    },

    /// Missing resource (404).
    #[error("{message}")]
    NotFound { message: String },

    /// CAS failure, referential integrity violation, or conditional-create
    /// ambiguity (409/412 depending on cause).
    #[error("{message}")]
    Conflict {
        message: String,
        cause: ConflictCause,
    },

    /// Method or feature not implemented (405/422).
    #[error("{message}")]
    NotSupported {
        message: String,
        kind: NotSupportedKind,
        expressions: Vec<String>,
    },

    /// Throttling or timeout (503).
    #[error("{message}")]
    Busy { message: String },

    /// Internal invariant violation (500).
    #[error("{message}")]
    Fault { message: String },
}

impl CoreError {
    pub fn incorrect(message: impl Into<String>) -> Self {
        Self::Incorrect {
            message: message.into(),
            issue: IssueType::Invalid,
            detail_code: None,
            expressions: Vec::new(),
        }
    }

    pub fn incorrect_value(message: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::Incorrect {
            message: message.into(),
            issue: IssueType::Value,
            detail_code: None,
            expressions: vec![expression.into()],
        }
    }

    pub fn required(message: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::Incorrect {
            message: message.into(),
            issue: IssueType::Required,
            detail_code: None,
            expressions: vec![expression.into()],
        }
    }

    pub fn coded(message: impl Into<String>, detail_code: &'static str) -> Self {
        Self::Incorrect {
            message: message.into(),
            issue: IssueType::Invariant,
            detail_code: Some(detail_code),
            expressions: Vec::new(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            cause: ConflictCause::Precondition,
        }
    }

    pub fn referential(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            cause: ConflictCause::Referential,
        }
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
            kind: NotSupportedKind::Feature,
            expressions: Vec::new(),
        }
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
            kind: NotSupportedKind::MethodNotAllowed,
            expressions: Vec::new(),
        }
    }

    pub fn busy(message: impl Into<String>) -> Self {
        Self::Busy {
            message: message.into(),
        }
    }

    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault {
            message: message.into(),
        }
    }

    /// Attaches an input-locating expression to the error where the variant
    /// carries them; other variants pass through unchanged.
    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        match &mut self {
            Self::Incorrect { expressions, .. } | Self::NotSupported { expressions, .. } => {
                expressions.push(expression.into());
            }
            _ => {}
        }
        self
    }

    /// The FHIR issue code reported for this error.
    pub fn issue_code(&self) -> IssueType {
        match self {
            Self::Incorrect { issue, .. } => *issue,
            Self::NotFound { .. } => IssueType::NotFound,
            Self::Conflict { .. } => IssueType::Conflict,
            Self::NotSupported { .. } => IssueType::NotSupported,
            Self::Busy { .. } | Self::Fault { .. } => IssueType::Processing,
        }
    }

    /// Error category for logging and metrics.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Incorrect { .. } => ErrorCategory::Incorrect,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::NotSupported { .. } => ErrorCategory::NotSupported,
            Self::Busy { .. } => ErrorCategory::Busy,
            Self::Fault { .. } => ErrorCategory::Fault,
        }
    }

    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Busy { .. } | Self::Fault { .. })
    }

    pub fn expressions(&self) -> &[String] {
        match self {
            Self::Incorrect { expressions, .. } | Self::NotSupported { expressions, .. } => {
                expressions
            }
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::incorrect(format!("Invalid JSON: {err}"))
    }
}

/// Error categories for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Incorrect,
    NotFound,
    Conflict,
    NotSupported,
    Busy,
    Fault,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incorrect => write!(f, "incorrect"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::NotSupported => write!(f, "not_supported"),
            Self::Busy => write!(f, "busy"),
            Self::Fault => write!(f, "fault"),
        }
    }
}

/// Convenience result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_helpers_set_categories() {
        assert_eq!(
            CoreError::incorrect("bad").category(),
            ErrorCategory::Incorrect
        );
        assert_eq!(
            CoreError::not_found("gone").category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            CoreError::precondition_failed("stale").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(CoreError::busy("full").category(), ErrorCategory::Busy);
        assert_eq!(CoreError::fault("bug").category(), ErrorCategory::Fault);
    }

    #[test]
    fn conflict_causes_are_distinguished() {
        match CoreError::precondition_failed("x") {
            CoreError::Conflict { cause, .. } => assert_eq!(cause, ConflictCause::Precondition),
            other => panic!("unexpected: {other:?}"),
        }
        match CoreError::referential("x") {
            CoreError::Conflict { cause, .. } => assert_eq!(cause, ConflictCause::Referential),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn issue_codes_follow_variants() {
        assert_eq!(CoreError::incorrect("x").issue_code(), IssueType::Invalid);
        assert_eq!(
            CoreError::incorrect_value("x", "Bundle.type").issue_code(),
            IssueType::Value
        );
        assert_eq!(CoreError::not_found("x").issue_code(), IssueType::NotFound);
        assert_eq!(
            CoreError::not_supported("x").issue_code(),
            IssueType::NotSupported
        );
        assert_eq!(CoreError::busy("x").issue_code(), IssueType::Processing);
    }

    #[test]
    fn expressions_attach_to_input_errors() {
        let err = CoreError::incorrect("bad entry").with_expression("Bundle.entry[3].request");
        assert_eq!(err.expressions(), ["Bundle.entry[3].request"]);

        let err = CoreError::busy("queue full").with_expression("ignored");
        assert!(err.expressions().is_empty());
    }

    #[test]
    fn display_uses_message() {
        let err = CoreError::precondition_failed("Precondition \"W/\\\"1\\\"\" failed.");
        assert_eq!(err.to_string(), "Precondition \"W/\\\"1\\\"\" failed.");
    }

    #[test]
    fn client_vs_server_classification() {
        assert!(CoreError::incorrect("x").is_client_error());
        assert!(CoreError::not_found("x").is_client_error());
        assert!(!CoreError::busy("x").is_client_error());
        assert!(!CoreError::fault("x").is_client_error());
    }

    #[test]
    fn coded_errors_carry_detail_code() {
        let err = CoreError::coded("Resource id is missing.", "MSG_RESOURCE_ID_MISSING");
        match err {
            CoreError::Incorrect { detail_code, .. } => {
                assert_eq!(detail_code, Some("MSG_RESOURCE_ID_MISSING"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
