//! Error taxonomy shared across validation, jobs, and clients.

/// Error raised when user-provided data fails validation.
///
/// Carries the top-level message plus the per-row detail list that is
/// persisted to `processing_errors.detail` on failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[error("{message}")]
pub struct ValidationError {
    /// Human-readable description of the failure.
    pub message: String,
    /// Individual triggering errors (one per offending row/column).
    pub triggering_exceptions: Vec<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            triggering_exceptions: Vec::new(),
        }
    }

    pub fn with_triggers(message: impl Into<String>, triggering_exceptions: Vec<String>) -> Self {
        Self {
            message: message.into(),
            triggering_exceptions,
        }
    }
}

/// Typed errors of the worker core.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    /// Bad user input; never retried, surfaced verbatim.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Identifier matches more than one publication database.
    #[error("ambiguous identifier: {0}")]
    AmbiguousIdentifier(String),
    /// Identifier matched no publication database.
    #[error("nonexistent identifier: {0}")]
    NonexistentIdentifier(String),
    /// Score set mixes sequence and accession based targets.
    #[error("mixed target types: {0}")]
    MixedTarget(String),
    /// Contributor lookup miss.
    #[error("no ORCID user found: {0}")]
    NonexistentOrcidUser(String),
    /// VRS mapper returned no results at all.
    #[error("missing mapping results: {0}")]
    NonexistentMappingResults(String),
    /// VRS mapper returned results without mapped scores.
    #[error("missing mapped scores: {0}")]
    NonexistentMappingScores(String),
    /// VRS mapper returned results without reference metadata.
    #[error("missing mapping reference metadata: {0}")]
    NonexistentMappingReference(String),
    /// Every variant in the score set failed to map.
    #[error("no variants were successfully mapped: {0}")]
    NoMappedVariants(String),
    /// Transport-level failure talking to an external service; retriable.
    #[error("upstream service error: {0}")]
    Transport(String),
    /// Requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Entity state conflicts with the requested operation.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Internal invariant violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the retry policy applies to this error class.
    ///
    /// Only transport-level failures are retriable; validation and typed
    /// mapping errors are terminal.
    pub fn is_retriable(&self) -> bool {
        matches!(self, CoreError::Transport(_))
    }

    /// Fixed HTTP status code used when translating this error at the API
    /// boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::Validation(_) => 400,
            CoreError::NotFound(_) | CoreError::NonexistentOrcidUser(_) => 404,
            CoreError::AmbiguousIdentifier(_) | CoreError::Conflict(_) => 409,
            CoreError::NonexistentIdentifier(_) | CoreError::MixedTarget(_) => 422,
            CoreError::Transport(_) => 502,
            CoreError::NonexistentMappingResults(_)
            | CoreError::NonexistentMappingScores(_)
            | CoreError::NonexistentMappingReference(_)
            | CoreError::NoMappedVariants(_) => 502,
            CoreError::Internal(_) => 500,
        }
    }

    /// The exception class name recorded on job failure.
    pub fn class_name(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "ValidationError",
            CoreError::AmbiguousIdentifier(_) => "AmbiguousIdentifierError",
            CoreError::NonexistentIdentifier(_) => "NonexistentIdentifierError",
            CoreError::MixedTarget(_) => "MixedTargetError",
            CoreError::NonexistentOrcidUser(_) => "NonexistentOrcidUserError",
            CoreError::NonexistentMappingResults(_) => "NonexistentMappingResultsError",
            CoreError::NonexistentMappingScores(_) => "NonexistentMappingScoresError",
            CoreError::NonexistentMappingReference(_) => "NonexistentMappingReferenceError",
            CoreError::NoMappedVariants(_) => "NoMappedVariantsError",
            CoreError::Transport(_) => "TransportError",
            CoreError::NotFound(_) => "NotFoundError",
            CoreError::Conflict(_) => "ConflictError",
            CoreError::Internal(_) => "InternalError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[rstest::rstest]
    #[case(CoreError::Transport("timeout".into()), true)]
    #[case(CoreError::Validation(ValidationError::new("bad")), false)]
    #[case(CoreError::NonexistentMappingScores("none".into()), false)]
    fn retriability(#[case] err: CoreError, #[case] expected: bool) {
        assert_eq!(expected, err.is_retriable());
    }

    #[rstest::rstest]
    #[case(CoreError::Validation(ValidationError::new("bad")), 400)]
    #[case(CoreError::NotFound("x".into()), 404)]
    #[case(CoreError::AmbiguousIdentifier("123".into()), 409)]
    #[case(CoreError::NonexistentIdentifier("123".into()), 422)]
    #[case(CoreError::Transport("5xx".into()), 502)]
    #[case(CoreError::Internal("bug".into()), 500)]
    fn http_status(#[case] err: CoreError, #[case] expected: u16) {
        assert_eq!(expected, err.http_status());
    }
}
