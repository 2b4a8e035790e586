//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant carries enough context (ids, expected vs. actual state) for an
/// operator to decide the next step. Infrastructure failures live in the infra
/// crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input: non-positive quantity, missing field, unknown enum value.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The target exists but is not in the state the operation requires.
    #[error("{subject} is {actual}, expected {expected}")]
    InvalidState {
        subject: String,
        expected: String,
        actual: String,
    },

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Unknown transaction, line, row, item type or location.
    #[error("not found: {0}")]
    NotFound(String),

    /// Batch-number collision, double resolution, concluding a concluded transfer,
    /// or a precondition that changed underneath the caller.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_state(
        subject: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            subject: subject.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_message_names_both_states() {
        let err = DomainError::invalid_state("row 7", "MISSING or OVERRECEIVED", "IN_WAREHOUSE");
        assert_eq!(
            err.to_string(),
            "row 7 is IN_WAREHOUSE, expected MISSING or OVERRECEIVED"
        );
    }

    #[test]
    fn predicates_match_variants() {
        assert!(DomainError::conflict("batch 12 in use").is_conflict());
        assert!(DomainError::not_found("transaction").is_not_found());
        assert!(!DomainError::validation("quantity").is_conflict());
    }
}
