//! Infrastructure and engine error model.

use thiserror::Error;

use stockmove_core::DomainError;

/// Store operation error.
///
/// These are **infrastructure errors** (locking, constraints, serialization) as
/// opposed to domain errors (validation, state).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// A unique index rejected the write (batch number, resolution per row, row id).
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The log or tables contradict each other.
    #[error("inconsistent store state: {0}")]
    Inconsistent(String),

    #[error("event payload (de)serialization failed: {0}")]
    Serialization(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Error returned by every `TransferEngine` operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),

    /// The unit of work committed, but fan-out to the bus failed. Read models can
    /// be rebuilt from the log.
    #[error("event publication failed after commit: {0}")]
    Publish(String),
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            // Constraint and version races surface as ordinary conflicts.
            StoreError::Concurrency(msg) | StoreError::UniqueViolation(msg) => {
                EngineError::Domain(DomainError::Conflict(msg))
            }
            other => EngineError::Store(other),
        }
    }
}

impl EngineError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.domain().is_some_and(DomainError::is_conflict)
    }

    pub fn is_not_found(&self) -> bool {
        self.domain().is_some_and(DomainError::is_not_found)
    }

    pub fn is_validation(&self) -> bool {
        matches!(self.domain(), Some(DomainError::Validation(_)))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self.domain(), Some(DomainError::InvalidState { .. }))
    }
}
