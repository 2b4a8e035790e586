//! Batch numbers: an optional external document number shared by both sides of
//! a transfer. At most one non-terminal transaction may hold a given number.

use serde::{Deserialize, Serialize};

use stockmove_core::{AggregateId, DomainError, DomainResult, TransactionId, ValueObject};

use crate::transaction::{Party, Transaction, TransactionStatus};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct BatchNumber(u64);

impl BatchNumber {
    pub fn new(value: u64) -> DomainResult<Self> {
        if value == 0 {
            return Err(DomainError::validation("batch number must be positive"));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for BatchNumber {
    type Error = DomainError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BatchNumber> for u64 {
    fn from(value: BatchNumber) -> Self {
        value.0
    }
}

impl ValueObject for BatchNumber {}

impl core::fmt::Display for BatchNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a batch number freed by a terminal transaction may be used again.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchReusePolicy {
    #[default]
    Block,
    AllowAfterTerminal,
}

/// The transaction currently holding a batch number.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BatchBinding {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    pub sender: Party,
    pub receiver: Party,
}

impl BatchBinding {
    pub fn of(transaction: &Transaction) -> Self {
        Self {
            transaction_id: transaction.id_typed(),
            status: transaction.status(),
            sender: transaction.sender(),
            receiver: transaction.receiver(),
        }
    }

    fn involves(&self, entity: AggregateId) -> bool {
        self.sender.entity_id() == entity || self.receiver.entity_id() == entity
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchScenario {
    /// Nobody holds the number.
    Unused,
    /// A non-terminal transaction involving the probing entity holds it.
    Resumable,
    /// A non-terminal transaction between other parties holds it.
    UsedByOtherEntity,
    /// Held by a transaction that is ACCEPTED or RESOLVED.
    Terminal,
}

/// Outcome of probing a batch number for an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchValidation {
    pub batch_number: BatchNumber,
    pub scenario: BatchScenario,
    pub can_create_new: bool,
    pub can_validate: bool,
    pub transaction_id: Option<TransactionId>,
    pub message: String,
}

/// Classify `batch` as seen by `entity` (a warehouse or equipment id).
pub fn classify(
    batch: BatchNumber,
    binding: Option<&BatchBinding>,
    entity: AggregateId,
    policy: BatchReusePolicy,
) -> BatchValidation {
    let Some(binding) = binding else {
        return BatchValidation {
            batch_number: batch,
            scenario: BatchScenario::Unused,
            can_create_new: true,
            can_validate: false,
            transaction_id: None,
            message: format!("batch {batch} is free"),
        };
    };

    let (scenario, can_create_new, can_validate, message) = if binding.status.is_terminal() {
        let reusable = policy == BatchReusePolicy::AllowAfterTerminal;
        (
            BatchScenario::Terminal,
            reusable,
            false,
            if reusable {
                format!(
                    "batch {batch} was closed by transaction {} ({}) and may be reused",
                    binding.transaction_id, binding.status
                )
            } else {
                format!(
                    "batch {batch} was closed by transaction {} ({}) and cannot be reused",
                    binding.transaction_id, binding.status
                )
            },
        )
    } else if binding.involves(entity) {
        (
            BatchScenario::Resumable,
            false,
            true,
            format!(
                "batch {batch} belongs to your transaction {} ({}); continue it instead",
                binding.transaction_id, binding.status
            ),
        )
    } else {
        (
            BatchScenario::UsedByOtherEntity,
            false,
            false,
            format!("batch {batch} is in use by another party"),
        )
    };

    BatchValidation {
        batch_number: batch,
        scenario,
        can_create_new,
        can_validate,
        transaction_id: Some(binding.transaction_id),
        message,
    }
}

/// Fails with a conflict iff a non-terminal transaction holds `batch`.
pub fn ensure_unique(batch: BatchNumber, binding: Option<&BatchBinding>) -> DomainResult<()> {
    match binding {
        Some(b) if !b.status.is_terminal() => Err(DomainError::conflict(format!(
            "batch {batch} is held by transaction {} ({})",
            b.transaction_id, b.status
        ))),
        _ => Ok(()),
    }
}

pub fn is_available(binding: Option<&BatchBinding>, policy: BatchReusePolicy) -> bool {
    match binding {
        None => true,
        Some(b) => b.status.is_terminal() && policy == BatchReusePolicy::AllowAfterTerminal,
    }
}

/// Guard for binding `batch` to `claimant`: the number must be free, already
/// held by the claimant itself, or released by a terminal transaction under a
/// policy that allows reuse.
pub fn ensure_claimable(
    batch: BatchNumber,
    binding: Option<&BatchBinding>,
    claimant: TransactionId,
    policy: BatchReusePolicy,
) -> DomainResult<()> {
    match binding {
        None => Ok(()),
        Some(b) if b.transaction_id == claimant => Ok(()),
        Some(b) if is_available(Some(b), policy) => Ok(()),
        Some(b) => Err(DomainError::conflict(format!(
            "batch {batch} is held by transaction {} ({})",
            b.transaction_id, b.status
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::tests::{equipment, warehouse};

    fn binding(status: TransactionStatus) -> BatchBinding {
        BatchBinding {
            transaction_id: TransactionId::new(),
            status,
            sender: warehouse(),
            receiver: equipment(),
        }
    }

    fn batch(n: u64) -> BatchNumber {
        BatchNumber::new(n).unwrap()
    }

    #[test]
    fn batch_number_must_be_positive() {
        assert!(BatchNumber::new(0).is_err());
        assert_eq!(batch(17).get(), 17);
        assert!(serde_json::from_str::<BatchNumber>("0").is_err());
    }

    #[test]
    fn unused_batch_allows_creation() {
        let v = classify(batch(1), None, AggregateId::new(), BatchReusePolicy::Block);
        assert_eq!(v.scenario, BatchScenario::Unused);
        assert!(v.can_create_new && !v.can_validate);
        assert!(is_available(None, BatchReusePolicy::Block));
    }

    #[test]
    fn pending_batch_of_own_entity_is_resumable() {
        let b = binding(TransactionStatus::Pending);
        let v = classify(batch(9), Some(&b), b.receiver.entity_id(), BatchReusePolicy::Block);
        assert_eq!(v.scenario, BatchScenario::Resumable);
        assert!(!v.can_create_new && v.can_validate);
        assert_eq!(v.transaction_id, Some(b.transaction_id));

        let resolving = binding(TransactionStatus::Resolving);
        let v = classify(batch(9), Some(&resolving), resolving.sender.entity_id(), BatchReusePolicy::Block);
        assert_eq!(v.scenario, BatchScenario::Resumable);
        assert!(v.can_validate);
    }

    #[test]
    fn pending_batch_of_other_entity_blocks_everything() {
        let b = binding(TransactionStatus::Pending);
        let v = classify(batch(9), Some(&b), AggregateId::new(), BatchReusePolicy::AllowAfterTerminal);
        assert_eq!(v.scenario, BatchScenario::UsedByOtherEntity);
        assert!(!v.can_create_new && !v.can_validate);
    }

    #[test]
    fn terminal_batch_follows_reuse_policy() {
        for status in [TransactionStatus::Accepted, TransactionStatus::Resolved] {
            let b = binding(status);
            let blocked = classify(batch(3), Some(&b), AggregateId::new(), BatchReusePolicy::Block);
            assert_eq!(blocked.scenario, BatchScenario::Terminal);
            assert!(!blocked.can_create_new);
            assert!(!is_available(Some(&b), BatchReusePolicy::Block));

            let reusable = classify(batch(3), Some(&b), AggregateId::new(), BatchReusePolicy::AllowAfterTerminal);
            assert!(reusable.can_create_new);
            assert!(is_available(Some(&b), BatchReusePolicy::AllowAfterTerminal));
        }
    }

    #[test]
    fn uniqueness_conflicts_only_for_non_terminal_holders() {
        assert!(ensure_unique(batch(5), None).is_ok());
        assert!(ensure_unique(batch(5), Some(&binding(TransactionStatus::Resolved))).is_ok());
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Rejected,
            TransactionStatus::Resolving,
        ] {
            assert!(ensure_unique(batch(5), Some(&binding(status))).unwrap_err().is_conflict());
        }
    }

    #[test]
    fn holder_may_keep_its_own_batch() {
        let b = binding(TransactionStatus::Pending);
        assert!(ensure_claimable(batch(5), Some(&b), b.transaction_id, BatchReusePolicy::Block).is_ok());
        assert!(
            ensure_claimable(batch(5), Some(&b), TransactionId::new(), BatchReusePolicy::AllowAfterTerminal)
                .unwrap_err()
                .is_conflict()
        );
    }
}
