//! Receiver-side reconciliation: classify each requested line against what
//! actually arrived and derive the stock effects of that classification.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use stockmove_core::{DomainError, DomainResult, TransactionId, TransactionItemId};
use stockmove_inventory::{DiscrepancyKind, ItemTypeId, LineOrigin, StockLocation};

use crate::transaction::{LineStatus, Transaction, TransactionStatus};

/// Rejection reason for lines the receiver marked as never arrived.
pub const NOT_RECEIVED_REASON: &str = "item was not sent/received";

/// What the receiver reported, keyed by line id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptReport {
    pub received: BTreeMap<TransactionItemId, i64>,
    pub not_received: BTreeMap<TransactionItemId, bool>,
}

impl ReceiptReport {
    fn is_not_received(&self, line_id: TransactionItemId) -> bool {
        self.not_received.get(&line_id).copied().unwrap_or(false)
    }
}

/// Classification of one line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineOutcome {
    pub line_id: TransactionItemId,
    pub item_type: ItemTypeId,
    pub requested: i64,
    /// `None` when the line was flagged as not received.
    pub received: Option<i64>,
    pub status: LineStatus,
    pub reason: Option<String>,
}

impl LineOutcome {
    /// Mismatch direction, if the line arrived with a different quantity.
    pub fn discrepancy(&self) -> Option<(DiscrepancyKind, i64)> {
        let received = self.received?;
        if received <= 0 || received == self.requested {
            return None;
        }
        if received > self.requested {
            Some((DiscrepancyKind::Overreceived, received - self.requested))
        } else {
            Some((DiscrepancyKind::Missing, self.requested - received))
        }
    }
}

/// Inventory consequence of an acceptance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockEffect {
    /// Usable stock at the receiver, at the reported quantity.
    Receive {
        origin: LineOrigin,
        item_type: ItemTypeId,
        location: StockLocation,
        quantity: i64,
    },
    /// A discrepancy row holding the absolute difference.
    OpenDiscrepancy {
        origin: LineOrigin,
        item_type: ItemTypeId,
        location: StockLocation,
        kind: DiscrepancyKind,
        quantity: i64,
    },
}

/// Result of reconciling a whole transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub status: TransactionStatus,
    pub outcomes: Vec<LineOutcome>,
    pub effects: Vec<StockEffect>,
}

impl Reconciliation {
    /// Default transaction-level rejection reason when the receiver left no comment.
    pub fn rejection_summary(&self) -> String {
        let rejected = self
            .outcomes
            .iter()
            .filter(|o| o.status == LineStatus::Rejected)
            .count();
        format!(
            "{rejected} of {} items did not match the request",
            self.outcomes.len()
        )
    }
}

/// Classify every line of `transaction` against `report`.
///
/// Each line needs either a reported quantity or a not-received flag. A flagged
/// line is rejected without stock. Any other line materializes its reported
/// quantity; a mismatch additionally rejects the line and opens a discrepancy
/// for the difference. The transaction is ACCEPTED only when every line matched.
pub fn reconcile(
    transaction: &Transaction,
    report: &ReceiptReport,
) -> DomainResult<Reconciliation> {
    for line_id in report.received.keys().chain(report.not_received.keys()) {
        if transaction.line(*line_id).is_none() {
            return Err(DomainError::not_found(format!(
                "line {line_id} in transaction {}",
                transaction.id_typed()
            )));
        }
    }

    let mut outcomes = Vec::with_capacity(transaction.lines().len());
    for line in transaction.lines() {
        let line_id = line.id_typed();
        let outcome = if report.is_not_received(line_id) {
            LineOutcome {
                line_id,
                item_type: line.item_type(),
                requested: line.quantity(),
                received: None,
                status: LineStatus::Rejected,
                reason: Some(NOT_RECEIVED_REASON.to_string()),
            }
        } else {
            let received = *report.received.get(&line_id).ok_or_else(|| {
                DomainError::validation(format!(
                    "line {line_id} needs a received quantity or a not-received flag"
                ))
            })?;
            if received < 0 {
                return Err(DomainError::validation(format!(
                    "line {line_id}: received quantity cannot be negative, got {received}"
                )));
            }
            let matched = received == line.quantity();
            LineOutcome {
                line_id,
                item_type: line.item_type(),
                requested: line.quantity(),
                received: Some(received),
                status: if matched {
                    LineStatus::Accepted
                } else {
                    LineStatus::Rejected
                },
                reason: (!matched).then(|| {
                    format!(
                        "quantity mismatch: requested {}, received {received}",
                        line.quantity()
                    )
                }),
            }
        };
        outcomes.push(outcome);
    }

    let status = if outcomes.iter().all(|o| o.status == LineStatus::Accepted) {
        TransactionStatus::Accepted
    } else {
        TransactionStatus::Rejected
    };
    let effects = stock_effects(
        transaction.id_typed(),
        transaction.receiver().location(),
        &outcomes,
    );

    Ok(Reconciliation {
        status,
        outcomes,
        effects,
    })
}

/// Stock effects implied by a set of line outcomes.
///
/// Lines flagged as not received produce nothing, and neither does a reported
/// quantity of zero: there is no physical stock to record on either side.
/// Rows therefore carry the reported quantity only for quantities above zero;
/// a zero report is a REJECTED mismatch with no row and no MISSING row.
pub fn stock_effects(
    transaction_id: TransactionId,
    location: StockLocation,
    outcomes: &[LineOutcome],
) -> Vec<StockEffect> {
    let mut effects = Vec::new();
    for outcome in outcomes {
        let Some(received) = outcome.received.filter(|q| *q > 0) else {
            continue;
        };
        let origin = LineOrigin {
            transaction_id,
            line_id: outcome.line_id,
        };
        effects.push(StockEffect::Receive {
            origin,
            item_type: outcome.item_type,
            location,
            quantity: received,
        });
        if let Some((kind, quantity)) = outcome.discrepancy() {
            effects.push(StockEffect::OpenDiscrepancy {
                origin,
                item_type: outcome.item_type,
                location,
                kind,
                quantity,
            });
        }
    }
    effects
}
