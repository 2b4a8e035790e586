//! Transfer ledger: transactions between warehouses and equipment, batch
//! numbers, and receiver-side reconciliation.
//!
//! Pure domain logic (no IO, no storage). The infra crate wires these decisions
//! into a store and the inventory arena.

pub mod acceptance;
pub mod batch;
pub mod transaction;

pub use acceptance::{
    LineOutcome, NOT_RECEIVED_REASON, ReceiptReport, Reconciliation, StockEffect, reconcile,
    stock_effects,
};
pub use batch::{
    BatchBinding, BatchNumber, BatchReusePolicy, BatchScenario, BatchValidation, classify,
    ensure_claimable, ensure_unique, is_available,
};
pub use transaction::{
    AcceptTransaction, CreateTransaction, InitiatingParty, LineResolved, LineStatus,
    LinkMaintenance, MaintenanceLinked, MaintenanceRecordId, Party, Purpose, RejectTransaction,
    RequestedLine, ResolveLine, TRANSACTION_AGGREGATE_TYPE, Transaction, TransactionCreated,
    TransactionItem, TransactionReconciled, TransactionRejected, TransactionStatus,
    TransactionUpdated, TransferCommand, TransferEvent, UpdateTransaction,
};
