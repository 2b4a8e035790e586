use std::collections::HashMap;
use std::ops::Deref;

use serde::Serialize;

use stockmove_core::{AggregateId, AggregateRoot, ExpectedVersion, TransactionId};
use stockmove_events::Event;
use stockmove_inventory::{
    InventoryEvent, InventoryRow, ItemResolution, ItemTypeId, LineOrigin, ROW_AGGREGATE_TYPE,
    StockLocation, StockRowId,
};
use stockmove_transfers::{
    BatchBinding, BatchNumber, Party, TRANSACTION_AGGREGATE_TYPE, Transaction, TransferEvent,
};

use super::log::{StoredEvent, UncommittedEvent};
use crate::error::StoreError;

/// Materialized state: the transaction ledger, the inventory arena, the
/// resolution audit records and the unique batch index.
///
/// Only a [`UnitOfWork`] mutates it, and only by recording events.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    transactions: HashMap<TransactionId, Transaction>,
    batch_index: HashMap<BatchNumber, TransactionId>,
    rows: HashMap<StockRowId, InventoryRow>,
    resolutions: HashMap<StockRowId, ItemResolution>,
    stream_versions: HashMap<AggregateId, u64>,
}

impl Tables {
    pub fn transaction(&self, id: TransactionId) -> Option<&Transaction> {
        self.transactions.get(&id)
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    /// Transactions where `party` is sender or receiver, oldest first.
    pub fn transactions_for_party(&self, party: Party) -> Vec<&Transaction> {
        let mut found: Vec<_> = self
            .transactions
            .values()
            .filter(|t| t.sender() == party || t.receiver() == party)
            .collect();
        found.sort_by_key(|t| (t.created_at(), t.id_typed()));
        found
    }

    pub fn batch_holder(&self, batch: BatchNumber) -> Option<&Transaction> {
        self.batch_index
            .get(&batch)
            .and_then(|id| self.transactions.get(id))
    }

    pub fn batch_binding(&self, batch: BatchNumber) -> Option<BatchBinding> {
        self.batch_holder(batch).map(BatchBinding::of)
    }

    pub fn row(&self, id: StockRowId) -> Option<&InventoryRow> {
        self.rows.get(&id)
    }

    pub fn rows(&self) -> impl Iterator<Item = &InventoryRow> {
        self.rows.values()
    }

    /// Every row of one item type at one location, oldest first.
    pub fn rows_at(&self, location: StockLocation, item_type: ItemTypeId) -> Vec<&InventoryRow> {
        let mut found: Vec<_> = self
            .rows
            .values()
            .filter(|r| r.location() == location && r.item_type() == item_type)
            .collect();
        found.sort_by_key(|r| r.age_key());
        found
    }

    /// Sum of AVAILABLE rows as currently materialized.
    pub fn available_quantity(&self, location: StockLocation, item_type: ItemTypeId) -> i64 {
        self.rows
            .values()
            .filter(|r| r.location() == location && r.item_type() == item_type && r.is_available())
            .map(InventoryRow::quantity)
            .sum()
    }

    /// Ordinary received stock of `origin`: the row acceptance created for the
    /// reported quantity, not the discrepancy row.
    pub fn received_row(&self, origin: LineOrigin) -> Option<&InventoryRow> {
        self.rows
            .values()
            .filter(|r| r.origin() == Some(origin) && r.discrepancy().is_none() && r.is_available())
            .min_by_key(|r| r.age_key())
    }

    /// Oldest AVAILABLE row of an item type at a location, excluding `except`.
    pub fn oldest_available(
        &self,
        location: StockLocation,
        item_type: ItemTypeId,
        except: StockRowId,
    ) -> Option<&InventoryRow> {
        self.rows
            .values()
            .filter(|r| {
                r.id_typed() != except
                    && r.location() == location
                    && r.item_type() == item_type
                    && r.is_available()
            })
            .min_by_key(|r| r.age_key())
    }

    pub fn resolution_for_row(&self, row: StockRowId) -> Option<&ItemResolution> {
        self.resolutions.get(&row)
    }

    pub fn resolutions(&self) -> impl Iterator<Item = &ItemResolution> {
        self.resolutions.values()
    }

    fn stream_version(&self, aggregate_id: AggregateId) -> u64 {
        self.stream_versions.get(&aggregate_id).copied().unwrap_or(0)
    }

    fn claim_batch(&mut self, batch: BatchNumber, claimant: TransactionId) -> Result<(), StoreError> {
        if let Some(holder) = self.batch_holder(batch) {
            if holder.id_typed() != claimant && !holder.status().is_terminal() {
                return Err(StoreError::UniqueViolation(format!(
                    "batch {batch} is held by transaction {} ({})",
                    holder.id_typed(),
                    holder.status()
                )));
            }
        }
        self.batch_index.insert(batch, claimant);
        Ok(())
    }

    fn release_batch(&mut self, batch: BatchNumber, holder: TransactionId) {
        if self.batch_index.get(&batch) == Some(&holder) {
            self.batch_index.remove(&batch);
        }
    }
}

/// Working copy of [`Tables`] for one mutating operation.
///
/// Everything recorded here becomes visible atomically when the store commits
/// the unit of work, or is discarded with it.
#[derive(Debug)]
pub struct UnitOfWork {
    tables: Tables,
    pending: Vec<StoredEvent>,
    next_sequence: u64,
}

impl Deref for UnitOfWork {
    type Target = Tables;

    fn deref(&self) -> &Self::Target {
        &self.tables
    }
}

impl UnitOfWork {
    pub(crate) fn begin(tables: Tables, next_sequence: u64) -> Self {
        Self {
            tables,
            pending: Vec::new(),
            next_sequence,
        }
    }

    pub(crate) fn finish(self) -> (Tables, Vec<StoredEvent>) {
        (self.tables, self.pending)
    }

    /// Record ledger events for one transaction.
    ///
    /// `expected` is the version the caller decided against; the batch index is
    /// maintained from creation and update events.
    pub fn record_transfer(
        &mut self,
        transaction_id: TransactionId,
        expected: ExpectedVersion,
        events: &[TransferEvent],
    ) -> Result<(), StoreError> {
        let current = self
            .tables
            .transactions
            .get(&transaction_id)
            .map(|t| t.version())
            .unwrap_or(0);
        if !expected.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "transaction {transaction_id}: expected {expected:?}, found {current}"
            )));
        }

        for event in events {
            if event.transaction_id() != transaction_id {
                return Err(StoreError::Inconsistent(format!(
                    "event for transaction {} recorded under {transaction_id}",
                    event.transaction_id()
                )));
            }

            match event {
                TransferEvent::TransactionCreated(created) => {
                    if self.tables.transactions.contains_key(&transaction_id) {
                        return Err(StoreError::UniqueViolation(format!(
                            "transaction {transaction_id} already exists"
                        )));
                    }
                    if let Some(batch) = created.batch_number {
                        self.tables.claim_batch(batch, transaction_id)?;
                    }
                    self.tables
                        .transactions
                        .insert(transaction_id, Transaction::from_created(created));
                }
                other => {
                    if let TransferEvent::TransactionUpdated(updated) = other {
                        if updated.previous_batch_number != updated.batch_number {
                            if let Some(previous) = updated.previous_batch_number {
                                self.tables.release_batch(previous, transaction_id);
                            }
                            if let Some(batch) = updated.batch_number {
                                self.tables.claim_batch(batch, transaction_id)?;
                            }
                        }
                    }
                    let transaction = self
                        .tables
                        .transactions
                        .get_mut(&transaction_id)
                        .ok_or_else(|| {
                            StoreError::Inconsistent(format!(
                                "{} for unknown transaction {transaction_id}",
                                other.event_type()
                            ))
                        })?;
                    stockmove_core::Aggregate::apply(transaction, other);
                }
            }

            self.append(transaction_id.into(), TRANSACTION_AGGREGATE_TYPE, event)?;
        }
        Ok(())
    }

    /// Record inventory events (row creation, adjustments, resolutions).
    pub fn record_inventory(&mut self, events: &[InventoryEvent]) -> Result<(), StoreError> {
        for event in events {
            let row_id = event.row_id();
            match event {
                InventoryEvent::RowMaterialized(materialized) => {
                    if self.tables.rows.contains_key(&row_id) {
                        return Err(StoreError::UniqueViolation(format!(
                            "inventory row {row_id} already exists"
                        )));
                    }
                    self.tables
                        .rows
                        .insert(row_id, InventoryRow::materialize(materialized));
                }
                other => {
                    if let InventoryEvent::DiscrepancyResolved(resolved) = other {
                        if self.tables.resolutions.contains_key(&row_id) {
                            return Err(StoreError::UniqueViolation(format!(
                                "discrepancy row {row_id} already has a resolution"
                            )));
                        }
                        self.tables
                            .resolutions
                            .insert(row_id, resolved.resolution.clone());
                    }
                    let row = self.tables.rows.get_mut(&row_id).ok_or_else(|| {
                        StoreError::Inconsistent(format!(
                            "{} for unknown inventory row {row_id}",
                            other.event_type()
                        ))
                    })?;
                    row.apply(other);
                }
            }

            self.append(row_id.0, ROW_AGGREGATE_TYPE, event)?;
        }
        Ok(())
    }

    fn append<E>(
        &mut self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        event: &E,
    ) -> Result<(), StoreError>
    where
        E: Event + Serialize,
    {
        let uncommitted = UncommittedEvent::from_typed(aggregate_id, aggregate_type, event)?;
        let stream_version = self.tables.stream_version(aggregate_id) + 1;
        self.tables
            .stream_versions
            .insert(aggregate_id, stream_version);

        self.pending.push(StoredEvent::commit(
            uncommitted,
            self.next_sequence,
            stream_version,
        ));
        self.next_sequence += 1;
        Ok(())
    }
}
