//! Transfer engine: the application service over the ledger, the batch index,
//! the inventory arena and the resolution audit trail.
//!
//! Every mutating call follows the same pipeline:
//!
//! ```text
//! request
//!   ↓
//! 1. Master-data checks (item types, locations, maintenance records)
//!   ↓
//! 2. Unit of work: load state, decide events (pure domain code), re-check
//!    preconditions, record ledger + inventory events together
//!   ↓
//! 3. Commit (all or nothing)
//!   ↓
//! 4. Publish committed events to the bus (projections, dashboards)
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use stockmove_core::{
    Actor, Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion, TransactionId,
    TransactionItemId,
};
use stockmove_events::{EventBus, EventEnvelope};
use stockmove_inventory::{
    DiscrepancySnapshot, InventoryEvent, InventoryRow, ItemResolution,
    ItemStatus, ItemTypeId, ResolutionContext, ResolutionId, ResolutionType, ResolveDiscrepancy,
    RowMaterialized, StockLocation, StockRowId, plan_resolution,
};
use stockmove_transfers::{
    AcceptTransaction, BatchNumber, BatchValidation, CreateTransaction, InitiatingParty,
    LinkMaintenance, MaintenanceRecordId, Party, Purpose, RejectTransaction, RequestedLine,
    ResolveLine, StockEffect, Transaction, TransferCommand, TransferEvent, UpdateTransaction,
    classify, ensure_claimable, ensure_unique, is_available, stock_effects,
};

use crate::error::{EngineError, StoreError};
use crate::master_data::MasterData;
use crate::projections::InventoryStockProjection;
use crate::settings::EngineSettings;
use crate::store::{StoredEvent, Tables, TransferStore, UnitOfWork};

/// A line as requested by the creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewLine {
    pub item_type: ItemTypeId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub sender: Party,
    pub receiver: Party,
    pub items: Vec<NewLine>,
    pub transfer_date: DateTime<Utc>,
    pub actor: Actor,
    pub batch_number: Option<BatchNumber>,
    pub initiated_by: InitiatingParty,
    /// Advisory only; the receiving side decides the purpose at acceptance.
    pub purpose_hint: Option<Purpose>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionChanges {
    pub items: Vec<NewLine>,
    pub transfer_date: DateTime<Utc>,
    pub batch_number: Option<BatchNumber>,
    pub actor: Actor,
}

/// What the receiving side reports for a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptSubmission {
    pub transaction_id: TransactionId,
    pub received: BTreeMap<TransactionItemId, i64>,
    pub not_received: BTreeMap<TransactionItemId, bool>,
    pub actor: Actor,
    pub comment: String,
    pub purpose: Option<Purpose>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptanceOutcome {
    pub transaction: Transaction,
    /// Rows created by this acceptance (received stock first, then any
    /// discrepancy for the same line).
    pub rows: Vec<InventoryRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub row_id: StockRowId,
    pub resolution_type: ResolutionType,
    pub notes: String,
    pub actor: Actor,
    /// When given, must be the transaction the row originated from.
    pub originating_transaction_id: Option<TransactionId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOutcome {
    pub resolution: ItemResolution,
    /// Parent transaction after roll-up, for rows that came from a transfer.
    pub transaction: Option<Transaction>,
}

/// Reconciliation engine service.
///
/// Generic over its store, bus and master-data port so tests run fully in memory.
#[derive(Debug)]
pub struct TransferEngine<S, B, M> {
    store: S,
    bus: B,
    master_data: M,
    settings: EngineSettings,
}

impl<S, B, M> TransferEngine<S, B, M> {
    pub fn new(store: S, bus: B, master_data: M, settings: EngineSettings) -> Self {
        Self {
            store,
            bus,
            master_data,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn master_data(&self) -> &M {
        &self.master_data
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

fn loaded(tables: &Tables, id: TransactionId) -> Result<&Transaction, DomainError> {
    tables
        .transaction(id)
        .ok_or_else(|| DomainError::not_found(format!("transaction {id}")))
}

fn requested_lines(items: &[NewLine]) -> Vec<RequestedLine> {
    items
        .iter()
        .map(|l| RequestedLine {
            line_id: TransactionItemId::new(),
            item_type: l.item_type,
            quantity: l.quantity,
        })
        .collect()
}

/// Decide and record one ledger command against the current state of `id`.
fn run_transfer(
    uow: &mut UnitOfWork,
    id: TransactionId,
    command: &TransferCommand,
) -> Result<Vec<TransferEvent>, EngineError> {
    let (version, events) = {
        let transaction = loaded(uow, id)?;
        (transaction.version(), transaction.handle(command)?)
    };
    uow.record_transfer(id, ExpectedVersion::Exact(version), &events)?;
    Ok(events)
}

fn snapshot(uow: &UnitOfWork, id: TransactionId) -> Result<Transaction, EngineError> {
    Ok(loaded(uow, id)?.clone())
}

impl<S, B, M> TransferEngine<S, B, M>
where
    S: TransferStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    M: MasterData,
{
    fn publish(&self, events: &[StoredEvent]) -> Result<(), EngineError> {
        for stored in events {
            self.bus.publish(stored.to_envelope()).map_err(|e| {
                warn!(sequence = stored.sequence_number, "publish failed after commit");
                EngineError::Publish(format!("{e:?}"))
            })?;
        }
        Ok(())
    }

    fn ensure_items(&self, items: &[NewLine]) -> Result<(), EngineError> {
        for line in items {
            self.master_data.ensure_item_type(line.item_type)?;
        }
        Ok(())
    }

    /// Create a transaction with every line PENDING, claiming `batch_number`
    /// in the same unit of work.
    #[instrument(
        skip_all,
        fields(
            sender = %request.sender,
            receiver = %request.receiver,
            batch = ?request.batch_number.map(BatchNumber::get),
            lines = request.items.len()
        ),
        err
    )]
    pub fn create_transaction(&self, request: NewTransaction) -> Result<Transaction, EngineError> {
        let now = Utc::now();
        let cmd = CreateTransaction {
            transaction_id: TransactionId::new(),
            sender: request.sender,
            receiver: request.receiver,
            lines: requested_lines(&request.items),
            transfer_date: request.transfer_date,
            actor: request.actor,
            batch_number: request.batch_number,
            initiated_by: request.initiated_by,
            purpose_hint: request.purpose_hint,
            occurred_at: now,
        };
        let events = Transaction::handle_create(&cmd)?;

        self.master_data.ensure_party(cmd.sender)?;
        self.master_data.ensure_party(cmd.receiver)?;
        self.ensure_items(&request.items)?;

        let policy = self.settings.batch_reuse;
        let committed = self.store.transact(|uow| -> Result<Transaction, EngineError> {
            if let Some(batch) = cmd.batch_number {
                ensure_claimable(
                    batch,
                    uow.batch_binding(batch).as_ref(),
                    cmd.transaction_id,
                    policy,
                )?;
            }
            uow.record_transfer(cmd.transaction_id, ExpectedVersion::Exact(0), &events)?;
            snapshot(uow, cmd.transaction_id)
        })?;

        self.publish(&committed.events)?;
        info!(transaction_id = %committed.value.id_typed(), "transaction created");
        Ok(committed.value)
    }

    /// Replace the lines (and optionally the batch number) of a PENDING transaction.
    #[instrument(skip_all, fields(transaction_id = %id, lines = changes.items.len()), err)]
    pub fn update_transaction(
        &self,
        id: TransactionId,
        changes: TransactionChanges,
    ) -> Result<Transaction, EngineError> {
        self.ensure_items(&changes.items)?;

        let cmd = TransferCommand::Update(UpdateTransaction {
            transaction_id: id,
            lines: requested_lines(&changes.items),
            transfer_date: changes.transfer_date,
            batch_number: changes.batch_number,
            actor: changes.actor,
            occurred_at: Utc::now(),
        });
        let policy = self.settings.batch_reuse;

        let committed = self.store.transact(|uow| -> Result<Transaction, EngineError> {
            let current_batch = loaded(uow, id)?.batch_number();
            if let Some(batch) = changes.batch_number.filter(|b| Some(*b) != current_batch) {
                ensure_claimable(batch, uow.batch_binding(batch).as_ref(), id, policy)?;
            }
            run_transfer(uow, id, &cmd)?;
            snapshot(uow, id)
        })?;

        self.publish(&committed.events)?;
        info!(transaction_id = %id, "transaction updated");
        Ok(committed.value)
    }

    /// Tag a PENDING transaction as maintenance-related.
    #[instrument(skip_all, fields(transaction_id = %id, record = %record_id), err)]
    pub fn link_maintenance(
        &self,
        id: TransactionId,
        record_id: MaintenanceRecordId,
    ) -> Result<Transaction, EngineError> {
        self.master_data.ensure_maintenance_record(record_id)?;

        let cmd = TransferCommand::LinkMaintenance(LinkMaintenance {
            transaction_id: id,
            record_id,
            occurred_at: Utc::now(),
        });
        let committed = self.store.transact(|uow| -> Result<Transaction, EngineError> {
            run_transfer(uow, id, &cmd)?;
            snapshot(uow, id)
        })?;

        self.publish(&committed.events)?;
        debug!(transaction_id = %id, "maintenance record linked");
        Ok(committed.value)
    }

    /// The receiving side refuses the whole transfer. No stock is recorded.
    #[instrument(skip_all, fields(transaction_id = %id), err)]
    pub fn reject_transaction(
        &self,
        id: TransactionId,
        reason: &str,
        actor: Actor,
    ) -> Result<Transaction, EngineError> {
        let cmd = TransferCommand::Reject(RejectTransaction {
            transaction_id: id,
            reason: reason.to_string(),
            actor,
            occurred_at: Utc::now(),
        });
        let committed = self.store.transact(|uow| -> Result<Transaction, EngineError> {
            run_transfer(uow, id, &cmd)?;
            snapshot(uow, id)
        })?;

        self.publish(&committed.events)?;
        info!(transaction_id = %id, "transaction rejected");
        Ok(committed.value)
    }

    /// Reconcile the receiver's report: classify every line, write received
    /// stock and discrepancy rows, conclude the transaction.
    #[instrument(skip_all, fields(transaction_id = %submission.transaction_id), err)]
    pub fn accept_transaction(
        &self,
        submission: ReceiptSubmission,
    ) -> Result<AcceptanceOutcome, EngineError> {
        let id = submission.transaction_id;
        let now = Utc::now();
        let actor = submission.actor.clone();
        let requested_purpose = submission.purpose;
        let cmd = TransferCommand::Accept(AcceptTransaction {
            transaction_id: id,
            received: submission.received,
            not_received: submission.not_received,
            actor: submission.actor,
            comment: submission.comment,
            purpose: submission.purpose,
            occurred_at: now,
        });

        let committed = self.store.transact(|uow| -> Result<AcceptanceOutcome, EngineError> {
            let (location, linked) = {
                let transaction = loaded(uow, id)?;
                (
                    transaction.receiver().location(),
                    transaction.maintenance_record().is_some(),
                )
            };
            if linked && requested_purpose.is_some_and(|p| p != Purpose::Maintenance) {
                debug!(transaction_id = %id, "maintenance link overrides requested purpose");
            }

            let events = run_transfer(uow, id, &cmd)?;
            let outcomes = events
                .iter()
                .find_map(|e| match e {
                    TransferEvent::TransactionReconciled(r) => Some(r.outcomes.as_slice()),
                    _ => None,
                })
                .unwrap_or_default();

            let mut touched = Vec::new();
            for effect in stock_effects(id, location, outcomes) {
                let event = inventory_event_for(effect, &actor, now);
                touched.push(event.row_id());
                uow.record_inventory(std::slice::from_ref(&event))?;
            }

            Ok(AcceptanceOutcome {
                transaction: snapshot(uow, id)?,
                rows: touched
                    .iter()
                    .filter_map(|row_id| uow.row(*row_id).cloned())
                    .collect(),
            })
        })?;

        self.publish(&committed.events)?;
        info!(
            transaction_id = %id,
            status = %committed.value.transaction.status(),
            rows = committed.value.rows.len(),
            "transaction reconciled"
        );
        Ok(committed.value)
    }

    /// Check a batch number on behalf of `entity` (a warehouse or equipment id).
    #[instrument(skip_all, fields(batch = batch.get(), entity = %entity), err)]
    pub fn validate_batch(
        &self,
        batch: BatchNumber,
        entity: AggregateId,
    ) -> Result<BatchValidation, EngineError> {
        let policy = self.settings.batch_reuse;
        let validation = self
            .store
            .read(|t| classify(batch, t.batch_binding(batch).as_ref(), entity, policy))?;
        debug!(scenario = ?validation.scenario, "batch classified");
        Ok(validation)
    }

    /// Fails with a conflict iff a non-terminal transaction holds `batch`.
    pub fn validate_batch_number_uniqueness(&self, batch: BatchNumber) -> Result<(), EngineError> {
        self.store
            .read(|t| ensure_unique(batch, t.batch_binding(batch).as_ref()))??;
        Ok(())
    }

    /// Side-effect-free check: could a new transaction claim `batch` right now?
    pub fn is_batch_number_available(&self, batch: BatchNumber) -> Result<bool, EngineError> {
        let policy = self.settings.batch_reuse;
        Ok(self
            .store
            .read(|t| is_available(t.batch_binding(batch).as_ref(), policy))?)
    }

    /// Close one discrepancy row with a policy, write its audit record, and
    /// roll the originating transaction up.
    #[instrument(
        skip_all,
        fields(row_id = %request.row_id, resolution = %request.resolution_type),
        err
    )]
    pub fn resolve_discrepancy(
        &self,
        request: ResolutionRequest,
    ) -> Result<ResolutionOutcome, EngineError> {
        let now = Utc::now();
        let row_id = request.row_id;
        let cmd = ResolveDiscrepancy {
            resolution_id: ResolutionId::new(AggregateId::new()),
            resolution_type: request.resolution_type,
            notes: request.notes,
            actor: request.actor,
            occurred_at: now,
        };

        let committed = self.store.transact(|uow| -> Result<ResolutionOutcome, EngineError> {
            let (plan, origin) = {
                let row = uow
                    .row(row_id)
                    .ok_or_else(|| DomainError::not_found(format!("inventory row {row_id}")))?;
                let origin = row.origin();
                if let Some(expected) = request.originating_transaction_id {
                    if origin.map(|o| o.transaction_id) != Some(expected) {
                        return Err(DomainError::validation(format!(
                            "inventory row {row_id} did not originate from transaction {expected}"
                        ))
                        .into());
                    }
                }
                let ctx = ResolutionContext {
                    sibling: origin.and_then(|o| uow.received_row(o)),
                    merge_target: uow.oldest_available(row.location(), row.item_type(), row_id),
                };
                (plan_resolution(row, &cmd, ctx)?, origin)
            };

            uow.record_inventory(&plan.events)?;

            let transaction = match origin {
                Some(origin) => {
                    let resolve = TransferCommand::ResolveLine(ResolveLine {
                        transaction_id: origin.transaction_id,
                        line_id: origin.line_id,
                        occurred_at: now,
                    });
                    run_transfer(uow, origin.transaction_id, &resolve)?;
                    Some(snapshot(uow, origin.transaction_id)?)
                }
                None => None,
            };

            Ok(ResolutionOutcome {
                resolution: plan.resolution,
                transaction,
            })
        })?;

        self.publish(&committed.events)?;
        let outcome = committed.value;
        if let Some(warning) = outcome.resolution.effect.warning() {
            warn!(row_id = %row_id, "{warning}");
        }
        info!(
            row_id = %row_id,
            resolution_id = %outcome.resolution.id,
            transaction_status = ?outcome.transaction.as_ref().map(|t| t.status()),
            "discrepancy resolved"
        );
        Ok(outcome)
    }

    /// Record ordinary (non-transfer) stock at a location.
    #[instrument(skip_all, fields(location = %location, item_type = %item_type, quantity = quantity), err)]
    pub fn record_stock(
        &self,
        location: StockLocation,
        item_type: ItemTypeId,
        quantity: i64,
        actor: Actor,
    ) -> Result<InventoryRow, EngineError> {
        if quantity <= 0 {
            return Err(DomainError::validation(format!(
                "stock quantity must be positive, got {quantity}"
            ))
            .into());
        }
        self.master_data.ensure_location(location)?;
        self.master_data.ensure_item_type(item_type)?;

        let row_id = StockRowId::new(AggregateId::new());
        let event = InventoryEvent::RowMaterialized(RowMaterialized {
            row_id,
            item_type,
            location,
            quantity,
            status: ItemStatus::Available,
            origin: None,
            discrepancy: None,
            created_by: actor,
            occurred_at: Utc::now(),
        });
        let committed = self.store.transact(|uow| -> Result<InventoryRow, EngineError> {
            uow.record_inventory(std::slice::from_ref(&event))?;
            uow.row(row_id).cloned().ok_or_else(|| {
                StoreError::Inconsistent(format!("row {row_id} missing after insert")).into()
            })
        })?;

        self.publish(&committed.events)?;
        Ok(committed.value)
    }

    /// Usable stock: sum of AVAILABLE rows of `item_type` at `location`.
    pub fn current_stock(
        &self,
        location: StockLocation,
        item_type: ItemTypeId,
    ) -> Result<i64, EngineError> {
        Ok(self
            .store
            .read(|t| t.available_quantity(location, item_type))?)
    }

    /// Replay the committed log into a fresh projection and compare it with the
    /// materialized arena. Reports drift; never repairs.
    #[instrument(skip_all, fields(location = %location, item_type = %item_type), err)]
    pub fn validate_stock_accuracy(
        &self,
        location: StockLocation,
        item_type: ItemTypeId,
    ) -> Result<bool, EngineError> {
        let log = self.store.events_after(0)?;
        let materialized = self.current_stock(location, item_type)?;

        let replayed = InventoryStockProjection::new();
        replayed
            .rebuild_from_scratch(log.iter().map(StoredEvent::to_envelope))
            .map_err(|e| StoreError::Inconsistent(e.to_string()))?;
        let expected = replayed
            .current_stock(location, item_type)
            .map_err(|e| StoreError::Inconsistent(e.to_string()))?;

        if expected != materialized {
            warn!(expected, materialized, "stock drift detected");
            return Ok(false);
        }
        Ok(true)
    }

    pub fn transaction(&self, id: TransactionId) -> Result<Transaction, EngineError> {
        Ok(self.store.read(|t| loaded(t, id).cloned())??)
    }

    pub fn transactions_for_party(&self, party: Party) -> Result<Vec<Transaction>, EngineError> {
        Ok(self.store.read(|t| {
            t.transactions_for_party(party)
                .into_iter()
                .cloned()
                .collect()
        })?)
    }

    pub fn transaction_by_batch(
        &self,
        batch: BatchNumber,
    ) -> Result<Option<Transaction>, EngineError> {
        Ok(self.store.read(|t| t.batch_holder(batch).cloned())?)
    }

    pub fn stock_rows(
        &self,
        location: StockLocation,
        item_type: ItemTypeId,
    ) -> Result<Vec<InventoryRow>, EngineError> {
        Ok(self.store.read(|t| {
            t.rows_at(location, item_type)
                .into_iter()
                .cloned()
                .collect()
        })?)
    }

    /// Open discrepancy rows, oldest first, optionally limited to one location.
    pub fn unresolved_discrepancies(
        &self,
        location: Option<StockLocation>,
    ) -> Result<Vec<InventoryRow>, EngineError> {
        Ok(self.store.read(|t| {
            let mut rows: Vec<_> = t
                .rows()
                .filter(|r| r.is_open_discrepancy())
                .filter(|r| location.is_none_or(|l| r.location() == l))
                .cloned()
                .collect();
            rows.sort_by_key(InventoryRow::age_key);
            rows
        })?)
    }

    pub fn resolutions_for_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Vec<ItemResolution>, EngineError> {
        Ok(self.store.read(|t| {
            let mut found: Vec<_> = t
                .resolutions()
                .filter(|r| r.origin.is_some_and(|o| o.transaction_id == id))
                .cloned()
                .collect();
            found.sort_by_key(|r| (r.resolved_at, r.row_id));
            found
        })?)
    }

    pub fn resolution_for_row(&self, row: StockRowId) -> Result<Option<ItemResolution>, EngineError> {
        Ok(self.store.read(|t| t.resolution_for_row(row).cloned())?)
    }

    /// Committed log entries after `sequence`, for catching up read models.
    pub fn events_after(&self, sequence: u64) -> Result<Vec<StoredEvent>, EngineError> {
        Ok(self.store.events_after(sequence)?)
    }
}

/// Inventory event implementing one acceptance stock effect. Every effect
/// materializes a fresh row linked to its originating line.
fn inventory_event_for(effect: StockEffect, actor: &Actor, at: DateTime<Utc>) -> InventoryEvent {
    match effect {
        StockEffect::Receive {
            origin,
            item_type,
            location,
            quantity,
        } => InventoryEvent::RowMaterialized(RowMaterialized {
            row_id: StockRowId::new(AggregateId::new()),
            item_type,
            location,
            quantity,
            status: ItemStatus::Available,
            origin: Some(origin),
            discrepancy: None,
            created_by: actor.clone(),
            occurred_at: at,
        }),
        StockEffect::OpenDiscrepancy {
            origin,
            item_type,
            location,
            kind,
            quantity,
        } => InventoryEvent::RowMaterialized(RowMaterialized {
            row_id: StockRowId::new(AggregateId::new()),
            item_type,
            location,
            quantity,
            status: kind.status(),
            origin: Some(origin),
            discrepancy: Some(DiscrepancySnapshot { kind, quantity }),
            created_by: actor.clone(),
            occurred_at: at,
        }),
    }
}
