use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;
use thiserror::Error;

use stockmove_events::{EventEnvelope, Projection, Subscription};
use stockmove_inventory::{
    InventoryEvent, InventoryRow, ItemTypeId, ROW_AGGREGATE_TYPE, StockLocation, StockRowId,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("failed to deserialize inventory event at sequence {sequence}: {message}")]
    Deserialize { sequence: u64, message: String },

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("projection lock poisoned")]
    Poisoned,
}

/// Row-level read model: every inventory row, evolved from inventory events only.
#[derive(Debug, Clone, Default)]
pub struct StockBook {
    rows: HashMap<StockRowId, InventoryRow>,
}

impl StockBook {
    /// Sum of AVAILABLE rows. Pending, delivering and discrepancy rows never count.
    pub fn current_stock(&self, location: StockLocation, item_type: ItemTypeId) -> i64 {
        self.rows
            .values()
            .filter(|r| r.location() == location && r.item_type() == item_type && r.is_available())
            .map(InventoryRow::quantity)
            .sum()
    }

    pub fn row(&self, id: StockRowId) -> Option<&InventoryRow> {
        self.rows.get(&id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Projection for StockBook {
    type Ev = InventoryEvent;

    fn apply(&mut self, envelope: &EventEnvelope<InventoryEvent>) {
        match envelope.payload() {
            InventoryEvent::RowMaterialized(e) => {
                self.rows
                    .entry(e.row_id)
                    .or_insert_with(|| InventoryRow::materialize(e));
            }
            other => {
                if let Some(row) = self.rows.get_mut(&other.row_id()) {
                    row.apply(other);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct State {
    book: StockBook,
    cursor: u64,
}

/// Inventory stock projection.
///
/// Consumes published envelopes (JSON payloads) from the global log. Envelopes
/// of other aggregate types only advance the cursor. Read models are disposable
/// and rebuildable from the log.
#[derive(Debug, Default)]
pub struct InventoryStockProjection {
    state: RwLock<State>,
}

impl InventoryStockProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_stock(
        &self,
        location: StockLocation,
        item_type: ItemTypeId,
    ) -> Result<i64, ProjectionError> {
        let state = self.state.read().map_err(|_| ProjectionError::Poisoned)?;
        Ok(state.book.current_stock(location, item_type))
    }

    pub fn row(&self, id: StockRowId) -> Result<Option<InventoryRow>, ProjectionError> {
        let state = self.state.read().map_err(|_| ProjectionError::Poisoned)?;
        Ok(state.book.row(id).cloned())
    }

    /// Last applied sequence number.
    pub fn cursor(&self) -> Result<u64, ProjectionError> {
        let state = self.state.read().map_err(|_| ProjectionError::Poisoned)?;
        Ok(state.cursor)
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Idempotent for at-least-once delivery (sequences <= cursor are ignored)
    /// - Enforces gapless sequences once the first envelope has been applied
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let mut state = self.state.write().map_err(|_| ProjectionError::Poisoned)?;
        let seq = envelope.sequence_number();
        let last = state.cursor;

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            // Duplicate or replay; safe to ignore.
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        if envelope.aggregate_type() == ROW_AGGREGATE_TYPE {
            let event: InventoryEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| ProjectionError::Deserialize {
                    sequence: seq,
                    message: e.to_string(),
                })?;
            let typed = EventEnvelope::new(
                envelope.event_id(),
                envelope.aggregate_id(),
                envelope.aggregate_type(),
                seq,
                event,
            );
            state.book.apply(&typed);
        }

        // Advance cursor after successful apply.
        state.cursor = seq;
        Ok(())
    }

    /// Apply everything currently queued on a bus subscription. Returns how
    /// many envelopes were received.
    pub fn drain(&self, subscription: &Subscription<EventEnvelope<JsonValue>>) -> Result<usize, ProjectionError> {
        let mut received = 0;
        while let Ok(envelope) = subscription.try_recv() {
            self.apply_envelope(&envelope)?;
            received += 1;
        }
        Ok(received)
    }

    /// Rebuild the read model from scratch by replaying envelopes in log order.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        {
            let mut state = self.state.write().map_err(|_| ProjectionError::Poisoned)?;
            *state = State::default();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| e.sequence_number());

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockmove_core::{Actor, AggregateId, UserId};
    use stockmove_inventory::{
        AdjustmentReason, ItemStatus, RowMaterialized, RowQuantityAdjusted, WarehouseId,
    };
    use uuid::Uuid;

    struct Fixture {
        location: StockLocation,
        item_type: ItemTypeId,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                location: StockLocation::Warehouse(WarehouseId::new(AggregateId::new())),
                item_type: ItemTypeId::new(AggregateId::new()),
            }
        }

        fn materialized(&self, row_id: StockRowId, quantity: i64, status: ItemStatus) -> InventoryEvent {
            InventoryEvent::RowMaterialized(RowMaterialized {
                row_id,
                item_type: self.item_type,
                location: self.location,
                quantity,
                status,
                origin: None,
                discrepancy: None,
                created_by: Actor::new(UserId::new(), "Ana Stock"),
                occurred_at: Utc::now(),
            })
        }
    }

    fn envelope(seq: u64, event: &InventoryEvent) -> EventEnvelope<JsonValue> {
            EventEnvelope::new(
            Uuid::now_v7(),
            event.row_id().0,
            ROW_AGGREGATE_TYPE,
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    #[test]
    fn only_available_rows_count() {
        let f = Fixture::new();
        let p = InventoryStockProjection::new();
        let events = [
            f.materialized(StockRowId::new(AggregateId::new()), 48, ItemStatus::Available),
            f.materialized(StockRowId::new(AggregateId::new()), 2, ItemStatus::Missing),
            f.materialized(StockRowId::new(AggregateId::new()), 7, ItemStatus::Pending),
        ];
        for (i, e) in events.iter().enumerate() {
            p.apply_envelope(&envelope(i as u64 + 1, e)).unwrap();
        }
        assert_eq!(p.current_stock(f.location, f.item_type).unwrap(), 48);
    }

    #[test]
    fn duplicates_are_ignored_and_gaps_rejected() {
        let f = Fixture::new();
        let row = StockRowId::new(AggregateId::new());
        let p = InventoryStockProjection::new();

        let first = envelope(1, &f.materialized(row, 10, ItemStatus::Available));
        p.apply_envelope(&first).unwrap();
        p.apply_envelope(&first).unwrap();
        assert_eq!(p.current_stock(f.location, f.item_type).unwrap(), 10);

        let adjust = InventoryEvent::RowQuantityAdjusted(RowQuantityAdjusted {
            row_id: row,
            previous: 10,
            quantity: 4,
            reason: AdjustmentReason::CountingError,
            occurred_at: Utc::now(),
        });
        let err = p.apply_envelope(&envelope(3, &adjust)).unwrap_err();
        assert_eq!(err, ProjectionError::NonMonotonicSequence { last: 1, found: 3 });

        p.apply_envelope(&envelope(2, &adjust)).unwrap();
        assert_eq!(p.current_stock(f.location, f.item_type).unwrap(), 4);
        assert_eq!(p.cursor().unwrap(), 2);
    }

    #[test]
    fn other_aggregates_only_advance_the_cursor() {
        let p = InventoryStockProjection::new();
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            AggregateId::new(),
            "transfer.transaction",
            1,
            serde_json::json!({ "TransactionRejected": {} }),
        );
        p.apply_envelope(&env).unwrap();
        assert_eq!(p.cursor().unwrap(), 1);
    }

    #[test]
    fn rebuild_replays_in_sequence_order() {
        let f = Fixture::new();
        let row = StockRowId::new(AggregateId::new());
        let adjust = InventoryEvent::RowQuantityAdjusted(RowQuantityAdjusted {
            row_id: row,
            previous: 5,
            quantity: 9,
            reason: AdjustmentReason::FoundItems,
            occurred_at: Utc::now(),
        });
        let envs = vec![
            envelope(2, &adjust),
            envelope(1, &f.materialized(row, 5, ItemStatus::Available)),
        ];

        let p = InventoryStockProjection::new();
        p.rebuild_from_scratch(envs.clone()).unwrap();
        assert_eq!(p.current_stock(f.location, f.item_type).unwrap(), 9);

        // Rebuilding again starts from an empty book.
        p.rebuild_from_scratch(envs).unwrap();
        assert_eq!(p.current_stock(f.location, f.item_type).unwrap(), 9);
    }
}
