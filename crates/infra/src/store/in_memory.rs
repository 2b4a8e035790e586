use std::sync::RwLock;

use super::log::StoredEvent;
use super::tables::{Tables, UnitOfWork};
use super::{Committed, TransferStore};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Inner {
    tables: Tables,
    log: Vec<StoredEvent>,
}

/// In-memory transfer store.
///
/// Units of work run under the write lock against a clone of the tables and
/// are swapped in on success. Intended for tests/dev and single-process
/// deployments; not optimized for large arenas.
#[derive(Debug, Default)]
pub struct InMemoryTransferStore {
    inner: RwLock<Inner>,
}

impl InMemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransferStore for InMemoryTransferStore {
    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&inner.tables))
    }

    fn transact<R, E>(
        &self,
        f: impl FnOnce(&mut UnitOfWork) -> Result<R, E>,
    ) -> Result<Committed<R>, E>
    where
        E: From<StoreError>,
    {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        let next_sequence = inner.log.len() as u64 + 1;
        let mut uow = UnitOfWork::begin(inner.tables.clone(), next_sequence);
        let value = f(&mut uow)?;

        // Swap in only after the closure succeeded.
        let (tables, events) = uow.finish();
        inner.tables = tables;
        inner.log.extend(events.iter().cloned());

        Ok(Committed { value, events })
    }

    fn events_after(&self, after: u64) -> Result<Vec<StoredEvent>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(inner.log.len());
        Ok(inner.log[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockmove_core::{Actor, AggregateId, ExpectedVersion, UserId};
    use stockmove_inventory::{
        InventoryEvent, ItemStatus, ItemTypeId, RowMaterialized, StockLocation, StockRowId,
        WarehouseId,
    };

    fn materialize(quantity: i64) -> InventoryEvent {
        InventoryEvent::RowMaterialized(RowMaterialized {
            row_id: StockRowId::new(AggregateId::new()),
            item_type: ItemTypeId::new(AggregateId::new()),
            location: StockLocation::Warehouse(WarehouseId::new(AggregateId::new())),
            quantity,
            status: ItemStatus::Available,
            origin: None,
            discrepancy: None,
            created_by: Actor::new(UserId::new(), "Ana Stock"),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn failed_unit_of_work_leaves_no_trace() {
        let store = InMemoryTransferStore::new();
        let result: Result<Committed<()>, StoreError> = store.transact(|uow| {
            uow.record_inventory(&[materialize(5)])?;
            Err(StoreError::Inconsistent("abort".to_string()))
        });
        assert!(result.is_err());

        assert_eq!(store.read(|t| t.rows().count()).unwrap(), 0);
        assert!(store.events_after(0).unwrap().is_empty());
    }

    #[test]
    fn sequence_numbers_are_global_and_gapless() {
        let store = InMemoryTransferStore::new();
        for q in [1, 2, 3] {
            let committed: Committed<()> = store
                .transact(|uow| uow.record_inventory(&[materialize(q)]))
                .unwrap();
            assert_eq!(committed.events.len(), 1);
        }

        let seqs: Vec<_> = store
            .events_after(0)
            .unwrap()
            .iter()
            .map(|e| (e.sequence_number, e.stream_version))
            .collect();
        assert_eq!(seqs, vec![(1, 1), (2, 1), (3, 1)]);
        assert_eq!(store.events_after(2).unwrap().len(), 1);
    }

    #[test]
    fn stored_payload_decodes_back_to_the_typed_event() {
        let store = InMemoryTransferStore::new();
        let event = materialize(9);
        store
            .transact(|uow| uow.record_inventory(std::slice::from_ref(&event)))
            .unwrap();

        let log = store.events_after(0).unwrap();
        assert_eq!(log[0].event_type, "inventory.row.materialized");
        assert_eq!(log[0].decode::<InventoryEvent>().unwrap(), event);
        assert!(log[0].decode::<u64>().is_err());
    }

    #[test]
    fn stale_expected_version_is_rejected() {
        let store = InMemoryTransferStore::new();
        let result: Result<Committed<()>, StoreError> = store.transact(|uow| {
            uow.record_transfer(stockmove_core::TransactionId::new(), ExpectedVersion::Exact(3), &[])
        });
        assert!(matches!(result, Err(StoreError::Concurrency(_))));
    }
}
