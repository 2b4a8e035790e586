//! Transfer store boundary.
//!
//! One store holds the ledger, the inventory arena, the resolution records and
//! the global event log. Every mutating engine call is a single unit of work:
//! it sees a consistent snapshot, records events, and either commits all of
//! them or none.

pub mod in_memory;
pub mod log;
pub mod tables;

use std::sync::Arc;

pub use in_memory::InMemoryTransferStore;
pub use log::{StoredEvent, UncommittedEvent};
pub use tables::{Tables, UnitOfWork};

use crate::error::StoreError;

/// Result of a committed unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<R> {
    pub value: R,
    /// Events appended by the unit of work, in log order.
    pub events: Vec<StoredEvent>,
}

/// Storage for the engine.
///
/// Implementations must:
/// - run `transact` closures serially against a private working copy
/// - make the closure's effects visible only if it returns `Ok`
/// - assign global sequence numbers without gaps
pub trait TransferStore: Send + Sync {
    /// Run a read-only query against the current committed state.
    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, StoreError>;

    /// Run one unit of work.
    fn transact<R, E>(
        &self,
        f: impl FnOnce(&mut UnitOfWork) -> Result<R, E>,
    ) -> Result<Committed<R>, E>
    where
        E: From<StoreError>;

    /// Committed events with a sequence number greater than `after`.
    fn events_after(&self, after: u64) -> Result<Vec<StoredEvent>, StoreError>;
}

impl<S> TransferStore for Arc<S>
where
    S: TransferStore + ?Sized,
{
    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, StoreError> {
        (**self).read(f)
    }

    fn transact<R, E>(
        &self,
        f: impl FnOnce(&mut UnitOfWork) -> Result<R, E>,
    ) -> Result<Committed<R>, E>
    where
        E: From<StoreError>,
    {
        (**self).transact(f)
    }

    fn events_after(&self, after: u64) -> Result<Vec<StoredEvent>, StoreError> {
        (**self).events_after(after)
    }
}
