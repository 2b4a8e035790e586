use crate::{Event, EventEnvelope};

/// A projection builds a read model from the append-only event log.
///
/// Read models are disposable: they can be dropped and rebuilt by replaying the
/// log from the first sequence number, which is exactly how stock accuracy is
/// audited.
///
/// `apply` must be idempotent. Delivery over the bus is at-least-once, so
/// implementations skip envelopes at or below the last sequence they applied.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
