//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Transaction lines and inventory rows are entities owned by an arena and
/// addressed by id, never by reference.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
