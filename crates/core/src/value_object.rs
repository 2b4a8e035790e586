//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Parties, locations and batch numbers are compared by value: two
/// `Warehouse(w1)` locations are the same place regardless of which row names it.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
