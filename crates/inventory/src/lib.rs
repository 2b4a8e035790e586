//! Inventory rows, discrepancies and their resolution policies.
//!
//! Pure domain logic (no IO, no storage): rows evolve only through
//! [`InventoryEvent`]s, and resolution policies are planned as events plus an
//! immutable audit record.

pub mod event;
pub mod resolution;
pub mod row;

pub use event::{
    AdjustmentReason, DiscrepancyResolved, InventoryEvent, ROW_AGGREGATE_TYPE, RowMaterialized,
    RowQuantityAdjusted, RowStatusChanged,
};
pub use resolution::{
    ItemResolution, ResolutionContext, ResolutionEffect, ResolutionId, ResolutionPlan,
    ResolutionType, ResolveDiscrepancy, plan_resolution,
};
pub use row::{
    DiscrepancyKind, DiscrepancySnapshot, EquipmentId, InventoryRow, ItemStatus, ItemTypeId,
    LineOrigin, RowKind, StockLocation, StockRowId, WarehouseId,
};
