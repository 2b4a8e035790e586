use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockmove_core::Actor;
use stockmove_events::Event;

use crate::resolution::ItemResolution;
use crate::row::{
    DiscrepancySnapshot, ItemStatus, ItemTypeId, LineOrigin, StockLocation, StockRowId,
};

/// Aggregate type recorded on inventory envelopes.
pub const ROW_AGGREGATE_TYPE: &str = "inventory.row";

/// Event: RowMaterialized (ordinary stock, acceptance residue, or a discrepancy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowMaterialized {
    pub row_id: StockRowId,
    pub item_type: ItemTypeId,
    pub location: StockLocation,
    pub quantity: i64,
    pub status: ItemStatus,
    pub origin: Option<LineOrigin>,
    pub discrepancy: Option<DiscrepancySnapshot>,
    pub created_by: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Why a row's quantity changed after creation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentReason {
    CountingError,
    FoundItems,
}

/// Event: RowQuantityAdjusted. Carries the absolute new quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowQuantityAdjusted {
    pub row_id: StockRowId,
    pub previous: i64,
    pub quantity: i64,
    pub reason: AdjustmentReason,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RowStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowStatusChanged {
    pub row_id: StockRowId,
    pub from: ItemStatus,
    pub to: ItemStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DiscrepancyResolved. Carries the immutable audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyResolved {
    pub row_id: StockRowId,
    pub resolution: ItemResolution,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryEvent {
    RowMaterialized(RowMaterialized),
    RowQuantityAdjusted(RowQuantityAdjusted),
    RowStatusChanged(RowStatusChanged),
    DiscrepancyResolved(DiscrepancyResolved),
}

impl InventoryEvent {
    pub fn row_id(&self) -> StockRowId {
        match self {
            InventoryEvent::RowMaterialized(e) => e.row_id,
            InventoryEvent::RowQuantityAdjusted(e) => e.row_id,
            InventoryEvent::RowStatusChanged(e) => e.row_id,
            InventoryEvent::DiscrepancyResolved(e) => e.row_id,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::RowMaterialized(_) => "inventory.row.materialized",
            InventoryEvent::RowQuantityAdjusted(_) => "inventory.row.quantity_adjusted",
            InventoryEvent::RowStatusChanged(_) => "inventory.row.status_changed",
            InventoryEvent::DiscrepancyResolved(_) => "inventory.row.discrepancy_resolved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::RowMaterialized(e) => e.occurred_at,
            InventoryEvent::RowQuantityAdjusted(e) => e.occurred_at,
            InventoryEvent::RowStatusChanged(e) => e.occurred_at,
            InventoryEvent::DiscrepancyResolved(e) => e.occurred_at,
        }
    }
}
