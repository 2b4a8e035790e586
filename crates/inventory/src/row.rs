use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockmove_core::{
    Actor, AggregateId, DomainError, Entity, TransactionId, TransactionItemId, ValueObject,
};

use crate::event::{InventoryEvent, RowMaterialized};

macro_rules! aggregate_newtype {
    ($(#[$meta:meta])* $t:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(pub AggregateId);

        impl $t {
            pub fn new(id: AggregateId) -> Self {
                Self(id)
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

aggregate_newtype!(
    /// Item type (master data; existence is checked by the caller).
    ItemTypeId
);
aggregate_newtype!(
    /// Warehouse (master data).
    WarehouseId
);
aggregate_newtype!(
    /// Piece of equipment (master data).
    EquipmentId
);
aggregate_newtype!(
    /// One inventory row in the arena.
    StockRowId
);

/// Where a row physically sits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum StockLocation {
    Warehouse(WarehouseId),
    Equipment(EquipmentId),
}

impl ValueObject for StockLocation {}

impl core::fmt::Display for StockLocation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StockLocation::Warehouse(id) => write!(f, "warehouse:{id}"),
            StockLocation::Equipment(id) => write!(f, "equipment:{id}"),
        }
    }
}

/// Warehouse rows are items; equipment rows are consumables. Same lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKind {
    Item,
    Consumable,
}

/// Status of an inventory row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Pending,
    /// Usable stock.
    #[serde(rename = "IN_WAREHOUSE")]
    Available,
    Delivering,
    Missing,
    Overreceived,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "PENDING",
            ItemStatus::Available => "IN_WAREHOUSE",
            ItemStatus::Delivering => "DELIVERING",
            ItemStatus::Missing => "MISSING",
            ItemStatus::Overreceived => "OVERRECEIVED",
        }
    }
}

impl core::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a quantity mismatch a discrepancy row records.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyKind {
    Missing,
    Overreceived,
}

impl DiscrepancyKind {
    pub fn status(self) -> ItemStatus {
        match self {
            DiscrepancyKind::Missing => ItemStatus::Missing,
            DiscrepancyKind::Overreceived => ItemStatus::Overreceived,
        }
    }
}

/// Original classification of a discrepancy row. Written once, never mutated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancySnapshot {
    pub kind: DiscrepancyKind,
    pub quantity: i64,
}

/// Back-reference from a row to the transaction line that produced it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineOrigin {
    pub transaction_id: TransactionId,
    pub line_id: TransactionItemId,
}

/// A physical quantity of one item type at one location.
///
/// Rows only change through [`InventoryEvent`]s, so the arena and any replayed
/// projection evolve through the same `apply`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRow {
    id: StockRowId,
    item_type: ItemTypeId,
    location: StockLocation,
    quantity: i64,
    status: ItemStatus,
    resolved: bool,
    created_at: DateTime<Utc>,
    created_by: Actor,
    origin: Option<LineOrigin>,
    discrepancy: Option<DiscrepancySnapshot>,
}

impl InventoryRow {
    pub fn materialize(e: &RowMaterialized) -> Self {
        Self {
            id: e.row_id,
            item_type: e.item_type,
            location: e.location,
            quantity: e.quantity,
            status: e.status,
            resolved: false,
            created_at: e.occurred_at,
            created_by: e.created_by.clone(),
            origin: e.origin,
            discrepancy: e.discrepancy,
        }
    }

    pub fn id_typed(&self) -> StockRowId {
        self.id
    }

    pub fn item_type(&self) -> ItemTypeId {
        self.item_type
    }

    pub fn location(&self) -> StockLocation {
        self.location
    }

    pub fn kind(&self) -> RowKind {
        match self.location {
            StockLocation::Warehouse(_) => RowKind::Item,
            StockLocation::Equipment(_) => RowKind::Consumable,
        }
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn resolved(&self) -> bool {
        self.resolved
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn created_by(&self) -> &Actor {
        &self.created_by
    }

    pub fn origin(&self) -> Option<LineOrigin> {
        self.origin
    }

    pub fn discrepancy(&self) -> Option<DiscrepancySnapshot> {
        self.discrepancy
    }

    /// Counts toward current usable stock.
    pub fn is_available(&self) -> bool {
        self.status == ItemStatus::Available
    }

    /// A discrepancy row still waiting for an operator.
    pub fn is_open_discrepancy(&self) -> bool {
        self.discrepancy.is_some() && !self.resolved
    }

    /// Oldest-first ordering used when choosing a row to merge into.
    pub fn age_key(&self) -> (DateTime<Utc>, StockRowId) {
        (self.created_at, self.id)
    }

    /// Evolve the row from one of its own events. Events for other rows and
    /// `RowMaterialized` (handled by [`InventoryRow::materialize`]) are ignored.
    pub fn apply(&mut self, event: &InventoryEvent) {
        if event.row_id() != self.id {
            return;
        }
        match event {
            InventoryEvent::RowMaterialized(_) => {}
            InventoryEvent::RowQuantityAdjusted(e) => self.quantity = e.quantity,
            InventoryEvent::RowStatusChanged(e) => self.status = e.to,
            InventoryEvent::DiscrepancyResolved(_) => self.resolved = true,
        }
    }

    /// Guard used before resolving: the row must have been created as a
    /// discrepancy and must not have been resolved yet.
    pub fn ensure_open_discrepancy(&self) -> Result<DiscrepancySnapshot, DomainError> {
        let Some(snapshot) = self.discrepancy else {
            return Err(DomainError::invalid_state(
                format!("inventory row {}", self.id),
                "MISSING or OVERRECEIVED",
                self.status.as_str(),
            ));
        };
        if self.resolved {
            return Err(DomainError::conflict(format!(
                "discrepancy row {} ({}) is already resolved",
                self.id,
                snapshot.kind.status()
            )));
        }
        Ok(snapshot)
    }
}

impl Entity for InventoryRow {
    type Id = StockRowId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
