//! Discrepancy resolution policies (pure decision core).
//!
//! `plan_resolution` turns an open discrepancy row plus the rows it may touch
//! into the inventory events to commit and the audit record to keep. It never
//! reads storage; the caller looks up the sibling and merge-target rows and
//! commits the plan atomically together with the ledger rollup.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockmove_core::{Actor, AggregateId, DomainError, DomainResult};

use crate::event::{
    AdjustmentReason, DiscrepancyResolved, InventoryEvent, RowQuantityAdjusted, RowStatusChanged,
};
use crate::row::{InventoryRow, ItemStatus, LineOrigin, StockRowId};

/// Identifier of an [`ItemResolution`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolutionId(pub AggregateId);

impl ResolutionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ResolutionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The six mutually exclusive ways an operator can close a discrepancy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionType {
    /// Permanent shrinkage.
    AcknowledgeLoss,
    /// Same inventory effect as a loss, different audit classification.
    ReportTheft,
    /// The reported count was wrong; correct the row received for the same line.
    CountingError,
    /// The goods turned up; put them back into usable stock.
    FoundItems,
    /// Keep the surplus on record without adding it to usable stock.
    AcceptSurplus,
    /// The surplus goes back; the row waits for an outbound movement.
    ReturnToSender,
}

impl ResolutionType {
    pub const ALL: [ResolutionType; 6] = [
        ResolutionType::AcknowledgeLoss,
        ResolutionType::ReportTheft,
        ResolutionType::CountingError,
        ResolutionType::FoundItems,
        ResolutionType::AcceptSurplus,
        ResolutionType::ReturnToSender,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionType::AcknowledgeLoss => "ACKNOWLEDGE_LOSS",
            ResolutionType::ReportTheft => "REPORT_THEFT",
            ResolutionType::CountingError => "COUNTING_ERROR",
            ResolutionType::FoundItems => "FOUND_ITEMS",
            ResolutionType::AcceptSurplus => "ACCEPT_SURPLUS",
            ResolutionType::ReturnToSender => "RETURN_TO_SENDER",
        }
    }
}

impl core::fmt::Display for ResolutionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ResolutionType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DomainError::validation(format!("unknown resolution type '{wanted}'")))
    }
}

/// What a resolution did to inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum ResolutionEffect {
    NoInventoryChange,
    SiblingReduced { row_id: StockRowId, from: i64, to: i64 },
    /// COUNTING_ERROR found no row received for the same line.
    SiblingMissing,
    MergedInto { row_id: StockRowId, from: i64, to: i64 },
    ConvertedToAvailable,
    ReturnedToPending,
}

impl ResolutionEffect {
    pub fn warning(&self) -> Option<&'static str> {
        match self {
            ResolutionEffect::SiblingMissing => {
                Some("no inventory row received for the originating line; no adjustment applied")
            }
            _ => None,
        }
    }
}

/// Immutable audit record of how one discrepancy row was closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResolution {
    pub id: ResolutionId,
    pub row_id: StockRowId,
    pub origin: Option<LineOrigin>,
    pub resolution_type: ResolutionType,
    pub notes: String,
    pub resolved_by: Actor,
    pub resolved_at: DateTime<Utc>,
    pub original_status: ItemStatus,
    pub original_quantity: i64,
    pub effect: ResolutionEffect,
}

/// Command: resolve one discrepancy row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveDiscrepancy {
    pub resolution_id: ResolutionId,
    pub resolution_type: ResolutionType,
    pub notes: String,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

/// Rows a policy may touch, looked up by the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolutionContext<'a> {
    /// Available row created from the same originating line (COUNTING_ERROR).
    pub sibling: Option<&'a InventoryRow>,
    /// Oldest available row of the same item type at the same location (FOUND_ITEMS).
    pub merge_target: Option<&'a InventoryRow>,
}

/// Output of [`plan_resolution`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPlan {
    pub resolution: ItemResolution,
    /// Inventory events in commit order; the last one is always `DiscrepancyResolved`.
    pub events: Vec<InventoryEvent>,
}

/// Decide the inventory effect of resolving `discrepancy` with `cmd.resolution_type`.
///
/// Fails with `InvalidState` for rows that were never discrepancies and with
/// `Conflict` for rows already resolved.
pub fn plan_resolution(
    discrepancy: &InventoryRow,
    cmd: &ResolveDiscrepancy,
    ctx: ResolutionContext<'_>,
) -> DomainResult<ResolutionPlan> {
    let snapshot = discrepancy.ensure_open_discrepancy()?;
    let row_id = discrepancy.id_typed();
    let at = cmd.occurred_at;
    let usable = |r: &&InventoryRow| r.id_typed() != row_id && r.is_available();

    let mut events = Vec::new();
    let effect = match cmd.resolution_type {
        ResolutionType::AcknowledgeLoss
        | ResolutionType::ReportTheft
        | ResolutionType::AcceptSurplus => ResolutionEffect::NoInventoryChange,

        ResolutionType::CountingError => match ctx.sibling.filter(usable) {
            Some(sibling) => {
                let from = sibling.quantity();
                let to = (from - snapshot.quantity).max(0);
                events.push(InventoryEvent::RowQuantityAdjusted(RowQuantityAdjusted {
                    row_id: sibling.id_typed(),
                    previous: from,
                    quantity: to,
                    reason: AdjustmentReason::CountingError,
                    occurred_at: at,
                }));
                ResolutionEffect::SiblingReduced {
                    row_id: sibling.id_typed(),
                    from,
                    to,
                }
            }
            None => ResolutionEffect::SiblingMissing,
        },

        ResolutionType::FoundItems => match ctx.merge_target.filter(usable) {
            Some(target) => {
                let from = target.quantity();
                let to = from + snapshot.quantity;
                events.push(InventoryEvent::RowQuantityAdjusted(RowQuantityAdjusted {
                    row_id: target.id_typed(),
                    previous: from,
                    quantity: to,
                    reason: AdjustmentReason::FoundItems,
                    occurred_at: at,
                }));
                ResolutionEffect::MergedInto {
                    row_id: target.id_typed(),
                    from,
                    to,
                }
            }
            None => {
                events.push(InventoryEvent::RowStatusChanged(RowStatusChanged {
                    row_id,
                    from: discrepancy.status(),
                    to: ItemStatus::Available,
                    occurred_at: at,
                }));
                ResolutionEffect::ConvertedToAvailable
            }
        },

        ResolutionType::ReturnToSender => {
            events.push(InventoryEvent::RowStatusChanged(RowStatusChanged {
                row_id,
                from: discrepancy.status(),
                to: ItemStatus::Pending,
                occurred_at: at,
            }));
            ResolutionEffect::ReturnedToPending
        }
    };

    let resolution = ItemResolution {
        id: cmd.resolution_id,
        row_id,
        origin: discrepancy.origin(),
        resolution_type: cmd.resolution_type,
        notes: cmd.notes.clone(),
        resolved_by: cmd.actor.clone(),
        resolved_at: at,
        original_status: snapshot.kind.status(),
        original_quantity: snapshot.quantity,
        effect,
    };

    events.push(InventoryEvent::DiscrepancyResolved(DiscrepancyResolved {
        row_id,
        resolution: resolution.clone(),
        occurred_at: at,
    }));

    Ok(ResolutionPlan { resolution, events })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RowMaterialized;
    use crate::row::{DiscrepancyKind, DiscrepancySnapshot, ItemTypeId, StockLocation, WarehouseId};
    use chrono::Duration;
    use proptest::prelude::*;
    use stockmove_core::{TransactionId, TransactionItemId, UserId};

    fn test_actor() -> Actor {
        Actor::new(UserId::new(), "Dana Ops")
    }

    fn test_origin() -> LineOrigin {
        LineOrigin {
            transaction_id: TransactionId::new(),
            line_id: TransactionItemId::new(),
        }
    }

    fn row(
        item_type: ItemTypeId,
        location: StockLocation,
        quantity: i64,
        origin: Option<LineOrigin>,
        discrepancy: Option<DiscrepancyKind>,
        at: DateTime<Utc>,
    ) -> InventoryRow {
        InventoryRow::materialize(&RowMaterialized {
            row_id: StockRowId::new(AggregateId::new()),
            item_type,
            location,
            quantity,
            status: discrepancy.map(|k| k.status()).unwrap_or(ItemStatus::Available),
            origin,
            discrepancy: discrepancy.map(|kind| DiscrepancySnapshot { kind, quantity }),
            created_by: test_actor(),
            occurred_at: at,
        })
    }

    fn cmd(resolution_type: ResolutionType) -> ResolveDiscrepancy {
        ResolveDiscrepancy {
            resolution_id: ResolutionId::new(AggregateId::new()),
            resolution_type,
            notes: "checked by shift lead".to_string(),
            actor: test_actor(),
            occurred_at: Utc::now(),
        }
    }

    struct Fixture {
        received: InventoryRow,
        missing: InventoryRow,
    }

    /// 75 requested, 60 received: one available row of 60 and a MISSING row of 15.
    fn shortfall() -> Fixture {
        let item_type = ItemTypeId::new(AggregateId::new());
        let location = StockLocation::Warehouse(WarehouseId::new(AggregateId::new()));
        let origin = Some(test_origin());
        let now = Utc::now();
        Fixture {
            received: row(item_type, location, 60, origin, None, now),
            missing: row(item_type, location, 15, origin, Some(DiscrepancyKind::Missing), now),
        }
    }

    fn adjusted_quantity(plan: &ResolutionPlan) -> Option<(StockRowId, i64)> {
        plan.events.iter().find_map(|e| match e {
            InventoryEvent::RowQuantityAdjusted(a) => Some((a.row_id, a.quantity)),
            _ => None,
        })
    }

    #[test]
    fn counting_error_reduces_sibling_by_discrepancy_amount() {
        let f = shortfall();
        let ctx = ResolutionContext {
            sibling: Some(&f.received),
            merge_target: None,
        };

        let plan = plan_resolution(&f.missing, &cmd(ResolutionType::CountingError), ctx).unwrap();

        assert_eq!(adjusted_quantity(&plan), Some((f.received.id_typed(), 45)));
        assert_eq!(
            plan.resolution.effect,
            ResolutionEffect::SiblingReduced {
                row_id: f.received.id_typed(),
                from: 60,
                to: 45
            }
        );
        assert_eq!(plan.resolution.original_status, ItemStatus::Missing);
        assert_eq!(plan.resolution.original_quantity, 15);
        assert!(matches!(
            plan.events.last(),
            Some(InventoryEvent::DiscrepancyResolved(_))
        ));
    }

    #[test]
    fn counting_error_without_sibling_warns_and_changes_nothing() {
        let f = shortfall();
        let plan = plan_resolution(
            &f.missing,
            &cmd(ResolutionType::CountingError),
            ResolutionContext::default(),
        )
        .unwrap();

        assert_eq!(plan.events.len(), 1);
        assert_eq!(plan.resolution.effect, ResolutionEffect::SiblingMissing);
        assert!(plan.resolution.effect.warning().is_some());
    }

    #[test]
    fn found_items_merges_into_merge_target() {
        let f = shortfall();
        let ctx = ResolutionContext {
            sibling: None,
            merge_target: Some(&f.received),
        };

        let plan = plan_resolution(&f.missing, &cmd(ResolutionType::FoundItems), ctx).unwrap();

        assert_eq!(adjusted_quantity(&plan), Some((f.received.id_typed(), 75)));
    }

    #[test]
    fn found_items_without_target_converts_the_row() {
        let f = shortfall();
        let plan = plan_resolution(
            &f.missing,
            &cmd(ResolutionType::FoundItems),
            ResolutionContext::default(),
        )
        .unwrap();

        let mut converted = f.missing.clone();
        for e in &plan.events {
            converted.apply(e);
        }
        assert!(converted.is_available());
        assert!(converted.resolved());
        assert_eq!(converted.quantity(), 15);
        assert_eq!(
            converted.discrepancy().map(|d| d.kind),
            Some(DiscrepancyKind::Missing)
        );
    }

    #[test]
    fn return_to_sender_moves_row_to_pending() {
        let item_type = ItemTypeId::new(AggregateId::new());
        let location = StockLocation::Warehouse(WarehouseId::new(AggregateId::new()));
        let surplus = row(
            item_type,
            location,
            5,
            Some(test_origin()),
            Some(DiscrepancyKind::Overreceived),
            Utc::now(),
        );

        let plan = plan_resolution(
            &surplus,
            &cmd(ResolutionType::ReturnToSender),
            ResolutionContext::default(),
        )
        .unwrap();

        let mut after = surplus.clone();
        for e in &plan.events {
            after.apply(e);
        }
        assert_eq!(after.status(), ItemStatus::Pending);
        assert_eq!(after.quantity(), 5);
        assert_eq!(plan.resolution.original_status, ItemStatus::Overreceived);
    }

    #[test]
    fn loss_theft_and_surplus_only_close_the_row() {
        for t in [
            ResolutionType::AcknowledgeLoss,
            ResolutionType::ReportTheft,
            ResolutionType::AcceptSurplus,
        ] {
            let f = shortfall();
            let ctx = ResolutionContext {
                sibling: Some(&f.received),
                merge_target: Some(&f.received),
            };
            let plan = plan_resolution(&f.missing, &cmd(t), ctx).unwrap();
            assert_eq!(plan.events.len(), 1, "{t} must not touch inventory");
            assert_eq!(plan.resolution.effect, ResolutionEffect::NoInventoryChange);
        }
    }

    #[test]
    fn resolving_twice_is_a_conflict() {
        let f = shortfall();
        let plan = plan_resolution(
            &f.missing,
            &cmd(ResolutionType::AcknowledgeLoss),
            ResolutionContext::default(),
        )
        .unwrap();
        let mut closed = f.missing.clone();
        for e in &plan.events {
            closed.apply(e);
        }

        let err = plan_resolution(
            &closed,
            &cmd(ResolutionType::ReportTheft),
            ResolutionContext::default(),
        )
        .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn resolving_an_ordinary_row_is_a_state_error() {
        let f = shortfall();
        let err = plan_resolution(
            &f.received,
            &cmd(ResolutionType::AcknowledgeLoss),
            ResolutionContext::default(),
        )
        .unwrap_err();
        match err {
            DomainError::InvalidState { actual, .. } => assert_eq!(actual, "IN_WAREHOUSE"),
            other => panic!("expected InvalidState, got {other:?}"),
        }
    }

    #[test]
    fn merge_target_older_rows_are_chosen_by_caller_age_key() {
        let item_type = ItemTypeId::new(AggregateId::new());
        let location = StockLocation::Warehouse(WarehouseId::new(AggregateId::new()));
        let now = Utc::now();
        let newer = row(item_type, location, 3, None, None, now);
        let older = row(item_type, location, 9, None, None, now - Duration::hours(2));
        assert!(older.age_key() < newer.age_key());
    }

    #[test]
    fn resolution_type_parses_case_insensitively() {
        assert_eq!(
            "counting_error".parse::<ResolutionType>().unwrap(),
            ResolutionType::CountingError
        );
        assert!("WRITE_OFF".parse::<ResolutionType>().is_err());
        let json = serde_json::to_string(&ResolutionType::ReturnToSender).unwrap();
        assert_eq!(json, "\"RETURN_TO_SENDER\"");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: COUNTING_ERROR lowers the sibling by exactly the discrepancy
        /// amount and never below zero.
        #[test]
        fn counting_error_is_floored_at_zero(received in 0i64..10_000, missing in 1i64..10_000) {
            let item_type = ItemTypeId::new(AggregateId::new());
            let location = StockLocation::Warehouse(WarehouseId::new(AggregateId::new()));
            let origin = Some(test_origin());
            let now = Utc::now();
            let sibling = row(item_type, location, received, origin, None, now);
            let gap = row(item_type, location, missing, origin, Some(DiscrepancyKind::Missing), now);

            let ctx = ResolutionContext { sibling: Some(&sibling), merge_target: None };
            let plan = plan_resolution(&gap, &cmd(ResolutionType::CountingError), ctx).unwrap();

            let (_, after) = adjusted_quantity(&plan).unwrap();
            prop_assert!(after >= 0);
            prop_assert_eq!(after, (received - missing).max(0));
        }
    }
}
