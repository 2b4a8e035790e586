//! Projection implementations (read model builders).
//!
//! Projections consume committed events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: Can be reconstructed from the event log
//! - **Idempotent**: Safe for at-least-once delivery

pub mod inventory_stock;

pub use inventory_stock::{InventoryStockProjection, ProjectionError, StockBook};
