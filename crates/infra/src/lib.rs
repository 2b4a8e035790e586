//! Infrastructure layer: the transfer engine service, storage, projections,
//! master-data ports and settings.

pub mod engine;
pub mod error;
pub mod master_data;
pub mod projections;
pub mod settings;
pub mod store;


pub use engine::{
    AcceptanceOutcome, NewLine, NewTransaction, ReceiptSubmission, ResolutionOutcome,
    ResolutionRequest, TransactionChanges, TransferEngine,
};
pub use error::{EngineError, StoreError};
pub use master_data::{InMemoryMasterData, MasterData};
pub use projections::{InventoryStockProjection, ProjectionError, StockBook};
pub use settings::{EngineSettings, Settings, bootstrap};
pub use store::{
    Committed, InMemoryTransferStore, StoredEvent, Tables, TransferStore, UnitOfWork,
};
