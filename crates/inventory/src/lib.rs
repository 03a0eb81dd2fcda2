//! Inventory stock domain module.
//!
//! Business rules for physical and reserved stock, implemented purely as
//! deterministic domain logic (no IO, no storage, no transactions).

pub mod error;
pub mod movement;
pub mod record;
pub mod report;

pub use error::{StockError, StockErrorKind, StockResult};
pub use movement::{
    MovementFilter, MovementKind, MovementMeta, MovementRecord, MovementType, StockChange,
};
pub use record::{InventoryRecord, StockKey, StockStatus};
pub use report::{Availability, MovementSummary, StockStatistics};
