//! Infrastructure layer: stock stores, ledger services, config.

pub mod config;
pub mod ledger;
pub mod store;


pub use config::{ConfigError, DatabaseConfig, StockLedgerConfig, StoreBackend};
pub use ledger::{MovementRecorder, StockLedger, StockReserver, StockUpdated, StockUpdater};
pub use store::{InMemoryStockStore, PostgresStockStore, StockStore, StockTransaction};
