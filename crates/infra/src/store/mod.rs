//! Transactional storage boundary for inventory records and movements.
//!
//! The stock components never talk to a database directly. They open a
//! [`StockTransaction`] through a [`StockStore`], read and write records through
//! it, and commit. A transaction dropped without `commit()` is rolled back, so
//! any `?` on a business rejection discards every staged write.
//!
//! ## Row locking
//!
//! `get_or_init` and `find` lock the row for the rest of the transaction
//! (Postgres: `SELECT ... FOR UPDATE`; in-memory: a per-row async mutex).
//! Writers on the same product serialize at the row; different products never
//! share a lock.

use std::sync::Arc;

use stockledger_core::{MovementId, TenantId};
use stockledger_inventory::{InventoryRecord, MovementFilter, MovementRecord, StockKey, StockResult};

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryStockStore, InMemoryTransaction};
pub use postgres::{PostgresStockStore, PostgresTransaction};

/// One atomic unit of work against the stock tables.
#[async_trait::async_trait]
pub trait StockTransaction: Send {
    /// Load the record, creating it with zero quantities when absent. Locks the row.
    async fn get_or_init(&mut self, key: StockKey) -> StockResult<InventoryRecord>;

    /// Load the record if it exists. Locks the row.
    async fn find(&mut self, key: StockKey) -> StockResult<Option<InventoryRecord>>;

    /// Persist a record previously read through this transaction.
    async fn save(&mut self, record: &InventoryRecord) -> StockResult<()>;

    /// Append an immutable movement entry.
    async fn append_movement(&mut self, movement: MovementRecord) -> StockResult<MovementRecord>;

    /// Make every staged write visible atomically.
    async fn commit(self) -> StockResult<()>;
}

/// Tenant-scoped stock storage.
#[async_trait::async_trait]
pub trait StockStore: Send + Sync {
    type Tx: StockTransaction + 'static;

    async fn begin(&self) -> StockResult<Self::Tx>;

    /// Last committed state of one record (no lock taken).
    async fn find_record(&self, key: StockKey) -> StockResult<Option<InventoryRecord>>;

    async fn list_records(&self, tenant_id: TenantId) -> StockResult<Vec<InventoryRecord>>;

    /// Movement history, newest first.
    async fn list_movements(
        &self,
        tenant_id: TenantId,
        filter: &MovementFilter,
    ) -> StockResult<Vec<MovementRecord>>;

    async fn find_movement(
        &self,
        tenant_id: TenantId,
        movement_id: MovementId,
    ) -> StockResult<Option<MovementRecord>>;
}

#[async_trait::async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self) -> StockResult<Self::Tx> {
        (**self).begin().await
    }

    async fn find_record(&self, key: StockKey) -> StockResult<Option<InventoryRecord>> {
        (**self).find_record(key).await
    }

    async fn list_records(&self, tenant_id: TenantId) -> StockResult<Vec<InventoryRecord>> {
        (**self).list_records(tenant_id).await
    }

    async fn list_movements(
        &self,
        tenant_id: TenantId,
        filter: &MovementFilter,
    ) -> StockResult<Vec<MovementRecord>> {
        (**self).list_movements(tenant_id, filter).await
    }

    async fn find_movement(
        &self,
        tenant_id: TenantId,
        movement_id: MovementId,
    ) -> StockResult<Option<MovementRecord>> {
        (**self).find_movement(tenant_id, movement_id).await
    }
}
