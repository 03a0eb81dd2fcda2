//! Stock ledger application services.
//!
//! ```text
//! StockLedger (one transaction per public call)
//!   ├── StockReserver   reserve / release / confirm
//!   │     └── StockUpdater   (confirm ships through the `out` path)
//!   └── StockUpdater    in / out / adjustment
//!         └── MovementRecorder   one audit entry per physical change
//! ```
//!
//! Components expose transaction-free `apply*` cores; `StockLedger` opens the
//! transaction, calls the cores, and commits. A business rejection returns
//! through `?` before `commit()`, which drops (rolls back) the transaction, so
//! a composed call like `confirm` never leaves a partial release behind.

use tracing::{info, instrument};

use stockledger_core::{MovementId, TenantId, UserId};
use stockledger_inventory::{
    Availability, InventoryRecord, MovementFilter, MovementKind, MovementMeta, MovementRecord,
    MovementSummary, StockKey, StockResult, StockStatistics, StockStatus,
};

use crate::store::{StockStore, StockTransaction};

mod recorder;
mod reserver;
mod updater;

pub use recorder::MovementRecorder;
pub use reserver::StockReserver;
pub use updater::{StockUpdated, StockUpdater};

/// Public stock ledger API consumed by order/sale/receiving workflows.
#[derive(Debug, Clone)]
pub struct StockLedger<S> {
    store: S,
    updater: StockUpdater,
    reserver: StockReserver,
}

impl<S> StockLedger<S>
where
    S: StockStore,
{
    pub fn new(store: S) -> Self {
        let updater = StockUpdater::new(MovementRecorder::new());
        Self {
            store,
            updater,
            reserver: StockReserver::new(updater),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Soft-lock stock for a pending order.
    #[instrument(
        skip(self),
        fields(tenant_id = %key.tenant_id, product_id = %key.product_id),
        err(level = "warn")
    )]
    pub async fn reserve(&self, key: StockKey, quantity: i64) -> StockResult<InventoryRecord> {
        let mut tx = self.store.begin().await?;
        let record = self.reserver.apply_reserve(&mut tx, key, quantity).await?;
        tx.commit().await?;

        info!(
            reserved_quantity = record.reserved_quantity(),
            available_quantity = record.available_quantity(),
            "stock reserved"
        );
        Ok(record)
    }

    /// Free a reservation (order cancelled).
    #[instrument(
        skip(self),
        fields(tenant_id = %key.tenant_id, product_id = %key.product_id),
        err(level = "warn")
    )]
    pub async fn release(&self, key: StockKey, quantity: i64) -> StockResult<InventoryRecord> {
        let mut tx = self.store.begin().await?;
        let record = self.reserver.apply_release(&mut tx, key, quantity).await?;
        tx.commit().await?;

        info!(
            reserved_quantity = record.reserved_quantity(),
            "stock reservation released"
        );
        Ok(record)
    }

    /// Turn a reservation into a physical exit (order fulfilled).
    #[instrument(
        skip(self, meta),
        fields(tenant_id = %key.tenant_id, product_id = %key.product_id),
        err(level = "warn")
    )]
    pub async fn confirm(
        &self,
        key: StockKey,
        quantity: i64,
        meta: MovementMeta,
        actor: Option<UserId>,
    ) -> StockResult<StockUpdated> {
        let mut tx = self.store.begin().await?;
        let updated = self
            .reserver
            .apply_confirm(&mut tx, key, quantity, &meta, actor)
            .await?;
        tx.commit().await?;

        info!(
            previous_quantity = updated.movement.previous_quantity,
            new_quantity = updated.movement.new_quantity,
            reserved_quantity = updated.record.reserved_quantity(),
            "stock reservation confirmed"
        );
        Ok(updated)
    }

    /// Apply a direct physical change (receipt, shipment, manual adjustment).
    #[instrument(
        skip(self, meta),
        fields(tenant_id = %key.tenant_id, product_id = %key.product_id),
        err(level = "warn")
    )]
    pub async fn update_stock(
        &self,
        key: StockKey,
        quantity: i64,
        kind: MovementKind,
        meta: MovementMeta,
        actor: Option<UserId>,
    ) -> StockResult<StockUpdated> {
        let mut tx = self.store.begin().await?;
        let updated = self
            .updater
            .apply(&mut tx, key, quantity, kind, &meta, actor)
            .await?;
        tx.commit().await?;

        info!(
            previous_quantity = updated.movement.previous_quantity,
            new_quantity = updated.movement.new_quantity,
            "stock updated"
        );
        Ok(updated)
    }

    pub async fn receive(
        &self,
        key: StockKey,
        quantity: i64,
        meta: MovementMeta,
        actor: Option<UserId>,
    ) -> StockResult<StockUpdated> {
        self.update_stock(key, quantity, MovementKind::In, meta, actor)
            .await
    }

    pub async fn ship(
        &self,
        key: StockKey,
        quantity: i64,
        meta: MovementMeta,
        actor: Option<UserId>,
    ) -> StockResult<StockUpdated> {
        self.update_stock(key, quantity, MovementKind::Out, meta, actor)
            .await
    }

    /// Set the absolute physical quantity (stock count correction).
    pub async fn set_stock(
        &self,
        key: StockKey,
        quantity: i64,
        meta: MovementMeta,
        actor: Option<UserId>,
    ) -> StockResult<StockUpdated> {
        self.update_stock(key, quantity, MovementKind::Adjustment, meta, actor)
            .await
    }

    /// Update reorder thresholds without touching quantities or the movement ledger.
    #[instrument(
        skip(self),
        fields(tenant_id = %key.tenant_id, product_id = %key.product_id),
        err(level = "warn")
    )]
    pub async fn set_thresholds(
        &self,
        key: StockKey,
        min_quantity: i64,
        max_quantity: Option<i64>,
    ) -> StockResult<InventoryRecord> {
        let mut tx = self.store.begin().await?;
        let mut record = tx.get_or_init(key).await?;
        record.set_thresholds(min_quantity, max_quantity)?;
        tx.save(&record).await?;
        tx.commit().await?;
        Ok(record)
    }

    pub async fn record(&self, key: StockKey) -> StockResult<Option<InventoryRecord>> {
        self.store.find_record(key).await
    }

    pub async fn check_availability(
        &self,
        key: StockKey,
        requested: i64,
    ) -> StockResult<Availability> {
        let record = self.store.find_record(key).await?;
        Ok(Availability::of(record.as_ref(), requested))
    }

    pub async fn statistics(&self, tenant_id: TenantId) -> StockResult<StockStatistics> {
        let records = self.store.list_records(tenant_id).await?;
        Ok(StockStatistics::from_records(&records))
    }

    /// Records at or below their reorder threshold (out-of-stock included).
    pub async fn low_stock(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> StockResult<Vec<InventoryRecord>> {
        self.records_with_status(tenant_id, limit, |s| {
            matches!(s, StockStatus::Low | StockStatus::OutOfStock)
        })
        .await
    }

    /// Records at or above their configured maximum.
    pub async fn high_stock(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> StockResult<Vec<InventoryRecord>> {
        self.records_with_status(tenant_id, limit, |s| s == StockStatus::High)
            .await
    }

    pub async fn out_of_stock(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> StockResult<Vec<InventoryRecord>> {
        self.records_with_status(tenant_id, limit, |s| s == StockStatus::OutOfStock)
            .await
    }

    pub async fn movements(
        &self,
        tenant_id: TenantId,
        filter: &MovementFilter,
    ) -> StockResult<Vec<MovementRecord>> {
        self.store.list_movements(tenant_id, filter).await
    }

    pub async fn find_movement(
        &self,
        tenant_id: TenantId,
        movement_id: MovementId,
    ) -> StockResult<Option<MovementRecord>> {
        self.store.find_movement(tenant_id, movement_id).await
    }

    pub async fn movement_summary(
        &self,
        tenant_id: TenantId,
        filter: &MovementFilter,
    ) -> StockResult<MovementSummary> {
        let movements = self.store.list_movements(tenant_id, filter).await?;
        Ok(MovementSummary::from_movements(&movements))
    }

    async fn records_with_status(
        &self,
        tenant_id: TenantId,
        limit: usize,
        wanted: impl Fn(StockStatus) -> bool + Send,
    ) -> StockResult<Vec<InventoryRecord>> {
        let records = self.store.list_records(tenant_id).await?;
        Ok(records
            .into_iter()
            .filter(|r| wanted(r.status()))
            .take(limit)
            .collect())
    }
}
