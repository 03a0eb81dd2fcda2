use stockledger_core::UserId;
use stockledger_inventory::{InventoryRecord, MovementKind, MovementMeta, StockKey, StockResult};

use super::{StockUpdated, StockUpdater};
use crate::store::StockTransaction;

/// Reserved-quantity soft lock: reserve, then release or confirm.
///
/// Only aggregate counters are kept per record; there are no per-order tickets.
#[derive(Debug, Default, Clone, Copy)]
pub struct StockReserver {
    updater: StockUpdater,
}

impl StockReserver {
    pub fn new(updater: StockUpdater) -> Self {
        Self { updater }
    }

    pub async fn apply_reserve<T>(
        &self,
        tx: &mut T,
        key: StockKey,
        quantity: i64,
    ) -> StockResult<InventoryRecord>
    where
        T: StockTransaction,
    {
        let mut record = tx.get_or_init(key).await?;
        record.reserve(quantity)?;
        tx.save(&record).await?;
        Ok(record)
    }

    /// A missing record behaves as one with nothing reserved and is not created.
    pub async fn apply_release<T>(
        &self,
        tx: &mut T,
        key: StockKey,
        quantity: i64,
    ) -> StockResult<InventoryRecord>
    where
        T: StockTransaction,
    {
        let mut record = match tx.find(key).await? {
            Some(record) => record,
            None => InventoryRecord::new(key),
        };
        record.release(quantity)?;
        tx.save(&record).await?;
        Ok(record)
    }

    /// Release the soft lock and ship the same quantity, inside the caller's transaction.
    pub async fn apply_confirm<T>(
        &self,
        tx: &mut T,
        key: StockKey,
        quantity: i64,
        meta: &MovementMeta,
        actor: Option<UserId>,
    ) -> StockResult<StockUpdated>
    where
        T: StockTransaction,
    {
        self.apply_release(tx, key, quantity).await?;
        self.updater
            .apply(tx, key, quantity, MovementKind::Out, meta, actor)
            .await
    }
}
