use stockledger_core::UserId;
use stockledger_inventory::{
    InventoryRecord, MovementKind, MovementMeta, MovementRecord, StockKey, StockResult,
};

use super::MovementRecorder;
use crate::store::StockTransaction;

/// Result of a physical stock change: the refreshed record and its audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockUpdated {
    pub record: InventoryRecord,
    pub movement: MovementRecord,
}

/// Single entry point for changing physical quantity.
///
/// Enforces the reserved floor (through [`InventoryRecord::apply_movement`]) and
/// pairs every change with a movement entry in the same transaction.
#[derive(Debug, Default, Clone, Copy)]
pub struct StockUpdater {
    recorder: MovementRecorder,
}

impl StockUpdater {
    pub fn new(recorder: MovementRecorder) -> Self {
        Self { recorder }
    }

    /// Transaction-free core: the caller owns begin/commit.
    pub async fn apply<T>(
        &self,
        tx: &mut T,
        key: StockKey,
        quantity: i64,
        kind: MovementKind,
        meta: &MovementMeta,
        actor: Option<UserId>,
    ) -> StockResult<StockUpdated>
    where
        T: StockTransaction,
    {
        let mut record = tx.get_or_init(key).await?;
        let change = record.apply_movement(kind, quantity)?;
        tx.save(&record).await?;

        let movement = self
            .recorder
            .execute(tx, key, &change, meta, actor)
            .await?;

        Ok(StockUpdated { record, movement })
    }
}
