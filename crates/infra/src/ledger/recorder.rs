use chrono::Utc;
use tracing::debug;

use stockledger_core::UserId;
use stockledger_inventory::{MovementMeta, MovementRecord, StockChange, StockKey, StockResult};

use crate::store::StockTransaction;

/// Appends one immutable movement entry per physical stock change.
///
/// Purely transcriptive: the change (including `new_quantity`) is computed once
/// by [`StockUpdater`](super::StockUpdater) and handed over as-is.
#[derive(Debug, Default, Clone, Copy)]
pub struct MovementRecorder;

impl MovementRecorder {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute<T>(
        &self,
        tx: &mut T,
        key: StockKey,
        change: &StockChange,
        meta: &MovementMeta,
        actor: Option<UserId>,
    ) -> StockResult<MovementRecord>
    where
        T: StockTransaction,
    {
        let movement = MovementRecord::from_change(key, change, meta, actor, Utc::now());
        debug!(
            %key,
            movement_type = movement.movement_type.as_str(),
            previous_quantity = movement.previous_quantity,
            new_quantity = movement.new_quantity,
            "recording movement"
        );
        tx.append_movement(movement).await
    }
}
