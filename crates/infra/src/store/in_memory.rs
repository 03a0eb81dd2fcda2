use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};
use tracing::debug;

use stockledger_core::{MovementId, TenantId};
use stockledger_inventory::{
    InventoryRecord, MovementFilter, MovementRecord, StockError, StockKey, StockResult,
};

use super::{StockStore, StockTransaction};

/// One row: a writer lock held for a whole transaction, plus the last committed state.
///
/// Readers only touch `committed`, so they never wait on an open transaction.
#[derive(Debug, Default)]
struct Row {
    writer: Arc<RowMutex<()>>,
    committed: RwLock<Option<InventoryRecord>>,
}

impl Row {
    fn committed(&self) -> StockResult<Option<InventoryRecord>> {
        self.committed
            .read()
            .map(|row| row.clone())
            .map_err(|_| StockError::storage("lock poisoned"))
    }

    fn publish(&self, record: InventoryRecord) -> StockResult<()> {
        let mut row = self
            .committed
            .write()
            .map_err(|_| StockError::storage("lock poisoned"))?;
        *row = Some(record);
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.committed.read().map(|row| row.is_none()).unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct Shared {
    rows: Mutex<HashMap<StockKey, Arc<Row>>>,
    movements: RwLock<Vec<MovementRecord>>,
}

impl Shared {
    /// Row for a writer, created on first use.
    fn row_for_write(&self, key: StockKey) -> StockResult<Arc<Row>> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StockError::storage("lock poisoned"))?;
        Ok(rows.entry(key).or_default().clone())
    }

    fn row(&self, key: StockKey) -> StockResult<Option<Arc<Row>>> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| StockError::storage("lock poisoned"))?;
        Ok(rows.get(&key).cloned())
    }

    fn all_rows(&self) -> StockResult<Vec<Arc<Row>>> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| StockError::storage("lock poisoned"))?;
        Ok(rows.values().cloned().collect())
    }

    /// Drop a row that never got committed, unless another writer is queued on it.
    ///
    /// Rows are only cloned under the map lock, so a strong count of 2 (map + caller)
    /// means nobody else can reach this row.
    fn forget_if_unused(&self, key: StockKey, row: &Arc<Row>) {
        let Ok(mut rows) = self.rows.lock() else {
            return;
        };
        if Arc::strong_count(row) == 2 && row.is_empty() {
            if let Some(current) = rows.get(&key) {
                if Arc::ptr_eq(current, row) {
                    rows.remove(&key);
                }
            }
        }
    }
}

/// In-memory stock store.
///
/// Intended for tests/dev. Each row has its own async writer lock which a
/// transaction holds until it commits or is dropped; staged writes are only
/// published on commit. Rows that were locked but never committed are removed
/// again when the transaction ends.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockStore {
    shared: Arc<Shared>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
struct LockedRow {
    row: Arc<Row>,
    guard: OwnedMutexGuard<()>,
}

/// Transaction over [`InMemoryStockStore`].
#[derive(Debug)]
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    locked: HashMap<StockKey, LockedRow>,
    staged: HashMap<StockKey, InventoryRecord>,
    movements: Vec<MovementRecord>,
}

impl InMemoryTransaction {
    async fn lock(&mut self, key: StockKey) -> StockResult<()> {
        if !self.locked.contains_key(&key) {
            let row = self.shared.row_for_write(key)?;
            let guard = row.writer.clone().lock_owned().await;
            self.locked.insert(key, LockedRow { row, guard });
        }
        Ok(())
    }

    fn current(&self, key: StockKey) -> StockResult<Option<InventoryRecord>> {
        if let Some(record) = self.staged.get(&key) {
            return Ok(Some(record.clone()));
        }
        match self.locked.get(&key) {
            Some(locked) => locked.row.committed(),
            None => Ok(None),
        }
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        for (key, locked) in self.locked.drain() {
            let LockedRow { row, guard } = locked;
            drop(guard);
            self.shared.forget_if_unused(key, &row);
        }
    }
}

#[async_trait::async_trait]
impl StockTransaction for InMemoryTransaction {
    async fn get_or_init(&mut self, key: StockKey) -> StockResult<InventoryRecord> {
        self.lock(key).await?;
        let record = match self.current(key)? {
            Some(record) => record,
            None => {
                debug!(%key, "initializing inventory record");
                let record = InventoryRecord::new(key);
                self.staged.insert(key, record.clone());
                record
            }
        };
        Ok(record)
    }

    async fn find(&mut self, key: StockKey) -> StockResult<Option<InventoryRecord>> {
        self.lock(key).await?;
        self.current(key)
    }

    async fn save(&mut self, record: &InventoryRecord) -> StockResult<()> {
        let key = record.key();
        if !self.locked.contains_key(&key) {
            return Err(StockError::storage(format!(
                "record {key} saved without being read in this transaction"
            )));
        }
        self.staged.insert(key, record.clone());
        Ok(())
    }

    async fn append_movement(&mut self, movement: MovementRecord) -> StockResult<MovementRecord> {
        self.movements.push(movement.clone());
        Ok(movement)
    }

    async fn commit(mut self) -> StockResult<()> {
        let shared = self.shared.clone();
        let mut movements = shared
            .movements
            .write()
            .map_err(|_| StockError::storage("lock poisoned"))?;

        let staged: Vec<_> = self.staged.drain().collect();
        for (key, record) in staged {
            match self.locked.get(&key) {
                Some(locked) => locked.row.publish(record)?,
                None => {
                    return Err(StockError::storage(format!(
                        "staged record {key} is not locked by this transaction"
                    )));
                }
            }
        }
        movements.append(&mut self.movements);

        // Writer locks are released when `self` drops, after both writes are visible.
        Ok(())
    }
}

#[async_trait::async_trait]
impl StockStore for InMemoryStockStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> StockResult<Self::Tx> {
        Ok(InMemoryTransaction {
            shared: self.shared.clone(),
            locked: HashMap::new(),
            staged: HashMap::new(),
            movements: Vec::new(),
        })
    }

    async fn find_record(&self, key: StockKey) -> StockResult<Option<InventoryRecord>> {
        match self.shared.row(key)? {
            Some(row) => row.committed(),
            None => Ok(None),
        }
    }

    async fn list_records(&self, tenant_id: TenantId) -> StockResult<Vec<InventoryRecord>> {
        let mut records = Vec::new();
        for row in self.shared.all_rows()? {
            if let Some(record) = row.committed()?.filter(|r| r.tenant_id() == tenant_id) {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.product_id());
        Ok(records)
    }

    async fn list_movements(
        &self,
        tenant_id: TenantId,
        filter: &MovementFilter,
    ) -> StockResult<Vec<MovementRecord>> {
        let movements = self
            .shared
            .movements
            .read()
            .map_err(|_| StockError::storage("lock poisoned"))?;

        Ok(movements
            .iter()
            .rev()
            .filter(|m| m.tenant_id == tenant_id && filter.matches(m))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn find_movement(
        &self,
        tenant_id: TenantId,
        movement_id: MovementId,
    ) -> StockResult<Option<MovementRecord>> {
        let movements = self
            .shared
            .movements
            .read()
            .map_err(|_| StockError::storage("lock poisoned"))?;

        Ok(movements
            .iter()
            .find(|m| m.id == movement_id && m.tenant_id == tenant_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use stockledger_core::ProductId;
    use stockledger_inventory::{MovementKind, MovementMeta, StockChange};

    use super::*;
    use crate::ledger::StockLedger;

    fn test_key() -> StockKey {
        StockKey::new(TenantId::new(), ProductId::new())
    }

    #[tokio::test]
    async fn committed_writes_become_visible() {
        let store = InMemoryStockStore::new();
        let key = test_key();

        let mut tx = store.begin().await.unwrap();
        let mut record = tx.get_or_init(key).await.unwrap();
        let change = record.apply_movement(MovementKind::In, 5).unwrap();
        tx.save(&record).await.unwrap();
        tx.append_movement(MovementRecord::from_change(
            key,
            &change,
            &MovementMeta::new(),
            None,
            Utc::now(),
        ))
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let stored = store.find_record(key).await.unwrap().unwrap();
        assert_eq!(stored.quantity(), 5);
        let movements = store
            .list_movements(key.tenant_id, &MovementFilter::default())
            .await
            .unwrap();
        assert_eq!(movements.len(), 1);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryStockStore::new();
        let key = test_key();

        {
            let mut tx = store.begin().await.unwrap();
            let mut record = tx.get_or_init(key).await.unwrap();
            record.apply_movement(MovementKind::In, 5).unwrap();
            tx.save(&record).await.unwrap();
        }

        assert_eq!(store.find_record(key).await.unwrap(), None);
        assert!(store.list_records(key.tenant_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_does_not_create_records() {
        let store = InMemoryStockStore::new();
        let key = test_key();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.find(key).await.unwrap(), None);
        tx.commit().await.unwrap();

        assert_eq!(store.find_record(key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_requires_a_locked_row() {
        let store = InMemoryStockStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx.save(&InventoryRecord::new(test_key())).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn listings_are_tenant_isolated() {
        let store = InMemoryStockStore::new();
        let ours = test_key();
        let theirs = test_key();

        for key in [ours, theirs] {
            let mut tx = store.begin().await.unwrap();
            let mut record = tx.get_or_init(key).await.unwrap();
            let change = StockChange::compute(MovementKind::In, 3, 0, 0).unwrap();
            record.apply_movement(MovementKind::In, 3).unwrap();
            tx.save(&record).await.unwrap();
            tx.append_movement(MovementRecord::from_change(
                key,
                &change,
                &MovementMeta::new(),
                None,
                Utc::now(),
            ))
            .await
            .unwrap();
            tx.commit().await.unwrap();
        }

        let records = store.list_records(ours.tenant_id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key(), ours);

        let movements = store
            .list_movements(ours.tenant_id, &MovementFilter::default())
            .await
            .unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].product_id, ours.product_id);
    }

    fn row_count(store: &InMemoryStockStore) -> usize {
        store.shared.rows.lock().unwrap().len()
    }

    #[tokio::test]
    async fn read_only_misses_leave_no_rows() {
        let store = InMemoryStockStore::new();
        let tenant_id = TenantId::new();

        for _ in 0..1000 {
            let key = StockKey::new(tenant_id, ProductId::new());
            assert_eq!(store.find_record(key).await.unwrap(), None);
        }
        assert!(store.list_records(tenant_id).await.unwrap().is_empty());
        assert_eq!(row_count(&store), 0);
    }

    #[tokio::test]
    async fn rolled_back_rows_are_forgotten() {
        let store = InMemoryStockStore::new();
        let ledger = StockLedger::new(store.clone());
        let key = test_key();

        ledger.reserve(key, 3).await.unwrap_err();
        ledger.release(key, 3).await.unwrap_err();
        {
            let mut tx = store.begin().await.unwrap();
            tx.get_or_init(key).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.find(key).await.unwrap(), None);
        tx.commit().await.unwrap();

        assert_eq!(row_count(&store), 0);

        ledger.receive(key, 1, MovementMeta::new(), None).await.unwrap();
        assert_eq!(row_count(&store), 1);
    }

    #[tokio::test]
    async fn reads_do_not_wait_for_open_writers() {
        let store = InMemoryStockStore::new();
        let ledger = StockLedger::new(store.clone());
        let key = test_key();
        ledger.receive(key, 4, MovementMeta::new(), None).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let mut record = tx.get_or_init(key).await.unwrap();
        record.apply_movement(MovementKind::In, 6).unwrap();
        tx.save(&record).await.unwrap();

        // The writer still holds the row; readers see the last committed state.
        let seen = store.find_record(key).await.unwrap().unwrap();
        assert_eq!(seen.quantity(), 4);
        assert_eq!(store.list_records(key.tenant_id).await.unwrap().len(), 1);

        tx.commit().await.unwrap();
        assert_eq!(store.find_record(key).await.unwrap().unwrap().quantity(), 10);
    }
}
