//! Postgres-backed stock store implementation.
//!
//! Inventory records live in `inventory_records` (one row per tenant + product)
//! and the audit ledger in `stock_movements` (append-only, guarded by a trigger).
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StockError::StorageConflict` with the failing
//! operation named in the message:
//!
//! | SQLx Error | PostgreSQL Error Code | Scenario |
//! |------------|----------------------|----------|
//! | Database (unique violation) | `23505` | Concurrent first insert of the same movement/row |
//! | Database (check constraint violation) | `23514` | `quantity >= reserved_quantity` or `reserved_quantity >= 0` rejected by the table |
//! | Database (foreign key violation) | `23503` | Referential integrity violation |
//! | Database (serialization failure) | `40001` | Concurrent transaction under stricter isolation |
//! | Database (deadlock detected) | `40P01` | Lock cycle between transactions |
//! | PoolClosed / PoolTimedOut / Io | N/A | Connectivity |
//!
//! Every variant is safe to retry from the top: the transaction is rolled back
//! in full.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use stockledger_core::{MovementId, ProductId, TenantId, UserId};
use stockledger_inventory::{
    InventoryRecord, MovementFilter, MovementRecord, StockError, StockKey,
    StockResult,
};

use super::{StockStore, StockTransaction};
use crate::config::DatabaseConfig;

/// Tables, constraints and the append-only trigger for the movement ledger.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS inventory_records (
    tenant_id UUID NOT NULL,
    product_id UUID NOT NULL,
    quantity BIGINT NOT NULL DEFAULT 0,
    reserved_quantity BIGINT NOT NULL DEFAULT 0,
    min_quantity BIGINT NOT NULL DEFAULT 0,
    max_quantity BIGINT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (tenant_id, product_id),
    CONSTRAINT inventory_reserved_non_negative CHECK (reserved_quantity >= 0),
    CONSTRAINT inventory_reserved_within_quantity CHECK (quantity >= reserved_quantity),
    CONSTRAINT inventory_min_non_negative CHECK (min_quantity >= 0)
);

CREATE TABLE IF NOT EXISTS stock_movements (
    id UUID PRIMARY KEY,
    tenant_id UUID NOT NULL,
    product_id UUID NOT NULL,
    movement_type TEXT NOT NULL CHECK (movement_type IN ('entry', 'exit', 'adjustment')),
    quantity BIGINT NOT NULL,
    previous_quantity BIGINT NOT NULL,
    new_quantity BIGINT NOT NULL,
    reason TEXT NULL,
    reference_id TEXT NULL,
    reference_type TEXT NULL,
    user_id UUID NULL,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS stock_movements_tenant_product_idx
    ON stock_movements (tenant_id, product_id, created_at DESC);

CREATE OR REPLACE FUNCTION stock_movements_append_only() RETURNS trigger AS $$
BEGIN
    RAISE EXCEPTION 'stock_movements is append-only';
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS stock_movements_append_only ON stock_movements;
CREATE TRIGGER stock_movements_append_only
    BEFORE UPDATE OR DELETE ON stock_movements
    FOR EACH ROW EXECUTE FUNCTION stock_movements_append_only();
"#;

/// Postgres-backed stock store.
///
/// Uses the SQLx connection pool (thread-safe). Every statement filters on
/// `tenant_id`, so cross-tenant reads and writes are impossible by construction.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    /// Create a new PostgresStockStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool from configuration.
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self::new(pool))
    }

    /// Create tables, constraints and triggers if they are missing.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .context("failed to apply stock ledger schema")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Transaction over [`PostgresStockStore`]. Rolled back by SQLx when dropped.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait::async_trait]
impl StockTransaction for PostgresTransaction {
    async fn get_or_init(&mut self, key: StockKey) -> StockResult<InventoryRecord> {
        sqlx::query(
            r#"
            INSERT INTO inventory_records (tenant_id, product_id)
            VALUES ($1, $2)
            ON CONFLICT (tenant_id, product_id) DO NOTHING
            "#,
        )
        .bind(key.tenant_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("init_record", e))?;

        self.find(key)
            .await?
            .ok_or_else(|| StockError::storage(format!("record {key} missing after insert")))
    }

    async fn find(&mut self, key: StockKey) -> StockResult<Option<InventoryRecord>> {
        let row = sqlx::query(
            r#"
            SELECT tenant_id, product_id, quantity, reserved_quantity, min_quantity, max_quantity
            FROM inventory_records
            WHERE tenant_id = $1 AND product_id = $2
            FOR UPDATE
            "#,
        )
        .bind(key.tenant_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_record", e))?;

        row.map(|r| record_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("decode_record", e))
    }

    async fn save(&mut self, record: &InventoryRecord) -> StockResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_records
            SET quantity = $3,
                reserved_quantity = $4,
                min_quantity = $5,
                max_quantity = $6,
                updated_at = NOW()
            WHERE tenant_id = $1 AND product_id = $2
            "#,
        )
        .bind(record.tenant_id().as_uuid())
        .bind(record.product_id().as_uuid())
        .bind(record.quantity())
        .bind(record.reserved_quantity())
        .bind(record.min_quantity())
        .bind(record.max_quantity())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("save_record", e))?;

        if result.rows_affected() != 1 {
            return Err(StockError::storage(format!(
                "record {} not found on save",
                record.key()
            )));
        }
        Ok(())
    }

    async fn append_movement(&mut self, movement: MovementRecord) -> StockResult<MovementRecord> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id,
                tenant_id,
                product_id,
                movement_type,
                quantity,
                previous_quantity,
                new_quantity,
                reason,
                reference_id,
                reference_type,
                user_id,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.tenant_id.as_uuid())
        .bind(movement.product_id.as_uuid())
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity)
        .bind(movement.previous_quantity)
        .bind(movement.new_quantity)
        .bind(movement.reason.as_deref())
        .bind(movement.reference_id.as_deref())
        .bind(movement.reference_type.as_deref())
        .bind(movement.user_id.map(Uuid::from))
        .bind(movement.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_movement", e))?;

        debug!(movement_id = %movement.id, "movement appended");
        Ok(movement)
    }

    async fn commit(self) -> StockResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

#[async_trait::async_trait]
impl StockStore for PostgresStockStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> StockResult<Self::Tx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PostgresTransaction { tx })
    }

    #[instrument(skip(self), fields(tenant_id = %key.tenant_id, product_id = %key.product_id), err)]
    async fn find_record(&self, key: StockKey) -> StockResult<Option<InventoryRecord>> {
        let row = sqlx::query(
            r#"
            SELECT tenant_id, product_id, quantity, reserved_quantity, min_quantity, max_quantity
            FROM inventory_records
            WHERE tenant_id = $1 AND product_id = $2
            "#,
        )
        .bind(key.tenant_id.as_uuid())
        .bind(key.product_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_record", e))?;

        row.map(|r| record_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("decode_record", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list_records(&self, tenant_id: TenantId) -> StockResult<Vec<InventoryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT tenant_id, product_id, quantity, reserved_quantity, min_quantity, max_quantity
            FROM inventory_records
            WHERE tenant_id = $1
            ORDER BY product_id ASC
            "#,
        )
        .bind(tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_records", e))?;

        rows.iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("decode_record", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list_movements(
        &self,
        tenant_id: TenantId,
        filter: &MovementFilter,
    ) -> StockResult<Vec<MovementRecord>> {
        let product_param: Option<Uuid> = filter.product_id.map(Uuid::from);
        let type_param: Option<&str> = filter.movement_type.map(|t| t.as_str());
        let limit_param: Option<i64> = filter.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));

        let rows = sqlx::query(
            r#"
            SELECT
                id,
                tenant_id,
                product_id,
                movement_type,
                quantity,
                previous_quantity,
                new_quantity,
                reason,
                reference_id,
                reference_type,
                user_id,
                created_at
            FROM stock_movements
            WHERE tenant_id = $1
                AND ($2::uuid IS NULL OR product_id = $2)
                AND ($3::text IS NULL OR movement_type = $3)
            ORDER BY created_at DESC, id DESC
            LIMIT $4
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(product_param)
        .bind(type_param)
        .bind(limit_param)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_movements", e))?;

        rows.iter().map(movement_from_row).collect()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, movement_id = %movement_id), err)]
    async fn find_movement(
        &self,
        tenant_id: TenantId,
        movement_id: MovementId,
    ) -> StockResult<Option<MovementRecord>> {
        let row = sqlx::query(
            r#"
            SELECT
                id,
                tenant_id,
                product_id,
                movement_type,
                quantity,
                previous_quantity,
                new_quantity,
                reason,
                reference_id,
                reference_type,
                user_id,
                created_at
            FROM stock_movements
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(movement_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_movement", e))?;

        row.as_ref().map(movement_from_row).transpose()
    }
}

fn record_from_row(row: &PgRow) -> Result<InventoryRecord, sqlx::Error> {
    let tenant_id: Uuid = row.try_get("tenant_id")?;
    let product_id: Uuid = row.try_get("product_id")?;
    Ok(InventoryRecord::restore(
        StockKey::new(TenantId::from_uuid(tenant_id), ProductId::from_uuid(product_id)),
        row.try_get("quantity")?,
        row.try_get("reserved_quantity")?,
        row.try_get("min_quantity")?,
        row.try_get("max_quantity")?,
    ))
}

fn movement_from_row(row: &PgRow) -> StockResult<MovementRecord> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_movement", e);

    let movement_type: String = row.try_get("movement_type").map_err(decode)?;
    let user_id: Option<Uuid> = row.try_get("user_id").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;

    Ok(MovementRecord {
        id: MovementId::from_uuid(row.try_get("id").map_err(decode)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(decode)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode)?),
        movement_type: movement_type.parse()?,
        quantity: row.try_get("quantity").map_err(decode)?,
        previous_quantity: row.try_get("previous_quantity").map_err(decode)?,
        new_quantity: row.try_get("new_quantity").map_err(decode)?,
        reason: row.try_get("reason").map_err(decode)?,
        reference_id: row.try_get("reference_id").map_err(decode)?,
        reference_type: row.try_get("reference_type").map_err(decode)?,
        user_id: user_id.map(UserId::from_uuid),
        created_at,
    })
}

/// Map SQLx errors to the storage-conflict kind.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StockError {
    match err {
        sqlx::Error::Database(db_err) => {
            let label = match db_err.code().as_deref() {
                Some("23505") => "unique violation",
                Some("23514") => "check constraint violation",
                Some("23503") => "foreign key violation",
                Some("40001") => "serialization failure",
                Some("40P01") => "deadlock detected",
                _ => "database error",
            };
            StockError::storage(format!("{label} in {operation}: {}", db_err.message()))
        }
        sqlx::Error::PoolClosed => {
            StockError::storage(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StockError::storage(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::RowNotFound => {
            StockError::storage(format!("unexpected row not found in {operation}"))
        }
        _ => StockError::storage(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use stockledger_inventory::StockErrorKind;

    use super::*;

    #[test]
    fn pool_failures_map_to_retryable_storage_conflicts() {
        let err = map_sqlx_error("begin_transaction", sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), StockErrorKind::StorageConflict);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("begin_transaction"));

        let err = map_sqlx_error("save_record", sqlx::Error::PoolClosed);
        assert_eq!(err.kind(), StockErrorKind::StorageConflict);
        assert!(err.to_string().contains("pool closed"));
    }

    #[test]
    fn row_not_found_names_the_operation() {
        let err = map_sqlx_error("lock_record", sqlx::Error::RowNotFound);
        assert_eq!(
            err,
            StockError::storage("unexpected row not found in lock_record")
        );
    }
}
