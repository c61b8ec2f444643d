//! Postgres-backed incoming store.
//!
//! Every trait method runs in one transaction. Line items being mutated are
//! locked with `SELECT ... FOR UPDATE`; SKU stock is moved with
//! `current_stock = current_stock + $delta`, in SKU-id order.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Conflict` |
//! | Database (foreign key / check violation) | `23503` / `23514` | `Backend` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / PoolTimedOut / Io | N/A | `Unavailable` |
//! | Other | N/A | `Backend` |

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{FromRow, Postgres, Row, Transaction};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use stockroom_core::{DomainError, EntityId, TenantId, TenantScoped};
use stockroom_inventory::{
    BrandId, HistoryFilter, IncomingHeader, IncomingRecord, IncomingRecordId, IncomingStatus,
    LineItem, LineItemChange, LineItemId, LineItemMutation, LineItemParts, Sku, SkuId,
    StatusChange, StockDelta, VendorId,
};

use super::{IncomingStore, StoreError, StoreResult};

const HEADER_COLUMNS: &str = "id, company_id, invoice_number, invoice_date, vendor_id, brand_id, \
     receiving_date, reason, remarks, status, warranty, warranty_unit, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, incoming_inventory_id, company_id, sku_id, total_quantity, \
     received, short, rejected, written_off, unit_price, total_value, number_of_boxes, \
     received_boxes, challan_number, challan_date, is_active, updated_at";

/// Postgres-backed incoming store.
#[derive(Debug, Clone)]
pub struct PostgresIncomingStore {
    pool: PgPool,
}

impl PostgresIncomingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        info!(max_connections, "connecting to PostgreSQL");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;
        info!("incoming inventory migrations applied");
        Ok(())
    }

    async fn begin(&self, operation: &str) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }
}

#[async_trait]
impl IncomingStore for PostgresIncomingStore {
    #[instrument(skip(self, sku), fields(tenant_id = %sku.tenant_id, sku_id = %sku.id), err)]
    async fn register_sku(&self, sku: &Sku) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO skus (id, company_id, code, name, current_stock)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(sku.id.0.as_uuid())
        .bind(sku.tenant_id.as_uuid())
        .bind(&sku.code)
        .bind(&sku.name)
        .bind(sku.current_stock)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("register_sku", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, sku_id = %sku_id), err)]
    async fn sku(&self, tenant_id: TenantId, sku_id: SkuId) -> StoreResult<Sku> {
        let row = sqlx::query(
            r#"
            SELECT id, company_id, code, name, current_stock
            FROM skus
            WHERE id = $1 AND company_id = $2
            "#,
        )
        .bind(sku_id.0.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("sku", e))?
        .ok_or_else(|| StoreError::not_found(format!("sku {sku_id}")))?;

        let sku = SkuRow::from_row(&row).map_err(|e| map_sqlx_error("decode_sku", e))?;
        Ok(sku.0)
    }

    #[instrument(
        skip(self, record, deltas),
        fields(tenant_id = %record.tenant_id(), record_id = %record.id_typed(), items = record.items().len()),
        err
    )]
    async fn insert_record(&self, record: &IncomingRecord, deltas: &[StockDelta]) -> StoreResult<()> {
        let tenant_id = record.tenant_id();
        let header = record.header();
        let warranty = i32::try_from(header.warranty)
            .map_err(|_| DomainError::validation("warranty is out of range"))?;

        let mut tx = self.begin("insert_record").await?;

        sqlx::query(
            r#"
            INSERT INTO incoming_inventory (
                id, company_id, invoice_number, invoice_date, vendor_id, brand_id,
                receiving_date, reason, remarks, status, warranty, warranty_unit,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(record.id_typed().0.as_uuid())
        .bind(tenant_id.as_uuid())
        .bind(&header.invoice_number)
        .bind(header.invoice_date)
        .bind(header.vendor_id.0.as_uuid())
        .bind(header.brand_id.map(|b| *b.0.as_uuid()))
        .bind(header.receiving_date)
        .bind(&header.reason)
        .bind(&header.remarks)
        .bind(header.status.as_str())
        .bind(warranty)
        .bind(header.warranty_unit.as_str())
        .bind(record.created_at())
        .bind(record.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_header", e))?;

        // Deltas first: an unknown SKU fails here with NotFound instead of a
        // foreign-key error on the item insert.
        for delta in deltas {
            apply_stock_delta(&mut tx, tenant_id, delta).await?;
        }

        for item in record.items() {
            insert_item(&mut tx, item.as_parts()).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_insert_record", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, record_id = %record_id), err)]
    async fn record(&self, tenant_id: TenantId, record_id: IncomingRecordId) -> StoreResult<IncomingRecord> {
        let mut tx = self.begin("record").await?;
        let record = load_record(&mut tx, tenant_id, record_id, false).await?;
        tx.commit().await.map_err(|e| map_sqlx_error("commit_record", e))?;
        Ok(record)
    }

    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id), err)]
    async fn records(&self, tenant_id: TenantId, filter: &HistoryFilter) -> StoreResult<Vec<IncomingRecord>> {
        let mut tx = self.begin("records").await?;

        let sql = format!(
            r#"
            SELECT {HEADER_COLUMNS}
            FROM incoming_inventory
            WHERE company_id = $1
              AND ($2::uuid IS NULL OR vendor_id = $2)
              AND ($3::uuid IS NULL OR brand_id = $3)
              AND ($4::date IS NULL OR receiving_date >= $4)
              AND ($5::date IS NULL OR receiving_date <= $5)
              AND ($6::text IS NULL OR strpos(lower(invoice_number), lower($6)) > 0)
              AND ($7 OR status <> 'cancelled')
            ORDER BY receiving_date DESC, invoice_number
            "#
        );
        let header_rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(filter.vendor_id.map(|v| *v.0.as_uuid()))
            .bind(filter.brand_id.map(|b| *b.0.as_uuid()))
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.invoice.as_deref().map(str::trim).filter(|s| !s.is_empty()))
            .bind(filter.include_cancelled)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("records", e))?;

        let headers = header_rows
            .iter()
            .map(HeaderRow::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("decode_header", e))?;
        let ids: Vec<Uuid> = headers.iter().map(|h| *h.id.0.as_uuid()).collect();

        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM incoming_inventory_items
            WHERE company_id = $1 AND incoming_inventory_id = ANY($2)
            ORDER BY incoming_inventory_id, id
            "#
        );
        let item_rows = sqlx::query(&sql)
            .bind(tenant_id.as_uuid())
            .bind(ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("record_items", e))?;

        let mut items_by_record: HashMap<IncomingRecordId, Vec<LineItem>> = HashMap::new();
        for row in &item_rows {
            let item = ItemRow::from_row(row).map_err(|e| map_sqlx_error("decode_item", e))?;
            items_by_record
                .entry(item.0.record_id)
                .or_default()
                .push(LineItem::from(item.0));
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit_records", e))?;

        let records: Vec<IncomingRecord> = headers
            .into_iter()
            .map(|h| {
                let items = items_by_record.remove(&h.id).unwrap_or_default();
                h.into_record(items)
            })
            .collect();
        debug!(count = records.len(), "loaded incoming records");
        Ok(records)
    }

    #[instrument(
        skip(self, mutation, now),
        fields(tenant_id = %tenant_id, record_id = %record_id, item_id = %item_id, mutation = mutation.kind()),
        err
    )]
    async fn mutate_line_item(
        &self,
        tenant_id: TenantId,
        record_id: IncomingRecordId,
        item_id: LineItemId,
        mutation: &LineItemMutation,
        now: DateTime<Utc>,
    ) -> StoreResult<LineItemChange> {
        let mut tx = self.begin("mutate_line_item").await?;

        let sql = format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM incoming_inventory_items
            WHERE id = $1 AND incoming_inventory_id = $2 AND company_id = $3
            FOR UPDATE
            "#
        );
        let row = sqlx::query(&sql)
            .bind(item_id.0.as_uuid())
            .bind(record_id.0.as_uuid())
            .bind(tenant_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_line_item", e))?
            .ok_or_else(|| StoreError::not_found(format!("line item {item_id}")))?;
        let current = LineItem::from(
            ItemRow::from_row(&row)
                .map_err(|e| map_sqlx_error("decode_item", e))?
                .0,
        );

        // A rejected plan drops `tx`, which rolls back and releases the lock.
        let change = mutation.plan(&current, now)?;
        let parts = change.item.as_parts();

        sqlx::query(
            r#"
            UPDATE incoming_inventory_items
            SET received = $1,
                short = $2,
                rejected = $3,
                written_off = $4,
                total_value = $5,
                received_boxes = $6,
                challan_number = $7,
                challan_date = $8,
                updated_at = $9
            WHERE id = $10 AND company_id = $11
            "#,
        )
        .bind(parts.received)
        .bind(parts.short)
        .bind(parts.rejected)
        .bind(parts.written_off)
        .bind(parts.total_value)
        .bind(parts.received_boxes)
        .bind(&parts.challan_number)
        .bind(parts.challan_date)
        .bind(parts.updated_at)
        .bind(item_id.0.as_uuid())
        .bind(tenant_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_line_item", e))?;

        if !change.stock_delta.is_zero() {
            apply_stock_delta(&mut tx, tenant_id, &change.stock_delta).await?;
        }

        sqlx::query("UPDATE incoming_inventory SET updated_at = $1 WHERE id = $2 AND company_id = $3")
            .bind(now)
            .bind(record_id.0.as_uuid())
            .bind(tenant_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("touch_record", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_mutate_line_item", e))?;
        Ok(change)
    }

    #[instrument(skip(self, now), fields(tenant_id = %tenant_id, record_id = %record_id, next = next.as_str()), err)]
    async fn change_status(
        &self,
        tenant_id: TenantId,
        record_id: IncomingRecordId,
        next: IncomingStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<StatusChange> {
        let mut tx = self.begin("change_status").await?;
        let record = load_record(&mut tx, tenant_id, record_id, true).await?;
        let change = record.change_status(next, now)?;

        sqlx::query(
            "UPDATE incoming_inventory SET status = $1, updated_at = $2 WHERE id = $3 AND company_id = $4",
        )
        .bind(next.as_str())
        .bind(now)
        .bind(record_id.0.as_uuid())
        .bind(tenant_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_status", e))?;

        if next == IncomingStatus::Cancelled {
            sqlx::query(
                r#"
                UPDATE incoming_inventory_items
                SET is_active = FALSE, updated_at = $1
                WHERE incoming_inventory_id = $2 AND company_id = $3
                "#,
            )
            .bind(now)
            .bind(record_id.0.as_uuid())
            .bind(tenant_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("deactivate_items", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_change_status", e))?;
        Ok(change)
    }
}

async fn load_record(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    record_id: IncomingRecordId,
    for_update: bool,
) -> StoreResult<IncomingRecord> {
    let lock = if for_update { "FOR UPDATE" } else { "" };
    let sql = format!(
        "SELECT {HEADER_COLUMNS} FROM incoming_inventory WHERE id = $1 AND company_id = $2 {lock}"
    );
    let row = sqlx::query(&sql)
        .bind(record_id.0.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("load_record", e))?
        .ok_or_else(|| StoreError::not_found(format!("incoming record {record_id}")))?;
    let header = HeaderRow::from_row(&row).map_err(|e| map_sqlx_error("decode_header", e))?;

    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM incoming_inventory_items \
         WHERE incoming_inventory_id = $1 AND company_id = $2 ORDER BY id {lock}"
    );
    let rows = sqlx::query(&sql)
        .bind(record_id.0.as_uuid())
        .bind(tenant_id.as_uuid())
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("load_record_items", e))?;
    let items = rows
        .iter()
        .map(|r| ItemRow::from_row(r).map(|i| LineItem::from(i.0)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| map_sqlx_error("decode_item", e))?;

    Ok(header.into_record(items))
}

async fn insert_item(tx: &mut Transaction<'_, Postgres>, parts: &LineItemParts) -> StoreResult<()> {
    let sql = format!(
        "INSERT INTO incoming_inventory_items ({ITEM_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
    );
    sqlx::query(&sql)
        .bind(parts.id.0.as_uuid())
        .bind(parts.record_id.0.as_uuid())
        .bind(parts.tenant_id.as_uuid())
        .bind(parts.sku_id.0.as_uuid())
        .bind(parts.total_quantity)
        .bind(parts.received)
        .bind(parts.short)
        .bind(parts.rejected)
        .bind(parts.written_off)
        .bind(parts.unit_price)
        .bind(parts.total_value)
        .bind(parts.number_of_boxes)
        .bind(parts.received_boxes)
        .bind(&parts.challan_number)
        .bind(parts.challan_date)
        .bind(parts.active)
        .bind(parts.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_item", e))?;
    Ok(())
}

/// Additive stock update. Zero rows means the SKU is unknown to this tenant.
async fn apply_stock_delta(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    delta: &StockDelta,
) -> StoreResult<()> {
    let result = sqlx::query(
        "UPDATE skus SET current_stock = current_stock + $1 WHERE id = $2 AND company_id = $3",
    )
    .bind(delta.delta)
    .bind(delta.sku_id.0.as_uuid())
    .bind(tenant_id.as_uuid())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("apply_stock_delta", e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(format!("sku {}", delta.sku_id)));
    }
    debug!(sku_id = %delta.sku_id, delta = delta.delta, "stock delta applied");
    Ok(())
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation, serialization failure, deadlock
                Some("23505") | Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                // Foreign key / check constraint violation
                Some("23503") | Some("23514") => StoreError::Backend(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

// SQLx row types

struct SkuRow(Sku);

impl<'r> FromRow<'r, PgRow> for SkuRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SkuRow(Sku {
            id: SkuId::new(EntityId::from_uuid(row.try_get("id")?)),
            tenant_id: TenantId::from_uuid(row.try_get("company_id")?),
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            current_stock: row.try_get("current_stock")?,
        }))
    }
}

struct HeaderRow {
    id: IncomingRecordId,
    tenant_id: TenantId,
    header: IncomingHeader,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl HeaderRow {
    fn into_record(self, items: Vec<LineItem>) -> IncomingRecord {
        IncomingRecord::restore(
            self.id,
            self.tenant_id,
            self.header,
            items,
            self.created_at,
            self.updated_at,
        )
    }
}

fn decode_err(err: DomainError) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

impl<'r> FromRow<'r, PgRow> for HeaderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let warranty_unit: String = row.try_get("warranty_unit")?;
        let warranty: i32 = row.try_get("warranty")?;
        let brand_id: Option<Uuid> = row.try_get("brand_id")?;
        let invoice_date: Option<NaiveDate> = row.try_get("invoice_date")?;

        Ok(HeaderRow {
            id: IncomingRecordId::new(EntityId::from_uuid(row.try_get("id")?)),
            tenant_id: TenantId::from_uuid(row.try_get("company_id")?),
            header: IncomingHeader {
                invoice_number: row.try_get("invoice_number")?,
                invoice_date,
                vendor_id: VendorId::new(EntityId::from_uuid(row.try_get("vendor_id")?)),
                brand_id: brand_id.map(|b| BrandId::new(EntityId::from_uuid(b))),
                receiving_date: row.try_get("receiving_date")?,
                reason: row.try_get("reason")?,
                remarks: row.try_get("remarks")?,
                status: status.parse().map_err(decode_err)?,
                warranty: u32::try_from(warranty)
                    .map_err(|_| decode_err(DomainError::validation("negative warranty")))?,
                warranty_unit: warranty_unit.parse().map_err(decode_err)?,
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

struct ItemRow(LineItemParts);

impl<'r> FromRow<'r, PgRow> for ItemRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ItemRow(LineItemParts {
            id: LineItemId::new(EntityId::from_uuid(row.try_get("id")?)),
            record_id: IncomingRecordId::new(EntityId::from_uuid(row.try_get("incoming_inventory_id")?)),
            tenant_id: TenantId::from_uuid(row.try_get("company_id")?),
            sku_id: SkuId::new(EntityId::from_uuid(row.try_get("sku_id")?)),
            total_quantity: row.try_get("total_quantity")?,
            received: row.try_get("received")?,
            short: row.try_get("short")?,
            rejected: row.try_get("rejected")?,
            written_off: row.try_get("written_off")?,
            unit_price: row.try_get("unit_price")?,
            total_value: row.try_get("total_value")?,
            number_of_boxes: row.try_get("number_of_boxes")?,
            received_boxes: row.try_get("received_boxes")?,
            challan_number: row.try_get("challan_number")?,
            challan_date: row.try_get("challan_date")?,
            active: row.try_get("is_active")?,
            updated_at: row.try_get("updated_at")?,
        }))
    }
}
