//! Incoming-inventory storage boundary.
//!
//! A store owns three things: incoming-record headers, their line items, and
//! the `current_stock` counter of every SKU. Each method is one transaction:
//! either every write (including stock deltas) lands, or none does.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stockroom_core::{DomainError, TenantId};
use stockroom_inventory::{
    HistoryFilter, IncomingRecord, IncomingRecordId, IncomingStatus, LineItemChange, LineItemId,
    LineItemMutation, Sku, SkuId, StatusChange, StockDelta,
};

pub use in_memory::InMemoryIncomingStore;
pub use postgres::PostgresIncomingStore;

/// Store operation error.
///
/// `Domain` carries rule violations found while planning inside the
/// transaction. Everything else is an infrastructure failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Missing, or owned by another tenant.
    #[error("{0} not found")]
    NotFound(String),

    /// The transaction could not commit; retrying may succeed.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Tenant-scoped persistence for incoming records and SKU stock.
///
/// Implementations must:
/// - scope every read and write by `tenant_id`, reporting foreign ids as `NotFound`
/// - apply stock deltas additively, never by writing an absolute value
/// - serialize mutations of the same line item
#[async_trait]
pub trait IncomingStore: Send + Sync {
    async fn register_sku(&self, sku: &Sku) -> StoreResult<()>;

    async fn sku(&self, tenant_id: TenantId, sku_id: SkuId) -> StoreResult<Sku>;

    /// Persist a new record with its items and apply `deltas`.
    async fn insert_record(&self, record: &IncomingRecord, deltas: &[StockDelta]) -> StoreResult<()>;

    async fn record(&self, tenant_id: TenantId, record_id: IncomingRecordId) -> StoreResult<IncomingRecord>;

    /// Records passing the record-level predicates of `filter`.
    async fn records(&self, tenant_id: TenantId, filter: &HistoryFilter) -> StoreResult<Vec<IncomingRecord>>;

    /// Plan `mutation` against the locked item, then write the item and its
    /// stock delta.
    async fn mutate_line_item(
        &self,
        tenant_id: TenantId,
        record_id: IncomingRecordId,
        item_id: LineItemId,
        mutation: &LineItemMutation,
        now: DateTime<Utc>,
    ) -> StoreResult<LineItemChange>;

    async fn change_status(
        &self,
        tenant_id: TenantId,
        record_id: IncomingRecordId,
        next: IncomingStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<StatusChange>;
}
