//! Receiving ledger (application-level orchestration).
//!
//! Entry points for everything that touches incoming inventory:
//!
//! ```text
//! request
//!   ↓
//! 1. Build or plan the new state (pure domain code, no IO)
//!   ↓
//! 2. Store: lock, re-plan against locked rows, write item + stock delta
//!   ↓
//! 3. Commit (all or nothing)
//! ```
//!
//! The ledger owns ids and timestamps so that domain code stays deterministic.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use stockroom_core::{EntityId, TenantId};
use stockroom_inventory::{
    HistoryEntry, HistoryFilter, IncomingHeader, IncomingRecord, IncomingRecordId,
    IncomingStatus, LineItem, LineItemAdjustment, LineItemChange, LineItemId, LineItemMutation,
    NewLineItem, NewSku, ShortItemPatch, Sku, SkuId, StatusChange, summarize,
};

use crate::store::{IncomingStore, StoreError, StoreResult};

/// Incoming-inventory service over any [`IncomingStore`].
#[derive(Clone)]
pub struct ReceivingLedger {
    store: Arc<dyn IncomingStore>,
}

impl std::fmt::Debug for ReceivingLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceivingLedger").finish_non_exhaustive()
    }
}

impl ReceivingLedger {
    pub fn new(store: Arc<dyn IncomingStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, new_sku), fields(tenant_id = %tenant_id), err)]
    pub async fn register_sku(&self, tenant_id: TenantId, new_sku: NewSku) -> StoreResult<Sku> {
        let sku = new_sku.into_sku(tenant_id, SkuId::new(EntityId::new()))?;
        self.store.register_sku(&sku).await?;
        info!(sku_id = %sku.id, code = %sku.code, opening_stock = sku.current_stock, "sku registered");
        Ok(sku)
    }

    pub async fn sku(&self, tenant_id: TenantId, sku_id: SkuId) -> StoreResult<Sku> {
        self.store.sku(tenant_id, sku_id).await
    }

    /// Record a delivery and add `received` of every line to its SKU's stock.
    #[instrument(skip(self, header, lines), fields(tenant_id = %tenant_id, invoice = %header.invoice_number), err)]
    pub async fn create_incoming_record(
        &self,
        tenant_id: TenantId,
        header: IncomingHeader,
        lines: Vec<NewLineItem>,
    ) -> StoreResult<IncomingRecord> {
        let record_id = IncomingRecordId::new(EntityId::new());
        let (record, deltas) = IncomingRecord::receive(tenant_id, record_id, header, lines, Utc::now())
            .inspect_err(|e| debug!(error = %e, "incoming record rejected"))?;

        self.store.insert_record(&record, &deltas).await?;

        for delta in &deltas {
            info!(record_id = %record_id, sku_id = %delta.sku_id, delta = delta.delta, "stock received");
        }
        Ok(record)
    }

    pub async fn record(&self, tenant_id: TenantId, record_id: IncomingRecordId) -> StoreResult<IncomingRecord> {
        self.store.record(tenant_id, record_id).await
    }

    /// Line items of a record, challan metadata included.
    pub async fn items(&self, tenant_id: TenantId, record_id: IncomingRecordId) -> StoreResult<Vec<LineItem>> {
        let record = self.store.record(tenant_id, record_id).await?;
        Ok(record.items().to_vec())
    }

    /// Reconcile a short shipment: counters must sum to the invoice total.
    pub async fn update_short_item(
        &self,
        tenant_id: TenantId,
        record_id: IncomingRecordId,
        item_id: LineItemId,
        patch: ShortItemPatch,
    ) -> StoreResult<LineItemChange> {
        self.mutate(tenant_id, record_id, item_id, LineItemMutation::ReconcileShort(patch))
            .await
    }

    /// Ordinary short/rejected edit. Never changes `received` or stock.
    pub async fn adjust_line_item(
        &self,
        tenant_id: TenantId,
        record_id: IncomingRecordId,
        item_id: LineItemId,
        adjustment: LineItemAdjustment,
    ) -> StoreResult<LineItemChange> {
        self.mutate(tenant_id, record_id, item_id, LineItemMutation::Adjust(adjustment))
            .await
    }

    /// Write the outstanding shortfall off as rejected.
    pub async fn move_short_to_rejected(
        &self,
        tenant_id: TenantId,
        record_id: IncomingRecordId,
        item_id: LineItemId,
    ) -> StoreResult<LineItemChange> {
        self.mutate(tenant_id, record_id, item_id, LineItemMutation::MoveShortToRejected)
            .await
    }

    #[instrument(
        skip(self, mutation),
        fields(tenant_id = %tenant_id, record_id = %record_id, item_id = %item_id, mutation = mutation.kind())
    )]
    async fn mutate(
        &self,
        tenant_id: TenantId,
        record_id: IncomingRecordId,
        item_id: LineItemId,
        mutation: LineItemMutation,
    ) -> StoreResult<LineItemChange> {
        match self
            .store
            .mutate_line_item(tenant_id, record_id, item_id, &mutation, Utc::now())
            .await
        {
            Ok(change) => {
                let after = change.item.quantities();
                info!(
                    sku_id = %change.stock_delta.sku_id,
                    delta = change.stock_delta.delta,
                    received = after.received,
                    short = after.short,
                    rejected = after.rejected,
                    available = after.available(),
                    "line item updated"
                );
                Ok(change)
            }
            Err(StoreError::Domain(e)) => {
                debug!(error = %e, "line item change rejected");
                Err(StoreError::Domain(e))
            }
            Err(e @ StoreError::NotFound(_)) => Err(e),
            Err(e) => {
                warn!(error = %e, "line item change failed");
                Err(e)
            }
        }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, record_id = %record_id, next = next.as_str()), err)]
    pub async fn set_status(
        &self,
        tenant_id: TenantId,
        record_id: IncomingRecordId,
        next: IncomingStatus,
    ) -> StoreResult<StatusChange> {
        let change = self
            .store
            .change_status(tenant_id, record_id, next, Utc::now())
            .await?;
        info!(from = change.from.as_str(), to = change.to.as_str(), "incoming record status changed");
        Ok(change)
    }

    /// Grouped, filtered receiving history. Status labels are computed here,
    /// from the items as they are now.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    pub async fn history(&self, tenant_id: TenantId, filter: &HistoryFilter) -> StoreResult<Vec<HistoryEntry>> {
        let records = self.store.records(tenant_id, filter).await?;
        let entries = summarize(&records, filter);
        debug!(records = records.len(), entries = entries.len(), "history summarized");
        Ok(entries)
    }
}
