use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stockroom_core::{DomainError, TenantId, TenantScoped};
use stockroom_inventory::{
    HistoryFilter, IncomingRecord, IncomingRecordId, IncomingStatus, LineItemChange, LineItemId,
    LineItemMutation, Sku, SkuId, StatusChange, StockDelta,
};

use super::{IncomingStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct State {
    skus: HashMap<SkuId, Sku>,
    records: HashMap<IncomingRecordId, IncomingRecord>,
}

impl State {
    fn record(&self, tenant_id: TenantId, record_id: IncomingRecordId) -> StoreResult<&IncomingRecord> {
        self.records
            .get(&record_id)
            .filter(|r| r.belongs_to(tenant_id))
            .ok_or_else(|| StoreError::not_found(format!("incoming record {record_id}")))
    }

    fn ensure_sku(&self, tenant_id: TenantId, sku_id: SkuId) -> StoreResult<()> {
        match self.skus.get(&sku_id) {
            Some(sku) if sku.belongs_to(tenant_id) => Ok(()),
            _ => Err(StoreError::not_found(format!("sku {sku_id}"))),
        }
    }

    /// Deltas arrive consolidated (one per SKU), so each is checked on its own.
    fn ensure_applicable(&self, tenant_id: TenantId, delta: &StockDelta) -> StoreResult<()> {
        self.ensure_sku(tenant_id, delta.sku_id)?;
        let stock = self.skus.get(&delta.sku_id).map_or(0, |s| s.current_stock);
        if stock.checked_add(delta.delta).is_none() {
            return Err(StoreError::Domain(DomainError::validation(format!(
                "stock of sku {} would overflow",
                delta.sku_id
            ))));
        }
        Ok(())
    }

    /// Caller must have checked every delta with `ensure_applicable`.
    fn apply(&mut self, delta: &StockDelta) {
        if let Some(sku) = self.skus.get_mut(&delta.sku_id) {
            sku.current_stock += delta.delta;
        }
    }
}

/// In-memory incoming store.
///
/// Intended for tests/dev. One lock over the whole state: every check runs
/// before the first write, so a failed operation leaves nothing behind.
#[derive(Debug, Default)]
pub struct InMemoryIncomingStore {
    state: RwLock<State>,
}

impl InMemoryIncomingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl IncomingStore for InMemoryIncomingStore {
    async fn register_sku(&self, sku: &Sku) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.skus.contains_key(&sku.id) {
            return Err(StoreError::Conflict(format!("sku {} already exists", sku.id)));
        }
        if state
            .skus
            .values()
            .any(|s| s.belongs_to(sku.tenant_id) && s.code == sku.code)
        {
            return Err(StoreError::Conflict(format!(
                "sku code '{}' already registered",
                sku.code
            )));
        }
        state.skus.insert(sku.id, sku.clone());
        Ok(())
    }

    async fn sku(&self, tenant_id: TenantId, sku_id: SkuId) -> StoreResult<Sku> {
        let state = self.read()?;
        state
            .skus
            .get(&sku_id)
            .filter(|s| s.belongs_to(tenant_id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("sku {sku_id}")))
    }

    async fn insert_record(&self, record: &IncomingRecord, deltas: &[StockDelta]) -> StoreResult<()> {
        let tenant_id = record.tenant_id();
        let mut state = self.write()?;

        if state.records.contains_key(&record.id_typed()) {
            return Err(StoreError::Conflict(format!(
                "incoming record {} already exists",
                record.id_typed()
            )));
        }
        for item in record.items() {
            state.ensure_sku(tenant_id, item.sku_id())?;
        }
        for delta in deltas {
            state.ensure_applicable(tenant_id, delta)?;
        }

        for delta in deltas {
            state.apply(delta);
        }
        state.records.insert(record.id_typed(), record.clone());
        Ok(())
    }

    async fn record(&self, tenant_id: TenantId, record_id: IncomingRecordId) -> StoreResult<IncomingRecord> {
        let state = self.read()?;
        state.record(tenant_id, record_id).cloned()
    }

    async fn records(&self, tenant_id: TenantId, filter: &HistoryFilter) -> StoreResult<Vec<IncomingRecord>> {
        let state = self.read()?;
        Ok(state
            .records
            .values()
            .filter(|r| r.belongs_to(tenant_id) && filter.matches_record(r))
            .cloned()
            .collect())
    }

    async fn mutate_line_item(
        &self,
        tenant_id: TenantId,
        record_id: IncomingRecordId,
        item_id: LineItemId,
        mutation: &LineItemMutation,
        now: DateTime<Utc>,
    ) -> StoreResult<LineItemChange> {
        let mut state = self.write()?;

        let change = {
            let record = state.record(tenant_id, record_id)?;
            let item = record
                .item(item_id)
                .ok_or_else(|| StoreError::not_found(format!("line item {item_id}")))?;
            mutation.plan(item, now)?
        };
        if !change.stock_delta.is_zero() {
            state.ensure_applicable(tenant_id, &change.stock_delta)?;
        }

        state.apply(&change.stock_delta);
        if let Some(record) = state.records.get_mut(&record_id) {
            record.replace_item(change.item.clone());
        }
        Ok(change)
    }

    async fn change_status(
        &self,
        tenant_id: TenantId,
        record_id: IncomingRecordId,
        next: IncomingStatus,
        now: DateTime<Utc>,
    ) -> StoreResult<StatusChange> {
        let mut state = self.write()?;
        let change = state.record(tenant_id, record_id)?.change_status(next, now)?;
        state.records.insert(record_id, change.record.clone());
        Ok(change)
    }
}
