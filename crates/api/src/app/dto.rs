use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use stockroom_core::DomainError;
use stockroom_inventory::{
    BrandId, HistoryEntry, HistoryFilter, IncomingHeader, IncomingRecord, IncomingStatus,
    LineItem, LineItemAdjustment, LineItemChange, NewLineItem, NewSku, ShortItemPatch, Sku, SkuId,
    StatusChange, VendorId, WarrantyUnit,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateIncomingRequest {
    pub invoice_number: String,
    pub invoice_date: Option<NaiveDate>,
    pub vendor_id: VendorId,
    pub brand_id: Option<BrandId>,
    /// Defaults to today (UTC).
    pub receiving_date: Option<NaiveDate>,
    pub reason: Option<String>,
    pub remarks: Option<String>,
    pub status: Option<IncomingStatus>,
    #[serde(default)]
    pub warranty: u32,
    pub warranty_unit: Option<WarrantyUnit>,
    pub items: Vec<CreateLineItemRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateLineItemRequest {
    pub sku_id: SkuId,
    pub total_quantity: i64,
    pub received: i64,
    pub short: Option<i64>,
    pub unit_price: i64,
    pub number_of_boxes: Option<i64>,
    pub received_boxes: Option<i64>,
}

impl CreateIncomingRequest {
    pub fn into_parts(self) -> (IncomingHeader, Vec<NewLineItem>) {
        let header = IncomingHeader {
            invoice_number: self.invoice_number,
            invoice_date: self.invoice_date,
            vendor_id: self.vendor_id,
            brand_id: self.brand_id,
            receiving_date: self.receiving_date.unwrap_or_else(|| Utc::now().date_naive()),
            reason: self.reason,
            remarks: self.remarks,
            status: self.status.unwrap_or(IncomingStatus::Draft),
            warranty: self.warranty,
            warranty_unit: self.warranty_unit.unwrap_or(WarrantyUnit::Months),
        };
        let lines = self
            .items
            .into_iter()
            .map(|i| NewLineItem {
                sku_id: i.sku_id,
                total_quantity: i.total_quantity,
                received: i.received,
                short: i.short,
                unit_price: i.unit_price,
                number_of_boxes: i.number_of_boxes,
                received_boxes: i.received_boxes,
            })
            .collect();
        (header, lines)
    }
}

/// Body of the short-reconciliation endpoint, the only edit that may move `received`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcileShortRequest {
    pub received: Option<i64>,
    pub short: Option<i64>,
    pub rejected: Option<i64>,
    pub challan_number: Option<String>,
    pub challan_date: Option<NaiveDate>,
}

impl From<ReconcileShortRequest> for ShortItemPatch {
    fn from(r: ReconcileShortRequest) -> Self {
        ShortItemPatch {
            received: r.received,
            short: r.short,
            rejected: r.rejected,
            challan_number: r.challan_number,
            challan_date: r.challan_date,
        }
    }
}

/// Ordinary edit. A `received` field is rejected at deserialization.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdjustLineItemRequest {
    pub short: Option<i64>,
    pub rejected: Option<i64>,
    pub received_boxes: Option<i64>,
}

impl From<AdjustLineItemRequest> for LineItemAdjustment {
    fn from(r: AdjustLineItemRequest) -> Self {
        LineItemAdjustment {
            short: r.short,
            rejected: r.rejected,
            received_boxes: r.received_boxes,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeStatusRequest {
    pub status: IncomingStatus,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterSkuRequest {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub opening_stock: i64,
}

impl From<RegisterSkuRequest> for NewSku {
    fn from(r: RegisterSkuRequest) -> Self {
        NewSku {
            code: r.code,
            name: r.name,
            opening_stock: r.opening_stock,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub vendor_id: Option<VendorId>,
    pub brand_id: Option<BrandId>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub invoice: Option<String>,
    pub status: Option<String>,
    pub include_cancelled: Option<bool>,
}

impl HistoryQuery {
    pub fn into_filter(self) -> Result<HistoryFilter, DomainError> {
        let status = self
            .status
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse())
            .transpose()?;
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(DomainError::validation("'from' must not be after 'to'"));
            }
        }
        Ok(HistoryFilter {
            vendor_id: self.vendor_id,
            brand_id: self.brand_id,
            from: self.from,
            to: self.to,
            invoice: self.invoice.filter(|i| !i.trim().is_empty()),
            status,
            include_cancelled: self.include_cancelled.unwrap_or(false),
        })
    }
}

// -------------------------
// Response mapping
// -------------------------

pub fn item_to_json(item: &LineItem) -> Value {
    let parts = item.as_parts();
    json!({
        "id": item.id_typed().to_string(),
        "record_id": item.record_id().to_string(),
        "sku_id": item.sku_id().to_string(),
        "total_quantity": item.total_quantity(),
        "received": item.received(),
        "short": item.short(),
        "rejected": item.rejected(),
        "available": item.available(),
        "unit_price": item.unit_price(),
        "total_value": item.total_value(),
        "number_of_boxes": parts.number_of_boxes,
        "received_boxes": parts.received_boxes,
        "challan_number": item.challan_number(),
        "challan_date": item.challan_date(),
        "active": item.is_active(),
        "reconciled": item.is_reconciled(),
        "updated_at": parts.updated_at,
    })
}

pub fn record_to_json(record: &IncomingRecord) -> Value {
    let header = record.header();
    json!({
        "id": record.id_typed().to_string(),
        "invoice_number": header.invoice_number,
        "invoice_date": header.invoice_date,
        "vendor_id": header.vendor_id.to_string(),
        "brand_id": header.brand_id.map(|b| b.to_string()),
        "receiving_date": header.receiving_date,
        "reason": header.reason,
        "remarks": header.remarks,
        "status": header.status.as_str(),
        "warranty": header.warranty,
        "warranty_unit": header.warranty_unit.as_str(),
        "receipt_status": record.receipt_status().as_str(),
        "items": record.items().iter().map(item_to_json).collect::<Vec<_>>(),
        "created_at": record.created_at(),
        "updated_at": record.updated_at(),
    })
}

pub fn change_to_json(change: &LineItemChange) -> Value {
    json!({
        "item": item_to_json(&change.item),
        "stock_delta": {
            "sku_id": change.stock_delta.sku_id.to_string(),
            "delta": change.stock_delta.delta,
        },
    })
}

pub fn status_change_to_json(change: &StatusChange) -> Value {
    json!({
        "from": change.from.as_str(),
        "to": change.to.as_str(),
        "record": record_to_json(&change.record),
    })
}

pub fn sku_to_json(sku: &Sku) -> Value {
    json!({
        "id": sku.id.to_string(),
        "code": sku.code,
        "name": sku.name,
        "current_stock": sku.current_stock,
    })
}

pub fn history_entry_to_json(entry: &HistoryEntry) -> Value {
    json!({
        "vendor_id": entry.vendor_id.to_string(),
        "invoice_number": entry.invoice_number,
        "record_ids": entry.record_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        "item_count": entry.item_count,
        "total_quantity": entry.total_quantity,
        "received": entry.received,
        "short": entry.short,
        "rejected": entry.rejected,
        "available": entry.available,
        "total_value": entry.total_value,
        "latest_receiving_date": entry.latest_receiving_date,
        "status": entry.status.as_str(),
    })
}
