use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, Entity, TenantId, TenantScoped};

use crate::history::ReceiptStatus;
use crate::quantities::Quantities;
use crate::sku::SkuId;
use crate::stock::{self, StockDelta};

entity_id! {
    /// Incoming record identifier (one per vendor delivery).
    IncomingRecordId
}

entity_id! {
    /// Line item identifier (one per SKU within a delivery).
    LineItemId
}

entity_id! {
    VendorId
}

entity_id! {
    BrandId
}

/// Incoming record lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncomingStatus {
    Draft,
    Completed,
    Cancelled,
}

impl IncomingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncomingStatus::Draft => "draft",
            IncomingStatus::Completed => "completed",
            IncomingStatus::Cancelled => "cancelled",
        }
    }

    /// Allowed transitions: draft -> completed, draft/completed -> cancelled.
    pub fn can_transition_to(self, next: IncomingStatus) -> bool {
        matches!(
            (self, next),
            (IncomingStatus::Draft, IncomingStatus::Completed)
                | (IncomingStatus::Draft, IncomingStatus::Cancelled)
                | (IncomingStatus::Completed, IncomingStatus::Cancelled)
        )
    }
}

impl core::str::FromStr for IncomingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(IncomingStatus::Draft),
            "completed" => Ok(IncomingStatus::Completed),
            "cancelled" => Ok(IncomingStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown status '{other}' (expected draft, completed or cancelled)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarrantyUnit {
    Months,
    Year,
}

impl WarrantyUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarrantyUnit::Months => "months",
            WarrantyUnit::Year => "year",
        }
    }
}

impl core::str::FromStr for WarrantyUnit {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "month" | "months" => Ok(WarrantyUnit::Months),
            "year" | "years" => Ok(WarrantyUnit::Year),
            other => Err(DomainError::validation(format!(
                "unknown warranty unit '{other}' (expected months or year)"
            ))),
        }
    }
}

/// Delivery-level fields of an incoming record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingHeader {
    pub invoice_number: String,
    pub invoice_date: Option<NaiveDate>,
    pub vendor_id: VendorId,
    pub brand_id: Option<BrandId>,
    pub receiving_date: NaiveDate,
    pub reason: Option<String>,
    pub remarks: Option<String>,
    pub status: IncomingStatus,
    pub warranty: u32,
    pub warranty_unit: WarrantyUnit,
}

impl IncomingHeader {
    fn normalized(mut self) -> DomainResult<Self> {
        self.invoice_number = self.invoice_number.trim().to_string();
        if self.invoice_number.is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }
        if self.status == IncomingStatus::Cancelled {
            return Err(DomainError::validation(
                "an incoming record cannot be created as cancelled",
            ));
        }
        self.reason = non_blank(self.reason);
        self.remarks = non_blank(self.remarks);
        Ok(self)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Line item as submitted when a delivery is first recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub sku_id: SkuId,
    pub total_quantity: i64,
    pub received: i64,
    /// Defaults to `total_quantity - received`.
    pub short: Option<i64>,
    /// Minor currency units.
    pub unit_price: i64,
    pub number_of_boxes: Option<i64>,
    pub received_boxes: Option<i64>,
}

/// Every persisted column of a line item.
///
/// Stores read and write this shape; domain code goes through [`LineItem`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemParts {
    pub id: LineItemId,
    pub record_id: IncomingRecordId,
    pub tenant_id: TenantId,
    pub sku_id: SkuId,
    pub total_quantity: i64,
    pub received: i64,
    pub short: i64,
    pub rejected: i64,
    /// Units moved from short to rejected. Non-zero once reconciled.
    pub written_off: i64,
    pub unit_price: i64,
    pub total_value: i64,
    pub number_of_boxes: Option<i64>,
    pub received_boxes: Option<i64>,
    pub challan_number: Option<String>,
    pub challan_date: Option<NaiveDate>,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

/// A line item of an incoming record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    parts: LineItemParts,
}

impl From<LineItemParts> for LineItem {
    fn from(parts: LineItemParts) -> Self {
        Self { parts }
    }
}

impl LineItem {
    pub fn as_parts(&self) -> &LineItemParts {
        &self.parts
    }

    pub fn into_parts(self) -> LineItemParts {
        self.parts
    }

    pub fn id_typed(&self) -> LineItemId {
        self.parts.id
    }

    pub fn record_id(&self) -> IncomingRecordId {
        self.parts.record_id
    }

    pub fn sku_id(&self) -> SkuId {
        self.parts.sku_id
    }

    pub fn quantities(&self) -> Quantities {
        Quantities::new(
            self.parts.total_quantity,
            self.parts.received,
            self.parts.short,
            self.parts.rejected,
        )
    }

    pub fn total_quantity(&self) -> i64 {
        self.parts.total_quantity
    }

    pub fn received(&self) -> i64 {
        self.parts.received
    }

    pub fn short(&self) -> i64 {
        self.parts.short
    }

    pub fn rejected(&self) -> i64 {
        self.parts.rejected
    }

    /// Derived on every call; there is no stored column.
    pub fn available(&self) -> i64 {
        self.quantities().available()
    }

    pub fn unit_price(&self) -> i64 {
        self.parts.unit_price
    }

    pub fn total_value(&self) -> i64 {
        self.parts.total_value
    }

    pub fn challan_number(&self) -> Option<&str> {
        self.parts.challan_number.as_deref()
    }

    pub fn challan_date(&self) -> Option<NaiveDate> {
        self.parts.challan_date
    }

    pub fn is_active(&self) -> bool {
        self.parts.active
    }

    /// True once outstanding short units were written off as rejected.
    pub fn is_reconciled(&self) -> bool {
        self.parts.written_off > 0
    }

    /// Copy with new counters; `total_quantity` and `unit_price` are kept and
    /// `total_value` follows `received`.
    pub(crate) fn with_quantities(&self, q: Quantities, now: DateTime<Utc>) -> DomainResult<Self> {
        let total_value = value_of(q.received, self.parts.unit_price)?;
        let mut parts = self.parts.clone();
        parts.received = q.received;
        parts.short = q.short;
        parts.rejected = q.rejected;
        parts.total_value = total_value;
        parts.updated_at = now;
        Ok(Self { parts })
    }

    pub(crate) fn with_challan(mut self, number: Option<&str>, date: Option<NaiveDate>) -> Self {
        if let Some(n) = number.map(str::trim).filter(|n| !n.is_empty()) {
            self.parts.challan_number = Some(n.to_string());
        }
        if date.is_some() {
            self.parts.challan_date = date;
        }
        self
    }

    pub(crate) fn with_received_boxes(mut self, received_boxes: Option<i64>) -> DomainResult<Self> {
        if let Some(boxes) = received_boxes {
            check_boxes(self.parts.number_of_boxes, Some(boxes))?;
            self.parts.received_boxes = Some(boxes);
        }
        Ok(self)
    }

    pub(crate) fn written_off_by(mut self, units: i64) -> Self {
        self.parts.written_off += units;
        self
    }

    fn deactivated(&self, now: DateTime<Utc>) -> Self {
        let mut parts = self.parts.clone();
        parts.active = false;
        parts.updated_at = now;
        Self { parts }
    }
}

impl Entity for LineItem {
    type Id = LineItemId;

    fn id(&self) -> &Self::Id {
        &self.parts.id
    }
}

impl TenantScoped for LineItem {
    fn tenant_id(&self) -> TenantId {
        self.parts.tenant_id
    }
}

fn value_of(received: i64, unit_price: i64) -> DomainResult<i64> {
    received
        .checked_mul(unit_price)
        .ok_or_else(|| DomainError::validation("total value overflows"))
}

fn check_boxes(number_of_boxes: Option<i64>, received_boxes: Option<i64>) -> DomainResult<()> {
    if number_of_boxes.is_some_and(|n| n < 0) || received_boxes.is_some_and(|n| n < 0) {
        return Err(DomainError::validation("box counts cannot be negative"));
    }
    if let (Some(total), Some(received)) = (number_of_boxes, received_boxes) {
        if received > total {
            return Err(DomainError::validation(
                "received boxes cannot exceed number of boxes",
            ));
        }
    }
    Ok(())
}

/// Result of a status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: IncomingStatus,
    pub to: IncomingStatus,
    pub record: IncomingRecord,
}

/// Incoming record: a vendor delivery and its line items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRecord {
    id: IncomingRecordId,
    tenant_id: TenantId,
    header: IncomingHeader,
    items: Vec<LineItem>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IncomingRecord {
    /// Record a new delivery.
    ///
    /// Returns the record together with the stock deltas it implies: `+received`
    /// per line, one delta per SKU. Nothing is returned unless every line is valid.
    pub fn receive(
        tenant_id: TenantId,
        id: IncomingRecordId,
        header: IncomingHeader,
        lines: Vec<NewLineItem>,
        now: DateTime<Utc>,
    ) -> DomainResult<(IncomingRecord, Vec<StockDelta>)> {
        let header = header.normalized()?;
        if lines.is_empty() {
            return Err(DomainError::validation(
                "an incoming record needs at least one item",
            ));
        }

        let mut items: Vec<LineItem> = Vec::with_capacity(lines.len());
        for (idx, line) in lines.into_iter().enumerate() {
            if items.iter().any(|i| i.sku_id() == line.sku_id) {
                return Err(DomainError::validation(format!(
                    "items[{idx}]: sku {} appears more than once",
                    line.sku_id
                )));
            }
            let item = new_line_item(tenant_id, id, line, now).map_err(|e| at_item(idx, e))?;
            items.push(item);
        }

        let deltas = stock::consolidate(
            items
                .iter()
                .map(|i| StockDelta::new(i.sku_id(), i.received())),
        );

        let record = IncomingRecord {
            id,
            tenant_id,
            header,
            items,
            created_at: now,
            updated_at: now,
        };
        Ok((record, deltas))
    }

    /// Rebuild from persisted state.
    pub fn restore(
        id: IncomingRecordId,
        tenant_id: TenantId,
        header: IncomingHeader,
        items: Vec<LineItem>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            header,
            items,
            created_at,
            updated_at,
        }
    }

    pub fn id_typed(&self) -> IncomingRecordId {
        self.id
    }

    pub fn header(&self) -> &IncomingHeader {
        &self.header
    }

    pub fn status(&self) -> IncomingStatus {
        self.header.status
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn item(&self, item_id: LineItemId) -> Option<&LineItem> {
        self.items.iter().find(|i| i.id_typed() == item_id)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn total_short(&self) -> i64 {
        self.items.iter().map(LineItem::short).fold(0, i64::saturating_add)
    }

    /// Read-time label; never stored.
    pub fn receipt_status(&self) -> ReceiptStatus {
        ReceiptStatus::from_total_short(self.total_short())
    }

    /// Swap in a mutated line item. Returns false if the item is not part of
    /// this record.
    pub fn replace_item(&mut self, item: LineItem) -> bool {
        match self.items.iter_mut().find(|i| i.id_typed() == item.id_typed()) {
            Some(slot) => {
                self.updated_at = self.updated_at.max(item.as_parts().updated_at);
                *slot = item;
                true
            }
            None => false,
        }
    }

    /// Move to `next`. Cancelling deactivates every line item and leaves stock alone.
    pub fn change_status(&self, next: IncomingStatus, now: DateTime<Utc>) -> DomainResult<StatusChange> {
        let from = self.header.status;
        if !from.can_transition_to(next) {
            return Err(DomainError::invariant(format!(
                "cannot change status from {} to {}",
                from.as_str(),
                next.as_str()
            )));
        }

        let mut record = self.clone();
        record.header.status = next;
        record.updated_at = now;
        if next == IncomingStatus::Cancelled {
            record.items = self.items.iter().map(|i| i.deactivated(now)).collect();
        }

        Ok(StatusChange { from, to: next, record })
    }
}

impl Entity for IncomingRecord {
    type Id = IncomingRecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantScoped for IncomingRecord {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

fn new_line_item(
    tenant_id: TenantId,
    record_id: IncomingRecordId,
    line: NewLineItem,
    now: DateTime<Utc>,
) -> DomainResult<LineItem> {
    let short = match line.short {
        Some(short) => short,
        None => line
            .total_quantity
            .checked_sub(line.received)
            .ok_or_else(|| DomainError::validation("quantities are out of range"))?,
    };
    let q = Quantities::new(line.total_quantity, line.received, short, 0);
    q.ensure_receivable()?;

    if line.unit_price < 0 {
        return Err(DomainError::validation("unit price cannot be negative"));
    }
    check_boxes(line.number_of_boxes, line.received_boxes)?;

    Ok(LineItem::from(LineItemParts {
        id: LineItemId::new(stockroom_core::EntityId::new()),
        record_id,
        tenant_id,
        sku_id: line.sku_id,
        total_quantity: q.total,
        received: q.received,
        short: q.short,
        rejected: 0,
        written_off: 0,
        unit_price: line.unit_price,
        total_value: value_of(q.received, line.unit_price)?,
        number_of_boxes: line.number_of_boxes,
        received_boxes: line.received_boxes,
        challan_number: None,
        challan_date: None,
        active: true,
        updated_at: now,
    }))
}

fn at_item(idx: usize, err: DomainError) -> DomainError {
    match err {
        DomainError::Validation(msg) => DomainError::Validation(format!("items[{idx}]: {msg}")),
        other => other,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;
    use stockroom_core::EntityId;

    pub(crate) fn header() -> IncomingHeader {
        IncomingHeader {
            invoice_number: "INV-001".to_string(),
            invoice_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            vendor_id: VendorId::new(EntityId::new()),
            brand_id: None,
            receiving_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            reason: None,
            remarks: Some("  ".to_string()),
            status: IncomingStatus::Draft,
            warranty: 12,
            warranty_unit: WarrantyUnit::Months,
        }
    }

    pub(crate) fn line(sku_id: SkuId, total: i64, received: i64) -> NewLineItem {
        NewLineItem {
            sku_id,
            total_quantity: total,
            received,
            short: None,
            unit_price: 50,
            number_of_boxes: None,
            received_boxes: None,
        }
    }

    pub(crate) fn sku() -> SkuId {
        SkuId::new(EntityId::new())
    }

    pub(crate) fn received_item(total: i64, received: i64) -> LineItem {
        let (record, _) = IncomingRecord::receive(
            TenantId::new(),
            IncomingRecordId::new(EntityId::new()),
            header(),
            vec![line(sku(), total, received)],
            Utc::now(),
        )
        .unwrap();
        record.items()[0].clone()
    }

    #[test]
    fn receive_defaults_short_and_starts_rejected_at_zero() {
        let item = received_item(100, 80);
        assert_eq!(item.short(), 20);
        assert_eq!(item.rejected(), 0);
        assert_eq!(item.total_value(), 80 * 50);
        assert!(item.is_active());
        assert!(item.challan_number().is_none());
    }

    #[test]
    fn receive_emits_received_not_total_as_stock_delta() {
        let sku_id = sku();
        let (_, deltas) = IncomingRecord::receive(
            TenantId::new(),
            IncomingRecordId::new(EntityId::new()),
            header(),
            vec![line(sku_id, 100, 80)],
            Utc::now(),
        )
        .unwrap();
        assert_eq!(deltas, vec![StockDelta::new(sku_id, 80)]);
    }

    #[test]
    fn receive_normalizes_header() {
        let (record, _) = IncomingRecord::receive(
            TenantId::new(),
            IncomingRecordId::new(EntityId::new()),
            IncomingHeader {
                invoice_number: "  INV-9 ".into(),
                ..header()
            },
            vec![line(sku(), 1, 1)],
            Utc::now(),
        )
        .unwrap();
        assert_eq!(record.header().invoice_number, "INV-9");
        assert_eq!(record.header().remarks, None);
    }

    #[test]
    fn receive_rejects_whole_record_when_any_line_is_invalid() {
        let err = IncomingRecord::receive(
            TenantId::new(),
            IncomingRecordId::new(EntityId::new()),
            header(),
            vec![line(sku(), 10, 10), line(sku(), 10, 11)],
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("items[1]: received + short cannot exceed Total Quantity")
        );
    }

    #[test]
    fn receive_rejects_duplicate_skus_and_empty_items() {
        let sku_id = sku();
        let dup = IncomingRecord::receive(
            TenantId::new(),
            IncomingRecordId::new(EntityId::new()),
            header(),
            vec![line(sku_id, 10, 10), line(sku_id, 5, 5)],
            Utc::now(),
        );
        assert!(matches!(dup, Err(DomainError::Validation(msg)) if msg.contains("more than once")));

        let empty = IncomingRecord::receive(
            TenantId::new(),
            IncomingRecordId::new(EntityId::new()),
            header(),
            vec![],
            Utc::now(),
        );
        assert!(empty.is_err());
    }

    #[test]
    fn receive_checks_boxes_and_price() {
        let mut bad_boxes = line(sku(), 10, 10);
        bad_boxes.number_of_boxes = Some(2);
        bad_boxes.received_boxes = Some(3);
        let mut bad_price = line(sku(), 10, 10);
        bad_price.unit_price = -1;

        for bad in [bad_boxes, bad_price] {
            assert!(IncomingRecord::receive(
                TenantId::new(),
                IncomingRecordId::new(EntityId::new()),
                header(),
                vec![bad],
                Utc::now(),
            )
            .is_err());
        }
    }

    #[test]
    fn receive_rejects_counters_that_would_overflow() {
        let mut huge_received = line(sku(), 100, 0);
        huge_received.received = i64::MAX;
        huge_received.short = Some(1);
        let mut wrapping_default = line(sku(), i64::MAX, 0);
        wrapping_default.received = -1;

        for bad in [huge_received, wrapping_default] {
            let err = IncomingRecord::receive(
                TenantId::new(),
                IncomingRecordId::new(EntityId::new()),
                header(),
                vec![bad],
                Utc::now(),
            )
            .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn cancelling_deactivates_items() {
        let (record, _) = IncomingRecord::receive(
            TenantId::new(),
            IncomingRecordId::new(EntityId::new()),
            header(),
            vec![line(sku(), 10, 8), line(sku(), 4, 4)],
            Utc::now(),
        )
        .unwrap();

        let change = record.change_status(IncomingStatus::Cancelled, Utc::now()).unwrap();
        assert_eq!(change.from, IncomingStatus::Draft);
        assert_eq!(change.record.status(), IncomingStatus::Cancelled);
        assert!(change.record.items().iter().all(|i| !i.is_active()));
        // Quantities are untouched by deactivation.
        assert_eq!(change.record.items()[0].received(), 8);

        let err = change
            .record
            .change_status(IncomingStatus::Completed, Utc::now())
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn status_parsing_is_case_insensitive() {
        assert_eq!("Completed".parse::<IncomingStatus>().unwrap(), IncomingStatus::Completed);
        assert_eq!("years".parse::<WarrantyUnit>().unwrap(), WarrantyUnit::Year);
        assert!("archived".parse::<IncomingStatus>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&IncomingStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Creating a record moves stock by exactly `received` per SKU.
        #[test]
        fn creation_delta_equals_received(
            lines in prop::collection::vec((0i64..10_000, 0i64..10_000), 1..8)
        ) {
            let new_lines: Vec<NewLineItem> = lines
                .iter()
                .map(|(a, b)| {
                    let (total, received) = if a >= b { (*a, *b) } else { (*b, *a) };
                    line(sku(), total, received)
                })
                .collect();
            let expected: i64 = new_lines.iter().map(|l| l.received).sum();

            let (record, deltas) = IncomingRecord::receive(
                TenantId::new(),
                IncomingRecordId::new(EntityId::new()),
                header(),
                new_lines,
                Utc::now(),
            )
            .unwrap();

            prop_assert_eq!(deltas.len(), record.items().len());
            prop_assert_eq!(deltas.iter().map(|d| d.delta).sum::<i64>(), expected);
            for item in record.items() {
                prop_assert_eq!(item.short(), item.total_quantity() - item.received());
            }
        }
    }
}
