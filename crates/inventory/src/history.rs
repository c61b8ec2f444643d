//! Receiving history grouped by invoice.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockroom_core::DomainError;

use crate::record::{BrandId, IncomingRecord, IncomingRecordId, IncomingStatus, VendorId};

/// Read-time label: `Pending` while any item still has short units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Pending,
    Complete,
}

impl ReceiptStatus {
    pub fn from_total_short(total_short: i64) -> Self {
        if total_short > 0 {
            ReceiptStatus::Pending
        } else {
            ReceiptStatus::Complete
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Pending => "Pending",
            ReceiptStatus::Complete => "Complete",
        }
    }
}

impl core::str::FromStr for ReceiptStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ReceiptStatus::Pending),
            "complete" => Ok(ReceiptStatus::Complete),
            other => Err(DomainError::validation(format!(
                "unknown receipt status '{other}' (expected Pending or Complete)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub vendor_id: Option<VendorId>,
    pub brand_id: Option<BrandId>,
    /// Inclusive bounds on `receiving_date`.
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Case-insensitive substring of the invoice number.
    pub invoice: Option<String>,
    pub status: Option<ReceiptStatus>,
    #[serde(default)]
    pub include_cancelled: bool,
}

impl HistoryFilter {
    /// Record-level predicates. `status` applies to grouped entries instead.
    pub fn matches_record(&self, record: &IncomingRecord) -> bool {
        let header = record.header();

        if !self.include_cancelled && header.status == IncomingStatus::Cancelled {
            return false;
        }
        if self.vendor_id.is_some_and(|v| v != header.vendor_id) {
            return false;
        }
        if self.brand_id.is_some() && self.brand_id != header.brand_id {
            return false;
        }
        if self.from.is_some_and(|from| header.receiving_date < from) {
            return false;
        }
        if self.to.is_some_and(|to| header.receiving_date > to) {
            return false;
        }
        if let Some(needle) = self.invoice.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            if !header
                .invoice_number
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        true
    }
}

/// One invoice from one vendor, possibly delivered over several records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub vendor_id: VendorId,
    pub invoice_number: String,
    pub record_ids: Vec<IncomingRecordId>,
    pub item_count: usize,
    pub total_quantity: i64,
    pub received: i64,
    pub short: i64,
    pub rejected: i64,
    pub available: i64,
    pub total_value: i64,
    pub latest_receiving_date: NaiveDate,
    pub status: ReceiptStatus,
}

impl HistoryEntry {
    fn open(record: &IncomingRecord) -> Self {
        let header = record.header();
        Self {
            vendor_id: header.vendor_id,
            invoice_number: header.invoice_number.clone(),
            record_ids: Vec::new(),
            item_count: 0,
            total_quantity: 0,
            received: 0,
            short: 0,
            rejected: 0,
            available: 0,
            total_value: 0,
            latest_receiving_date: header.receiving_date,
            status: ReceiptStatus::Complete,
        }
    }

    fn absorb(&mut self, record: &IncomingRecord) {
        self.record_ids.push(record.id_typed());
        self.latest_receiving_date = self.latest_receiving_date.max(record.header().receiving_date);
        for item in record.items() {
            self.item_count += 1;
            self.total_quantity = self.total_quantity.saturating_add(item.total_quantity());
            self.received = self.received.saturating_add(item.received());
            self.short = self.short.saturating_add(item.short());
            self.rejected = self.rejected.saturating_add(item.rejected());
            self.available = self.available.saturating_add(item.available());
            self.total_value = self.total_value.saturating_add(item.total_value());
        }
        self.status = ReceiptStatus::from_total_short(self.short);
    }
}

/// Group `records` by (vendor, invoice number) and aggregate their items.
///
/// Newest receiving date first, ties broken by invoice number.
pub fn summarize<'a, I>(records: I, filter: &HistoryFilter) -> Vec<HistoryEntry>
where
    I: IntoIterator<Item = &'a IncomingRecord>,
{
    let mut groups: BTreeMap<(VendorId, String), HistoryEntry> = BTreeMap::new();

    for record in records.into_iter().filter(|r| filter.matches_record(r)) {
        let key = (record.header().vendor_id, record.header().invoice_number.clone());
        groups
            .entry(key)
            .or_insert_with(|| HistoryEntry::open(record))
            .absorb(record);
    }

    let mut entries: Vec<HistoryEntry> = groups
        .into_values()
        .filter(|e| filter.status.is_none_or(|s| s == e.status))
        .collect();

    entries.sort_by(|a, b| {
        b.latest_receiving_date
            .cmp(&a.latest_receiving_date)
            .then_with(|| a.invoice_number.cmp(&b.invoice_number))
    });
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::{header, line, sku};
    use crate::{IncomingHeader, LineItemMutation};
    use chrono::Utc;
    use stockroom_core::{EntityId, TenantId};

    fn record(header: IncomingHeader, lines: Vec<(i64, i64)>) -> IncomingRecord {
        IncomingRecord::receive(
            TenantId::new(),
            IncomingRecordId::new(EntityId::new()),
            header,
            lines.into_iter().map(|(t, r)| line(sku(), t, r)).collect(),
            Utc::now(),
        )
        .unwrap()
        .0
    }

    fn on(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn status_label_follows_total_short() {
        assert_eq!(ReceiptStatus::from_total_short(1), ReceiptStatus::Pending);
        assert_eq!(ReceiptStatus::from_total_short(0), ReceiptStatus::Complete);
        assert_eq!("pending".parse::<ReceiptStatus>().unwrap(), ReceiptStatus::Pending);
        assert_eq!(
            serde_json::to_string(&ReceiptStatus::Complete).unwrap(),
            "\"Complete\""
        );
    }

    #[test]
    fn groups_by_vendor_and_invoice() {
        let base = header();
        let first = record(
            IncomingHeader {
                receiving_date: on(1),
                ..base.clone()
            },
            vec![(100, 80), (10, 10)],
        );
        let second = record(
            IncomingHeader {
                receiving_date: on(3),
                ..base.clone()
            },
            vec![(20, 20)],
        );
        let other_vendor = record(
            IncomingHeader {
                vendor_id: VendorId::new(EntityId::new()),
                receiving_date: on(2),
                ..base.clone()
            },
            vec![(5, 5)],
        );

        let entries = summarize([&first, &second, &other_vendor], &HistoryFilter::default());
        assert_eq!(entries.len(), 2);

        let merged = &entries[0];
        assert_eq!(merged.record_ids.len(), 2);
        assert_eq!(merged.item_count, 3);
        assert_eq!(merged.total_quantity, 130);
        assert_eq!(merged.received, 110);
        assert_eq!(merged.short, 20);
        assert_eq!(merged.available, 90);
        assert_eq!(merged.total_value, 110 * 50);
        assert_eq!(merged.latest_receiving_date, on(3));
        assert_eq!(merged.status, ReceiptStatus::Pending);

        assert_eq!(entries[1].status, ReceiptStatus::Complete);
    }

    #[test]
    fn status_is_recomputed_from_current_items() {
        let pending = record(header(), vec![(100, 80)]);
        let item = &pending.items()[0];
        let reconciled = LineItemMutation::MoveShortToRejected
            .plan(item, Utc::now())
            .unwrap()
            .item;
        let complete = IncomingRecord::restore(
            pending.id_typed(),
            stockroom_core::TenantScoped::tenant_id(&pending),
            pending.header().clone(),
            vec![reconciled],
            pending.created_at(),
            Utc::now(),
        );

        let only_pending = HistoryFilter {
            status: Some(ReceiptStatus::Pending),
            ..HistoryFilter::default()
        };
        assert_eq!(summarize([&pending], &only_pending).len(), 1);
        assert!(summarize([&complete], &only_pending).is_empty());
    }

    #[test]
    fn filters_by_date_invoice_and_cancellation() {
        let early = record(
            IncomingHeader {
                invoice_number: "INV-Alpha".into(),
                receiving_date: on(1),
                ..header()
            },
            vec![(1, 1)],
        );
        let late = record(
            IncomingHeader {
                invoice_number: "INV-beta".into(),
                receiving_date: on(10),
                ..header()
            },
            vec![(1, 1)],
        );
        let cancelled = record(
            IncomingHeader {
                invoice_number: "INV-gamma".into(),
                receiving_date: on(5),
                ..header()
            },
            vec![(1, 1)],
        )
        .change_status(IncomingStatus::Cancelled, Utc::now())
        .unwrap()
        .record;

        let all = [&early, &late, &cancelled];

        let by_date = HistoryFilter {
            from: Some(on(1)),
            to: Some(on(5)),
            ..HistoryFilter::default()
        };
        let entries = summarize(all, &by_date);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].invoice_number, "INV-Alpha");

        let by_invoice = HistoryFilter {
            invoice: Some("BETA".into()),
            ..HistoryFilter::default()
        };
        assert_eq!(summarize(all, &by_invoice)[0].invoice_number, "INV-beta");

        let with_cancelled = HistoryFilter {
            include_cancelled: true,
            ..HistoryFilter::default()
        };
        let names: Vec<_> = summarize(all, &with_cancelled)
            .into_iter()
            .map(|e| e.invoice_number)
            .collect();
        assert_eq!(names, vec!["INV-beta", "INV-gamma", "INV-Alpha"]);
    }

    #[test]
    fn same_day_entries_sort_by_invoice() {
        let b = record(
            IncomingHeader {
                invoice_number: "B".into(),
                ..header()
            },
            vec![(1, 1)],
        );
        let a = record(
            IncomingHeader {
                invoice_number: "A".into(),
                ..header()
            },
            vec![(1, 1)],
        );
        let names: Vec<_> = summarize([&b, &a], &HistoryFilter::default())
            .into_iter()
            .map(|e| e.invoice_number)
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }
}
