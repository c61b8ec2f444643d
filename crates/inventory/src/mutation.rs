//! Line-item mutations.
//!
//! Each mutation is planned against the item's current state and yields the
//! next state plus exactly one stock delta. Planning is pure; stores run it
//! while holding the item's row lock and persist the result together with the
//! delta.
//!
//! Only [`ShortItemPatch`] can change `received`. [`LineItemAdjustment`] has no
//! such field, so ordinary edits cannot touch it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult};

use crate::quantities::Quantities;
use crate::record::LineItem;
use crate::stock::StockDelta;

/// Patch for reconciling a short shipment against the invoice total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortItemPatch {
    pub received: Option<i64>,
    pub short: Option<i64>,
    pub rejected: Option<i64>,
    pub challan_number: Option<String>,
    pub challan_date: Option<NaiveDate>,
}

/// Ordinary edit of an item after receipt (e.g. defects found later).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemAdjustment {
    pub short: Option<i64>,
    pub rejected: Option<i64>,
    pub received_boxes: Option<i64>,
}

impl LineItemAdjustment {
    fn is_empty(&self) -> bool {
        self.short.is_none() && self.rejected.is_none() && self.received_boxes.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineItemMutation {
    /// Strict regime: `received + short + rejected == total` afterwards.
    ReconcileShort(ShortItemPatch),
    /// Write the outstanding shortfall off as rejected.
    MoveShortToRejected,
    /// Relaxed regime: `rejected <= received`, `available >= 0`.
    Adjust(LineItemAdjustment),
}

/// Planned outcome of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemChange {
    pub before: Quantities,
    pub item: LineItem,
    pub stock_delta: StockDelta,
}

impl LineItemMutation {
    pub fn kind(&self) -> &'static str {
        match self {
            LineItemMutation::ReconcileShort(_) => "reconcile_short",
            LineItemMutation::MoveShortToRejected => "move_short_to_rejected",
            LineItemMutation::Adjust(_) => "adjust",
        }
    }

    pub fn plan(&self, current: &LineItem, now: DateTime<Utc>) -> DomainResult<LineItemChange> {
        if !current.is_active() {
            return Err(DomainError::invariant(
                "line item belongs to a cancelled incoming record",
            ));
        }

        match self {
            LineItemMutation::ReconcileShort(patch) => reconcile_short(current, patch, now),
            LineItemMutation::MoveShortToRejected => move_short_to_rejected(current, now),
            LineItemMutation::Adjust(adjustment) => adjust(current, adjustment, now),
        }
    }
}

fn ensure_short_not_reopened(current: &LineItem, next: &Quantities) -> DomainResult<()> {
    if current.is_reconciled() && next.short > 0 {
        return Err(DomainError::invariant(
            "short quantity was already written off as rejected; record a new delivery for later arrivals",
        ));
    }
    Ok(())
}

fn reconcile_short(
    current: &LineItem,
    patch: &ShortItemPatch,
    now: DateTime<Utc>,
) -> DomainResult<LineItemChange> {
    let before = current.quantities();
    let next = Quantities {
        total: before.total,
        received: patch.received.unwrap_or(before.received),
        short: patch.short.unwrap_or(before.short),
        rejected: patch.rejected.unwrap_or(before.rejected),
    };

    next.ensure_matches_total()?;
    ensure_short_not_reopened(current, &next)?;
    next.ensure_not_driven_negative(&before)?;

    let item = current
        .with_quantities(next, now)?
        .with_challan(patch.challan_number.as_deref(), patch.challan_date);

    Ok(LineItemChange {
        before,
        item,
        stock_delta: StockDelta::for_received_change(current.sku_id(), before.received, next.received),
    })
}

fn move_short_to_rejected(current: &LineItem, now: DateTime<Utc>) -> DomainResult<LineItemChange> {
    let before = current.quantities();
    if before.short == 0 {
        return Err(DomainError::validation(
            "no outstanding short quantity to move to rejected",
        ));
    }

    // Recomputed from the fixed counters; the stored `short` may be stale.
    let shortfall = before.shortfall();
    if shortfall < 0 {
        return Err(DomainError::validation(format!(
            "received ({}) exceeds Total Quantity ({}); shortfall cannot be negative",
            before.received, before.total
        )));
    }
    if shortfall == 0 {
        return Err(DomainError::validation(
            "no outstanding short quantity to move to rejected",
        ));
    }

    let rejected = before
        .rejected
        .checked_add(shortfall)
        .ok_or_else(|| DomainError::validation("rejected quantity is out of range"))?;
    let next = Quantities {
        short: 0,
        rejected,
        ..before
    };
    next.ensure_non_negative()?;
    next.ensure_rejected_within_received()?;
    next.ensure_not_driven_negative(&before)?;

    let item = current.with_quantities(next, now)?.written_off_by(shortfall);

    Ok(LineItemChange {
        before,
        item,
        stock_delta: StockDelta::new(current.sku_id(), shortfall),
    })
}

fn adjust(
    current: &LineItem,
    adjustment: &LineItemAdjustment,
    now: DateTime<Utc>,
) -> DomainResult<LineItemChange> {
    if adjustment.is_empty() {
        return Err(DomainError::validation("nothing to adjust"));
    }

    let before = current.quantities();
    let next = Quantities {
        short: adjustment.short.unwrap_or(before.short),
        rejected: adjustment.rejected.unwrap_or(before.rejected),
        ..before
    };

    next.ensure_usable()?;
    ensure_short_not_reopened(current, &next)?;

    let item = current
        .with_quantities(next, now)?
        .with_received_boxes(adjustment.received_boxes)?;

    Ok(LineItemChange {
        before,
        item,
        stock_delta: StockDelta::none(current.sku_id()),
    })
}
