//! Signed stock deltas.
//!
//! Every operation in this crate expresses its effect on `current_stock` as a
//! list of `StockDelta`s, at most one per SKU. Stores apply them additively
//! (`current_stock = current_stock + delta`) inside the same transaction as
//! the line-item write; nothing here ever produces an absolute stock value.

use serde::{Deserialize, Serialize};

use crate::sku::SkuId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDelta {
    pub sku_id: SkuId,
    pub delta: i64,
}

impl StockDelta {
    pub fn new(sku_id: SkuId, delta: i64) -> Self {
        Self { sku_id, delta }
    }

    pub fn none(sku_id: SkuId) -> Self {
        Self { sku_id, delta: 0 }
    }

    /// Delta for a change of the `received` counter.
    pub fn for_received_change(sku_id: SkuId, old_received: i64, new_received: i64) -> Self {
        Self::new(sku_id, new_received - old_received)
    }

    pub fn is_zero(&self) -> bool {
        self.delta == 0
    }
}

/// Collapse deltas to one per SKU and order them by SKU id.
///
/// The fixed order means two transactions touching the same SKUs lock the
/// rows in the same sequence.
pub fn consolidate(deltas: impl IntoIterator<Item = StockDelta>) -> Vec<StockDelta> {
    let mut merged: Vec<StockDelta> = Vec::new();
    for d in deltas {
        match merged.iter_mut().find(|m| m.sku_id == d.sku_id) {
            Some(m) => m.delta += d.delta,
            None => merged.push(d),
        }
    }
    merged.sort_by_key(|d| d.sku_id);
    merged
}
