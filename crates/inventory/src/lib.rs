//! Incoming-inventory domain module.
//!
//! Vendor deliveries (incoming records), their per-SKU line items, the quantity
//! rules that govern `received`/`short`/`rejected`, and the signed stock deltas
//! those rules produce. Pure, deterministic logic: no IO, no HTTP, no storage.

/// Declare a tenant-agnostic identifier newtype over `EntityId`.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub stockroom_core::EntityId);

        impl $name {
            pub fn new(id: stockroom_core::EntityId) -> Self {
                Self(id)
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl core::str::FromStr for $name {
            type Err = stockroom_core::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<stockroom_core::EntityId>().map(Self)
            }
        }
    };
}

pub mod history;
pub mod mutation;
pub mod quantities;
pub mod record;
pub mod sku;
pub mod stock;

pub use history::{HistoryEntry, HistoryFilter, ReceiptStatus, summarize};
pub use mutation::{LineItemAdjustment, LineItemChange, LineItemMutation, ShortItemPatch};
pub use quantities::Quantities;
pub use record::{
    BrandId, IncomingHeader, IncomingRecord, IncomingRecordId, IncomingStatus, LineItem,
    LineItemId, LineItemParts, NewLineItem, StatusChange, VendorId, WarrantyUnit,
};
pub use sku::{NewSku, Sku, SkuId};
pub use stock::StockDelta;
