//! Infrastructure layer: incoming-inventory storage and the receiving ledger.

pub mod ledger;
pub mod store;

pub use ledger::ReceivingLedger;
pub use store::{
    InMemoryIncomingStore, IncomingStore, PostgresIncomingStore, StoreError, StoreResult,
};
