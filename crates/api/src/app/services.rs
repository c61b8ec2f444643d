//! Store selection and service wiring.

use std::sync::Arc;

use tracing::info;

use stockroom_infra::{
    InMemoryIncomingStore, IncomingStore, PostgresIncomingStore, ReceivingLedger, StoreResult,
};

use crate::config::StoreConfig;

/// Shared, cloneable handles used by every handler.
#[derive(Debug, Clone)]
pub struct AppServices {
    pub ledger: ReceivingLedger,
    backend: &'static str,
}

impl AppServices {
    pub fn new(store: Arc<dyn IncomingStore>, backend: &'static str) -> Self {
        Self {
            ledger: ReceivingLedger::new(store),
            backend,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryIncomingStore::new()), "in_memory")
    }

    /// Which store backs the ledger ("in_memory" or "postgres").
    pub fn backend(&self) -> &'static str {
        self.backend
    }
}

pub async fn build_services(config: &StoreConfig) -> StoreResult<AppServices> {
    match config {
        StoreConfig::InMemory => {
            info!(backend = "in_memory", "using in-memory incoming store");
            Ok(AppServices::in_memory())
        }
        StoreConfig::Postgres {
            database_url,
            max_connections,
            run_migrations,
        } => {
            let store = PostgresIncomingStore::connect(database_url, *max_connections).await?;
            if *run_migrations {
                store.migrate().await?;
                info!("database migrations applied");
            }
            info!(backend = "postgres", max_connections, "using postgres incoming store");
            Ok(AppServices::new(Arc::new(store), "postgres"))
        }
    }
}
