use axum::{Router, routing::get};

pub mod common;
pub mod incoming;
pub mod skus;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/inventory/incoming", incoming::router())
        .nest("/inventory/skus", skus::router())
}
