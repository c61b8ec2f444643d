use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use stockroom_auth::Permission;
use stockroom_inventory::SkuId;

use crate::app::routes::common::require;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_sku))
        .route("/:id", get(get_sku))
}

pub async fn register_sku(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::RegisterSkuRequest>, JsonRejection>,
) -> Response {
    if let Err(res) = require(&tenant, &principal, &Permission::SKU_REGISTER) {
        return res;
    }
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services.ledger.register_sku(tenant.tenant_id(), body.into()).await {
        Ok(sku) => (StatusCode::CREATED, Json(dto::sku_to_json(&sku))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_sku(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(res) = require(&tenant, &principal, &Permission::SKU_READ) {
        return res;
    }
    let sku_id: SkuId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.ledger.sku(tenant.tenant_id(), sku_id).await {
        Ok(sku) => Json(dto::sku_to_json(&sku)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
