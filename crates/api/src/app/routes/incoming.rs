use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};

use stockroom_auth::Permission;
use stockroom_inventory::{IncomingRecordId, LineItemId};

use crate::app::routes::common::require;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_record))
        .route("/history", get(history))
        .route("/:id", get(get_record))
        .route("/:id/items", get(list_items))
        .route("/:id/items/:item_id", patch(adjust_item))
        .route("/:id/items/:item_id/short", put(update_short_item))
        .route(
            "/:id/items/:item_id/move-short-to-rejected",
            post(move_short_to_rejected),
        )
        .route("/:id/status", post(change_status))
}

fn parse_item_path(record_id: &str, item_id: &str) -> Result<(IncomingRecordId, LineItemId), Response> {
    Ok((errors::parse_id(record_id)?, errors::parse_id(item_id)?))
}

pub async fn create_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::CreateIncomingRequest>, JsonRejection>,
) -> Response {
    if let Err(res) = require(&tenant, &principal, &Permission::INCOMING_CREATE) {
        return res;
    }
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    let (header, lines) = body.into_parts();
    match services
        .ledger
        .create_incoming_record(tenant.tenant_id(), header, lines)
        .await
    {
        Ok(record) => (StatusCode::CREATED, Json(dto::record_to_json(&record))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(res) = require(&tenant, &principal, &Permission::INCOMING_READ) {
        return res;
    }
    let record_id: IncomingRecordId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.ledger.record(tenant.tenant_id(), record_id).await {
        Ok(record) => Json(dto::record_to_json(&record)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(res) = require(&tenant, &principal, &Permission::INCOMING_READ) {
        return res;
    }
    let record_id: IncomingRecordId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match services.ledger.items(tenant.tenant_id(), record_id).await {
        Ok(items) => Json(items.iter().map(dto::item_to_json).collect::<Vec<_>>()).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn update_short_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, item_id)): Path<(String, String)>,
    body: Result<Json<dto::ReconcileShortRequest>, JsonRejection>,
) -> Response {
    if let Err(res) = require(&tenant, &principal, &Permission::INCOMING_RECONCILE) {
        return res;
    }
    let (record_id, item_id) = match parse_item_path(&id, &item_id) {
        Ok(ids) => ids,
        Err(res) => return res,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services
        .ledger
        .update_short_item(tenant.tenant_id(), record_id, item_id, body.into())
        .await
    {
        Ok(change) => Json(dto::change_to_json(&change)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn adjust_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, item_id)): Path<(String, String)>,
    body: Result<Json<dto::AdjustLineItemRequest>, JsonRejection>,
) -> Response {
    if let Err(res) = require(&tenant, &principal, &Permission::INCOMING_ADJUST) {
        return res;
    }
    let (record_id, item_id) = match parse_item_path(&id, &item_id) {
        Ok(ids) => ids,
        Err(res) => return res,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services
        .ledger
        .adjust_line_item(tenant.tenant_id(), record_id, item_id, body.into())
        .await
    {
        Ok(change) => Json(dto::change_to_json(&change)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn move_short_to_rejected(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path((id, item_id)): Path<(String, String)>,
) -> Response {
    if let Err(res) = require(&tenant, &principal, &Permission::INCOMING_RECONCILE) {
        return res;
    }
    let (record_id, item_id) = match parse_item_path(&id, &item_id) {
        Ok(ids) => ids,
        Err(res) => return res,
    };

    match services
        .ledger
        .move_short_to_rejected(tenant.tenant_id(), record_id, item_id)
        .await
    {
        Ok(change) => Json(dto::change_to_json(&change)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn change_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::ChangeStatusRequest>, JsonRejection>,
) -> Response {
    if let Err(res) = require(&tenant, &principal, &Permission::INCOMING_STATUS) {
        return res;
    }
    let record_id: IncomingRecordId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection_to_response(rejection),
    };

    match services
        .ledger
        .set_status(tenant.tenant_id(), record_id, body.status)
        .await
    {
        Ok(change) => Json(dto::status_change_to_json(&change)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<dto::HistoryQuery>, QueryRejection>,
) -> Response {
    if let Err(res) = require(&tenant, &principal, &Permission::INCOMING_READ) {
        return res;
    }
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return errors::query_rejection_to_response(rejection),
    };
    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.ledger.history(tenant.tenant_id(), &filter).await {
        Ok(entries) => {
            Json(entries.iter().map(dto::history_entry_to_json).collect::<Vec<_>>()).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}
