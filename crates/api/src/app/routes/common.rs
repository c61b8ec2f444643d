use axum::http::StatusCode;
use axum::response::Response;

use stockroom_auth::Permission;

use crate::app::errors;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

/// Authorize the request or produce the 403 response.
pub fn require(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    permission: &Permission,
) -> Result<(), Response> {
    authz::authorize_request(tenant, principal, permission)
        .map_err(|e| errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}
