//! API-side authorization guard.
//!
//! Every handler checks its permission here before touching the ledger, so
//! the domain and infra crates stay auth-agnostic.

use stockroom_auth::{AuthzError, Permission, Principal, TenantMembership, authorize};

use crate::context::{PrincipalContext, TenantContext};

/// Check `required` against the roles carried by the request's token.
pub fn authorize_request(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    required: &Permission,
) -> Result<(), AuthzError> {
    let principal = Principal {
        principal_id: principal.principal_id(),
        active_tenant_id: tenant.tenant_id(),
        membership: TenantMembership::from_roles(tenant.tenant_id(), principal.roles().to_vec()),
    };

    authorize(&principal, required)
}
