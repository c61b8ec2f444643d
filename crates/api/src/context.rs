//! Per-request identity, attached by the auth middleware.

use stockroom_auth::{Role, UserId};
use stockroom_core::TenantId;

/// The company a request acts for.
///
/// Taken from the token's `tenant_id` claim and passed as the `company_id`
/// of every ledger call. Records, line items and SKU stock of other
/// companies are invisible to the request (they read as not found).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Who is calling, and the roles their token grants within the company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: UserId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(principal_id: UserId, roles: Vec<Role>) -> Self {
        Self { principal_id, roles }
    }

    pub fn principal_id(&self) -> UserId {
        self.principal_id
    }

    /// Roles as issued; permissions are resolved per request in `authz`.
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}
