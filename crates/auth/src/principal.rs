use serde::{Deserialize, Serialize};

use stockroom_core::TenantId;

use crate::{Permission, Role};

/// A principal's membership in a tenant.
///
/// States which tenant the principal is acting within and which
/// roles/permissions are granted there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl TenantMembership {
    /// Membership whose permissions are the union of the built-in role policies.
    pub fn from_roles(tenant_id: TenantId, roles: Vec<Role>) -> Self {
        let mut permissions: Vec<Permission> = Vec::new();
        for perm in roles.iter().flat_map(Role::permissions) {
            if !permissions.contains(&perm) {
                permissions.push(perm);
            }
        }
        Self {
            tenant_id,
            roles,
            permissions,
        }
    }
}
