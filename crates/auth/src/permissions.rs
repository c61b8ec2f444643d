use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are dotted strings (e.g. "inventory.incoming.read"). `"*"`
/// grants everything; a trailing `.*` grants every permission under that
/// prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const INCOMING_CREATE: Permission = Permission::from_static("inventory.incoming.create");
    pub const INCOMING_READ: Permission = Permission::from_static("inventory.incoming.read");
    pub const INCOMING_RECONCILE: Permission = Permission::from_static("inventory.incoming.reconcile");
    pub const INCOMING_ADJUST: Permission = Permission::from_static("inventory.incoming.adjust");
    pub const INCOMING_STATUS: Permission = Permission::from_static("inventory.incoming.status");
    pub const SKU_REGISTER: Permission = Permission::from_static("inventory.skus.register");
    pub const SKU_READ: Permission = Permission::from_static("inventory.skus.read");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    /// Whether holding `self` satisfies `required`.
    pub fn grants(&self, required: &Permission) -> bool {
        if self.is_wildcard() || self == required {
            return true;
        }
        match self.as_str().strip_suffix(".*") {
            Some(prefix) => required
                .as_str()
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.')),
            None => false,
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
