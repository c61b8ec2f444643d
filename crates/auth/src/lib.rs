//! `stockroom-auth`: pure authentication/authorization boundary.
//!
//! Decoupled from HTTP and storage: tokens come in as strings, decisions go
//! out as `Result`s.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, Principal, authorize};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use principal::TenantMembership;
pub use roles::Role;
pub use stockroom_core::UserId;
