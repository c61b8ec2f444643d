//! `stockroom-core`: shared domain building blocks.
//!
//! Identifiers, the entity contract and the domain error model. No IO lives here.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::{Entity, TenantScoped};
pub use error::{DomainError, DomainResult};
pub use id::{EntityId, TenantId, UserId};
