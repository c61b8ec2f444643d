//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic business failures only. Storage and transport failures are
/// modelled by the infrastructure layer and wrap this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input or prospective state failed a quantity/field rule.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation is not allowed in the entity's current state.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The entity does not exist, or belongs to another tenant.
    #[error("not found")]
    NotFound,

    /// A concurrent modification prevented the operation.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Human-readable reason without the category prefix.
    pub fn reason(&self) -> String {
        match self {
            Self::Validation(m)
            | Self::InvariantViolation(m)
            | Self::InvalidId(m)
            | Self::Conflict(m) => m.clone(),
            Self::NotFound => "not found".to_string(),
            Self::Unauthorized => "unauthorized".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strips_category_prefix() {
        let err = DomainError::validation("short cannot be negative");
        assert_eq!(err.to_string(), "validation failed: short cannot be negative");
        assert_eq!(err.reason(), "short cannot be negative");
        assert_eq!(DomainError::not_found().reason(), "not found");
    }
}
