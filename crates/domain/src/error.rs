//! Unified error types for the domain layer.
//!
//! `DomainError` covers runtime domain violations; `ConfigError` is the
//! fatal-at-initialization configuration fault, which always names the
//! offending field path so a run aborts with an actionable message before
//! any output is written.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone)]
pub enum DomainError {
    /// Validation failed (e.g., invalid field values)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Business rule violation
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Parse error (for vocabulary labels and value objects)
    #[error("Parse error: {0}")]
    Parse(String),

    /// State transition not allowed
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

impl DomainError {
    /// Creates a validation error for business rule violations.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Create a constraint violation error
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::Constraint(msg.into())
    }

    /// Creates a parse error for string-to-type conversion failures.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an invalid state transition error
    pub fn invalid_state_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }
}

/// Fatal configuration fault.
///
/// Raised at initialization (or at first use for lazily-required sections
/// such as the discovery config) and never silently defaulted. `path` is the
/// JSON-ish path of the offending field, e.g.
/// `relationshipKinds[2].srcKinds` or `discovery`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid configuration at {path}: {message}")]
pub struct ConfigError {
    pub path: String,
    pub message: String,
}

impl ConfigError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// A required section is entirely absent.
    pub fn missing(path: impl Into<String>) -> Self {
        Self::new(path, "required section is missing")
    }
}
