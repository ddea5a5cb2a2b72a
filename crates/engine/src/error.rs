//! Engine error taxonomy.
//!
//! Configuration faults are fatal and abort the run; template and system
//! faults are recoverable - the scheduler logs them to history and moves on
//! to the next component in the phase.

use thiserror::Error;

use worldloom_domain::{ConfigError, DomainError};

#[derive(Debug, Error)]
pub enum EngineError {
    /// Fatal: malformed or incomplete domain configuration. Propagates out
    /// of the run.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Recoverable: a single template failed unexpectedly.
    #[error("template {template} failed: {message}")]
    Template { template: String, message: String },

    /// Recoverable: a single system failed unexpectedly.
    #[error("system {system} failed: {message}")]
    System { system: String, message: String },

    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The run was cooperatively aborted.
    #[error("run aborted")]
    Aborted,
}

impl EngineError {
    pub fn template(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            message: message.into(),
        }
    }

    pub fn system(system: impl Into<String>, message: impl Into<String>) -> Self {
        Self::System {
            system: system.into(),
            message: message.into(),
        }
    }

    /// Whether this error must abort the run instead of being logged.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Aborted)
    }
}
