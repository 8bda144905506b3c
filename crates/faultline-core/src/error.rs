//! Error types for configuration resolution.
//!
//! `ConfigError` is the only failure the reporting agent ever surfaces to
//! the host application, and only at explicit initialization time. Every
//! other failure mode (identity, normalization, delivery) is absorbed
//! inside the pipeline.

use thiserror::Error;

/// Result type alias using `ConfigError`.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Structurally invalid configuration, fatal to startup of the reporting
/// subsystem only, never to the host application.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A supplied value failed validation.
    #[error("invalid configuration: {field}: {reason}")]
    InvalidValue {
        /// Name of the offending configuration field
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Configuration sources could not be merged or deserialized, for
    /// example an unknown uncaught-handling mode in the environment.
    #[error("failed to resolve configuration: {0}")]
    Resolution(String),
}

impl ConfigError {
    /// Creates an invalid-value error for a named field.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue { field, reason: reason.into() }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Resolution(err.to_string())
    }
}
