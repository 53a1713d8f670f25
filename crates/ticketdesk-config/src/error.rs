//! Error types for configuration resolution.

use std::error::Error as StdError;

use thiserror::Error;

use crate::model::ConfigId;

/// Boxed error raised by a configuration backend.
pub type BackendError = Box<dyn StdError + Send + Sync + 'static>;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration exists for the identifier, or the identifier was unset.
    #[error("configuration not found")]
    NotFound {
        /// Identifier that was requested.
        id: ConfigId,
    },
    /// The store answered with a snapshot belonging to another identifier.
    #[error("configuration identifier mismatch")]
    Mismatch {
        /// Identifier that was requested.
        requested: ConfigId,
        /// Identifier carried by the returned snapshot.
        resolved: ConfigId,
    },
    /// A stored field held a value outside its accepted range.
    #[error("invalid configuration field")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// The backing store failed.
    #[error("configuration backend failed")]
    Backend {
        /// Operation identifier.
        operation: &'static str,
        /// Source backend error.
        source: BackendError,
    },
}

impl ConfigError {
    /// Wrap a backend failure raised during `operation`.
    pub fn backend(operation: &'static str, source: impl Into<BackendError>) -> Self {
        Self::Backend {
            operation,
            source: source.into(),
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
