//! # Design
//!
//! - Bootstrap failures are fatal to the request; everything else is recoverable.
//! - Upload errors double as the user-facing rejection message.
//! - Collaborator failures keep their source and an operation label.

use std::error::Error as StdError;

use thiserror::Error;
use ticketdesk_config::{ConfigError, ConfigId};

/// Boxed error raised by an external collaborator.
pub type CollaboratorError = Box<dyn StdError + Send + Sync + 'static>;

/// Result alias for bootstrap operations.
pub type BootstrapResult<T> = Result<T, BootstrapError>;

/// Reasons a request context could not be constructed.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The identifier was unset or no profile exists for it.
    #[error("configuration not found")]
    ConfigNotFound {
        /// Identifier that was requested.
        id: ConfigId,
    },
    /// The resolved profile carries a different identifier.
    #[error("configuration identifier mismatch")]
    ConfigMismatch {
        /// Identifier that was requested.
        requested: ConfigId,
        /// Identifier of the resolved profile.
        resolved: ConfigId,
    },
    /// The profile could not be loaded or failed validation.
    #[error("configuration unavailable")]
    Config {
        /// Source configuration error.
        source: ConfigError,
    },
    /// The session backend failed while starting the session.
    #[error("session bootstrap failed")]
    Session {
        /// Source session error.
        source: SessionError,
    },
}

impl From<ConfigError> for BootstrapError {
    fn from(source: ConfigError) -> Self {
        match source {
            ConfigError::NotFound { id } => Self::ConfigNotFound { id },
            ConfigError::Mismatch {
                requested,
                resolved,
            } => Self::ConfigMismatch {
                requested,
                resolved,
            },
            other => Self::Config { source: other },
        }
    }
}

impl From<SessionError> for BootstrapError {
    fn from(source: SessionError) -> Self {
        Self::Session { source }
    }
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised by session backends.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The backing store failed.
    #[error("session store failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Source store error.
        source: CollaboratorError,
    },
    /// Stored session data could not be decoded.
    #[error("session data is malformed")]
    Malformed {
        /// Source decoding error.
        source: serde_json::Error,
    },
}

impl SessionError {
    /// Wrap a store failure raised during `operation`.
    pub fn store(operation: &'static str, source: impl Into<CollaboratorError>) -> Self {
        Self::Store {
            operation,
            source: source.into(),
        }
    }
}

/// Result alias for log store operations.
pub type LogStoreResult<T> = Result<T, LogStoreError>;

/// Errors raised by log stores.
#[derive(Debug, Error)]
#[error("log store operation failed")]
pub struct LogStoreError {
    /// Operation identifier.
    pub operation: &'static str,
    /// Source store error.
    #[source]
    pub source: CollaboratorError,
}

impl LogStoreError {
    /// Wrap a store failure raised during `operation`.
    pub fn new(operation: &'static str, source: impl Into<CollaboratorError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }
}

/// Result alias for mail operations.
pub type MailResult<T> = Result<T, MailError>;

/// Errors raised by mail transports.
#[derive(Debug, Error)]
#[error("mail delivery failed")]
pub struct MailError {
    /// Operation identifier.
    pub operation: &'static str,
    /// Source transport error.
    #[source]
    pub source: CollaboratorError,
}

impl MailError {
    /// Wrap a transport failure raised during `operation`.
    pub fn new(operation: &'static str, source: impl Into<CollaboratorError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }
}

/// Reasons an upload candidate was rejected. `Display` is the user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// The extension is not in the allowed set.
    #[error("Invalid file type for {name}")]
    BadType {
        /// Display name of the file.
        name: String,
    },
    /// The declared size exceeds the configured maximum.
    #[error("File ({name}) is too big. Maximum of {limit} allowed")]
    TooLarge {
        /// Display name of the file.
        name: String,
        /// Human-readable maximum size.
        limit: String,
    },
    /// The temporary handle does not belong to a completed upload.
    #[error("Invalid or bad upload POST")]
    BadTransfer,
    /// The transport reported a failure before validation ran.
    #[error("{reason}")]
    Transport {
        /// Transport-provided description.
        reason: String,
    },
}

/// Anti-forgery check failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsrfError {
    /// Neither the form field nor the header carried the session token.
    #[error("invalid CSRF token")]
    Invalid {
        /// Form field that was inspected.
        field: String,
    },
}
