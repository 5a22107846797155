//! Error types for the lbstack reconciliation system.
//!
//! This module provides the error hierarchy for every stage of a stack
//! lifecycle call: configuration, caller state, the Data Plane API,
//! remote transactions and reconciliation.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::ParentScope;

/// The main error type for lbstack.
#[derive(Debug, Error)]
pub enum LbStackError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Data Plane API errors.
    #[error("Data Plane API error: {0}")]
    Dataplane(#[from] DataplaneError),

    /// Remote transaction lifecycle errors.
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The stack file was not found.
    #[error("Stack file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The stack file could not be parsed.
    #[error("Failed to parse stack file: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Stack validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// A host-supplied value does not have the expected shape.
    #[error("Invalid {expected} value: {message}")]
    InvalidShape {
        /// What the value was expected to be.
        expected: &'static str,
        /// Description of the mismatch.
        message: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Writing the state or lock file failed.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Data Plane API errors.
#[derive(Debug, Error)]
pub enum DataplaneError {
    /// Authentication failed.
    #[error("Data Plane authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("Data Plane request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from API.
        message: String,
    },

    /// The addressed object does not exist.
    #[error("Not found: {resource}")]
    NotFound {
        /// Description of the missing object.
        resource: String,
    },

    /// The API rejected the request because of a version or object conflict.
    #[error("Conflict: {message}")]
    Conflict {
        /// Error message from API.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with the Data Plane API: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from the Data Plane API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Remote transaction lifecycle errors.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// A terminal call was made on a transaction that is no longer open.
    #[error("Cannot {attempted} transaction {id}: it is already {state}")]
    InvalidState {
        /// Transaction identifier.
        id: String,
        /// The call that was rejected.
        attempted: &'static str,
        /// The state the transaction was in.
        state: String,
    },
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A remote operation failed and the transaction was rolled back.
    #[error("{operation} in {scope} failed: {source}")]
    OperationFailed {
        /// Description of the operation, including the entry it targeted.
        operation: String,
        /// Parent scope of the operation.
        scope: String,
        /// The triggering error.
        #[source]
        source: Box<LbStackError>,
    },

    /// The stack declares nothing to reconcile.
    #[error("Stack '{stack}' declares neither a backend nor a frontend")]
    EmptyStack {
        /// Stack name.
        stack: String,
    },

    /// Reconciliation was aborted.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Result type alias for lbstack operations.
pub type Result<T> = std::result::Result<T, LbStackError>;

impl LbStackError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Dataplane(DataplaneError::NetworkError { .. })
                | Self::State(StateError::LockFailed { .. })
        ) || matches!(
            self,
            Self::Dataplane(DataplaneError::ApiRequestFailed { status, .. }) if *status >= 500
        )
    }

    /// Returns true if the error reports a missing remote object.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Dataplane(DataplaneError::NotFound { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StateError {
    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl DataplaneError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}

impl ReconcileError {
    /// Wraps a failed remote operation with its context.
    #[must_use]
    pub fn operation_failed(
        operation: impl Into<String>,
        scope: &ParentScope,
        source: LbStackError,
    ) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            scope: scope.to_string(),
            source: Box::new(source),
        }
    }
}
