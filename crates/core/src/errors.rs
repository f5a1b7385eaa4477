//! Error types shared across the sync engine.

use thiserror::Error;

/// Result type alias for sync engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Retry policy class for store failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    Permanent,
}

/// Errors that can occur inside the sync engine or its store adapters.
#[derive(Debug, Error)]
pub enum Error {
    /// Local store failure (sqlite, serialization of stored rows, ...).
    #[error("Database error: {0}")]
    Database(String),

    /// Remote store failure. `status` is present for HTTP-level rejections,
    /// absent for transport failures (timeout, refused connection).
    #[error("Remote store error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Remote {
        status: Option<u16>,
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error (image reads, database path).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bootstrap could not resolve a required precondition.
    #[error("Station not provisioned: {0}")]
    NotProvisioned(String),

    /// Invalid configuration supplied by the caller.
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a local database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Create a remote error carrying an HTTP status.
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a remote transport error (no HTTP status available).
    pub fn remote_transport(message: impl Into<String>) -> Self {
        Self::Remote {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status if this is a remote error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => *status,
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Remote { status, .. } => match status {
                Some(code) => match *code {
                    408 | 409 | 423 | 425 | 429 => RetryClass::Retryable,
                    500..=599 => RetryClass::Retryable,
                    _ => RetryClass::Permanent,
                },
                // Transport failures recover when connectivity returns.
                None => RetryClass::Retryable,
            },
            Self::Database(_) | Self::Io(_) => RetryClass::Retryable,
            Self::Serialization(_) | Self::NotProvisioned(_) | Self::Config(_) => {
                RetryClass::Permanent
            }
        }
    }
}
