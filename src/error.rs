//! Error types for the stream consumer.

use thiserror::Error;

/// Failure reported by the remote stream service.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Stream closed")]
    Closed,
}

/// Main error type for consumer operations.
///
/// Only `Initialization` and `Transport` ever land in the consumer's error
/// slot; everything else is returned to the caller of the failing operation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConsumerError {
    #[error("Initialization failed: {0}")]
    Initialization(ServiceError),

    #[error("Transport error: {0}")]
    Transport(ServiceError),

    #[error("Request failed: {0}")]
    Request(ServiceError),

    #[error("Consumer not initialized")]
    NotInitialized,

    #[error("No authenticated user")]
    NoIdentity,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ConsumerError {
    /// Whether this error belongs in the shared error slot.
    pub fn is_transport_level(&self) -> bool {
        matches!(
            self,
            ConsumerError::Initialization(_) | ConsumerError::Transport(_)
        )
    }
}

impl From<serde_json::Error> for ConsumerError {
    fn from(e: serde_json::Error) -> Self {
        ConsumerError::Serialization(e.to_string())
    }
}

/// Result type for consumer operations.
pub type Result<T> = std::result::Result<T, ConsumerError>;
