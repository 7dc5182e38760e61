//! # Queue Error Types
//!
//! Unified error handling for the store, scheduler, runner and processors.

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, QueueError>;

/// Every failure the offline queue can surface to its callers
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Storage error: {0}")]
    StorageError(#[from] sqlx::Error),

    #[error("Request creation error: {0}")]
    RequestCreationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Auth error: {0}")]
    AuthError(String),

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Illegal state: {0}")]
    IllegalStateError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl QueueError {
    /// Create a request creation error
    pub fn request_creation(message: impl Into<String>) -> Self {
        Self::RequestCreationError(message.into())
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportError(message.into())
    }

    /// Create an illegal state error
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalStateError(message.into())
    }

    /// Transport failures are the only errors that are always worth retrying
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::TransportError(_))
    }
}

impl From<crate::config::ConfigurationError> for QueueError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        Self::ConfigurationError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = QueueError::ServerError {
            status: 503,
            message: "Service Unavailable".to_string(),
        };
        assert_eq!(error.to_string(), "Server error: 503 - Service Unavailable");

        let error = QueueError::illegal_state("auth provider dropped");
        assert_eq!(error.to_string(), "Illegal state: auth provider dropped");
    }

    #[test]
    fn test_transport_detection() {
        assert!(QueueError::transport("offline").is_transport());
        assert!(!QueueError::request_creation("no user").is_transport());
    }
}
