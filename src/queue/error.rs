//! Queue Error Types

use crate::core::error_handling::ContextualError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueueError {
    #[error("No queue factory has been registered for scheme '{scheme}'")]
    FactoryNotFound { scheme: String },

    #[error("Queue '{uri}' ({queue_type}) does not support the '{capability}' operation")]
    CapabilityNotSupported {
        uri: String,
        queue_type: String,
        capability: String,
    },

    #[error("Invalid queue uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Queue '{uri}' does not exist")]
    QueueNotFound { uri: String },

    #[error("Unknown receipt {token} for queue '{uri}'")]
    UnknownReceipt { uri: String, token: u64 },

    #[error("Queue operation failed: {message}")]
    OperationFailed { message: String },
}

impl QueueError {
    pub fn factory_not_found(scheme: &str) -> Self {
        QueueError::FactoryNotFound {
            scheme: scheme.to_string(),
        }
    }

    pub fn invalid_uri(uri: &str, reason: impl Into<String>) -> Self {
        QueueError::InvalidUri {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }
}

impl ContextualError for QueueError {
    fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            QueueError::FactoryNotFound { .. } | QueueError::InvalidUri { .. }
        )
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            QueueError::FactoryNotFound { scheme } => Some(scheme),
            QueueError::InvalidUri { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;
