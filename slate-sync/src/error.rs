//! Error types for the sync layer.

use slate_types::{ObjectId, OperationId};
use thiserror::Error;

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Update or delete against an object the local mirror does not hold.
    #[error("Object not found in local state")]
    NotFoundLocally { object_id: ObjectId },

    /// The remote channel rejected a write, patch, remove or read.
    #[error("remote error: {0}")]
    Remote(String),

    /// The remote channel is offline.
    #[error("remote channel disconnected")]
    Disconnected,

    /// A remote call exceeded the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// A queued operation was abandoned after the retry ceiling.
    #[error("operation {operation_id} abandoned after {attempts} retries")]
    RetryExhausted {
        operation_id: OperationId,
        attempts: u32,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether a retry could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::Disconnected | Self::Timeout)
    }
}
