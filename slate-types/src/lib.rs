//! Board object model for Slate.
//!
//! This crate defines the plain data types shared by the sync engine and
//! its callers:
//! - Board, object and operation identifiers
//! - `SyncableObject`, the shared mutable board entity
//! - `ObjectUpdate`, an explicit field mask for partial updates
//! - `CommitTimestamp`, the authority-assigned modification time
//!
//! Nothing here performs I/O. Rendering concerns (what a "sticky-note" looks
//! like) belong to the canvas layer, not here.

mod ids;
mod object;
mod timestamp;
mod update;

pub use ids::{BoardId, ObjectId, OperationId};
pub use object::{now_millis, SyncableObject};
pub use timestamp::{CommitTimestamp, StampedObject, StampedUpdate};
pub use update::{FieldChange, ObjectField, ObjectUpdate};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("field `{0}` cannot be changed by an update")]
    ImmutableField(String),

    #[error("unknown field `{0}` in update")]
    UnknownField(String),

    #[error("invalid value for field `{field}`: {reason}")]
    InvalidValue { field: String, reason: String },
}
