//! Optimistic object synchronization for Slate boards.
//!
//! Keeps a local, immediately consistent mirror of every board's objects
//! while an authoritative remote store confirms, rejects or reorders the
//! changes asynchronously.
//!
//! # Architecture
//!
//! ## Components
//!
//! - **Mirror**: in-memory keyed store of one board's objects
//! - **Registry**: fan-out of change, status and failure notifications
//! - **Status**: connectivity, pending count and last sync time
//! - **Queue**: operations applied locally but not yet confirmed
//! - **Reconcile**: snapshot-diff merge of remote snapshots into a mirror
//! - **Remote**: the authoritative store, behind the `RemoteChannel` trait
//! - **Engine**: orchestrates the above
//!
//! ## Mutation lifecycle
//!
//! 1. **Apply**: write to the mirror and notify listeners
//! 2. **Queue**: record the operation with its pre-image
//! 3. **Commit**: send to the remote channel with an authority timestamp
//! 4. **Resolve**: dequeue on success, roll back on failure
//!
//! Operations that stay unconfirmed are retried with exponential backoff and
//! abandoned after `SyncConfig::max_retries` passes.
//!
//! # Example
//!
//! ```
//! use slate_sync::{MemoryRemote, SyncConfig, SyncEngine};
//! use std::sync::Arc;
//!
//! let remote = MemoryRemote::new();
//! let config = SyncConfig {
//!     max_retries: 5,
//!     ..Default::default()
//! };
//!
//! let engine = SyncEngine::new(Arc::new(remote), config);
//! assert_eq!(engine.get_sync_status().pending_count, 0);
//! ```

pub mod config;
mod engine;
mod error;
pub mod mirror;
pub mod queue;
pub mod reconcile;
pub mod registry;
pub mod remote;
pub mod status;
mod tasks;

pub use config::{RollbackPolicy, SyncConfig};
pub use engine::{RetryReport, SyncEngine, SyncResult};
pub use error::{Result, SyncError};
pub use mirror::LocalMirror;
pub use queue::{
    OperationFailure, OperationKind, OperationPayload, OperationQueue, OperationState,
    PendingOperation,
};
pub use reconcile::{reconcile_collection, reconcile_object, DeferredSnapshots, ReconcileOutcome};
pub use registry::{SubscriberRegistry, Subscription};
pub use remote::{
    ConnectivityCallback, MemoryRemote, RemoteChannel, RemotePath, RemoteStats,
    RemoteSubscription, Snapshot, SnapshotCallback,
};
pub use status::{StatusTracker, SyncStatus};
