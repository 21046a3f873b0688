//! Remote channel abstraction.
//!
//! The authoritative store behind the engine: a network-accessible database
//! with one-shot reads, writes, live snapshot subscriptions and a
//! connectivity signal. The engine only talks to it through this trait, so
//! the same engine runs against a hosted backend, a relay, or the in-memory
//! implementation used in tests.
//!
//! Paths follow `{board}/objects/{object}` for a single object and
//! `{board}/objects` for a board's collection.

pub mod memory;

pub use memory::{MemoryRemote, RemoteStats};

use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use slate_types::{BoardId, CommitTimestamp, ObjectId, StampedObject, StampedUpdate, SyncableObject};
use std::fmt;
use std::sync::Arc;

/// Address of a value in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RemotePath {
    /// `{board}/objects`
    Collection { board: BoardId },
    /// `{board}/objects/{object}`
    Object { board: BoardId, object: ObjectId },
}

impl RemotePath {
    pub fn collection(board: BoardId) -> Self {
        Self::Collection { board }
    }

    pub fn object(board: BoardId, object: ObjectId) -> Self {
        Self::Object { board, object }
    }

    pub fn board(&self) -> &BoardId {
        match self {
            Self::Collection { board } | Self::Object { board, .. } => board,
        }
    }

    /// The object id, for object paths.
    pub fn object_id(&self) -> Option<&ObjectId> {
        match self {
            Self::Collection { .. } => None,
            Self::Object { object, .. } => Some(object),
        }
    }

    /// Whether a change at `other` is visible through this path.
    pub fn covers(&self, other: &RemotePath) -> bool {
        match self {
            Self::Collection { board } => board == other.board(),
            Self::Object { .. } => self == other,
        }
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection { board } => write!(f, "{board}/objects"),
            Self::Object { board, object } => write!(f, "{board}/objects/{object}"),
        }
    }
}

/// Authoritative state at a path.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// Every object of a board (empty if the board has none).
    Collection(Vec<SyncableObject>),
    /// One object, `None` if it does not exist.
    Object(Option<SyncableObject>),
}

/// Receives snapshots pushed by a live subscription.
pub type SnapshotCallback = Arc<dyn Fn(Snapshot) + Send + Sync>;
/// Receives connectivity changes (`true` = connected).
pub type ConnectivityCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Detach handle for a remote listener. `unsubscribe` runs at most once.
#[must_use = "the remote listener stays attached until `unsubscribe` is called"]
pub struct RemoteSubscription {
    detach: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl RemoteSubscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Mutex::new(Some(Box::new(detach))),
        }
    }

    pub fn unsubscribe(&self) {
        let detach = self.detach.lock().take();
        if let Some(detach) = detach {
            detach();
        }
    }
}

impl fmt::Debug for RemoteSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteSubscription")
            .field("attached", &self.detach.lock().is_some())
            .finish()
    }
}

/// The authoritative store.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Writes a full object at an object path.
    async fn write(&self, path: &RemotePath, value: StampedObject) -> Result<()>;

    /// Applies a field mask to the object at an object path.
    async fn patch(&self, path: &RemotePath, update: StampedUpdate) -> Result<()>;

    /// Removes the object at an object path.
    async fn remove(&self, path: &RemotePath) -> Result<()>;

    /// Reads the current value once.
    async fn read_once(&self, path: &RemotePath) -> Result<Snapshot>;

    /// Streams snapshots of `path`, starting with the current one.
    fn subscribe(&self, path: &RemotePath, on_snapshot: SnapshotCallback) -> RemoteSubscription;

    /// Streams connectivity changes, starting with the current state.
    fn on_connectivity_change(&self, callback: ConnectivityCallback) -> RemoteSubscription;

    /// The token substituted for `modifiedAt` on every write and patch.
    fn authority_timestamp(&self) -> CommitTimestamp {
        CommitTimestamp::Authority
    }
}
