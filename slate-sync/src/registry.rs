//! Subscriber registry.
//!
//! Fans change notifications out to listeners scoped per board (the full
//! object list) or per object (the object or its absence), plus engine-wide
//! status and failure channels.
//!
//! The registry only holds callback references and removal tokens. Delivery
//! clones the listener list under the lock and invokes it with the lock
//! released, so a listener may subscribe, unsubscribe or call back into the
//! engine while being notified. A panicking listener is logged and skipped.

use crate::queue::OperationFailure;
use crate::status::SyncStatus;
use parking_lot::Mutex;
use slate_types::{BoardId, ObjectId, SyncableObject};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::warn;

/// Receives the current object list of a board.
pub type ObjectsCallback = Arc<dyn Fn(&[SyncableObject]) + Send + Sync>;
/// Receives the current value of one object, `None` once it is gone.
pub type ObjectCallback = Arc<dyn Fn(Option<&SyncableObject>) + Send + Sync>;
/// Receives every status change.
pub type StatusCallback = Arc<dyn Fn(&SyncStatus) + Send + Sync>;
/// Receives operations that ended without confirmation.
pub type FailureCallback = Arc<dyn Fn(&OperationFailure) + Send + Sync>;

type ListenerId = u64;
type ObjectKey = (BoardId, ObjectId);

#[derive(Default)]
struct Listeners {
    next_id: ListenerId,
    boards: HashMap<BoardId, Vec<(ListenerId, ObjectsCallback)>>,
    objects: HashMap<ObjectKey, Vec<(ListenerId, ObjectCallback)>>,
    status: Vec<(ListenerId, StatusCallback)>,
    failures: Vec<(ListenerId, FailureCallback)>,
}

impl Listeners {
    fn allocate(&mut self) -> ListenerId {
        self.next_id += 1;
        self.next_id
    }

    fn remove(&mut self, key: &ListenerKey) {
        match key {
            ListenerKey::Board(board, id) => {
                if let Some(list) = self.boards.get_mut(board) {
                    list.retain(|(lid, _)| lid != id);
                    if list.is_empty() {
                        self.boards.remove(board);
                    }
                }
            }
            ListenerKey::Object(object_key, id) => {
                if let Some(list) = self.objects.get_mut(object_key) {
                    list.retain(|(lid, _)| lid != id);
                    if list.is_empty() {
                        self.objects.remove(object_key);
                    }
                }
            }
            ListenerKey::Status(id) => self.status.retain(|(lid, _)| lid != id),
            ListenerKey::Failure(id) => self.failures.retain(|(lid, _)| lid != id),
        }
    }
}

#[derive(Debug, Clone)]
enum ListenerKey {
    Board(BoardId, ListenerId),
    Object(ObjectKey, ListenerId),
    Status(ListenerId),
    Failure(ListenerId),
}

/// Removal token for a listener.
///
/// `unsubscribe` is idempotent and only detaches this listener. Dropping the
/// token does not unsubscribe, so a dropped token leaks its listener.
#[must_use = "the listener stays attached until `unsubscribe` is called"]
pub struct Subscription {
    registry: Weak<Mutex<Listeners>>,
    key: ListenerKey,
    active: AtomicBool,
    detach: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    fn new(registry: &Arc<Mutex<Listeners>>, key: ListenerKey) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            key,
            active: AtomicBool::new(true),
            detach: Mutex::new(None),
        }
    }

    /// Runs `detach` (once) when this subscription is cancelled.
    #[must_use]
    pub fn with_detach(self, detach: impl FnOnce() + Send + 'static) -> Self {
        *self.detach.lock() = Some(Box::new(detach));
        self
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().remove(&self.key);
        }
        let detach = self.detach.lock().take();
        if let Some(detach) = detach {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Invokes a listener, containing any panic.
pub(crate) fn deliver(channel: &'static str, notify: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(notify)).is_err() {
        warn!("A {} listener panicked; continuing delivery", channel);
    }
}

/// Registry of change listeners for one engine.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<Mutex<Listeners>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listens to every change of `board`.
    pub fn subscribe_all(
        &self,
        board: &BoardId,
        callback: impl Fn(&[SyncableObject]) + Send + Sync + 'static,
    ) -> Subscription {
        let mut listeners = self.inner.lock();
        let id = listeners.allocate();
        listeners
            .boards
            .entry(board.clone())
            .or_default()
            .push((id, Arc::new(callback)));
        drop(listeners);
        Subscription::new(&self.inner, ListenerKey::Board(board.clone(), id))
    }

    /// Listens to one object of `board`.
    pub fn subscribe_one(
        &self,
        board: &BoardId,
        object_id: &ObjectId,
        callback: impl Fn(Option<&SyncableObject>) + Send + Sync + 'static,
    ) -> Subscription {
        let key = (board.clone(), object_id.clone());
        let mut listeners = self.inner.lock();
        let id = listeners.allocate();
        listeners
            .objects
            .entry(key.clone())
            .or_default()
            .push((id, Arc::new(callback)));
        drop(listeners);
        Subscription::new(&self.inner, ListenerKey::Object(key, id))
    }

    pub fn subscribe_status(
        &self,
        callback: impl Fn(&SyncStatus) + Send + Sync + 'static,
    ) -> Subscription {
        let mut listeners = self.inner.lock();
        let id = listeners.allocate();
        listeners.status.push((id, Arc::new(callback)));
        drop(listeners);
        Subscription::new(&self.inner, ListenerKey::Status(id))
    }

    pub fn subscribe_failures(
        &self,
        callback: impl Fn(&OperationFailure) + Send + Sync + 'static,
    ) -> Subscription {
        let mut listeners = self.inner.lock();
        let id = listeners.allocate();
        listeners.failures.push((id, Arc::new(callback)));
        drop(listeners);
        Subscription::new(&self.inner, ListenerKey::Failure(id))
    }

    /// Delivers the current content of `board` to its board listeners and
    /// to every object listener on that board.
    pub fn notify_board(&self, board: &BoardId, objects: &[SyncableObject]) {
        let (board_listeners, object_listeners) = {
            let listeners = self.inner.lock();
            let board_listeners: Vec<ObjectsCallback> = listeners
                .boards
                .get(board)
                .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default();
            let object_listeners: Vec<(ObjectId, ObjectCallback)> = listeners
                .objects
                .iter()
                .filter(|((b, _), _)| b == board)
                .flat_map(|((_, object_id), list)| {
                    list.iter().map(move |(_, cb)| (object_id.clone(), cb.clone()))
                })
                .collect();
            (board_listeners, object_listeners)
        };

        for callback in board_listeners {
            deliver("board", || callback(objects));
        }

        if object_listeners.is_empty() {
            return;
        }
        let index: HashMap<&ObjectId, &SyncableObject> =
            objects.iter().map(|o| (&o.id, o)).collect();
        for (object_id, callback) in object_listeners {
            let current = index.get(&object_id).copied();
            deliver("object", || callback(current));
        }
    }

    pub fn notify_status(&self, status: &SyncStatus) {
        let callbacks: Vec<StatusCallback> = self
            .inner
            .lock()
            .status
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            deliver("status", || callback(status));
        }
    }

    pub fn notify_failure(&self, failure: &OperationFailure) {
        let callbacks: Vec<FailureCallback> = self
            .inner
            .lock()
            .failures
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            deliver("failure", || callback(failure));
        }
    }

    /// Number of board and object listeners on `board`.
    pub fn listener_count(&self, board: &BoardId) -> usize {
        let listeners = self.inner.lock();
        let board_count = listeners.boards.get(board).map_or(0, Vec::len);
        let object_count: usize = listeners
            .objects
            .iter()
            .filter(|((b, _), _)| b == board)
            .map(|(_, list)| list.len())
            .sum();
        board_count + object_count
    }
}
