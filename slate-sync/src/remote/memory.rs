//! In-memory remote channel.
//!
//! Behaves like a hosted realtime database: it resolves authority timestamps
//! with its own clock, pushes a fresh snapshot to every matching subscriber
//! after each commit, and reports connectivity. Writes made through the
//! `*_external` helpers look like another client's confirmed edits.
//!
//! Failure injection (`fail_next`, `set_fail_all`, `set_fail_reads`, going
//! offline) and a commit gate (`hold_commits` / `release_commits`) let tests
//! observe every state the engine can be in.

use super::{
    ConnectivityCallback, RemoteChannel, RemotePath, RemoteSubscription, Snapshot, SnapshotCallback,
};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use slate_types::{
    now_millis, BoardId, CommitTimestamp, ObjectId, ObjectUpdate, StampedObject, StampedUpdate,
    SyncableObject,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::debug;

/// Call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemoteStats {
    pub writes: u64,
    pub patches: u64,
    pub removes: u64,
    pub reads: u64,
    /// Commits and reads that were refused.
    pub rejected: u64,
}

impl RemoteStats {
    /// Write, patch and remove attempts.
    pub fn commit_attempts(&self) -> u64 {
        self.writes + self.patches + self.removes
    }
}

struct State {
    boards: HashMap<BoardId, BTreeMap<ObjectId, SyncableObject>>,
    clock: i64,
    /// Never stamp below the wall time.
    wall_clock: bool,
    connected: bool,
    fail_next: usize,
    fail_all: bool,
    fail_reads: bool,
    next_listener: u64,
    snapshot_listeners: Vec<(u64, RemotePath, SnapshotCallback)>,
    connectivity_listeners: Vec<(u64, ConnectivityCallback)>,
    stats: RemoteStats,
}

impl State {
    fn tick(&mut self) -> i64 {
        let floor = if self.wall_clock { now_millis() } else { i64::MIN };
        self.clock = self.clock.saturating_add(1).max(floor);
        self.clock
    }

    fn check_commit(&mut self) -> Result<()> {
        let refusal = if !self.connected {
            Some(SyncError::Disconnected)
        } else if self.fail_all {
            Some(SyncError::Remote("commit rejected".into()))
        } else if self.fail_next > 0 {
            self.fail_next -= 1;
            Some(SyncError::Remote("commit rejected".into()))
        } else {
            None
        };
        match refusal {
            Some(err) => {
                self.stats.rejected += 1;
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn snapshot_of(&self, path: &RemotePath) -> Snapshot {
        let board = self.boards.get(path.board());
        match path {
            RemotePath::Collection { .. } => Snapshot::Collection(
                board.map(|objects| objects.values().cloned().collect()).unwrap_or_default(),
            ),
            RemotePath::Object { object, .. } => {
                Snapshot::Object(board.and_then(|objects| objects.get(object)).cloned())
            }
        }
    }

    fn fan_out(&self, changed: &RemotePath) -> Vec<(SnapshotCallback, Snapshot)> {
        self.snapshot_listeners
            .iter()
            .filter(|(_, path, _)| path.covers(changed))
            .map(|(_, path, cb)| (cb.clone(), self.snapshot_of(path)))
            .collect()
    }

    fn allocate(&mut self) -> u64 {
        self.next_listener += 1;
        self.next_listener
    }
}

struct Inner {
    state: Mutex<State>,
    /// `true` while commits may proceed.
    gate: watch::Sender<bool>,
}

/// An authoritative store held in memory.
#[derive(Clone)]
pub struct MemoryRemote {
    inner: Arc<Inner>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    /// Creates a connected, empty store. Commits are stamped with the wall
    /// time, bumped by one where needed to stay strictly increasing.
    pub fn new() -> Self {
        Self::build(now_millis(), true)
    }

    /// Creates a store with a purely logical authority clock starting at
    /// `start` (the first commit is stamped `start + 1`).
    pub fn with_clock_start(start: i64) -> Self {
        Self::build(start, false)
    }

    fn build(start: i64, wall_clock: bool) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    boards: HashMap::new(),
                    clock: start,
                    wall_clock,
                    connected: true,
                    fail_next: 0,
                    fail_all: false,
                    fail_reads: false,
                    next_listener: 0,
                    snapshot_listeners: Vec::new(),
                    connectivity_listeners: Vec::new(),
                    stats: RemoteStats::default(),
                }),
                gate,
            }),
        }
    }

    // ── Simulation controls ──────────────────────────────────────

    /// Goes online or offline, notifying connectivity listeners on change.
    pub fn set_connected(&self, connected: bool) {
        let listeners: Vec<ConnectivityCallback> = {
            let mut state = self.inner.state.lock();
            if state.connected == connected {
                return;
            }
            state.connected = connected;
            state.connectivity_listeners.iter().map(|(_, cb)| cb.clone()).collect()
        };
        debug!("Memory remote connectivity -> {}", connected);
        for listener in listeners {
            listener(connected);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().connected
    }

    /// Rejects the next `count` commits.
    pub fn fail_next(&self, count: usize) {
        self.inner.state.lock().fail_next = count;
    }

    /// Rejects every commit until turned off.
    pub fn set_fail_all(&self, fail: bool) {
        self.inner.state.lock().fail_all = fail;
    }

    /// Rejects every one-shot read until turned off.
    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.state.lock().fail_reads = fail;
    }

    /// Parks every commit until `release_commits`.
    pub fn hold_commits(&self) {
        self.inner.gate.send_replace(false);
    }

    pub fn release_commits(&self) {
        self.inner.gate.send_replace(true);
    }

    pub fn stats(&self) -> RemoteStats {
        self.inner.state.lock().stats
    }

    /// Current authoritative value of an object.
    pub fn object(&self, board: &BoardId, object_id: &ObjectId) -> Option<SyncableObject> {
        self.inner
            .state
            .lock()
            .boards
            .get(board)
            .and_then(|objects| objects.get(object_id))
            .cloned()
    }

    /// Current authoritative content of a board, ordered by id.
    pub fn objects(&self, board: &BoardId) -> Vec<SyncableObject> {
        self.inner
            .state
            .lock()
            .boards
            .get(board)
            .map(|objects| objects.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().snapshot_listeners.len()
    }

    // ── Other clients ────────────────────────────────────────────

    /// Commits a write on behalf of another client. Bypasses the gate and
    /// failure injection. Returns the committed object.
    pub fn insert_external(&self, board: &BoardId, object: SyncableObject) -> SyncableObject {
        let path = RemotePath::object(board.clone(), object.id.clone());
        let (committed, deliveries) = {
            let mut state = self.inner.state.lock();
            let now = state.tick();
            let committed = StampedObject::new(object, CommitTimestamp::Authority)
                .commit(now);
            state
                .boards
                .entry(board.clone())
                .or_default()
                .insert(committed.id.clone(), committed.clone());
            (committed, state.fan_out(&path))
        };
        Self::deliver(deliveries);
        committed
    }

    /// Patches an object on behalf of another client. Returns the new value,
    /// or `None` if the object does not exist.
    pub fn patch_external(
        &self,
        board: &BoardId,
        object_id: &ObjectId,
        update: &ObjectUpdate,
    ) -> Option<SyncableObject> {
        let path = RemotePath::object(board.clone(), object_id.clone());
        let (committed, deliveries) = {
            let mut state = self.inner.state.lock();
            let now = state.tick();
            let target = state.boards.get_mut(board)?.get_mut(object_id)?;
            StampedUpdate::new(update.clone(), CommitTimestamp::Authority)
                .commit_onto(target, now);
            let committed = target.clone();
            (committed, state.fan_out(&path))
        };
        Self::deliver(deliveries);
        Some(committed)
    }

    /// Removes an object on behalf of another client.
    pub fn remove_external(&self, board: &BoardId, object_id: &ObjectId) -> Option<SyncableObject> {
        let path = RemotePath::object(board.clone(), object_id.clone());
        let (removed, deliveries) = {
            let mut state = self.inner.state.lock();
            let removed = state.boards.get_mut(board)?.remove(object_id)?;
            (removed, state.fan_out(&path))
        };
        Self::deliver(deliveries);
        Some(removed)
    }

    // ── Internals ────────────────────────────────────────────────

    fn deliver(deliveries: Vec<(SnapshotCallback, Snapshot)>) {
        for (callback, snapshot) in deliveries {
            callback(snapshot);
        }
    }

    async fn wait_for_gate(&self) {
        let mut rx = self.inner.gate.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    async fn commit<F>(&self, path: &RemotePath, apply: F) -> Result<()>
    where
        F: FnOnce(&mut State, &BoardId, &ObjectId, i64) -> Result<()> + Send,
    {
        self.wait_for_gate().await;
        let RemotePath::Object { board, object } = path else {
            return Err(SyncError::Remote(format!("{path} is not an object path")));
        };
        let deliveries = {
            let mut state = self.inner.state.lock();
            state.check_commit()?;
            let now = state.tick();
            apply(&mut *state, board, object, now)?;
            state.fan_out(path)
        };
        debug!("Memory remote committed {}", path);
        Self::deliver(deliveries);
        Ok(())
    }
}

fn listener_detach<F>(inner: Weak<Inner>, remove: F) -> RemoteSubscription
where
    F: FnOnce(&mut State) + Send + 'static,
{
    RemoteSubscription::new(move || {
        if let Some(inner) = inner.upgrade() {
            remove(&mut *inner.state.lock());
        }
    })
}

#[async_trait]
impl RemoteChannel for MemoryRemote {
    async fn write(&self, path: &RemotePath, value: StampedObject) -> Result<()> {
        self.inner.state.lock().stats.writes += 1;
        self.commit(path, move |state, board, object, now| {
            if &value.object.id != object {
                return Err(SyncError::Remote(format!(
                    "object id {} does not match path",
                    value.object.id
                )));
            }
            let committed = value.commit(now);
            state
                .boards
                .entry(board.clone())
                .or_default()
                .insert(object.clone(), committed);
            Ok(())
        })
        .await
    }

    async fn patch(&self, path: &RemotePath, update: StampedUpdate) -> Result<()> {
        self.inner.state.lock().stats.patches += 1;
        self.commit(path, move |state, board, object, now| {
            let target = state
                .boards
                .get_mut(board)
                .and_then(|objects| objects.get_mut(object))
                .ok_or_else(|| SyncError::Remote(format!("nothing to patch at {board}/{object}")))?;
            update.commit_onto(target, now);
            Ok(())
        })
        .await
    }

    async fn remove(&self, path: &RemotePath) -> Result<()> {
        self.inner.state.lock().stats.removes += 1;
        self.commit(path, |state, board, object, _now| {
            if let Some(objects) = state.boards.get_mut(board) {
                objects.remove(object);
            }
            Ok(())
        })
        .await
    }

    async fn read_once(&self, path: &RemotePath) -> Result<Snapshot> {
        let mut state = self.inner.state.lock();
        state.stats.reads += 1;
        if !state.connected {
            state.stats.rejected += 1;
            return Err(SyncError::Disconnected);
        }
        if state.fail_reads {
            state.stats.rejected += 1;
            return Err(SyncError::Remote(format!("read of {path} failed")));
        }
        Ok(state.snapshot_of(path))
    }

    fn subscribe(&self, path: &RemotePath, on_snapshot: SnapshotCallback) -> RemoteSubscription {
        let (id, initial) = {
            let mut state = self.inner.state.lock();
            let id = state.allocate();
            state
                .snapshot_listeners
                .push((id, path.clone(), on_snapshot.clone()));
            (id, state.snapshot_of(path))
        };
        on_snapshot(initial);
        listener_detach(Arc::downgrade(&self.inner), move |state| {
            state.snapshot_listeners.retain(|(lid, _, _)| *lid != id);
        })
    }

    fn on_connectivity_change(&self, callback: ConnectivityCallback) -> RemoteSubscription {
        let (id, connected) = {
            let mut state = self.inner.state.lock();
            let id = state.allocate();
            state.connectivity_listeners.push((id, callback.clone()));
            (id, state.connected)
        };
        callback(connected);
        listener_detach(Arc::downgrade(&self.inner), move |state| {
            state.connectivity_listeners.retain(|(lid, _)| *lid != id);
        })
    }
}
