//! Sync engine.
//!
//! Every mutation follows the same pattern: apply to the board's mirror and
//! broadcast, queue, send to the remote channel, then resolve (dequeue on
//! success, roll back on failure). Remote snapshots are reconciled into the
//! mirrors independently of the mutation path.
//!
//! All state lives behind one `parking_lot::Mutex`. The lock is never held
//! across an `.await` or while a listener runs: listeners may call back into
//! the engine, and the in-memory remote delivers snapshots synchronously from
//! inside a commit.

use crate::config::{RollbackPolicy, SyncConfig};
use crate::error::{Result, SyncError};
use crate::mirror::LocalMirror;
use crate::queue::{
    OperationFailure, OperationKind, OperationPayload, OperationQueue, OperationState,
    PendingOperation,
};
use crate::reconcile::{reconcile_collection, reconcile_object, DeferredSnapshots};
use crate::registry::{self, SubscriberRegistry, Subscription};
use crate::remote::{RemoteChannel, RemotePath, RemoteSubscription, Snapshot};
use crate::status::{StatusTracker, SyncStatus};
use crate::tasks::RetryTasks;
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use slate_types::{BoardId, ObjectId, ObjectUpdate, StampedObject, StampedUpdate, SyncableObject};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Outcome of a mutation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub success: bool,
    /// State after the commit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<SyncableObject>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the optimistic apply was reversed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolled_back: Option<bool>,
}

impl SyncResult {
    pub fn ok(object: Option<SyncableObject>) -> Self {
        Self {
            success: true,
            object,
            error: None,
            rolled_back: None,
        }
    }

    /// The fail-fast result for update/delete of an unknown object.
    pub fn not_found(object_id: &ObjectId) -> Self {
        Self {
            success: false,
            object: None,
            error: Some(
                SyncError::NotFoundLocally {
                    object_id: object_id.clone(),
                }
                .to_string(),
            ),
            rolled_back: None,
        }
    }

    /// A failed commit whose optimistic state was reverted.
    pub fn rolled_back(error: &SyncError) -> Self {
        Self {
            success: false,
            object: None,
            error: Some(error.to_string()),
            rolled_back: Some(true),
        }
    }

    /// A failed commit whose optimistic state was kept.
    pub fn failed(error: &SyncError) -> Self {
        Self {
            success: false,
            object: None,
            error: Some(error.to_string()),
            rolled_back: Some(false),
        }
    }

    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back == Some(true)
    }
}

/// What a retry pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    /// Operations whose retry count was bumped.
    pub retried: usize,
    /// Re-sent operations that committed.
    pub committed: usize,
    /// Operations dropped at the retry ceiling.
    pub abandoned: usize,
    /// Kept operations dropped because a later local change replaced
    /// everything they wrote.
    pub superseded: usize,
    /// Another pass was already running; nothing was done.
    pub skipped: bool,
    /// Shutdown interrupted the pass.
    pub cancelled: bool,
}

/// What a retry pass sends for an operation kept optimistic.
#[derive(Debug)]
enum Resend {
    /// The operation, with an update mask narrowed to what the mirror still
    /// holds.
    Send(PendingOperation),
    Superseded,
}

/// How a queued operation ended, for applying deferred snapshot values.
#[derive(Debug, Clone, Copy)]
enum Resolution {
    Committed(OperationKind),
    Reverted,
}

#[derive(Debug, Default)]
struct BoardSession {
    mirror: LocalMirror,
    deferred: DeferredSnapshots,
}

impl BoardSession {
    /// Applies the deferred snapshot value for `object_id` once nothing is
    /// queued for it. Returns true if the mirror changed.
    fn settle(
        &mut self,
        queue: &OperationQueue,
        board: &BoardId,
        object_id: &ObjectId,
        resolution: Resolution,
    ) -> bool {
        if queue.has_pending_for(board, object_id) {
            return false;
        }
        let Some(value) = self.deferred.take(object_id) else {
            return false;
        };
        let applicable = match resolution {
            Resolution::Committed(OperationKind::Delete) => value.is_none(),
            Resolution::Committed(_) => value.is_some(),
            Resolution::Reverted => true,
        };
        if !applicable {
            debug!("Dropping stale deferred snapshot for {}", object_id);
            return false;
        }
        match value {
            Some(object) if self.mirror.get(object_id) == Some(&object) => false,
            Some(object) => {
                self.mirror.set(object);
                true
            }
            None => self.mirror.delete(object_id).is_some(),
        }
    }
}

#[derive(Debug, Default)]
struct EngineState {
    boards: HashMap<BoardId, BoardSession>,
    queue: OperationQueue,
    status: StatusTracker,
}

struct Inner {
    remote: Arc<dyn RemoteChannel>,
    config: SyncConfig,
    state: Mutex<EngineState>,
    registry: SubscriberRegistry,
    tasks: RetryTasks,
    connectivity: Mutex<Option<RemoteSubscription>>,
    retry_running: AtomicBool,
    /// A reconnect asked for a pass that has not started yet.
    retry_requested: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(subscription) = self.connectivity.get_mut().take() {
            subscription.unsubscribe();
        }
        self.tasks.shutdown();
    }
}

/// Resets the retry flag even if the pass is aborted.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Optimistic sync engine for any number of boards.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    /// Creates an engine on top of `remote` and starts following its
    /// connectivity. Call from within a tokio runtime to enable automatic
    /// retries on reconnect.
    pub fn new(remote: Arc<dyn RemoteChannel>, config: SyncConfig) -> Self {
        let inner = Arc::new(Inner {
            remote,
            config,
            state: Mutex::new(EngineState::default()),
            registry: SubscriberRegistry::new(),
            tasks: RetryTasks::new(),
            connectivity: Mutex::new(None),
            retry_running: AtomicBool::new(false),
            retry_requested: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        let on_change = move |connected: bool| {
            if let Some(engine) = Self::upgrade(&weak) {
                engine.on_connectivity(connected);
            }
        };
        let subscription = inner.remote.on_connectivity_change(Arc::new(on_change));
        *inner.connectivity.lock() = Some(subscription);

        Self { inner }
    }

    /// Creates an engine with the default configuration.
    pub fn with_defaults(remote: Arc<dyn RemoteChannel>) -> Self {
        Self::new(remote, SyncConfig::default())
    }

    fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner.state.lock()
    }

    // ── Mutations ────────────────────────────────────────────────

    /// Creates (or overwrites) an object.
    pub async fn create_object(&self, board: &BoardId, object: SyncableObject) -> SyncResult {
        let (op, status) = {
            let mut state = self.lock();
            let EngineState {
                boards,
                queue,
                status,
            } = &mut *state;
            let session = boards.entry(board.clone()).or_default();
            let previous = session.mirror.set(object.clone());
            let mut op = PendingOperation::create(board.clone(), object);
            op.rollback = previous;
            queue.enqueue(op.clone());
            (op, status.set_pending(queue.len()))
        };
        debug!("Applied create of {} on board {}", op.object_id, board);
        self.broadcast(board);
        self.publish_status(status);

        self.resolve(op).await
    }

    /// Applies a field mask to an object held in the local mirror.
    pub async fn update_object(
        &self,
        board: &BoardId,
        object_id: &ObjectId,
        update: ObjectUpdate,
    ) -> SyncResult {
        let Some((op, status)) = self.apply_update(board, object_id, update) else {
            debug!("Update of unknown object {} on board {}", object_id, board);
            return SyncResult::not_found(object_id);
        };
        debug!("Applied update of {} on board {}", object_id, board);
        self.broadcast(board);
        self.publish_status(status);

        self.resolve(op).await
    }

    /// Deletes an object held in the local mirror.
    pub async fn delete_object(&self, board: &BoardId, object_id: &ObjectId) -> SyncResult {
        let Some((op, status)) = self.apply_delete(board, object_id) else {
            debug!("Delete of unknown object {} on board {}", object_id, board);
            return SyncResult::not_found(object_id);
        };
        debug!("Applied delete of {} on board {}", object_id, board);
        self.broadcast(board);
        self.publish_status(status);

        self.resolve(op).await
    }

    fn apply_update(
        &self,
        board: &BoardId,
        object_id: &ObjectId,
        update: ObjectUpdate,
    ) -> Option<(PendingOperation, Option<SyncStatus>)> {
        let mut state = self.lock();
        let EngineState {
            boards,
            queue,
            status,
        } = &mut *state;
        let session = boards.get_mut(board)?;
        let before = session.mirror.get(object_id)?.clone();

        let mut after = update.applied(&before);
        // Provisional until the authority's timestamp arrives. Only the
        // previous value orders it; the local clock never does.
        after.modified_at = after.modified_at.max(before.modified_at.saturating_add(1));
        session.mirror.set(after.clone());

        let op = PendingOperation::update(board.clone(), update, before, after);
        queue.enqueue(op.clone());
        Some((op, status.set_pending(queue.len())))
    }

    fn apply_delete(
        &self,
        board: &BoardId,
        object_id: &ObjectId,
    ) -> Option<(PendingOperation, Option<SyncStatus>)> {
        let mut state = self.lock();
        let EngineState {
            boards,
            queue,
            status,
        } = &mut *state;
        let before = boards.get_mut(board)?.mirror.delete(object_id)?;

        let op = PendingOperation::delete(board.clone(), before);
        queue.enqueue(op.clone());
        Some((op, status.set_pending(queue.len())))
    }

    async fn resolve(&self, op: PendingOperation) -> SyncResult {
        match self.send(&op).await {
            Ok(()) => {
                self.complete(&op);
                let object = match op.kind() {
                    OperationKind::Delete => None,
                    _ => self.local_object(&op.board_id, &op.object_id).or(op.applied),
                };
                SyncResult::ok(object)
            }
            Err(err) => self.fail(op, err),
        }
    }

    /// Sends an operation's payload, stamped with the authority token.
    async fn send(&self, op: &PendingOperation) -> Result<()> {
        let remote = &self.inner.remote;
        let path = RemotePath::object(op.board_id.clone(), op.object_id.clone());
        let stamp = remote.authority_timestamp();
        let call = async {
            match &op.payload {
                OperationPayload::Create(object) => {
                    remote.write(&path, StampedObject::new(object.clone(), stamp)).await
                }
                OperationPayload::Update(mask) => {
                    remote.patch(&path, StampedUpdate::new(mask.clone(), stamp)).await
                }
                OperationPayload::Delete => remote.remove(&path).await,
            }
        };
        match tokio::time::timeout(self.inner.config.remote_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout),
        }
    }

    fn complete(&self, op: &PendingOperation) {
        let (changed, statuses) = {
            let mut state = self.lock();
            let EngineState {
                boards,
                queue,
                status,
            } = &mut *state;
            queue.remove(op.id);
            let changed = boards.get_mut(&op.board_id).is_some_and(|session| {
                session.settle(queue, &op.board_id, &op.object_id, Resolution::Committed(op.kind()))
            });
            let statuses = [status.set_pending(queue.len()), status.mark_synced(Utc::now())];
            (changed, statuses)
        };
        info!(
            "Committed {:?} of {} on board {}",
            op.kind(),
            op.object_id,
            op.board_id
        );
        if changed {
            self.broadcast(&op.board_id);
        }
        for status in statuses {
            self.publish_status(status);
        }
    }

    fn fail(&self, op: PendingOperation, err: SyncError) -> SyncResult {
        match self.inner.config.rollback_policy {
            // Only failures a retry could fix are kept.
            RollbackPolicy::AfterRetriesExhausted if err.is_transient() => {
                let queued = self.lock().queue.set_state(op.id, OperationState::AwaitingRetry);
                if queued {
                    warn!(
                        "Commit of {:?} {} on board {} failed, kept for retry: {}",
                        op.kind(),
                        op.object_id,
                        op.board_id,
                        err
                    );
                    SyncResult::failed(&err)
                } else if self.rollback(&op) {
                    // Abandoned while in flight.
                    SyncResult::rolled_back(&err)
                } else {
                    SyncResult::failed(&err)
                }
            }
            _ => {
                warn!(
                    "Commit of {:?} {} on board {} failed: {}",
                    op.kind(),
                    op.object_id,
                    op.board_id,
                    err
                );
                if self.rollback(&op) {
                    SyncResult::rolled_back(&err)
                } else {
                    SyncResult::failed(&err)
                }
            }
        }
    }

    /// Dequeues `op` and restores its pre-image, unless a later local
    /// operation already replaced the value it applied. Returns whether the
    /// pre-image was restored.
    fn rollback(&self, op: &PendingOperation) -> bool {
        let (restored, changed, status) = {
            let mut state = self.lock();
            let EngineState {
                boards,
                queue,
                status,
            } = &mut *state;
            queue.remove(op.id);
            let session = boards.entry(op.board_id.clone()).or_default();

            let untouched = session.mirror.get(&op.object_id) == op.applied.as_ref();
            if untouched {
                match &op.rollback {
                    Some(previous) => {
                        session.mirror.set(previous.clone());
                    }
                    None => {
                        session.mirror.delete(&op.object_id);
                    }
                }
            } else {
                queue.rebase_rollbacks(&op.board_id, &op.object_id, &op.applied, &op.rollback);
            }
            let settled = session.settle(queue, &op.board_id, &op.object_id, Resolution::Reverted);
            (untouched, untouched || settled, status.set_pending(queue.len()))
        };

        if restored {
            warn!("Rolled back {:?} of {} on board {}", op.kind(), op.object_id, op.board_id);
        } else {
            warn!(
                "Skipped rollback of {} on board {}: replaced by a later change",
                op.object_id, op.board_id
            );
        }
        if changed {
            self.broadcast(&op.board_id);
        }
        self.publish_status(status);
        restored
    }

    /// Drops an operation at the retry ceiling and reports it on the failure
    /// channel. Operations kept optimistic are rolled back first.
    fn abandon(&self, op: PendingOperation) {
        let error = SyncError::RetryExhausted {
            operation_id: op.id,
            attempts: op.retry_count,
        };
        warn!("Abandoning {:?} of {}: {}", op.kind(), op.object_id, error);

        let rolled_back = match op.state {
            OperationState::AwaitingRetry => self.rollback(&op),
            OperationState::InFlight => {
                let status = {
                    let mut state = self.lock();
                    state.queue.remove(op.id);
                    let pending = state.queue.len();
                    state.status.set_pending(pending)
                };
                self.publish_status(status);
                false
            }
        };

        self.inner.registry.notify_failure(&OperationFailure {
            operation: op,
            error: error.to_string(),
            rolled_back,
        });
    }

    /// Dequeues a kept operation that a later local change made redundant.
    /// The mirror keeps the later value.
    fn retire(&self, op: &PendingOperation) {
        let (changed, status) = {
            let mut state = self.lock();
            let EngineState {
                boards,
                queue,
                status,
            } = &mut *state;
            queue.remove(op.id);
            let changed = boards.get_mut(&op.board_id).is_some_and(|session| {
                session.settle(queue, &op.board_id, &op.object_id, Resolution::Reverted)
            });
            (changed, status.set_pending(queue.len()))
        };
        info!(
            "Dropped {:?} of {} on board {}: superseded by a later change",
            op.kind(),
            op.object_id,
            op.board_id
        );
        if changed {
            self.broadcast(&op.board_id);
        }
        self.publish_status(status);
    }

    // ── Queries ──────────────────────────────────────────────────

    /// The local value of an object, falling back to a one-shot remote read.
    /// A value found remotely is cached into the mirror.
    pub async fn get_object(
        &self,
        board: &BoardId,
        object_id: &ObjectId,
    ) -> Option<SyncableObject> {
        if let Some(object) = self.local_object(board, object_id) {
            return Some(object);
        }

        let path = RemotePath::object(board.clone(), object_id.clone());
        let object = match self.read(&path).await {
            Ok(Snapshot::Object(value)) => value?,
            Ok(Snapshot::Collection(_)) => {
                warn!("Unexpected collection snapshot for {}", path);
                return None;
            }
            Err(err) => {
                warn!("Read of {} failed: {}", path, err);
                return None;
            }
        };

        let cached = {
            let mut state = self.lock();
            let EngineState { boards, queue, .. } = &mut *state;
            if queue.has_pending_for(board, object_id) {
                // A local delete is in flight.
                false
            } else {
                boards
                    .entry(board.clone())
                    .or_default()
                    .mirror
                    .set(object.clone());
                true
            }
        };
        if !cached {
            return None;
        }
        debug!("Cached {} from remote read", path);
        self.broadcast(board);
        Some(object)
    }

    /// Resyncs a board from a one-shot read of its collection and returns
    /// the result. Falls back to the local mirror if the read fails.
    pub async fn get_all_objects(&self, board: &BoardId) -> Vec<SyncableObject> {
        let path = RemotePath::collection(board.clone());
        match self.read(&path).await {
            Ok(snapshot @ Snapshot::Collection(_)) => self.apply_snapshot(&path, snapshot),
            Ok(Snapshot::Object(_)) => warn!("Unexpected object snapshot for {}", path),
            Err(err) => warn!("Read of {} failed, serving local state: {}", path, err),
        }
        self.local_objects(board)
    }

    async fn read(&self, path: &RemotePath) -> Result<Snapshot> {
        let timeout = self.inner.config.remote_timeout();
        match tokio::time::timeout(timeout, self.inner.remote.read_once(path)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout),
        }
    }

    /// The mirror's value, without touching the remote channel.
    pub fn local_object(&self, board: &BoardId, object_id: &ObjectId) -> Option<SyncableObject> {
        self.lock()
            .boards
            .get(board)
            .and_then(|session| session.mirror.get(object_id))
            .cloned()
    }

    /// The mirror's content, without touching the remote channel.
    pub fn local_objects(&self, board: &BoardId) -> Vec<SyncableObject> {
        self.lock()
            .boards
            .get(board)
            .map(|session| session.mirror.all())
            .unwrap_or_default()
    }

    pub fn get_sync_status(&self) -> SyncStatus {
        self.lock().status.status()
    }

    /// A copy of the operation queue, oldest first.
    pub fn pending_operations(&self) -> Vec<PendingOperation> {
        self.lock().queue.snapshot()
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// Follows every object of `board`. The listener receives the full
    /// object list after every change.
    pub fn subscribe_to_objects(
        &self,
        board: &BoardId,
        callback: impl Fn(&[SyncableObject]) + Send + Sync + 'static,
    ) -> Subscription {
        let subscription = self.inner.registry.subscribe_all(board, callback);
        let remote = self.follow(RemotePath::collection(board.clone()));
        subscription.with_detach(move || remote.unsubscribe())
    }

    /// Follows one object. The listener receives `None` once it is gone.
    pub fn subscribe_to_object(
        &self,
        board: &BoardId,
        object_id: &ObjectId,
        callback: impl Fn(Option<&SyncableObject>) + Send + Sync + 'static,
    ) -> Subscription {
        let subscription = self.inner.registry.subscribe_one(board, object_id, callback);
        let remote = self.follow(RemotePath::object(board.clone(), object_id.clone()));
        subscription.with_detach(move || remote.unsubscribe())
    }

    /// Follows the sync status. The current status is delivered at once.
    pub fn subscribe_to_sync_status(
        &self,
        callback: impl Fn(&SyncStatus) + Send + Sync + 'static,
    ) -> Subscription {
        let callback = Arc::new(callback);
        let listener = callback.clone();
        let subscription = self.inner.registry.subscribe_status(move |status| listener(status));
        let current = self.get_sync_status();
        registry::deliver("status", || callback(&current));
        subscription
    }

    /// Follows operations abandoned at the retry ceiling.
    pub fn subscribe_to_failures(
        &self,
        callback: impl Fn(&OperationFailure) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.registry.subscribe_failures(callback)
    }

    fn follow(&self, path: RemotePath) -> RemoteSubscription {
        let weak = Arc::downgrade(&self.inner);
        let target = path.clone();
        self.inner.remote.subscribe(
            &path,
            Arc::new(move |snapshot: Snapshot| {
                if let Some(engine) = Self::upgrade(&weak) {
                    engine.apply_snapshot(&target, snapshot);
                }
            }),
        )
    }

    fn apply_snapshot(&self, path: &RemotePath, snapshot: Snapshot) {
        let board = path.board();
        let (outcome, status) = {
            let mut state = self.lock();
            let EngineState {
                boards,
                queue,
                status,
            } = &mut *state;
            let session = boards.entry(board.clone()).or_default();
            let is_pending = |object_id: &ObjectId| queue.has_pending_for(board, object_id);
            let outcome = match (snapshot, path.object_id()) {
                (Snapshot::Collection(objects), None) => reconcile_collection(
                    &mut session.mirror,
                    &mut session.deferred,
                    objects,
                    is_pending,
                ),
                (Snapshot::Object(value), Some(object_id)) => reconcile_object(
                    &mut session.mirror,
                    &mut session.deferred,
                    object_id,
                    value,
                    is_pending,
                ),
                _ => {
                    warn!("Snapshot shape does not match {}", path);
                    return;
                }
            };
            (outcome, status.mark_synced(Utc::now()))
        };
        debug!(
            "Reconciled {}: {} upserted, {} removed, {} deferred",
            path, outcome.upserted, outcome.removed, outcome.deferred
        );
        self.broadcast(board);
        self.publish_status(status);
    }

    fn broadcast(&self, board: &BoardId) {
        let objects = self.local_objects(board);
        self.inner.registry.notify_board(board, &objects);
    }

    fn publish_status(&self, status: Option<SyncStatus>) {
        if let Some(status) = status {
            self.inner.registry.notify_status(&status);
        }
    }

    // ── Resilience ───────────────────────────────────────────────

    fn on_connectivity(&self, connected: bool) {
        let (status, regained, has_pending) = {
            let mut state = self.lock();
            let was_connected = state.status.is_connected();
            let status = state.status.set_connected(connected);
            (status, connected && !was_connected, !state.queue.is_empty())
        };
        if status.is_some() {
            info!("Remote channel {}", if connected { "connected" } else { "disconnected" });
        }
        self.publish_status(status);
        if regained && has_pending {
            self.request_retry();
        }
    }

    /// Starts a background pass, or has the running one start another when
    /// it finishes.
    fn request_retry(&self) {
        self.inner.retry_requested.store(true, Ordering::Release);
        if self.inner.retry_running.load(Ordering::Acquire) {
            info!("Retry pass already running; another pass will follow it");
            return;
        }
        self.schedule_retry();
    }

    fn schedule_retry(&self) {
        let engine = self.clone();
        let spawned = self.inner.tasks.spawn(async move {
            let report = engine.retry_pending_operations().await;
            debug!("Background retry pass finished: {:?}", report);
        });
        if spawned {
            debug!("Scheduled background retry pass");
        }
    }

    /// Runs one retry pass over the queue.
    ///
    /// Operations at the retry ceiling are abandoned. The others wait
    /// `retry_base_delay × 2^retry_count`, get their retry count bumped and
    /// stay queued. Operations kept optimistic after a failure are re-sent,
    /// limited to what the mirror still holds of them; one whose values were
    /// all replaced by a later local change is dropped instead.
    /// Only one pass runs at a time.
    pub async fn retry_pending_operations(&self) -> RetryReport {
        if self.inner.retry_running.swap(true, Ordering::AcqRel) {
            debug!("Retry pass already running");
            return RetryReport {
                skipped: true,
                ..RetryReport::default()
            };
        }
        let report = {
            let _guard = PassGuard(&self.inner.retry_running);
            // This pass serves any reconnect that asked for one.
            self.inner.retry_requested.store(false, Ordering::Release);
            self.run_retry_pass().await
        };

        if self.inner.retry_requested.swap(false, Ordering::AcqRel)
            && !report.cancelled
            && !self.lock().queue.is_empty()
        {
            info!("Reconnected during the retry pass; starting another");
            self.schedule_retry();
        }
        report
    }

    async fn run_retry_pass(&self) -> RetryReport {
        let operations = self.pending_operations();
        let max_retries = self.inner.config.max_retries;
        let mut report = RetryReport::default();
        info!("Retry pass over {} pending operations", operations.len());

        for queued in operations {
            let Some(op) = self.lock().queue.get(queued.id).cloned() else {
                continue;
            };
            if op.retry_count >= max_retries {
                self.abandon(op);
                report.abandoned += 1;
                continue;
            }

            let delay = self.inner.config.backoff_for(op.retry_count);
            if !self.inner.tasks.sleep(delay).await {
                report.cancelled = true;
                break;
            }

            let current = {
                let mut state = self.lock();
                state.queue.increment_retry(op.id);
                state.queue.get(op.id).cloned()
            };
            // Resolved while we were waiting.
            let Some(current) = current else {
                continue;
            };
            report.retried += 1;

            if current.state != OperationState::AwaitingRetry {
                continue;
            }
            match self.plan_resend(&current) {
                Resend::Send(outgoing) => match self.send(&outgoing).await {
                    Ok(()) => {
                        self.complete(&current);
                        report.committed += 1;
                    }
                    Err(err) => warn!(
                        "Retry {} of {} failed: {}",
                        current.retry_count, current.object_id, err
                    ),
                },
                Resend::Superseded => {
                    self.retire(&current);
                    report.superseded += 1;
                }
            }
        }

        report
    }

    /// Decides what re-sending a kept operation means now. Later queued
    /// operations on the object still depend on it, so it goes out as is.
    /// Otherwise only the values the mirror still holds are sent.
    fn plan_resend(&self, op: &PendingOperation) -> Resend {
        let state = self.lock();
        let current = state
            .boards
            .get(&op.board_id)
            .and_then(|session| session.mirror.get(&op.object_id));
        if current == op.applied.as_ref() || state.queue.has_later_for(op.id) {
            return Resend::Send(op.clone());
        }
        match (&op.payload, current) {
            (OperationPayload::Update(mask), Some(current)) => {
                let held = mask.held_by(current);
                if held.is_empty() {
                    return Resend::Superseded;
                }
                let mut outgoing = op.clone();
                outgoing.payload = OperationPayload::Update(held);
                Resend::Send(outgoing)
            }
            _ => Resend::Superseded,
        }
    }

    /// Empties the queue without resolving anything remotely.
    ///
    /// Destructive: unconfirmed writes are forgotten and may never reach the
    /// remote store. Returns what was discarded.
    pub fn clear_pending_operations(&self) -> Vec<PendingOperation> {
        let (cleared, changed_boards, status) = {
            let mut state = self.lock();
            let EngineState {
                boards,
                queue,
                status,
            } = &mut *state;
            let cleared = queue.clear();
            let mut changed_boards = BTreeSet::new();
            for op in &cleared {
                let Some(session) = boards.get_mut(&op.board_id) else {
                    continue;
                };
                if session.settle(queue, &op.board_id, &op.object_id, Resolution::Reverted) {
                    changed_boards.insert(op.board_id.clone());
                }
            }
            (cleared, changed_boards, status.set_pending(0))
        };
        if !cleared.is_empty() {
            warn!(
                "Cleared {} pending operations without remote resolution; changes may be lost",
                cleared.len()
            );
        }
        for board in &changed_boards {
            self.broadcast(board);
        }
        self.publish_status(status);
        cleared
    }

    /// Cancels retry passes and background tasks and stops following
    /// connectivity. Listener subscriptions stay attached.
    pub fn shutdown(&self) {
        self.inner.tasks.shutdown();
        let subscription = self.inner.connectivity.lock().take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        info!("Sync engine shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.tasks.is_shut_down()
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.inner.config)
            .field("status", &self.get_sync_status())
            .finish()
    }
}
