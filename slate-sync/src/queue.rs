//! Operation queue.
//!
//! Holds every mutation that was applied to a mirror but not yet confirmed by
//! the remote channel. Each entry carries what is needed to re-send it (the
//! payload) and to undo it (the pre-image), plus the value it wrote so a
//! rollback can check that nothing newer has replaced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slate_types::{BoardId, ObjectId, ObjectUpdate, OperationId, SyncableObject};

/// The kind of mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

/// What gets sent to the remote channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum OperationPayload {
    /// The full object.
    Create(SyncableObject),
    /// The field mask.
    Update(ObjectUpdate),
    Delete,
}

impl OperationPayload {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create(_) => OperationKind::Create,
            Self::Update(_) => OperationKind::Update,
            Self::Delete => OperationKind::Delete,
        }
    }
}

/// Where an operation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Sent, waiting for the remote channel to answer.
    InFlight,
    /// Failed once; kept optimistic and re-sent by retry passes.
    AwaitingRetry,
}

/// One outstanding mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: OperationId,
    pub board_id: BoardId,
    pub object_id: ObjectId,
    pub payload: OperationPayload,
    pub queued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub state: OperationState,
    /// Mirror value before the optimistic apply (`None`: did not exist).
    pub rollback: Option<SyncableObject>,
    /// Mirror value written by the optimistic apply (`None`: deleted).
    pub applied: Option<SyncableObject>,
}

impl PendingOperation {
    fn new(
        board_id: BoardId,
        object_id: ObjectId,
        payload: OperationPayload,
        rollback: Option<SyncableObject>,
        applied: Option<SyncableObject>,
    ) -> Self {
        Self {
            id: OperationId::new(),
            board_id,
            object_id,
            payload,
            queued_at: Utc::now(),
            retry_count: 0,
            state: OperationState::InFlight,
            rollback,
            applied,
        }
    }

    /// A create of `object`, which did not exist before.
    pub fn create(board_id: BoardId, object: SyncableObject) -> Self {
        let object_id = object.id.clone();
        Self::new(
            board_id,
            object_id,
            OperationPayload::Create(object.clone()),
            None,
            Some(object),
        )
    }

    /// An update that turned `before` into `after` using `mask`.
    pub fn update(
        board_id: BoardId,
        mask: ObjectUpdate,
        before: SyncableObject,
        after: SyncableObject,
    ) -> Self {
        let object_id = before.id.clone();
        Self::new(
            board_id,
            object_id,
            OperationPayload::Update(mask),
            Some(before),
            Some(after),
        )
    }

    /// A delete of `before`.
    pub fn delete(board_id: BoardId, before: SyncableObject) -> Self {
        let object_id = before.id.clone();
        Self::new(board_id, object_id, OperationPayload::Delete, Some(before), None)
    }

    pub fn kind(&self) -> OperationKind {
        self.payload.kind()
    }

    /// Whether this operation targets `object_id` on `board_id`.
    pub fn targets(&self, board_id: &BoardId, object_id: &ObjectId) -> bool {
        &self.board_id == board_id && &self.object_id == object_id
    }
}

/// A queued operation that ended without confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationFailure {
    pub operation: PendingOperation,
    pub error: String,
    /// Whether the optimistic state was reverted.
    pub rolled_back: bool,
}

/// FIFO of pending operations.
#[derive(Debug, Default)]
pub struct OperationQueue {
    operations: Vec<PendingOperation>,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, operation: PendingOperation) -> OperationId {
        let id = operation.id;
        self.operations.push(operation);
        id
    }

    pub fn remove(&mut self, id: OperationId) -> Option<PendingOperation> {
        let index = self.operations.iter().position(|op| op.id == id)?;
        Some(self.operations.remove(index))
    }

    pub fn get(&self, id: OperationId) -> Option<&PendingOperation> {
        self.operations.iter().find(|op| op.id == id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// A copy of the queue, oldest first.
    pub fn snapshot(&self) -> Vec<PendingOperation> {
        self.operations.clone()
    }

    /// Whether any queued operation targets the object.
    pub fn has_pending_for(&self, board_id: &BoardId, object_id: &ObjectId) -> bool {
        self.operations.iter().any(|op| op.targets(board_id, object_id))
    }

    /// Whether an operation queued after `id` targets the same object.
    pub fn has_later_for(&self, id: OperationId) -> bool {
        let Some(index) = self.operations.iter().position(|op| op.id == id) else {
            return false;
        };
        let op = &self.operations[index];
        self.operations[index + 1..]
            .iter()
            .any(|later| later.targets(&op.board_id, &op.object_id))
    }

    /// Bumps the retry counter. Returns the new count, or `None` if the
    /// operation is gone.
    pub fn increment_retry(&mut self, id: OperationId) -> Option<u32> {
        let op = self.operations.iter_mut().find(|op| op.id == id)?;
        op.retry_count += 1;
        Some(op.retry_count)
    }

    /// Returns false if the operation is gone.
    pub fn set_state(&mut self, id: OperationId, state: OperationState) -> bool {
        match self.operations.iter_mut().find(|op| op.id == id) {
            Some(op) => {
                op.state = state;
                true
            }
            None => false,
        }
    }

    /// After a skipped rollback, later operations on the same object that
    /// would restore `stale` must restore `replacement` instead, otherwise a
    /// second failure would resurrect a value that was never confirmed.
    pub fn rebase_rollbacks(
        &mut self,
        board_id: &BoardId,
        object_id: &ObjectId,
        stale: &Option<SyncableObject>,
        replacement: &Option<SyncableObject>,
    ) -> usize {
        let mut rebased = 0;
        for op in self
            .operations
            .iter_mut()
            .filter(|op| op.targets(board_id, object_id))
        {
            if &op.rollback == stale {
                op.rollback.clone_from(replacement);
                rebased += 1;
            }
        }
        rebased
    }

    /// Empties the queue, returning what was dropped.
    pub fn clear(&mut self) -> Vec<PendingOperation> {
        std::mem::take(&mut self.operations)
    }
}
