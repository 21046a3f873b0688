use pretty_assertions::assert_eq;
use slate_sync::{OperationKind, OperationPayload, OperationQueue, OperationState, PendingOperation};
use slate_types::{BoardId, ObjectId, ObjectUpdate, SyncableObject};

fn board() -> BoardId {
    BoardId::from("b1")
}

fn obj(id: &str) -> SyncableObject {
    SyncableObject::new(id, "rectangle", "u1").with_timestamps(1000, 1000)
}

// ── PendingOperation ─────────────────────────────────────────────

#[test]
fn create_has_no_pre_image() {
    let op = PendingOperation::create(board(), obj("a"));
    assert_eq!(op.kind(), OperationKind::Create);
    assert_eq!(op.object_id, ObjectId::from("a"));
    assert_eq!(op.rollback, None);
    assert_eq!(op.applied, Some(obj("a")));
    assert_eq!(op.retry_count, 0);
    assert_eq!(op.state, OperationState::InFlight);
}

#[test]
fn update_keeps_full_pre_image() {
    let before = obj("a");
    let mask = ObjectUpdate::new().x(50.0);
    let after = mask.applied(&before);
    let op = PendingOperation::update(board(), mask.clone(), before.clone(), after.clone());

    assert_eq!(op.kind(), OperationKind::Update);
    assert_eq!(op.payload, OperationPayload::Update(mask));
    assert_eq!(op.rollback, Some(before));
    assert_eq!(op.applied, Some(after));
}

#[test]
fn delete_applies_absence() {
    let op = PendingOperation::delete(board(), obj("a"));
    assert_eq!(op.kind(), OperationKind::Delete);
    assert_eq!(op.payload, OperationPayload::Delete);
    assert_eq!(op.applied, None);
    assert_eq!(op.rollback, Some(obj("a")));
}

#[test]
fn operation_ids_are_unique() {
    let a = PendingOperation::create(board(), obj("a"));
    let b = PendingOperation::create(board(), obj("a"));
    assert_ne!(a.id, b.id);
}

#[test]
fn targets_checks_board_and_object() {
    let op = PendingOperation::create(board(), obj("a"));
    assert!(op.targets(&board(), &ObjectId::from("a")));
    assert!(!op.targets(&BoardId::from("b2"), &ObjectId::from("a")));
    assert!(!op.targets(&board(), &ObjectId::from("b")));
}

// ── OperationQueue ───────────────────────────────────────────────

#[test]
fn enqueue_and_remove() {
    let mut queue = OperationQueue::new();
    let first = queue.enqueue(PendingOperation::create(board(), obj("a")));
    let second = queue.enqueue(PendingOperation::create(board(), obj("b")));
    assert_eq!(queue.len(), 2);
    assert!(queue.get(first).is_some());

    let removed = queue.remove(first).unwrap();
    assert_eq!(removed.object_id, ObjectId::from("a"));
    assert!(queue.remove(first).is_none());
    assert_eq!(queue.snapshot().iter().map(|op| op.id).collect::<Vec<_>>(), vec![second]);
}

#[test]
fn snapshot_is_oldest_first() {
    let mut queue = OperationQueue::new();
    for id in ["a", "b", "c"] {
        queue.enqueue(PendingOperation::create(board(), obj(id)));
    }
    let order: Vec<String> =
        queue.snapshot().iter().map(|op| op.object_id.to_string()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
}

#[test]
fn has_later_for_looks_only_behind_the_operation() {
    let mut queue = OperationQueue::new();
    let create = queue.enqueue(PendingOperation::create(board(), obj("a")));
    let other = queue.enqueue(PendingOperation::create(board(), obj("b")));
    let delete = queue.enqueue(PendingOperation::delete(board(), obj("a")));

    assert!(queue.has_later_for(create));
    assert!(!queue.has_later_for(other));
    assert!(!queue.has_later_for(delete));

    queue.remove(delete);
    assert!(!queue.has_later_for(create));
}

#[test]
fn has_pending_for_is_board_scoped() {
    let mut queue = OperationQueue::new();
    queue.enqueue(PendingOperation::create(board(), obj("dup")));
    assert!(queue.has_pending_for(&board(), &ObjectId::from("dup")));
    assert!(!queue.has_pending_for(&BoardId::from("b2"), &ObjectId::from("dup")));
}

#[test]
fn increment_retry_and_state() {
    let mut queue = OperationQueue::new();
    let id = queue.enqueue(PendingOperation::create(board(), obj("a")));

    assert_eq!(queue.increment_retry(id), Some(1));
    assert_eq!(queue.increment_retry(id), Some(2));
    assert!(queue.set_state(id, OperationState::AwaitingRetry));
    assert_eq!(queue.get(id).unwrap().state, OperationState::AwaitingRetry);

    queue.remove(id);
    assert_eq!(queue.increment_retry(id), None);
    assert!(!queue.set_state(id, OperationState::InFlight));
}

#[test]
fn rebase_rollbacks_redirects_stale_pre_images() {
    let mut queue = OperationQueue::new();
    let original = obj("a");
    let first = original.clone().at(1.0, 1.0);
    let second = original.clone().at(2.0, 2.0);

    queue.enqueue(PendingOperation::update(
        board(),
        ObjectUpdate::new().position(1.0, 1.0),
        original.clone(),
        first.clone(),
    ));
    let later = queue.enqueue(PendingOperation::update(
        board(),
        ObjectUpdate::new().position(2.0, 2.0),
        first.clone(),
        second,
    ));

    let rebased = queue.rebase_rollbacks(
        &board(),
        &ObjectId::from("a"),
        &Some(first),
        &Some(original.clone()),
    );
    assert_eq!(rebased, 1);
    assert_eq!(queue.get(later).unwrap().rollback, Some(original));
}

#[test]
fn clear_returns_everything() {
    let mut queue = OperationQueue::new();
    queue.enqueue(PendingOperation::create(board(), obj("a")));
    queue.enqueue(PendingOperation::delete(board(), obj("b")));

    let cleared = queue.clear();
    assert_eq!(cleared.len(), 2);
    assert!(queue.is_empty());
}

#[test]
fn payload_serializes_with_op_tag() {
    let value = serde_json::to_value(OperationPayload::Delete).unwrap();
    assert_eq!(value, serde_json::json!({"op": "delete"}));

    let value = serde_json::to_value(OperationPayload::Update(ObjectUpdate::new().x(3.0))).unwrap();
    assert_eq!(value, serde_json::json!({"op": "update", "data": {"x": 3.0}}));
}
