use pretty_assertions::assert_eq;
use slate_sync::{reconcile_collection, reconcile_object, DeferredSnapshots, LocalMirror};
use slate_types::{ObjectId, SyncableObject};

fn obj(id: &str, modified_at: i64) -> SyncableObject {
    SyncableObject::new(id, "rectangle", "u1").with_timestamps(1000, modified_at)
}

fn sorted_ids(mirror: &LocalMirror) -> Vec<String> {
    let mut ids: Vec<String> = mirror.ids().into_iter().map(|id| id.to_string()).collect();
    ids.sort();
    ids
}

fn never_pending(_: &ObjectId) -> bool {
    false
}

// ── Collections ──────────────────────────────────────────────────

#[test]
fn snapshot_overwrites_and_inserts() {
    let mut mirror = LocalMirror::new();
    let mut deferred = DeferredSnapshots::default();
    mirror.set(obj("a", 1000));

    let outcome = reconcile_collection(
        &mut mirror,
        &mut deferred,
        vec![obj("a", 2000), obj("b", 1500)],
        never_pending,
    );

    assert_eq!(outcome.upserted, 2);
    assert_eq!(outcome.removed, 0);
    assert_eq!(mirror.get(&ObjectId::from("a")).unwrap().modified_at, 2000);
    assert_eq!(sorted_ids(&mirror), vec!["a", "b"]);
}

#[test]
fn missing_ids_are_deleted() {
    let mut mirror = LocalMirror::new();
    let mut deferred = DeferredSnapshots::default();
    mirror.set(obj("a", 1000));
    mirror.set(obj("b", 1000));

    let outcome =
        reconcile_collection(&mut mirror, &mut deferred, vec![obj("a", 1000)], never_pending);

    assert_eq!(outcome.removed, 1);
    assert_eq!(sorted_ids(&mirror), vec!["a"]);
    assert!(mirror.all().iter().all(|o| o.id != ObjectId::from("b")));
}

#[test]
fn empty_snapshot_clears_board() {
    let mut mirror = LocalMirror::new();
    let mut deferred = DeferredSnapshots::default();
    mirror.set(obj("a", 1000));

    reconcile_collection(&mut mirror, &mut deferred, Vec::new(), never_pending);
    assert!(mirror.is_empty());
}

#[test]
fn applying_same_snapshot_twice_is_idempotent() {
    let mut mirror = LocalMirror::new();
    let mut deferred = DeferredSnapshots::default();
    mirror.set(obj("stale", 1000));
    let snapshot = vec![obj("a", 2000), obj("b", 3000)];

    let first = reconcile_collection(&mut mirror, &mut deferred, snapshot.clone(), never_pending);
    assert!(first.changed());
    let mut after_first = mirror.all();
    after_first.sort_by(|l, r| l.id.cmp(&r.id));

    let second = reconcile_collection(&mut mirror, &mut deferred, snapshot, never_pending);
    assert!(!second.changed());
    let mut after_second = mirror.all();
    after_second.sort_by(|l, r| l.id.cmp(&r.id));
    assert_eq!(after_first, after_second);
}

#[test]
fn pending_objects_keep_optimistic_value() {
    let mut mirror = LocalMirror::new();
    let mut deferred = DeferredSnapshots::default();
    let optimistic = obj("a", 5000).at(99.0, 99.0);
    mirror.set(optimistic.clone());
    mirror.set(obj("local-only", 5000));

    let pending = |id: &ObjectId| id.as_str() == "a" || id.as_str() == "local-only";
    let outcome = reconcile_collection(&mut mirror, &mut deferred, vec![obj("a", 1000)], pending);

    assert_eq!(outcome.deferred, 2);
    assert_eq!(mirror.get(&ObjectId::from("a")), Some(&optimistic));
    assert!(mirror.contains(&ObjectId::from("local-only")));

    assert_eq!(deferred.take(&ObjectId::from("a")), Some(Some(obj("a", 1000))));
    assert_eq!(deferred.take(&ObjectId::from("local-only")), Some(None));
    assert_eq!(deferred.take(&ObjectId::from("a")), None);
}

#[test]
fn newer_deferred_value_replaces_older() {
    let mut deferred = DeferredSnapshots::default();
    deferred.defer(ObjectId::from("a"), None);
    deferred.defer(ObjectId::from("a"), Some(obj("a", 2000)));

    assert_eq!(deferred.take(&ObjectId::from("a")), Some(Some(obj("a", 2000))));
    assert_eq!(deferred.take(&ObjectId::from("a")), None);
}

// ── Single objects ───────────────────────────────────────────────

#[test]
fn object_snapshot_upserts_and_deletes() {
    let mut mirror = LocalMirror::new();
    let mut deferred = DeferredSnapshots::default();
    let id = ObjectId::from("a");

    let outcome =
        reconcile_object(&mut mirror, &mut deferred, &id, Some(obj("a", 1000)), never_pending);
    assert_eq!(outcome.upserted, 1);

    let outcome =
        reconcile_object(&mut mirror, &mut deferred, &id, Some(obj("a", 1000)), never_pending);
    assert!(!outcome.changed());

    let outcome = reconcile_object(&mut mirror, &mut deferred, &id, None, never_pending);
    assert_eq!(outcome.removed, 1);
    assert!(mirror.is_empty());
}

#[test]
fn object_snapshot_defers_when_pending() {
    let mut mirror = LocalMirror::new();
    let mut deferred = DeferredSnapshots::default();
    let id = ObjectId::from("a");
    mirror.set(obj("a", 5000));

    let outcome = reconcile_object(&mut mirror, &mut deferred, &id, None, |_| true);

    assert_eq!(outcome.deferred, 1);
    assert!(mirror.contains(&id));
    assert_eq!(deferred.take(&id), Some(None));
}
