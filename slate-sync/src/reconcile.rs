//! Snapshot-diff reconciliation.
//!
//! Remote snapshots are authoritative: objects in the snapshot overwrite the
//! mirror and mirror entries missing from a collection snapshot are deleted
//! (that is how other clients' deletions arrive).
//!
//! Objects with a queued local operation are the exception. Their snapshot
//! value may predate our write, so it is parked in `DeferredSnapshots` and
//! applied by the engine once the last operation on the object resolves.

use crate::mirror::LocalMirror;
use slate_types::{ObjectId, SyncableObject};
use std::collections::{HashMap, HashSet};

/// What a reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub upserted: usize,
    pub removed: usize,
    pub deferred: usize,
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        self.upserted > 0 || self.removed > 0
    }
}

/// Latest authoritative value seen for objects that had pending operations.
/// `None` means the authority did not have the object.
#[derive(Debug, Clone, Default)]
pub struct DeferredSnapshots {
    values: HashMap<ObjectId, Option<SyncableObject>>,
}

impl DeferredSnapshots {
    pub fn defer(&mut self, object_id: ObjectId, value: Option<SyncableObject>) {
        self.values.insert(object_id, value);
    }

    pub fn take(&mut self, object_id: &ObjectId) -> Option<Option<SyncableObject>> {
        self.values.remove(object_id)
    }
}

/// Reconciles a full collection snapshot.
pub fn reconcile_collection(
    mirror: &mut LocalMirror,
    deferred: &mut DeferredSnapshots,
    snapshot: Vec<SyncableObject>,
    is_pending: impl Fn(&ObjectId) -> bool,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    let incoming: HashSet<ObjectId> = snapshot.iter().map(|o| o.id.clone()).collect();

    for object in snapshot {
        if is_pending(&object.id) {
            deferred.defer(object.id.clone(), Some(object));
            outcome.deferred += 1;
        } else if mirror.get(&object.id) != Some(&object) {
            mirror.set(object);
            outcome.upserted += 1;
        }
    }

    for object_id in mirror.ids() {
        if incoming.contains(&object_id) {
            continue;
        }
        if is_pending(&object_id) {
            deferred.defer(object_id, None);
            outcome.deferred += 1;
        } else {
            mirror.delete(&object_id);
            outcome.removed += 1;
        }
    }

    outcome
}

/// Reconciles a single-object snapshot (`None`: the object does not exist).
pub fn reconcile_object(
    mirror: &mut LocalMirror,
    deferred: &mut DeferredSnapshots,
    object_id: &ObjectId,
    value: Option<SyncableObject>,
    is_pending: impl Fn(&ObjectId) -> bool,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();

    if is_pending(object_id) {
        deferred.defer(object_id.clone(), value);
        outcome.deferred = 1;
        return outcome;
    }

    match value {
        Some(object) if mirror.get(object_id) != Some(&object) => {
            mirror.set(object);
            outcome.upserted = 1;
        }
        Some(_) => {}
        None => {
            if mirror.delete(object_id).is_some() {
                outcome.removed = 1;
            }
        }
    }
    outcome
}
