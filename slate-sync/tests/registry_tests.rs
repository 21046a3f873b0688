use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use slate_sync::{
    OperationFailure, PendingOperation, SubscriberRegistry, Subscription, SyncStatus,
};
use slate_types::{BoardId, ObjectId, SyncableObject};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn obj(id: &str) -> SyncableObject {
    SyncableObject::new(id, "rectangle", "u1").with_timestamps(1000, 1000)
}

fn board() -> BoardId {
    BoardId::from("b1")
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

// ── Board and object listeners ───────────────────────────────────

#[test]
fn board_listeners_receive_full_list() {
    let registry = SubscriberRegistry::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _sub = registry.subscribe_all(&board(), move |objects| {
        sink.lock().push(objects.len());
    });

    registry.notify_board(&board(), &[obj("a"), obj("b")]);
    registry.notify_board(&board(), &[obj("a")]);

    assert_eq!(*seen.lock(), vec![2, 1]);
}

#[test]
fn listeners_are_board_scoped() {
    let registry = SubscriberRegistry::new();
    let hits = counter();
    let h = hits.clone();
    let _sub = registry.subscribe_all(&BoardId::from("b2"), move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });

    registry.notify_board(&board(), &[obj("a")]);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn object_listeners_receive_value_or_absence() {
    let registry = SubscriberRegistry::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _sub = registry.subscribe_one(&board(), &ObjectId::from("a"), move |object| {
        sink.lock().push(object.map(|o| o.x));
    });

    registry.notify_board(&board(), &[obj("a").at(7.0, 0.0), obj("b")]);
    registry.notify_board(&board(), &[obj("b")]);

    assert_eq!(*seen.lock(), vec![Some(7.0), None]);
    assert_eq!(registry.listener_count(&board()), 1);
}

// ── Unsubscribe ──────────────────────────────────────────────────

#[test]
fn unsubscribe_is_idempotent_and_isolated() {
    let registry = SubscriberRegistry::new();
    let first = counter();
    let second = counter();
    let (f, s) = (first.clone(), second.clone());
    let sub_a = registry.subscribe_all(&board(), move |_| {
        f.fetch_add(1, Ordering::SeqCst);
    });
    let _sub_b = registry.subscribe_all(&board(), move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });

    sub_a.unsubscribe();
    sub_a.unsubscribe();
    assert!(!sub_a.is_active());
    registry.notify_board(&board(), &[]);

    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(registry.listener_count(&board()), 1);
}

#[test]
fn detach_hook_runs_once() {
    let registry = SubscriberRegistry::new();
    let detached = counter();
    let d = detached.clone();
    let sub = registry.subscribe_all(&board(), |_| {}).with_detach(move || {
        d.fetch_add(1, Ordering::SeqCst);
    });

    sub.unsubscribe();
    sub.unsubscribe();
    assert_eq!(detached.load(Ordering::SeqCst), 1);
}

#[test]
fn dropping_token_keeps_listener() {
    let registry = SubscriberRegistry::new();
    let hits = counter();
    let h = hits.clone();
    drop(registry.subscribe_all(&board(), move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    }));

    registry.notify_board(&board(), &[]);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn listener_may_unsubscribe_itself_during_delivery() {
    let registry = SubscriberRegistry::new();
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let hits = counter();
    let other_hits = counter();

    let (own, h) = (slot.clone(), hits.clone());
    let sub = registry.subscribe_all(&board(), move |_| {
        h.fetch_add(1, Ordering::SeqCst);
        if let Some(sub) = own.lock().as_ref() {
            sub.unsubscribe();
        }
    });
    *slot.lock() = Some(sub);
    let o = other_hits.clone();
    let _other = registry.subscribe_all(&board(), move |_| {
        o.fetch_add(1, Ordering::SeqCst);
    });

    registry.notify_board(&board(), &[]);
    registry.notify_board(&board(), &[]);

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(other_hits.load(Ordering::SeqCst), 2);
}

#[test]
fn listener_may_subscribe_during_delivery() {
    let registry = SubscriberRegistry::new();
    let added = Arc::new(Mutex::new(Vec::new()));
    let (reg, store) = (registry.clone(), added.clone());
    let _sub = registry.subscribe_all(&board(), move |_| {
        store.lock().push(reg.subscribe_all(&BoardId::from("b1"), |_| {}));
    });

    registry.notify_board(&board(), &[]);
    assert_eq!(added.lock().len(), 1);
    assert_eq!(registry.listener_count(&board()), 2);
}

// ── Panic isolation ──────────────────────────────────────────────

#[test]
fn panicking_listener_does_not_block_others() {
    let registry = SubscriberRegistry::new();
    let hits = counter();
    let _bad = registry.subscribe_all(&board(), |_| panic!("listener bug"));
    let h = hits.clone();
    let _good = registry.subscribe_all(&board(), move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });
    let _bad_status = registry.subscribe_status(|_| panic!("status bug"));
    let s = hits.clone();
    let _good_status = registry.subscribe_status(move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });

    registry.notify_board(&board(), &[obj("a")]);
    registry.notify_status(&SyncStatus::default());

    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

// ── Status and failure channels ──────────────────────────────────

#[test]
fn status_and_failure_channels() {
    let registry = SubscriberRegistry::new();
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let failures = Arc::new(Mutex::new(Vec::new()));
    let (st, fl) = (statuses.clone(), failures.clone());
    let _s = registry.subscribe_status(move |status| st.lock().push(status.clone()));
    let _f = registry.subscribe_failures(move |failure| fl.lock().push(failure.clone()));

    let status = SyncStatus {
        is_connected: true,
        pending_count: 1,
        last_sync_at: None,
    };
    registry.notify_status(&status);
    let failure = OperationFailure {
        operation: PendingOperation::create(board(), obj("a")),
        error: "boom".into(),
        rolled_back: true,
    };
    registry.notify_failure(&failure);

    assert_eq!(*statuses.lock(), vec![status]);
    assert_eq!(*failures.lock(), vec![failure]);
}
