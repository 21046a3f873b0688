use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use slate_sync::{StatusTracker, SyncStatus};

#[test]
fn starts_disconnected_and_idle_queue() {
    let tracker = StatusTracker::new();
    assert_eq!(tracker.status(), SyncStatus::default());
    assert!(!tracker.status().is_idle());
}

#[test]
fn setters_report_only_changes() {
    let mut tracker = StatusTracker::new();

    let status = tracker.set_connected(true).unwrap();
    assert!(status.is_connected);
    assert!(tracker.set_connected(true).is_none());

    assert_eq!(tracker.set_pending(2).unwrap().pending_count, 2);
    assert!(tracker.set_pending(2).is_none());
    assert!(!tracker.status().is_idle());

    tracker.set_pending(0);
    assert!(tracker.status().is_idle());
}

#[test]
fn last_sync_never_moves_backwards() {
    let mut tracker = StatusTracker::new();
    let now = Utc::now();

    assert_eq!(tracker.mark_synced(now).unwrap().last_sync_at, Some(now));
    assert!(tracker.mark_synced(now - Duration::seconds(5)).is_none());
    assert!(tracker.mark_synced(now).is_none());

    let later = now + Duration::seconds(1);
    assert_eq!(tracker.mark_synced(later).unwrap().last_sync_at, Some(later));
}

#[test]
fn serializes_in_camel_case() {
    let status = SyncStatus {
        is_connected: true,
        pending_count: 3,
        last_sync_at: None,
    };
    let value = serde_json::to_value(&status).unwrap();
    assert_eq!(value["isConnected"], true);
    assert_eq!(value["pendingCount"], 3);
    assert!(value["lastSyncAt"].is_null());
}
