use pretty_assertions::assert_eq;
use slate_sync::SyncError;
use slate_types::{ObjectId, OperationId};

fn serialization_error() -> SyncError {
    match serde_json::from_str::<serde_json::Value>("{") {
        Err(err) => SyncError::from(err),
        Ok(value) => panic!("parsed truncated JSON as {value}"),
    }
}

#[test]
fn channel_failures_are_transient() {
    assert!(SyncError::Remote("write rejected".into()).is_transient());
    assert!(SyncError::Disconnected.is_transient());
    assert!(SyncError::Timeout.is_transient());
}

#[test]
fn local_and_terminal_failures_are_not_transient() {
    let missing = SyncError::NotFoundLocally {
        object_id: ObjectId::from("o1"),
    };
    let exhausted = SyncError::RetryExhausted {
        operation_id: OperationId::new(),
        attempts: 3,
    };

    assert!(!missing.is_transient());
    assert!(!exhausted.is_transient());
    assert!(!serialization_error().is_transient());
}

#[test]
fn not_found_message_is_stable() {
    let err = SyncError::NotFoundLocally {
        object_id: ObjectId::from("ghost"),
    };
    assert_eq!(err.to_string(), "Object not found in local state");
}
