use slate_types::{BoardId, ObjectId, OperationId};
use std::collections::HashSet;
use std::str::FromStr;

// ── BoardId / ObjectId ────────────────────────────────────────────

#[test]
fn board_id_display_matches_input() {
    let id = BoardId::new("b1");
    assert_eq!(id.to_string(), "b1");
    assert_eq!(id.as_str(), "b1");
}

#[test]
fn board_id_from_str_and_from() {
    let parsed = BoardId::from_str("board-7").unwrap();
    assert_eq!(parsed, BoardId::from("board-7"));
    assert_eq!(parsed, BoardId::from("board-7".to_string()));
}

#[test]
fn object_id_is_transparent_in_json() {
    let id = ObjectId::new("o1");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"o1\"");
    let parsed: ObjectId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn object_id_generate_is_unique() {
    let a = ObjectId::generate();
    let b = ObjectId::generate();
    assert_ne!(a, b);
}

#[test]
fn same_string_ids_are_equal_across_types_of_construction() {
    let mut set = HashSet::new();
    set.insert(ObjectId::from("dup"));
    set.insert(ObjectId::new(String::from("dup")));
    assert_eq!(set.len(), 1);
}

// ── OperationId ───────────────────────────────────────────────────

#[test]
fn operation_id_new_is_unique() {
    let a = OperationId::new();
    let b = OperationId::new();
    assert_ne!(a, b);
}

#[test]
fn operation_id_is_time_ordered() {
    let a = OperationId::new();
    std::thread::sleep(std::time::Duration::from_millis(2));
    let b = OperationId::new();
    assert!(a < b);
}

#[test]
fn operation_id_display_and_parse() {
    let id = OperationId::new();
    let parsed = OperationId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
    let from_str: OperationId = OperationId::from_str(&id.to_string()).unwrap();
    assert_eq!(id, from_str);
}

#[test]
fn operation_id_parse_invalid() {
    assert!(OperationId::parse("not-a-uuid").is_err());
}

#[test]
fn operation_id_from_uuid_roundtrip() {
    let uuid = uuid::Uuid::now_v7();
    assert_eq!(OperationId::from_uuid(uuid).as_uuid(), uuid);
}
