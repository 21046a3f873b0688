//! The shared mutable board entity.

use crate::ObjectId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch according to the local clock.
///
/// Only used for provisional values; committed modification times come from
/// the authority.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// An object on a board (shape, sticky note, connector, ...).
///
/// Geometry and provenance are first-class; anything type-specific lives in
/// the opaque `data` map and is never interpreted by the sync layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncableObject {
    /// Stable id, unique within the board.
    pub id: ObjectId,
    /// Open type tag (e.g. "sticky-note", "rectangle").
    #[serde(rename = "type")]
    pub object_type: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub z_index: i64,
    /// Immutable provenance.
    pub created_by: String,
    pub created_at: i64,
    /// Mutable provenance. `modified_at` orders conflicting writes.
    pub modified_by: String,
    pub modified_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl SyncableObject {
    /// Creates an object at the origin with zero size, created and modified
    /// by `author` at the current local time.
    #[must_use]
    pub fn new(
        id: impl Into<ObjectId>,
        object_type: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        let author = author.into();
        let now = now_millis();
        Self {
            id: id.into(),
            object_type: object_type.into(),
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            z_index: 0,
            created_by: author.clone(),
            created_at: now,
            modified_by: author,
            modified_at: now,
            data: None,
        }
    }

    /// Sets the position.
    #[must_use]
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Sets the size.
    #[must_use]
    pub fn sized(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Sets the stacking order.
    #[must_use]
    pub fn with_z_index(mut self, z_index: i64) -> Self {
        self.z_index = z_index;
        self
    }

    /// Sets both provenance timestamps (for replay and tests).
    #[must_use]
    pub fn with_timestamps(mut self, created_at: i64, modified_at: i64) -> Self {
        self.created_at = created_at;
        self.modified_at = modified_at;
        self
    }

    /// Attaches a type-specific payload.
    #[must_use]
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    /// Reads a string from the payload using a JSON pointer (e.g. "/text").
    pub fn get_str(&self, pointer: &str) -> Option<&str> {
        self.data_pointer(pointer).and_then(Value::as_str)
    }

    /// Reads a number from the payload using a JSON pointer.
    pub fn get_number(&self, pointer: &str) -> Option<f64> {
        self.data_pointer(pointer).and_then(Value::as_f64)
    }

    fn data_pointer(&self, pointer: &str) -> Option<&Value> {
        let path = pointer.strip_prefix('/')?;
        let head = path.split('/').next().unwrap_or(path);
        let key = head.replace("~1", "/").replace("~0", "~");
        let value = self.data.as_ref()?.get(&key)?;
        // `Value::pointer` resolves the rest, escapes included.
        match &path[head.len()..] {
            "" => Some(value),
            tail => value.pointer(tail),
        }
    }
}
