//! Field-mask partial updates.
//!
//! An `ObjectUpdate` records exactly which fields a caller touched. A field
//! that is not in the mask is left alone, which is different from setting it
//! to a default. Immutable provenance (`id`, `type`, `createdBy`,
//! `createdAt`) has no `ObjectField` and cannot be expressed.

use crate::{Error, SyncableObject};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A mutable field of `SyncableObject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectField {
    X,
    Y,
    Width,
    Height,
    ZIndex,
    ModifiedBy,
    ModifiedAt,
    Data,
}

impl ObjectField {
    /// Every mutable field, in wire order.
    pub const ALL: [ObjectField; 8] = [
        Self::X,
        Self::Y,
        Self::Width,
        Self::Height,
        Self::ZIndex,
        Self::ModifiedBy,
        Self::ModifiedAt,
        Self::Data,
    ];

    /// The camelCase wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Width => "width",
            Self::Height => "height",
            Self::ZIndex => "zIndex",
            Self::ModifiedBy => "modifiedBy",
            Self::ModifiedAt => "modifiedAt",
            Self::Data => "data",
        }
    }

    /// Looks a field up by wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl fmt::Display for ObjectField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A new value for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    X(f64),
    Y(f64),
    Width(f64),
    Height(f64),
    ZIndex(i64),
    ModifiedBy(String),
    ModifiedAt(i64),
    /// `None` clears the payload.
    Data(Option<Map<String, Value>>),
}

impl FieldChange {
    /// The field this change targets.
    #[must_use]
    pub const fn field(&self) -> ObjectField {
        match self {
            Self::X(_) => ObjectField::X,
            Self::Y(_) => ObjectField::Y,
            Self::Width(_) => ObjectField::Width,
            Self::Height(_) => ObjectField::Height,
            Self::ZIndex(_) => ObjectField::ZIndex,
            Self::ModifiedBy(_) => ObjectField::ModifiedBy,
            Self::ModifiedAt(_) => ObjectField::ModifiedAt,
            Self::Data(_) => ObjectField::Data,
        }
    }

    fn apply_to(&self, object: &mut SyncableObject) {
        match self {
            Self::X(v) => object.x = *v,
            Self::Y(v) => object.y = *v,
            Self::Width(v) => object.width = *v,
            Self::Height(v) => object.height = *v,
            Self::ZIndex(v) => object.z_index = *v,
            Self::ModifiedBy(v) => object.modified_by.clone_from(v),
            Self::ModifiedAt(v) => object.modified_at = *v,
            Self::Data(v) => object.data.clone_from(v),
        }
    }

    /// Whether `object` currently holds this value.
    #[must_use]
    pub fn is_held_by(&self, object: &SyncableObject) -> bool {
        match self {
            Self::X(v) => object.x == *v,
            Self::Y(v) => object.y == *v,
            Self::Width(v) => object.width == *v,
            Self::Height(v) => object.height == *v,
            Self::ZIndex(v) => object.z_index == *v,
            Self::ModifiedBy(v) => &object.modified_by == v,
            Self::ModifiedAt(v) => object.modified_at == *v,
            Self::Data(v) => &object.data == v,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::X(v) | Self::Y(v) | Self::Width(v) | Self::Height(v) => {
                Number::from_f64(*v).map_or(Value::Null, Value::Number)
            }
            Self::ZIndex(v) | Self::ModifiedAt(v) => Value::from(*v),
            Self::ModifiedBy(v) => Value::String(v.clone()),
            Self::Data(Some(map)) => Value::Object(map.clone()),
            Self::Data(None) => Value::Null,
        }
    }

    fn from_value(field: ObjectField, value: Value) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::InvalidValue {
            field: field.as_str().to_string(),
            reason: reason.to_string(),
        };
        let number = |v: &Value| v.as_f64().ok_or_else(|| invalid("expected a number"));
        let integer = |v: &Value| v.as_i64().ok_or_else(|| invalid("expected an integer"));

        Ok(match field {
            ObjectField::X => Self::X(number(&value)?),
            ObjectField::Y => Self::Y(number(&value)?),
            ObjectField::Width => Self::Width(number(&value)?),
            ObjectField::Height => Self::Height(number(&value)?),
            ObjectField::ZIndex => Self::ZIndex(integer(&value)?),
            ObjectField::ModifiedAt => Self::ModifiedAt(integer(&value)?),
            ObjectField::ModifiedBy => match value {
                Value::String(s) => Self::ModifiedBy(s),
                _ => return Err(invalid("expected a string")),
            },
            ObjectField::Data => match value {
                Value::Null => Self::Data(None),
                Value::Object(map) => Self::Data(Some(map)),
                _ => return Err(invalid("expected an object or null")),
            },
        })
    }
}

/// A set of field changes. Each field appears at most once; setting a field
/// twice keeps the last value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct ObjectUpdate {
    changes: BTreeMap<ObjectField, FieldChange>,
}

impl ObjectUpdate {
    /// Creates an empty mask.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a change.
    pub fn set(&mut self, change: FieldChange) -> &mut Self {
        self.changes.insert(change.field(), change);
        self
    }

    /// Adds a change, builder style.
    #[must_use]
    pub fn with(mut self, change: FieldChange) -> Self {
        self.set(change);
        self
    }

    #[must_use]
    pub fn x(self, x: f64) -> Self {
        self.with(FieldChange::X(x))
    }

    #[must_use]
    pub fn y(self, y: f64) -> Self {
        self.with(FieldChange::Y(y))
    }

    /// Sets both coordinates.
    #[must_use]
    pub fn position(self, x: f64, y: f64) -> Self {
        self.x(x).y(y)
    }

    #[must_use]
    pub fn width(self, width: f64) -> Self {
        self.with(FieldChange::Width(width))
    }

    #[must_use]
    pub fn height(self, height: f64) -> Self {
        self.with(FieldChange::Height(height))
    }

    #[must_use]
    pub fn z_index(self, z_index: i64) -> Self {
        self.with(FieldChange::ZIndex(z_index))
    }

    #[must_use]
    pub fn modified_by(self, user: impl Into<String>) -> Self {
        self.with(FieldChange::ModifiedBy(user.into()))
    }

    #[must_use]
    pub fn modified_at(self, millis: i64) -> Self {
        self.with(FieldChange::ModifiedAt(millis))
    }

    /// Replaces the payload.
    #[must_use]
    pub fn data(self, data: Map<String, Value>) -> Self {
        self.with(FieldChange::Data(Some(data)))
    }

    /// Removes the payload entirely.
    #[must_use]
    pub fn clear_data(self) -> Self {
        self.with(FieldChange::Data(None))
    }

    /// Drops a field from the mask. Returns the change that was present.
    pub fn remove(&mut self, field: ObjectField) -> Option<FieldChange> {
        self.changes.remove(&field)
    }

    /// Returns the change for `field`, if the mask touches it.
    #[must_use]
    pub fn get(&self, field: ObjectField) -> Option<&FieldChange> {
        self.changes.get(&field)
    }

    /// Whether the mask touches `field`.
    #[must_use]
    pub fn contains(&self, field: ObjectField) -> bool {
        self.changes.contains_key(&field)
    }

    /// The touched fields, in wire order.
    pub fn fields(&self) -> impl Iterator<Item = ObjectField> + '_ {
        self.changes.keys().copied()
    }

    /// The changes, in wire order.
    pub fn changes(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Writes the touched fields into `object`; everything else is untouched.
    pub fn apply_to(&self, object: &mut SyncableObject) {
        for change in self.changes.values() {
            change.apply_to(object);
        }
    }

    /// The part of this mask whose values `object` still holds.
    #[must_use]
    pub fn held_by(&self, object: &SyncableObject) -> Self {
        Self {
            changes: self
                .changes
                .iter()
                .filter(|(_, change)| change.is_held_by(object))
                .map(|(field, change)| (*field, change.clone()))
                .collect(),
        }
    }

    /// Returns a copy of `object` with the mask applied.
    #[must_use]
    pub fn applied(&self, object: &SyncableObject) -> SyncableObject {
        let mut next = object.clone();
        self.apply_to(&mut next);
        next
    }

    /// The JSON patch document: only touched fields, camelCase keys.
    #[must_use]
    pub fn to_patch(&self) -> Map<String, Value> {
        self.changes
            .values()
            .map(|c| (c.field().as_str().to_string(), c.to_value()))
            .collect()
    }

    /// Parses a JSON patch document.
    ///
    /// Immutable provenance keys and unknown keys are rejected rather than
    /// silently ignored.
    pub fn from_patch(patch: Map<String, Value>) -> Result<Self, Error> {
        let mut update = Self::new();
        for (key, value) in patch {
            let Some(field) = ObjectField::from_name(&key) else {
                return Err(match key.as_str() {
                    "id" | "type" | "createdBy" | "createdAt" => Error::ImmutableField(key),
                    _ => Error::UnknownField(key),
                });
            };
            update.set(FieldChange::from_value(field, value)?);
        }
        Ok(update)
    }
}

impl From<ObjectUpdate> for Map<String, Value> {
    fn from(update: ObjectUpdate) -> Self {
        update.to_patch()
    }
}

impl TryFrom<Map<String, Value>> for ObjectUpdate {
    type Error = Error;

    fn try_from(patch: Map<String, Value>) -> Result<Self, Self::Error> {
        Self::from_patch(patch)
    }
}

impl FromIterator<FieldChange> for ObjectUpdate {
    fn from_iter<I: IntoIterator<Item = FieldChange>>(iter: I) -> Self {
        let mut update = Self::new();
        for change in iter {
            update.set(change);
        }
        update
    }
}
