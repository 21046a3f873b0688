//! Local mirror of one board's objects.
//!
//! A plain keyed store: the best-known state of every object, read
//! synchronously by the UI. It performs no validation and knows nothing
//! about pending operations; the engine decides what goes in.

use slate_types::{ObjectId, SyncableObject};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct LocalMirror {
    objects: HashMap<ObjectId, SyncableObject>,
}

impl LocalMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, object_id: &ObjectId) -> Option<&SyncableObject> {
        self.objects.get(object_id)
    }

    pub fn contains(&self, object_id: &ObjectId) -> bool {
        self.objects.contains_key(object_id)
    }

    /// Inserts or replaces an object. Returns the previous value.
    pub fn set(&mut self, object: SyncableObject) -> Option<SyncableObject> {
        self.objects.insert(object.id.clone(), object)
    }

    /// Removes an object. Returns the removed value.
    pub fn delete(&mut self, object_id: &ObjectId) -> Option<SyncableObject> {
        self.objects.remove(object_id)
    }

    /// All objects, in no particular order.
    pub fn all(&self) -> Vec<SyncableObject> {
        self.objects.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        self.objects.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
