//! Authority-assigned commit timestamps.
//!
//! Clients never put their own clock into a committed `modifiedAt`. Every
//! write carries `CommitTimestamp::Authority`, a sentinel the authoritative
//! store replaces with its own time at commit. The resolved value comes back
//! through the snapshot stream.

use crate::{ObjectUpdate, SyncableObject};
use serde::{Deserialize, Serialize};

/// A modification time as sent to the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitTimestamp {
    /// Resolve to the authority's clock at commit time.
    Authority,
    /// Already resolved (milliseconds since the Unix epoch).
    At(i64),
}

impl CommitTimestamp {
    /// Resolves the timestamp, using `authority_now` for the sentinel.
    #[must_use]
    pub fn resolve(self, authority_now: i64) -> i64 {
        match self {
            Self::Authority => authority_now,
            Self::At(ms) => ms,
        }
    }

    /// Returns true for the unresolved sentinel.
    #[must_use]
    pub fn is_authority(&self) -> bool {
        matches!(self, Self::Authority)
    }
}

/// A full object write. `object.modified_at` is ignored by the authority in
/// favour of `modified_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampedObject {
    pub object: SyncableObject,
    pub modified_at: CommitTimestamp,
}

impl StampedObject {
    #[must_use]
    pub fn new(object: SyncableObject, modified_at: CommitTimestamp) -> Self {
        Self { object, modified_at }
    }

    /// Produces the committed object.
    #[must_use]
    pub fn commit(self, authority_now: i64) -> SyncableObject {
        let mut object = self.object;
        object.modified_at = self.modified_at.resolve(authority_now);
        object
    }
}

/// A partial write. Any `modified_at` inside the mask is superseded by the
/// stamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StampedUpdate {
    pub update: ObjectUpdate,
    pub modified_at: CommitTimestamp,
}

impl StampedUpdate {
    #[must_use]
    pub fn new(update: ObjectUpdate, modified_at: CommitTimestamp) -> Self {
        Self { update, modified_at }
    }

    /// Applies the mask to `target` and stamps the result.
    pub fn commit_onto(&self, target: &mut SyncableObject, authority_now: i64) {
        self.update.apply_to(target);
        target.modified_at = self.modified_at.resolve(authority_now);
    }
}
