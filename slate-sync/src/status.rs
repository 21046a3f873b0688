//! Sync status tracking.
//!
//! Folds three inputs (remote connectivity, queue length, time of the last
//! confirmed write or applied snapshot) into one `SyncStatus`. Every setter
//! returns the new status only when it actually changed, so the engine
//! broadcasts exactly once per change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observable sync state of an engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Whether the remote channel reports a live connection.
    pub is_connected: bool,
    /// Operations applied locally but not yet confirmed.
    pub pending_count: usize,
    /// Most recent confirmed write or applied snapshot.
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl SyncStatus {
    /// True when connected with nothing in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.is_connected && self.pending_count == 0
    }
}

#[derive(Debug, Default)]
pub struct StatusTracker {
    current: SyncStatus,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SyncStatus {
        self.current.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.current.is_connected
    }

    pub fn set_connected(&mut self, connected: bool) -> Option<SyncStatus> {
        if self.current.is_connected == connected {
            return None;
        }
        self.current.is_connected = connected;
        Some(self.status())
    }

    pub fn set_pending(&mut self, pending_count: usize) -> Option<SyncStatus> {
        if self.current.pending_count == pending_count {
            return None;
        }
        self.current.pending_count = pending_count;
        Some(self.status())
    }

    /// Records a confirmed write or applied snapshot. The timestamp never
    /// moves backwards.
    pub fn mark_synced(&mut self, at: DateTime<Utc>) -> Option<SyncStatus> {
        match self.current.last_sync_at {
            Some(last) if last >= at => None,
            _ => {
                self.current.last_sync_at = Some(at);
                Some(self.status())
            }
        }
    }
}
