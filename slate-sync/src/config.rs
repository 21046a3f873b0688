//! Engine configuration.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with the optimistic state when a remote commit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Roll back on the first failure and drop the operation.
    #[default]
    Immediate,
    /// Keep the optimistic state and the queued operation; roll back only
    /// once the operation is abandoned by a retry pass.
    AfterRetriesExhausted,
}

/// Configuration for the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Retry passes an operation survives before it is abandoned.
    pub max_retries: u32,
    /// Base of the exponential backoff between retries (ms).
    pub retry_base_delay_ms: u64,
    /// Timeout for a single remote call (ms).
    pub remote_timeout_ms: u64,
    /// Failure handling for optimistic state.
    pub rollback_policy: RollbackPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            remote_timeout_ms: 30_000,
            rollback_policy: RollbackPolicy::Immediate,
        }
    }
}

impl SyncConfig {
    /// Parses a JSON config document. Missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Base backoff delay.
    #[must_use]
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Per-call remote timeout.
    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    /// Backoff before retry number `retry_count + 1`: `base × 2^retry_count`.
    #[must_use]
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        let factor = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.retry_base_delay().saturating_mul(factor)
    }
}
