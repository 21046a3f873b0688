//! Scripted sync sessions against the in-memory store.
//!
//! A scenario creates a batch of objects, moves them, deletes a third of
//! them and edits one while the store is offline, injecting a commit failure
//! every `fail_every` mutations. The report compares the engine's mirror with
//! the authoritative store at the end.

use anyhow::{ensure, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};
use slate_sync::{
    MemoryRemote, RemoteStats, RetryReport, RollbackPolicy, SyncConfig, SyncEngine, SyncResult,
    SyncStatus,
};
use slate_types::{BoardId, ObjectId, ObjectUpdate, SyncableObject};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Settings for one scripted session.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub board: BoardId,
    /// Objects created at the start.
    pub objects: usize,
    /// Inject a commit failure every n-th mutation (0: never).
    pub fail_every: usize,
    pub retry_base_ms: u64,
    pub rollback_policy: RollbackPolicy,
    pub author: String,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            board: BoardId::from("sandbox"),
            objects: 12,
            fail_every: 5,
            retry_base_ms: 50,
            rollback_policy: RollbackPolicy::Immediate,
            author: "sim".to_string(),
        }
    }
}

impl Scenario {
    fn config(&self) -> SyncConfig {
        SyncConfig {
            retry_base_delay_ms: self.retry_base_ms,
            rollback_policy: self.rollback_policy,
            ..Default::default()
        }
    }
}

/// Mutation outcomes, by kind of result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub attempted: usize,
    pub committed: usize,
    pub rolled_back: usize,
    /// Failed but kept optimistic for a retry.
    pub kept: usize,
}

impl Tally {
    fn record(&mut self, result: &SyncResult) {
        self.attempted += 1;
        if result.success {
            self.committed += 1;
        } else if result.is_rolled_back() {
            self.rolled_back += 1;
        } else {
            self.kept += 1;
        }
    }
}

/// What a scenario did and where it ended up.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub board: BoardId,
    pub creates: Tally,
    pub updates: Tally,
    pub deletes: Tally,
    pub retry_passes: Vec<RetryReport>,
    pub abandoned: usize,
    pub broadcasts: usize,
    pub status: SyncStatus,
    pub mirror_size: usize,
    pub remote_size: usize,
    /// Mirror and store hold the same objects.
    pub converged: bool,
    pub remote_stats: RemoteStats,
}

/// Decides which mutations get a failure injected.
struct Injector<'a> {
    remote: &'a MemoryRemote,
    every: usize,
    count: usize,
}

impl Injector<'_> {
    fn next(&mut self) {
        self.count += 1;
        if self.every > 0 && self.count % self.every == 0 {
            debug!("Injecting failure into mutation {}", self.count);
            self.remote.fail_next(1);
        }
    }
}

fn note(id: &str, index: usize, author: &str) -> SyncableObject {
    let mut data = Map::new();
    data.insert("text".to_string(), Value::String(format!("note {index}")));
    data.insert("color".to_string(), json!("yellow"));
    let column = (index % 4) as f64;
    let row = (index / 4) as f64;
    SyncableObject::new(id, "sticky-note", author)
        .at(column * 120.0, row * 120.0)
        .sized(100.0, 80.0)
        .with_z_index(index as i64)
        .with_data(data)
}

/// Runs a scenario to completion.
pub async fn run_scenario(scenario: &Scenario) -> Result<ScenarioReport> {
    ensure!(scenario.objects > 0, "scenario needs at least one object");

    let remote = MemoryRemote::new();
    let engine = SyncEngine::new(Arc::new(remote.clone()), scenario.config());
    let board = &scenario.board;
    info!("Running scenario on board {} with {} objects", board, scenario.objects);

    let broadcasts = Arc::new(AtomicUsize::new(0));
    let abandoned = Arc::new(AtomicUsize::new(0));
    let seen = broadcasts.clone();
    let objects_sub = engine.subscribe_to_objects(board, move |_| {
        seen.fetch_add(1, Ordering::Relaxed);
    });
    let dropped = abandoned.clone();
    let failures_sub = engine.subscribe_to_failures(move |failure| {
        debug!("Abandoned {}: {}", failure.operation.object_id, failure.error);
        dropped.fetch_add(1, Ordering::Relaxed);
    });

    let mut inject = Injector {
        remote: &remote,
        every: scenario.fail_every,
        count: 0,
    };

    let mut creates = Tally::default();
    for index in 0..scenario.objects {
        inject.next();
        let id = format!("note-{index}");
        creates.record(&engine.create_object(board, note(&id, index, &scenario.author)).await);
    }

    let mut updates = Tally::default();
    let mut ids: Vec<ObjectId> = engine.local_objects(board).into_iter().map(|o| o.id).collect();
    ids.sort();
    for id in &ids {
        inject.next();
        let Some(current) = engine.local_object(board, id) else {
            continue;
        };
        let update = ObjectUpdate::new()
            .x(current.x + 10.0)
            .modified_by(scenario.author.as_str());
        updates.record(&engine.update_object(board, id, update).await);
    }

    let mut deletes = Tally::default();
    for id in ids.iter().step_by(3) {
        inject.next();
        deletes.record(&engine.delete_object(board, id).await);
    }

    // Edit while offline, then come back.
    remote.set_connected(false);
    if let Some(id) = ids.iter().find(|id| engine.local_object(board, id).is_some()) {
        updates.record(&engine.update_object(board, id, ObjectUpdate::new().y(-40.0)).await);
    }
    remote.set_connected(true);

    let retry_passes = drain_queue(&engine, scenario).await;

    let mirror = engine.get_all_objects(board).await;
    let mut authoritative = remote.objects(board);
    let mut local = mirror.clone();
    local.sort_by(|a, b| a.id.cmp(&b.id));
    authoritative.sort_by(|a, b| a.id.cmp(&b.id));

    objects_sub.unsubscribe();
    failures_sub.unsubscribe();
    engine.shutdown();

    let report = ScenarioReport {
        board: board.clone(),
        creates,
        updates,
        deletes,
        retry_passes,
        abandoned: abandoned.load(Ordering::Relaxed),
        broadcasts: broadcasts.load(Ordering::Relaxed),
        status: engine.get_sync_status(),
        mirror_size: mirror.len(),
        remote_size: authoritative.len(),
        converged: local == authoritative,
        remote_stats: remote.stats(),
    };
    info!(
        "Scenario finished: {} objects locally, {} remotely, converged = {}",
        report.mirror_size, report.remote_size, report.converged
    );
    Ok(report)
}

/// Runs retry passes until the queue is empty or the ceiling is passed.
async fn drain_queue(engine: &SyncEngine, scenario: &Scenario) -> Vec<RetryReport> {
    let limit = engine.config().max_retries as usize + 2;
    let wait = Duration::from_millis(scenario.retry_base_ms.clamp(5, 250));
    let mut passes = Vec::new();
    let mut waits = 0;
    while engine.get_sync_status().pending_count > 0 && passes.len() < limit {
        let report = engine.retry_pending_operations().await;
        if report.skipped {
            // A reconnect already started a pass.
            waits += 1;
            if waits > 400 {
                break;
            }
            tokio::time::sleep(wait).await;
            continue;
        }
        passes.push(report);
    }
    passes
}
