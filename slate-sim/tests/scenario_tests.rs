use pretty_assertions::assert_eq;
use slate_sim::{run_scenario, Scenario, Tally};
use slate_sync::RollbackPolicy;

fn scenario(objects: usize, fail_every: usize) -> Scenario {
    Scenario {
        objects,
        fail_every,
        retry_base_ms: 1,
        ..Scenario::default()
    }
}

// ── Clean Runs ──────────────────────────────────────────────────

#[tokio::test]
async fn clean_run_commits_everything_but_the_offline_edit() {
    let report = run_scenario(&scenario(6, 0)).await.unwrap();

    assert_eq!(
        report.creates,
        Tally { attempted: 6, committed: 6, rolled_back: 0, kept: 0 }
    );
    // Six moves plus the edit made while offline.
    assert_eq!(
        report.updates,
        Tally { attempted: 7, committed: 6, rolled_back: 1, kept: 0 }
    );
    assert_eq!(
        report.deletes,
        Tally { attempted: 2, committed: 2, rolled_back: 0, kept: 0 }
    );
    assert!(report.retry_passes.is_empty());
    assert_eq!(report.abandoned, 0);
    assert_eq!(report.mirror_size, 4);
    assert_eq!(report.remote_size, 4);
    assert!(report.converged);
    assert_eq!(report.status.pending_count, 0);
    assert!(report.status.is_connected);
}

// ── Injected Failures ───────────────────────────────────────────

#[tokio::test]
async fn immediate_rollback_reverts_injected_failures() {
    let report = run_scenario(&scenario(8, 4)).await.unwrap();

    // Creates 4 and 8 fail.
    assert_eq!(
        report.creates,
        Tally { attempted: 8, committed: 6, rolled_back: 2, kept: 0 }
    );
    // Mutation 12 is the fourth move.
    assert_eq!(
        report.updates,
        Tally { attempted: 7, committed: 5, rolled_back: 2, kept: 0 }
    );
    // Mutation 16 is the second delete; the object comes back.
    assert_eq!(
        report.deletes,
        Tally { attempted: 2, committed: 1, rolled_back: 1, kept: 0 }
    );
    assert_eq!(report.mirror_size, 5);
    assert_eq!(report.remote_size, 5);
    assert!(report.converged);
    // Four injected failures and the offline edit.
    assert_eq!(report.remote_stats.rejected, 5);
}

#[tokio::test]
async fn deferred_rollback_retries_until_converged() {
    let mut run = scenario(3, 3);
    run.rollback_policy = RollbackPolicy::AfterRetriesExhausted;

    let report = run_scenario(&run).await.unwrap();

    assert_eq!(
        report.creates,
        Tally { attempted: 3, committed: 2, rolled_back: 0, kept: 1 }
    );
    assert_eq!(report.abandoned, 0);
    assert_eq!(report.status.pending_count, 0);
    assert!(report.converged);
    assert_eq!(report.mirror_size, report.remote_size);
}

// ── Validation ──────────────────────────────────────────────────

#[tokio::test]
async fn empty_scenario_is_rejected() {
    let err = run_scenario(&scenario(0, 0)).await.unwrap_err();
    assert!(err.to_string().contains("at least one object"));
}

#[tokio::test]
async fn report_serializes_as_camel_case_json() {
    let report = run_scenario(&scenario(2, 0)).await.unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["board"], "sandbox");
    assert_eq!(json["mirrorSize"], 1);
    assert_eq!(json["creates"]["committed"], 2);
    assert!(json["remoteStats"].is_object());
}
