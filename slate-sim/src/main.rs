//! Slate sync sandbox
//!
//! Drives a sync engine through a scripted editing session against the
//! in-memory store and prints a JSON report.
//!
//! Usage:
//!   slate-sim --objects 20 --fail-every 4 --deferred-rollback

use anyhow::{Context, Result};
use clap::Parser;
use slate_sim::{run_scenario, Scenario};
use slate_sync::RollbackPolicy;
use slate_types::BoardId;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "slate-sim")]
#[command(about = "Scripted Slate sync session against an in-memory store")]
struct Args {
    /// Board to edit
    #[arg(short, long, default_value = "sandbox")]
    board: String,

    /// Number of objects to create
    #[arg(short, long, default_value = "12")]
    objects: usize,

    /// Inject a commit failure every n-th mutation (0 disables)
    #[arg(long, default_value = "5")]
    fail_every: usize,

    /// Base retry backoff in milliseconds
    #[arg(long, default_value = "50")]
    retry_base_ms: u64,

    /// Keep failed changes until retries are exhausted
    #[arg(long)]
    deferred_rollback: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let scenario = Scenario {
        board: BoardId::new(args.board),
        objects: args.objects,
        fail_every: args.fail_every,
        retry_base_ms: args.retry_base_ms,
        rollback_policy: if args.deferred_rollback {
            RollbackPolicy::AfterRetriesExhausted
        } else {
            RollbackPolicy::Immediate
        },
        ..Scenario::default()
    };
    info!("Slate sim starting...");

    let report = run_scenario(&scenario).await?;
    let json = serde_json::to_string_pretty(&report).context("failed to encode report")?;
    println!("{json}");
    Ok(())
}
