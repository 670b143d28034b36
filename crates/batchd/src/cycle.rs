//! Cycle driving for the daemon: load inputs, run, report.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use batchgrid_core::SchedulerConfig;
use batchgrid_scheduler::{CycleOutcome, PluginRegistry, Scheduler};
use batchgrid_state::ClusterSnapshot;

/// Load `path`, or fall back to the built-in configuration.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<SchedulerConfig> {
    match path {
        Some(path) => SchedulerConfig::from_file(path)
            .with_context(|| format!("loading scheduler config {}", path.display())),
        None => {
            debug!("no config given, using built-in plugin tiers");
            Ok(SchedulerConfig::default())
        }
    }
}

pub fn build_scheduler(config: &SchedulerConfig) -> anyhow::Result<Scheduler> {
    let scheduler = Scheduler::new(config, &PluginRegistry::builtin())?;
    Ok(scheduler)
}

/// Read the snapshot at `path` and run one cycle over it.
pub fn run_once(scheduler: &Scheduler, path: &Path) -> anyhow::Result<CycleOutcome> {
    let snapshot = ClusterSnapshot::from_file(path)
        .with_context(|| format!("loading snapshot {}", path.display()))?;
    let outcome = scheduler.run_cycle(snapshot);
    info!(
        evicted = outcome.evicted().count(),
        pipelined = outcome.pipelined().count(),
        "cycle complete"
    );
    Ok(outcome)
}

/// Re-read `snapshot` and run a cycle every `interval` until `shutdown`
/// flips. A cycle that fails to load its input is skipped.
pub async fn run_loop(
    scheduler: Scheduler,
    snapshot: PathBuf,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    info!(
        interval_secs = interval.as_secs(),
        snapshot = %snapshot.display(),
        "scheduling loop started"
    );

    let mut ticker = tokio::time::interval(interval);
    let mut cycles = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_once(&scheduler, &snapshot) {
                    Ok(_) => cycles += 1,
                    Err(e) => warn!(error = %e, "scheduling cycle skipped"),
                }
            }
            _ = shutdown.changed() => {
                info!(cycles, "scheduling loop shutting down");
                break;
            }
        }
    }
    cycles
}
