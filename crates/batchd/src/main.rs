//! batchd — the BatchGrid scheduling daemon.
//!
//! Runs the configured scheduling actions over a cluster snapshot:
//! - `once`: a single cycle, printing the committed operations as JSON
//! - `run`: a cycle per interval, re-reading the snapshot each time
//!
//! # Usage
//!
//! ```text
//! batchd once --snapshot cluster.json --config batchgrid.toml --metrics
//! batchd run --snapshot cluster.json --interval 10
//! ```

mod cycle;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use batchgrid_metrics::render_prometheus;

const DEFAULT_FILTER: &str = "info,batchd=debug,batchgrid=debug";

#[derive(Parser)]
#[command(name = "batchd", about = "BatchGrid scheduling daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single scheduling cycle and print what it committed.
    Once {
        /// Cluster snapshot (JSON).
        #[arg(long)]
        snapshot: PathBuf,

        /// Scheduler configuration (TOML). Built-in tiers when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Also print preemption metrics in Prometheus text format.
        #[arg(long)]
        metrics: bool,
    },

    /// Run a scheduling cycle every interval until interrupted.
    Run {
        /// Cluster snapshot (JSON), re-read every cycle.
        #[arg(long)]
        snapshot: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Seconds between cycles.
        #[arg(long, default_value = "10", value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Once {
            snapshot,
            config,
            metrics,
        } => {
            let config = cycle::load_config(config.as_deref())?;
            let scheduler = cycle::build_scheduler(&config)?;
            let outcome = cycle::run_once(&scheduler, &snapshot)?;

            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if metrics {
                print!("{}", render_prometheus(&scheduler.metrics().snapshot()));
            }
            Ok(())
        }
        Command::Run {
            snapshot,
            config,
            interval,
        } => run_daemon(snapshot, config, interval).await,
    }
}

async fn run_daemon(snapshot: PathBuf, config: Option<PathBuf>, interval: u64) -> anyhow::Result<()> {
    info!("BatchGrid daemon starting");

    let config = cycle::load_config(config.as_deref())?;
    let scheduler = cycle::build_scheduler(&config)?;

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // ── Scheduling loop ────────────────────────────────────────

    let handle = tokio::spawn(cycle::run_loop(
        scheduler,
        snapshot,
        Duration::from_secs(interval),
        shutdown_rx,
    ));
    let cycles = handle.await?;

    info!(cycles, "BatchGrid daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_once_with_metrics() {
        let cli = Cli::try_parse_from([
            "batchd",
            "once",
            "--snapshot",
            "cluster.json",
            "--metrics",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Text);
        match cli.command {
            Command::Once {
                snapshot,
                config,
                metrics,
            } => {
                assert_eq!(snapshot, PathBuf::from("cluster.json"));
                assert!(config.is_none());
                assert!(metrics);
            }
            Command::Run { .. } => panic!("expected once"),
        }
    }

    #[test]
    fn log_format_is_global() {
        let cli = Cli::try_parse_from([
            "batchd",
            "run",
            "--snapshot",
            "cluster.json",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Command::Run { interval: 10, .. }));
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(
            Cli::try_parse_from(["batchd", "run", "--snapshot", "s.json", "--interval", "0"]).is_err()
        );
    }
}
