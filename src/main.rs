//! CLI entry point for the bus position grabber.
//!
//! Polls the open-data endpoint for every bus position in the city, indexes
//! each response by line and by vehicle, and hands the snapshots downstream.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use riobus_grabber::{
    config::FileConfig,
    fetch::{BasicClient, HttpTransport},
    output::{ChannelSink, JsonLinesSink, assemble_snapshot},
    parser::parse_snapshot,
    poller::Poller,
    stats::SnapshotStats,
    types::Snapshot,
};
use std::ffi::OsStr;
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "riobus_grabber")]
#[command(about = "Polls bus GPS positions and indexes them by line and vehicle", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll forever, writing each snapshot to stdout as one JSON line
    Run {
        /// JSON config file, re-read before every request
        #[arg(short, long, env = "RIOBUS_CONFIG", default_value = "riobus-config.json")]
        config: String,
    },
    /// Run a single cycle and log a summary of the snapshot
    Once {
        /// JSON config file
        #[arg(short, long, env = "RIOBUS_CONFIG", default_value = "riobus-config.json")]
        config: String,
    },
    /// Decode a saved response body and log a summary
    Inspect {
        /// Path to a response body saved from the endpoint
        #[arg(value_name = "FILE")]
        file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/riobus_grabber.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("riobus_grabber.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run(&config).await?,
        Commands::Once { config } => once(&config).await?,
        Commands::Inspect { file } => {
            let bytes = std::fs::read(&file).with_context(|| format!("failed to read '{file}'"))?;
            let parsed = parse_snapshot(&bytes)?;
            log_summary(&assemble_snapshot(parsed));
        }
    }

    Ok(())
}

/// Polls until Ctrl+C, one JSON line per successful cycle on stdout.
#[tracing::instrument]
async fn run(config_path: &str) -> Result<()> {
    let transport = HttpTransport::new(BasicClient::new()?);
    let sink = JsonLinesSink::new(std::io::stdout());
    let poller = Poller::new(transport, FileConfig::new(config_path), sink)?;

    poller
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Could not listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}

/// Runs exactly one cycle. Fails unless that cycle produced a snapshot.
#[tracing::instrument]
async fn once(config_path: &str) -> Result<()> {
    let transport = HttpTransport::new(BasicClient::new()?);
    let (tx, mut rx) = mpsc::channel(1);
    let mut poller = Poller::new(transport, FileConfig::new(config_path), ChannelSink::new(tx))?;

    let report = poller.cycle().await;
    match rx.try_recv() {
        Ok(snapshot) => {
            log_summary(&snapshot);
            Ok(())
        }
        Err(_) => bail!("cycle finished with status '{}'", report.status),
    }
}

fn log_summary(snapshot: &Snapshot) {
    let stats = SnapshotStats::from_snapshot(snapshot);
    info!(
        rows = stats.total_rows,
        rejected = stats.rejected_rows,
        lines = stats.lines,
        vehicles = stats.vehicles,
        without_line = stats.without_line,
        without_line_pct = stats.without_line_pct(),
        busiest_line = stats.busiest_line.as_deref().unwrap_or("-"),
        busiest_line_rows = stats.busiest_line_rows,
        last_update = %snapshot.last_update,
        "Snapshot summary"
    );
}
