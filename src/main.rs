use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use proposal_monitor::config::Config;
use proposal_monitor::datasets::DatasetReader;
use proposal_monitor::fetcher::{FetchOrchestrator, RunOutcome};
use proposal_monitor::notifications::NotificationService;
use proposal_monitor::refresh::CommandRefresher;
use proposal_monitor::scheduling::{ExecutionGuard, SchedulerService};
use proposal_monitor::store::{LastCheckStore, ScheduleStore};

#[derive(Parser)]
#[command(
    name = "proposal-monitor",
    about = "Scheduled blockchain governance proposal monitor",
    version
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the data directory from the configuration
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log filter (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Run one fetch immediately and exit
    #[arg(long)]
    check_now: bool,

    /// Print the next admissible run times for a schedule id and exit
    #[arg(long, value_name = "SCHEDULE_ID")]
    preview: Option<String>,
}

fn init_tracing(cli_level: Option<&str>) {
    let filter = cli_level
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let mut config = Config::load_from_file(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data directory {}", config.data_dir.display()))?;

    let schedules = ScheduleStore::new(config.data_dir.join("schedules.json"));
    let last_check = LastCheckStore::new(config.data_dir.join("last_check.json"));
    let datasets = DatasetReader::new(&config.data_dir);
    let refresher = Arc::new(CommandRefresher::new(&config.refresh));
    let notifier = Arc::new(NotificationService::from_config(&config.notifications));
    let guard = ExecutionGuard::new();

    let orchestrator = Arc::new(FetchOrchestrator::new(
        schedules.clone(),
        last_check,
        datasets,
        refresher,
        notifier,
        guard,
        config.protocols.clone(),
    ));

    let service = SchedulerService::new(schedules, Arc::clone(&orchestrator), &config)
        .context("binding schedules")?;

    if let Some(schedule_id) = &cli.preview {
        let times = service.preview(schedule_id, 5)?;
        if times.is_empty() {
            println!("No upcoming runs for schedule '{schedule_id}'");
        } else {
            println!("Next runs for schedule '{schedule_id}':");
            for time in times {
                println!("  {time}");
            }
        }
        return Ok(());
    }

    if cli.check_now {
        match service.run_manual().await? {
            RunOutcome::Completed { delta } => {
                info!("Manual check complete, {} new proposal(s)", delta.total());
            }
            RunOutcome::Skipped(reason) => {
                error!("Manual check skipped: {reason:?}");
            }
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    service.run(cancel).await;
    info!("Shutdown complete");
    Ok(())
}
