use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use clap::Parser;
use panel_reaper::{
    config::PanelConfig,
    db::DbPool,
    jobs::{AutoDeleteJob, JobScheduler, RunStatus},
    observability, services,
};

/// Default config file looked up in the working directory.
const DEFAULT_CONFIG_FILE: &str = "panel-reaper.toml";

/// How long shutdown waits for an in-flight run before giving up.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// CLI arguments for panel-reaper
#[derive(Parser, Debug)]
#[command(version, about = "Depleted client reclamation for a proxy panel", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./panel-reaper.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run the daily auto-delete scheduler until SIGINT/SIGTERM (default)
    Serve,
    /// Run a single auto-delete pass and exit
    RunOnce {
        /// Log what would be deleted without deleting anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Run database migrations and exit
    Migrate,
    /// Read or change the auto-delete threshold
    #[command(subcommand)]
    Threshold(ThresholdCommand),
}

#[derive(clap::Subcommand, Debug)]
enum ThresholdCommand {
    /// Print the current threshold in days (0 = disabled)
    Get,
    /// Set the threshold in days (0 disables auto-delete)
    Set {
        #[arg(value_parser = clap::value_parser!(i64).range(0..))]
        days: i64,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config_path = args.config.as_deref();

    match args.command {
        Some(Command::RunOnce { dry_run }) => run_once(config_path, dry_run).await,
        Some(Command::Migrate) => run_migrate(config_path).await,
        Some(Command::Threshold(command)) => run_threshold(config_path, command).await,
        Some(Command::Serve) | None => run_server(config_path).await,
    }
}

fn resolve_config_path(explicit_path: Option<&str>) -> Result<PathBuf, String> {
    if let Some(path) = explicit_path {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(format!("Config file not found: {}", path.display()));
        }
        return Ok(path);
    }

    let cwd_config = PathBuf::from(DEFAULT_CONFIG_FILE);
    if cwd_config.exists() {
        return Ok(cwd_config);
    }

    Err(format!(
        "No config file given and {DEFAULT_CONFIG_FILE} not found in the working directory"
    ))
}

/// Load the config file and initialize tracing. Exits on failure.
fn load_config(explicit_config_path: Option<&str>) -> (PanelConfig, PathBuf) {
    let config_path = match resolve_config_path(explicit_config_path) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let config = match PanelConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "Failed to load config from {}: {}",
                config_path.display(),
                e
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability.logging) {
        eprintln!("Failed to initialize tracing: {}", e);
        std::process::exit(1);
    }

    (config, config_path)
}

/// Connect to the database, running migrations when `migrate` is set. Exits on failure.
async fn connect_database(config: &PanelConfig, migrate: bool) -> DbPool {
    let db = match DbPool::from_config(&config.database).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            eprintln!("Error: Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if migrate && let Err(e) = db.run_migrations().await {
        tracing::error!(error = %e, "Database migrations failed");
        eprintln!("Error: Database migrations failed: {}", e);
        std::process::exit(1);
    }

    db
}

async fn run_server(explicit_config_path: Option<&str>) {
    let (config, config_path) = load_config(explicit_config_path);

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics: {e}");
    }

    tracing::info!(
        config_file = %config_path.display(),
        "Starting panel-reaper"
    );

    let db = connect_database(&config, config.database.run_migrations()).await;
    let regenerator = services::create_regenerator(&config.proxy, &db);
    tracing::info!(
        backend = regenerator.backend_name(),
        "Proxy config regeneration configured"
    );

    let auto_delete = &config.jobs.auto_delete;
    let scheduler = if auto_delete.enabled {
        let job = AutoDeleteJob::from_pool(&db, regenerator, auto_delete);
        let scheduler =
            JobScheduler::new(Arc::new(job)).with_run_on_start(auto_delete.run_on_start);
        if let Err(e) = scheduler.start() {
            tracing::error!(error = %e, "Failed to start auto-delete scheduler");
            eprintln!("Error: Failed to start auto-delete scheduler: {}", e);
            db.close().await;
            std::process::exit(1);
        }
        Some(scheduler)
    } else {
        tracing::info!("Auto-delete job disabled in configuration");
        None
    };

    shutdown_signal().await;

    tracing::info!("Shutdown signal received, waiting for background tasks to complete...");

    if let Some(scheduler) = &scheduler {
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, scheduler.shutdown()).await {
            Ok(()) => tracing::info!("All background tasks completed"),
            Err(_) => {
                tracing::warn!("Timeout waiting for background tasks, some may not have completed")
            }
        }
    }

    db.close().await;
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn run_once(explicit_config_path: Option<&str>, dry_run: bool) {
    let (config, _) = load_config(explicit_config_path);
    let db = connect_database(&config, config.database.run_migrations()).await;

    let regenerator = services::create_regenerator(&config.proxy, &db);
    let auto_delete = &config.jobs.auto_delete;
    let job = AutoDeleteJob::from_pool(&db, regenerator, auto_delete)
        .with_dry_run(dry_run || auto_delete.dry_run);

    let result = job.run(Utc::now()).await;
    db.close().await;

    if result.status == RunStatus::Skipped {
        println!("status=skipped: another auto-delete run holds the lease");
        return;
    }

    println!(
        "status={} threshold_days={} eligible={} removed={} failed={} skipped={}{}",
        result.status.as_str(),
        result.threshold_days,
        result.eligible,
        result.removed,
        result.failed,
        result.skipped,
        if result.dry_run { " (dry run)" } else { "" }
    );
    for failure in &result.failures {
        println!(
            "failed inbound_id={} email={}: {}",
            failure.inbound_id, failure.email, failure.error
        );
    }

    if result.status == RunStatus::Aborted || result.failed > 0 {
        std::process::exit(1);
    }
}

async fn run_migrate(explicit_config_path: Option<&str>) {
    let (config, config_path) = load_config(explicit_config_path);

    tracing::info!(
        config_file = %config_path.display(),
        "Running database migrations"
    );

    let db = connect_database(&config, true).await;
    db.close().await;
    tracing::info!("Database migrations completed successfully");
}

async fn run_threshold(explicit_config_path: Option<&str>, command: ThresholdCommand) {
    let (config, _) = load_config(explicit_config_path);
    let db = connect_database(&config, config.database.run_migrations()).await;
    let settings = db.settings();

    let result = match command {
        ThresholdCommand::Get => settings.get_auto_delete_days().await.map(|days| {
            println!("{days}");
        }),
        ThresholdCommand::Set { days } => settings.set_auto_delete_days(days).await.map(|()| {
            tracing::info!(days, "Auto-delete threshold updated");
            println!("{days}");
        }),
    };
    db.close().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
