use std::sync::Arc;

use busreminder_core::config::ReminderConfig;
use busreminder_core::{Reminder, ReminderPayload};
use busreminder_scheduler::{ReminderService, SystemClock};
use busreminder_store::{SqliteFavoritesStore, SqliteSettingsStore};
use clap::Parser;
use tracing::{info, warn};

mod cli;
mod commands;
mod timer;

use cli::{Cli, Commands};
use timer::TokioTimerService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busreminder_daemon=info,busreminder_scheduler=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > BUSREMINDER_CONFIG env > ~/.busreminder/busreminder.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("BUSREMINDER_CONFIG").ok());
    let config = ReminderConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!(code = e.code(), "Config load failed ({}), using defaults", e);
        ReminderConfig::default()
    });

    match cli.command {
        Commands::Run => run(config).await,
        Commands::Favorites { command } => commands::favorites(command, &config),
        Commands::Settings { command } => commands::settings(command, &config).await,
        Commands::Preview => commands::preview(&config).await,
    }
}

async fn run(config: ReminderConfig) -> anyhow::Result<()> {
    let db_path = &config.database.path;
    info!(path = %db_path, "opening SQLite database");

    // each store gets its own connection
    let settings = Arc::new(SqliteSettingsStore::new(open_db(db_path)?)?);
    let favorites = Arc::new(SqliteFavoritesStore::new(open_db(db_path)?)?);

    // Fired-timer channel: timer tasks → service loop
    let (fired_tx, fired_rx) = tokio::sync::mpsc::channel::<ReminderPayload>(256);
    // Notification channel: service loop → delivery task
    let (notify_tx, notify_rx) = tokio::sync::mpsc::channel::<Reminder>(256);

    let timers = Arc::new(TokioTimerService::new(
        tokio::runtime::Handle::current(),
        fired_tx,
        !config.engine.force_inexact,
    ));

    let service = Arc::new(ReminderService::new(
        settings,
        favorites,
        timers,
        Arc::new(SystemClock),
        chrono::Local,
        &config,
    ));

    let report = service.start().await?;
    info!(
        scheduled = report.scheduled,
        skipped = report.total() - report.scheduled,
        "initial reconciliation done"
    );

    tokio::spawn(deliver(notify_rx));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let service_task = tokio::spawn(Arc::clone(&service).run(fired_rx, notify_tx, shutdown_rx));

    info!("busreminder daemon running; Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    // signal service loop to stop
    let _ = shutdown_tx.send(true);
    let _ = service_task.await;
    Ok(())
}

/// Surface reminders on stdout. Stands in for a platform notification API.
async fn deliver(mut notify_rx: tokio::sync::mpsc::Receiver<Reminder>) {
    while let Some(reminder) = notify_rx.recv().await {
        info!(favorite_id = %reminder.favorite_id, "delivering reminder");
        println!("🚌 {}: {}", reminder.title, reminder.body);
    }
}

pub(crate) fn open_db(path: &str) -> anyhow::Result<rusqlite::Connection> {
    ensure_parent_dir(path);
    let db = rusqlite::Connection::open(path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
    Ok(db)
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
