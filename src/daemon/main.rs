use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use focus_timer::clock::SystemClock;
use focus_timer::config::{init_tracing, Config};
use focus_timer::db::Database;
use focus_timer::notify::NotificationManager;
use focus_timer::service::TimerService;
use focus_timer::watcher::Watcher;

#[derive(Parser)]
#[command(name = "timerd")]
#[command(about = "Reminder and pomodoro notification daemon", long_about = None)]
struct Cli {
    /// Config file path (defaults to user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path (overrides config)
    #[arg(short, long)]
    db_path: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    // 设置日志
    let log_level = if cli.debug { "debug" } else { config.log_level.as_str() };
    init_tracing(log_level);
    match &config.source {
        Some(path) => tracing::debug!("Using config file: {:?}", path),
        None => tracing::debug!("No config file, using defaults"),
    }

    if let Some(db_path) = cli.db_path {
        config.db_path = Some(db_path);
    }
    let db_path = config.resolve_db_path()?;
    tracing::info!("Using database: {:?}", db_path);

    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database {:?}", db_path))?;
    let poll_interval = i64::try_from(config.daemon.poll_interval_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .context("daemon.poll_interval_secs is too large")?;

    // 创建并运行守护进程
    let mut watcher = Watcher::new(
        TimerService::new(db, SystemClock),
        NotificationManager::new(config.daemon.notifications),
        config.user_id,
        poll_interval,
    );
    watcher.run().await?;

    Ok(())
}
