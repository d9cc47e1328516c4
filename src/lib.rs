pub mod boards;
pub mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod mapping;
pub mod models;
pub mod reconcile;
pub mod validation;

use crate::boards::BoardService;
use crate::commands::AppState;
use crate::config::ServiceConfig;
use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

pub fn run() -> anyhow::Result<()> {
    let config = ServiceConfig::load().context("failed to load configuration")?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create data directory {}", config.data_dir.display()))?;
    init_tracing(&config).map_err(anyhow::Error::msg)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        let boards = BoardService::open(&config)?;
        let state = AppState::new(boards);
        tracing::info!(data_dir = %config.data_dir.display(), "board engine listening on stdin");

        let reader = tokio::io::BufReader::new(tokio::io::stdin());
        commands::serve(&state, reader, tokio::io::stdout()).await?;
        tracing::info!("stdin closed, shutting down");
        Ok::<(), anyhow::Error>(())
    })
}

fn init_tracing(config: &ServiceConfig) -> Result<(), String> {
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, &config.log.file_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.filter)),
        )
        .with_writer(non_blocking);
    let installed = if config.log.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|error| error.to_string())
}
