//! Logging setup: console plus daily-rolling file output

use std::path::Path;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

use crate::config::AppConfig;
use crate::Result;

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "docrag.log";

/// Initialize logging using `RUST_LOG` or the crate default filter
pub fn init_logging() -> Result<()> {
    init_logging_with_config(None)
}

/// Initialize logging, taking the level from configuration when available
pub fn init_logging_with_config(config: Option<&AppConfig>) -> Result<()> {
    let env_filter = match config {
        Some(config) => level_filter(&config.logging.level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,docrag=debug")),
    };
    let level = config.map_or("info", |c| c.logging.level.as_str());
    install(env_filter, level)
}

/// Initialize logging with an explicit level (used by `--verbose`)
pub fn init_logging_with_level(level: &str) -> Result<()> {
    install(level_filter(level), level)
}

fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("{level},docrag={level}"))
}

fn install(env_filter: EnvFilter, level: &str) -> Result<()> {
    let logs_dir = Path::new(LOG_DIR);
    if !logs_dir.exists() {
        std::fs::create_dir_all(logs_dir)?;
    }

    let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(non_blocking)
        .with_ansi(false);

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| crate::DocRagError::Custom(format!("Logging already initialized: {e}")))?;

    tracing::info!("Logging initialized with level: {level} - console and file output enabled");
    tracing::debug!("Log files are written to {LOG_DIR}/{LOG_FILE}.YYYY-MM-DD");

    // The writer thread must outlive every span emitted by the process.
    std::mem::forget(guard);

    Ok(())
}

/// Initialize simple stderr logging for tests
pub fn init_simple_logging() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
    Ok(())
}
