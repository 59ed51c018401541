//! Logging configuration using tracing

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Default filter when `LOGDECK_LOG` is unset. The crates log under their
/// own targets, so each needs its own directive; everything else falls to
/// `warn`.
const DEFAULT_FILTER: &str =
    "logdeck=info,logdeck_core=info,logdeck_adb=info,logdeck_server=info,warn";

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/logdeck/logs/`
/// Log level is controlled by the `LOGDECK_LOG` environment variable.
///
/// # Examples
/// ```bash
/// LOGDECK_LOG=debug cargo run
/// LOGDECK_LOG=trace cargo run
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory()?;
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "logdeck.log");

    // Default to info, allow override via LOGDECK_LOG
    let env_filter =
        EnvFilter::try_from_env("LOGDECK_LOG").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .init();

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("logdeck starting");
    tracing::info!("Log directory: {}", log_dir.display());
    tracing::info!("═══════════════════════════════════════════════════════");

    Ok(())
}

/// Get the log directory path
fn get_log_directory() -> Result<PathBuf> {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Ok(base.join("logdeck").join("logs"))
}

/// Get the log file path for the current day
pub fn get_current_log_file() -> Result<PathBuf> {
    let dir = get_log_directory()?;
    Ok(dir.join("logdeck.log"))
}
