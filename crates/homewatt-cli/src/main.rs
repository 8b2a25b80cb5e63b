//! homewatt - a terminal client for per-device energy monitoring.
//!
//! Lists devices and their usage, charts hourly consumption and relays
//! questions to the backend's query assistant. All data commands require a
//! live session; the session ends on its own once the token expires.

mod app;
mod commands;
mod render;
mod utils;

use std::io;
use std::path::Path;

use anyhow::Result;
use homewatt_core::Config;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use commands::Command;

/// Prefix of the daily log files in the data directory
const LOG_FILE_PREFIX: &str = "homewatt.log";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and, when `log_dir` is usable, to a daily-rolling file.
/// The returned guard must live until exit so buffered lines are flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let appender = log_dir.and_then(|dir| {
        RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_FILE_PREFIX)
            .build(dir)
            .ok()
    });
    let (file_layer, guard) = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Ignoring unreadable config: {}", e);
        Config::default()
    });

    let log_dir = config.data_dir().ok().map(|dir| dir.join("logs"));
    let _log_guard = init_tracing(log_dir.as_deref());
    info!("homewatt starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let app = App::new(config)?;
    app::spawn_session_watcher(app.session.subscribe());

    let result = commands::run(&app, command).await;
    if let Err(ref e) = result {
        warn!(error = %e, "Command failed");
    }

    info!("homewatt shutting down");
    result
}
