use std::{path::Path, sync::Mutex};

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

/// File name prefix of the rolling log.
pub const LOG_FILE_NAME: &str = "lockutils.log";

// Keeps the non-blocking file writer alive until flushed.
static FILE_APPENDER_GUARD: Mutex<Option<tracing_appender::non_blocking::WorkerGuard>> =
    Mutex::new(None);

/// Flush and close the log file appender, if one is installed.
pub fn flush_logs() {
    if let Ok(mut holder) = FILE_APPENDER_GUARD.lock() {
        drop(holder.take());
    }
}

fn filter_for(verbosity: u8) -> Result<EnvFilter> {
    let base = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| base.to_string());
    EnvFilter::try_new(filter).context("invalid RUST_LOG / filter")
}

/// Initialize tracing to stderr. `RUST_LOG` (if set) takes precedence.
/// Otherwise, -v/-vv map to "debug"/"trace".
pub fn init_tracing(verbosity: u8) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*};

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    // Allow re-init to be a no-op in tests
    let _ = tracing_subscriber::registry()
        .with(filter_for(verbosity)?)
        .with(fmt_layer)
        .try_init();

    Ok(())
}

/// Initialize tracing to stderr plus a daily rolling file under `log_dir`.
pub fn init_tracing_with_file(log_dir: &Path, verbosity: u8) -> Result<()> {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*};

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;

    let file_appender = rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    if let Ok(mut holder) = FILE_APPENDER_GUARD.lock() {
        *holder = Some(guard);
    }

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(non_blocking);
    let console_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(filter_for(verbosity)?)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    Ok(())
}
