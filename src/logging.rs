//! Tracing setup for the daemon binary, grounded on `plugins::logging::init`.
//!
//! Library code never calls this itself — only `gatehoused`'s `main` does,
//! so embedding this crate elsewhere doesn't fight another subscriber.

use std::{path::PathBuf, sync::OnceLock};

static GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Initialise the tracing subscriber with a rolling daily log file under
/// `log_dir` (or the platform default when `None`).
///
/// Verbosity is controlled by `RUST_LOG` (defaults to `info`). Existing
/// `log::*` call sites are forwarded into the tracing pipeline via
/// `tracing_log::LogTracer`.
pub fn init(log_dir: Option<PathBuf>) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let log_dir = log_dir.unwrap_or_else(resolve_log_dir);
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, "gatehouse.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = GUARD.set(guard);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .ok();

    tracing_log::LogTracer::init().ok();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gatehouse started");
}

fn resolve_log_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    let base = dirs::home_dir().map(|h| h.join("Library").join("Logs"));

    #[cfg(not(target_os = "macos"))]
    let base = dirs::data_local_dir();

    base.map(|d| d.join("gatehouse")).unwrap_or_else(std::env::temp_dir)
}
