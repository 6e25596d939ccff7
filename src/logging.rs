//! Tracing setup: stderr always, plus an optional daily-rolling file.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// `RUST_LOG` when set, otherwise `level`, otherwise `info`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Stderr-only subscriber for the window before the config is known.
pub fn bootstrap() -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::registry()
        .with(env_filter("warn"))
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop and must be held
/// for the life of the process.
pub fn init(level: &str, file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    match file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .context("log file path has no file name")?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;

            let appender = tracing_appender::rolling::daily(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter(level))
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .context("installing tracing subscriber")?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter(level))
                .with(stderr_layer)
                .try_init()
                .context("installing tracing subscriber")?;
            Ok(None)
        }
    }
}
