use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking file writer flushing; hold it for the process
/// lifetime.
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

/// Installs the tracing subscriber: stdout always, plus a daily-rolling
/// log file when `log_dir` is given.
pub fn init_tracing(log_level: &str, log_dir: Option<&Path>) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    if let Some(dir) = log_dir {
        match std::fs::create_dir_all(dir) {
            Ok(()) => {
                let appender =
                    RollingFileAppender::new(Rotation::DAILY, dir, "review-engine.log");
                let (file_writer, guard) = tracing_appender::non_blocking(appender);
                registry
                    .with(
                        fmt::layer()
                            .with_writer(file_writer)
                            .with_ansi(false)
                            .with_target(true),
                    )
                    .init();
                return Some(FileLogGuard { _guard: guard });
            }
            Err(err) => {
                eprintln!("failed to create log directory {}: {err}", dir.display());
            }
        }
    }

    registry.init();
    None
}
