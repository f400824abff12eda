pub mod metrics;

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Initialize logging: human-readable records on stdout plus JSON records
/// in a daily rolling `app.log` under `log_dir`.
///
/// The returned guard must live as long as the process so buffered file
/// records are flushed on shutdown.
pub fn init_logging(log_dir: &Path) -> WorkerGuard {
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("Failed to create logs directory {}: {e}", log_dir.display());
    }

    let file_appender = tracing_appender::rolling::daily(log_dir, "app.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(env_filter());

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_filter(env_filter());

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stdout_layer)
        .init();

    tracing::info!("Logging to {} (daily rolling)", log_dir.join("app.log").display());
    guard
}
