//! Console and rolling-file tracing output.

use tracing_appender::non_blocking::NonBlocking;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;
use crate::error::AppError;

const LOG_FILE_PREFIX: &str = "weakbus";
const RETAINED_LOG_FILES: usize = 7;

/// Installs the global subscriber: ANSI output on stdout plus a plain daily
/// file under [`Config::logs_path`].
///
/// `RUST_LOG` takes precedence over [`Config::log_filter`].
pub fn setup_logging(config: &Config) -> Result<(), AppError> {
    let filter = log_filter(config)?;
    let file_writer = daily_file_writer(config)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .try_init()
        .map_err(|e| AppError::Logging {
            msg: format!("Failed to install tracing subscriber: {e}"),
        })
}

fn log_filter(config: &Config) -> Result<EnvFilter, AppError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|e| AppError::Logging {
            msg: format!("Invalid log filter '{}': {e}", config.log_filter),
        })
}

fn daily_file_writer(config: &Config) -> Result<NonBlocking, AppError> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .max_log_files(RETAINED_LOG_FILES)
        .build(&config.logs_path)
        .map_err(|e| AppError::Logging {
            msg: format!(
                "Cannot open log directory '{}': {e}",
                config.logs_path.display()
            ),
        })?;

    let (writer, flush_on_drop) = tracing_appender::non_blocking(appender);
    // Logging stays on for the whole process, so the flusher is never dropped.
    std::mem::forget(flush_on_drop);
    Ok(writer)
}
