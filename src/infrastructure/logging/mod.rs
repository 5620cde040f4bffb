//! Tracing initialization.

use tracing_subscriber::{fmt, EnvFilter};

use super::config::LoggingConfig;

/// Initialize the global subscriber from config. `RUST_LOG` overrides the
/// configured level. Returns a guard that must be held for the process
/// lifetime when file logging is enabled.
pub fn init(config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "faultline.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            if config.format == "json" {
                fmt().with_env_filter(filter).with_writer(writer).json().init();
            } else {
                fmt().with_env_filter(filter).with_writer(writer).with_ansi(false).init();
            }
            Some(guard)
        }
        None => {
            if config.format == "json" {
                fmt().with_env_filter(filter).json().init();
            } else {
                fmt().with_env_filter(filter).init();
            }
            None
        }
    }
}
