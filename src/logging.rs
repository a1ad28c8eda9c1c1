//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over the configured filter. When a log file is configured
//! the returned guard must be kept alive for buffered lines to be written.

use crate::config::LogSettings;
use crate::error::{BusError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber described by `settings`.
pub fn init(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .map_err(|e| BusError::Config(format!("Invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer());

    match &settings.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| BusError::Config(format!("Invalid log file path {:?}", path)))?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .map_err(|e| BusError::Config(format!("Failed to install logger: {}", e)))?;
            Ok(Some(guard))
        }
        None => {
            registry
                .try_init()
                .map_err(|e| BusError::Config(format!("Failed to install logger: {}", e)))?;
            Ok(None)
        }
    }
}
