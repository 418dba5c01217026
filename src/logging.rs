use std::fs;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

pub const LOG_FILE_NAME: &str = "reelgram.log";

/// Routes `tracing` output to a log file, since the terminal belongs to the
/// UI. `RUST_LOG` takes precedence over `logging.level`. Keep the returned
/// guard alive for the lifetime of the process or buffered lines are lost.
pub fn init(cfg: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let Some(dir) = cfg.directory.as_ref() else {
        return Ok(None);
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("logging: failed to create directory {}", dir.display()))?;

    let file_appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("reelgram=info,warn"));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init();
    if installed.is_err() {
        return Ok(None);
    }

    tracing::info!(
        version = crate::VERSION,
        "logging to {}",
        dir.join(LOG_FILE_NAME).display()
    );
    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn no_directory_disables_file_logging() {
        let cfg = LoggingConfig {
            level: "info".into(),
            directory: None,
        };
        assert!(init(&cfg).unwrap().is_none());
    }

    #[test]
    fn creates_log_directory() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested").join("logs");
        let cfg = LoggingConfig {
            level: "debug".into(),
            directory: Some(target.clone()),
        };
        let _guard = init(&cfg).unwrap();
        assert!(target.is_dir());
    }
}
