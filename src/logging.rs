use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Install a file-backed tracing subscriber.
///
/// The terminal belongs to the UI, so logs go to a file. RUST_LOG overrides
/// the configured level. Keep the returned guard alive until exit or buffered
/// lines are lost.
pub fn init(config: &Config) -> Result<WorkerGuard> {
  let path = config.log_file()?;
  let dir = path
    .parent()
    .ok_or_else(|| eyre!("Log file has no parent directory: {}", path.display()))?;
  let file_name = path
    .file_name()
    .ok_or_else(|| eyre!("Log file has no file name: {}", path.display()))?;

  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(dir, file_name);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(&config.log.level))
    .map_err(|e| eyre!("Invalid log level {}: {}", config.log.level, e))?;

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to install tracing subscriber: {}", e))?;

  Ok(guard)
}
