mod api;
mod app;
mod cache;
mod config;
mod event;
mod logging;
mod mutation;
#[cfg(test)]
mod testing;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "todoq")]
#[command(about = "A terminal client for a remote todo list with optimistic updates")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/todoq/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Base URL of the todo API
  #[arg(short, long)]
  base_url: Option<String>,

  /// Number of todos to load
  #[arg(short, long)]
  limit: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Command line overrides
  if let Some(base_url) = args.base_url {
    config.api.base_url = base_url;
  }
  if let Some(limit) = args.limit {
    config.api.list_limit = limit;
  }

  let _log_guard = logging::init(&config)?;
  tracing::info!(base_url = %config.api.base_url, "Starting todoq");

  let token = config::Config::get_api_token();
  let client = api::ApiClient::new(&config.api, token.as_deref())?;

  // Initialize and run the app
  let mut app = app::App::new(&config, Arc::new(client));
  app.run().await?;

  Ok(())
}
