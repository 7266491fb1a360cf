mod api;
mod app;
mod cache;
mod commands;
mod config;
mod consent;
mod logging;
mod net;
mod proxy;
mod render;
mod tables;
mod validation;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "festa")]
#[command(about = "Offline-first client for the Festa dello Sport site")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/festa/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let data_dir = config::Config::data_dir()?;
  let _log_guard = logging::init(&data_dir.join("logs"), args.verbose)?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  let app = app::App::new(config, &data_dir)?;
  app.run(args.command).await
}
