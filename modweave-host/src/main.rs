//! # modweave-host
//!
//! Reference host for the modweave mod loader.
//!
//! The host:
//! - Loads its configuration (permission policy, game version, mods directory)
//! - Discovers mods in the mods directory
//! - Resolves their load order and initializes them
//! - Unloads everything in reverse order on Ctrl+C
//!
//! ## Configuration
//!
//! The host reads configuration from `$XDG_CONFIG_HOME/modweave/config.toml`
//! unless `--config` is given.
//!
//! ## Running
//!
//! ```bash
//! # Start the host
//! cargo run --bin modweave-host
//!
//! # With debug logging and a local mods directory
//! RUST_LOG=debug cargo run --bin modweave-host -- --mods-dir ./mods
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use modweave_host::bootstrap;
use modweave_host::config::Config;

#[derive(Debug, Parser)]
#[command(name = "modweave-host", version, about = "Discover, load and run mods")]
struct Args {
    /// Configuration file (default: $XDG_CONFIG_HOME/modweave/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to scan for mods, overriding the configuration
    #[arg(short, long)]
    mods_dir: Option<PathBuf>,

    /// Game version to check mods against, overriding the configuration
    #[arg(short, long)]
    game_version: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.host.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting modweave-host v{}", env!("CARGO_PKG_VERSION"));

    let mods_dir = match args.mods_dir {
        Some(dir) => dir,
        None => config.mods_dir()?,
    };
    let game_version = args
        .game_version
        .unwrap_or_else(|| config.host.game_version.clone());

    info!("Scanning {} for mods", mods_dir.display());
    let mut loader = bootstrap::build_loader(&config, mods_dir);

    let report = loader
        .initialize(&game_version)
        .context("Failed to initialize mods")?;
    bootstrap::log_load_report(&report);

    info!("Host startup complete");
    info!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    let unload = loader.unload_all();
    bootstrap::log_unload_report(&unload);

    info!("Host stopped");
    Ok(())
}
