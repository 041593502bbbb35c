//! sqlite-admin server entrypoint.
//!
//! Loads configuration, installs logging and hands over to [`server::run`].

use anyhow::Result;
use clap::Parser;
use sqlite_admin::config::ServerConfig;
use sqlite_admin::{logging, server};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "sqlite-admin", version, about = "Web admin for uploaded SQLite files")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override server.host
    #[arg(long)]
    host: Option<String>,

    /// Override server.port
    #[arg(long)]
    port: Option<u16>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Fall back to defaults when the config file is missing, fail when it is broken.
    let mut config = if args.config.exists() {
        ServerConfig::from_file(&args.config).map_err(|e| {
            anyhow::anyhow!("Failed to load {}: {}", args.config.display(), e)
        })?
    } else {
        eprintln!(
            "Config file {} not found, using defaults",
            args.config.display()
        );
        ServerConfig::default()
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    logging::init_logging(&config.logging)?;

    server::run(config).await
}
