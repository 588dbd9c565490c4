// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Circuit Harvester Web UI
//!
//! Standalone server for the scanning interface.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use circuit_harvester::config::AppConfig;
use circuit_harvester::{web, AppController, Result};

#[derive(Parser, Debug)]
#[command(name = "circuit-harvester-web")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Circuit Harvester Web UI Server")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Host to bind to
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Open browser automatically
    #[arg(long)]
    open: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.web.host = host.clone();
        }
        if let Some(port) = self.port {
            config.web.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("Circuit Harvester Web UI v{}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load(&args.config)?;
    args.apply(&mut config);
    config.validate()?;

    let controller = Arc::new(AppController::open(&config)?);
    info!("Session store: {}", config.session.path);

    if args.open {
        web::open_in_browser(&config);
    }

    web::start_server(config, controller).await
}
