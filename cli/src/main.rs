// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # SAP Gateway CLI
//!
//! The `sapgw` binary runs the session-bridged authentication gateway.
//!
//! ## Commands
//!
//! - `sapgw serve` - Run the HTTP gateway with its background session sweeper
//! - `sapgw route "<request>"` - Show how a free-form request would be routed
//! - `sapgw config show|validate|generate` - Configuration management

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use sap_gateway::commands::{self, ConfigCommand, RouteArgs};
use sap_gateway::logging::init_logging;
use sap_gateway_core::domain::gateway_config::GatewayConfigManifest;

/// SAP Gateway - session-bridged authentication and request routing for SAP tools
#[derive(Parser)]
#[command(name = "sapgw")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "SAP_GATEWAY_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "SAP_GATEWAY_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway HTTP server
    #[command(name = "serve")]
    Serve {
        /// HTTP port (overrides spec.network.port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Route a request without executing it
    #[command(name = "route")]
    Route(RouteArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is not an error
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let logging = GatewayConfigManifest::load_or_default(cli.config.clone())
        .map(|c| c.spec.observability.logging)
        .unwrap_or_default();
    let level = cli.log_level.as_deref().unwrap_or(&logging.level);
    init_logging(level, &logging.format)?;

    match cli.command {
        Some(Commands::Serve { port }) => commands::serve::run(cli.config, port).await,
        Some(Commands::Route(args)) => commands::route::run(args, cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}
