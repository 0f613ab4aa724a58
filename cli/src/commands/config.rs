// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use sap_gateway_core::domain::gateway_config::GatewayConfigManifest;

const MINIMAL_TEMPLATE: &str = include_str!("../../templates/gateway-minimal.yaml");
const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/gateway-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./sap-gateway.yaml)
        #[arg(short, long, default_value = "./sap-gateway.yaml")]
        output: PathBuf,

        /// Include an identity provider section and a sample SAP catalog
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(&output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. SAP_GATEWAY_CONFIG_PATH: {}",
            std::env::var("SAP_GATEWAY_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./sap-gateway.yaml");
        println!("  4. ~/.sap-gateway/config.yaml");
        println!("  5. /etc/sap-gateway/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    let spec = &config.spec;
    println!("{}", "Sessions:".bold());
    println!("  TTL: {}s (sliding)", spec.session.ttl_seconds);
    println!("  Max sessions per user: {}", spec.session.max_sessions_per_user);
    println!("  Sweep interval: {}s", spec.session.cleanup_interval_seconds);
    println!();

    println!("{}", "Identity Provider:".bold());
    match &spec.identity_provider {
        Some(idp) => {
            println!("  Issuer: {}", idp.issuer);
            println!("  Client ID: {}", idp.client_id);
            println!("  Algorithm: {:?}", idp.algorithm);
            println!("  Audiences: {}", idp.audiences.join(", "));
            if let Some(prefix) = &idp.scope_prefix {
                println!("  Scope prefix: {}", prefix);
            }
            println!(
                "  Client secret: {}",
                if idp.client_secret.is_some() { "(set)" } else { "(none)" }
            );
        }
        None => println!("  {}", "(not configured, `serve` will refuse to start)".yellow()),
    }
    println!();

    println!("{}", "Routing:".bold());
    println!("  Ambiguity threshold: {}", spec.routing.ambiguity_threshold);
    println!("  Tie epsilon: {}", spec.routing.tie_epsilon);
    println!("  Step timeout: {}s", spec.workflow.step_timeout_seconds);
    println!();

    println!("{}", "SAP Catalog:".bold());
    if spec.sap.services.is_empty() {
        println!("  {}", "(empty)".dimmed());
    }
    for service in &spec.sap.services {
        println!("  {} ({} entity sets)", service.id.bold(), service.entity_sets.len());
    }
    println!();

    println!("{}", "Network:".bold());
    println!("  Listen: {}:{}", spec.network.bind_address, spec.network.port);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GatewayConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    if config.spec.identity_provider.is_none() {
        println!(
            "{}",
            "! No identity provider configured; `sapgw serve` needs one".yellow()
        );
    }
    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, with_examples: bool) -> Result<()> {
    let sample = if with_examples { EXAMPLES_TEMPLATE } else { MINIMAL_TEMPLATE };

    std::fs::write(output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
