// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use aegis_shares::domain::driver_config::ShareDriverConfig;

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

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./aegis-shares.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(&output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = ShareDriverConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. AEGIS_SHARES_CONFIG_PATH: {}",
            std::env::var("AEGIS_SHARES_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./aegis-shares.yaml");
        println!("  4. ~/.aegis/shares.yaml");
        println!("  5. /etc/aegis/shares.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Driver:".bold());
    println!("  Name: {}", config.metadata.name);
    println!(
        "  Protocols: {}",
        spec.enabled_protocols
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();

    println!("{}", "Volumes:".bold());
    println!("  Mount root: {}", spec.share_mount_path);
    println!("  Filesystem: {}", spec.volume_fstype.as_str());
    println!("  Volume names: {}", spec.volume_name_template);
    println!("  Snapshot names: {}", spec.snapshot_name_template);
    println!(
        "  Volume type: {}",
        spec.volume_type.as_deref().unwrap_or("(backend default)")
    );
    println!();

    println!("{}", "Timeouts:".bold());
    println!("  Volume create/delete: {:?}", spec.timeouts.volume_create);
    println!("  Volume attach/detach: {:?}", spec.timeouts.volume_attach);
    println!("  Poll interval: {:?}", spec.timeouts.poll_interval);
    println!();

    println!("{}", "SSH:".bold());
    println!("  Connect timeout: {:?}", spec.ssh.connect_timeout);
    println!("  Known hosts: {:?}", spec.ssh.known_hosts);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ShareDriverConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    ShareDriverConfig::default()
        .to_yaml_file(output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
