// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service host commands
//!
//! Commands: check, mounts

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use aegis_shares::application::mount_manager::MountStateManager;
use aegis_shares::domain::driver_config::{ShareDriverConfig, ShareDriverSpec};
use aegis_shares::domain::host::{HostCredentials, ServiceHost};
use aegis_shares::domain::mount::MountRecord;
use aegis_shares::infrastructure::exports::ExportAdapterRegistry;
use aegis_shares::infrastructure::locks::ResourceLockRegistry;
use aegis_shares::infrastructure::remote::{RemoteExecutionChannel, SshConnector};

#[derive(Subcommand)]
pub enum HostCommand {
    /// Check that a service host is reachable and carries the export tooling
    Check {
        #[command(flatten)]
        target: HostTarget,
    },

    /// List share mounts on a service host
    Mounts {
        #[command(flatten)]
        target: HostTarget,

        /// Include mounts outside the share mount root
        #[arg(long)]
        all: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
pub struct HostTarget {
    /// Management address of the service host
    #[arg(long)]
    address: String,

    /// Compute instance id (defaults to the address)
    #[arg(long)]
    instance_id: Option<String>,

    /// Address advertised to share clients
    #[arg(long)]
    public_address: Option<String>,

    /// SSH user
    #[arg(long, env = "AEGIS_SHARES_SSH_USER", default_value = "manila")]
    user: String,

    /// SSH private key
    #[arg(long, env = "AEGIS_SHARES_SSH_KEY", value_name = "FILE")]
    key: Option<PathBuf>,

    /// SSH port
    #[arg(long, default_value_t = 22)]
    port: u16,
}

impl HostTarget {
    fn to_service_host(&self) -> ServiceHost {
        let mut credentials = HostCredentials::new(&self.user).with_port(self.port);
        if let Some(key) = &self.key {
            credentials = credentials.with_private_key(key);
        }

        let instance_id = self.instance_id.as_deref().unwrap_or(&self.address);
        let host = ServiceHost::new(instance_id, &self.address, credentials);
        match &self.public_address {
            Some(public) => host.with_public_address(public),
            None => host,
        }
    }
}

pub async fn handle_command(command: HostCommand, config_override: Option<PathBuf>) -> Result<()> {
    let config = ShareDriverConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    match command {
        HostCommand::Check { target } => check(&config.spec, &target.to_service_host()).await,
        HostCommand::Mounts { target, all, json } => {
            mounts(&config.spec, &target.to_service_host(), all, json).await
        }
    }
}

fn ssh_channel(spec: &ShareDriverSpec) -> Arc<RemoteExecutionChannel> {
    Arc::new(RemoteExecutionChannel::new(Arc::new(SshConnector::new(
        spec.ssh.clone(),
    ))))
}

async fn check(spec: &ShareDriverSpec, host: &ServiceHost) -> Result<()> {
    println!("Checking service host {}...", host.ssh_destination().bold());

    let channel = ssh_channel(spec);
    if !channel.probe(host).await {
        anyhow::bail!(
            "{}:{} does not accept connections",
            host.address,
            host.credentials.port
        );
    }
    println!("  {} SSH port reachable", "✓".green());

    let exports = ExportAdapterRegistry::from_spec(
        spec,
        Arc::clone(&channel),
        ResourceLockRegistry::in_process(),
    )?;

    let mut failures = 0;
    for protocol in exports.protocols() {
        let adapter = exports.get(protocol)?;
        match adapter.init(host).await {
            Ok(()) => println!("  {} {} export tooling present", "✓".green(), protocol),
            Err(e) => {
                failures += 1;
                println!("  {} {}: {}", "✗".red(), protocol, e);
            }
        }
    }
    channel.release(&host.instance_id).await;

    if failures > 0 {
        anyhow::bail!("{} protocol check(s) failed", failures);
    }
    println!("{}", "✓ Service host is ready".green());
    Ok(())
}

async fn mounts(spec: &ShareDriverSpec, host: &ServiceHost, all: bool, json: bool) -> Result<()> {
    let channel = ssh_channel(spec);
    let manager = MountStateManager::new(Arc::clone(&channel), ResourceLockRegistry::in_process(), spec);

    let records = manager
        .list_mounts(host)
        .await
        .with_context(|| format!("Failed to read mount table of {}", host.address))?;
    channel.release(&host.instance_id).await;

    let root = format!("{}/", spec.share_mount_path.trim_end_matches('/'));
    let records: Vec<MountRecord> = records
        .into_iter()
        .filter(|r| all || r.mount_path.starts_with(&root))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", "No share mounts found.".dimmed());
        return Ok(());
    }

    println!("{:<24} {}", "DEVICE".bold(), "MOUNT PATH".bold());
    for record in &records {
        println!("{:<24} {}", record.device, record.mount_path);
    }
    Ok(())
}
