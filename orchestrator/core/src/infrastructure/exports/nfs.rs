// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! NFS export adapter
//!
//! Drives the kernel NFS server with `exportfs`. The export table is a single
//! resource per host, so every read-modify-write of it runs under the
//! host's `nfs:<host>` lock. After each change the kernel table is copied
//! over the permanent exports file so exports survive a reboot.
//!
//! Export locations look like `<public address>:<mount path>`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::access::{validate_ip_target, AccessLevel, AccessRule, AccessType};
use crate::domain::driver_config::{NfsConfig, ShareDriverSpec};
use crate::domain::error::ShareError;
use crate::domain::export::ProtocolExportAdapter;
use crate::domain::host::ServiceHost;
use crate::domain::share::{validate_share_name, ShareProtocol};
use crate::infrastructure::locks::{LockKey, ResourceLockRegistry};
use crate::infrastructure::remote::{CommandOutput, RemoteCommandError, RemoteExecutionChannel};

/// One `path client` pair of the kernel export table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub path: String,
    pub client: String,
}

/// Parse `exportfs` output.
///
/// Paths start a line. The client follows on the same line, or on the next
/// (indented) line when the path is too long for the column. Client option
/// lists (`10.0.0.1(rw,...)`) are stripped.
pub fn parse_export_table(output: &str) -> Vec<ExportEntry> {
    let mut entries = Vec::new();
    let mut pending: Option<String> = None;

    for line in output.lines() {
        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            continue;
        };

        if first.starts_with('/') {
            match tokens.next() {
                Some(client) => entries.push(ExportEntry {
                    path: first.to_string(),
                    client: strip_options(client),
                }),
                None => pending = Some(first.to_string()),
            }
        } else if let Some(path) = pending.take() {
            entries.push(ExportEntry {
                path,
                client: strip_options(first),
            });
        }
    }

    entries
}

fn strip_options(client: &str) -> String {
    client.split('(').next().unwrap_or(client).to_string()
}

pub struct NfsExportAdapter {
    channel: Arc<RemoteExecutionChannel>,
    locks: ResourceLockRegistry,
    mount_root: String,
    files: NfsConfig,
}

impl NfsExportAdapter {
    pub fn new(
        channel: Arc<RemoteExecutionChannel>,
        locks: ResourceLockRegistry,
        spec: &ShareDriverSpec,
    ) -> Self {
        Self {
            channel,
            locks,
            mount_root: spec.share_mount_path.trim_end_matches('/').to_string(),
            files: spec.nfs.clone(),
        }
    }

    fn local_path(&self, share_name: &str) -> Result<String, ShareError> {
        validate_share_name(share_name)?;
        Ok(format!("{}/{}", self.mount_root, share_name))
    }

    async fn run(&self, host: &ServiceHost, argv: &[&str]) -> Result<CommandOutput, ShareError> {
        self.channel
            .execute(host, argv)
            .await
            .map_err(|e| ShareError::backend_command(&host.instance_id, e))
    }

    async fn export_table(&self, host: &ServiceHost) -> Result<Vec<ExportEntry>, ShareError> {
        let output = self.run(host, &["sudo", "exportfs"]).await?;
        Ok(parse_export_table(&output.stdout))
    }

    async fn sync_exports(&self, host: &ServiceHost) -> Result<(), ShareError> {
        self.run(
            host,
            &[
                "sudo",
                "cp",
                &self.files.etab_file,
                &self.files.exports_file,
                "&&",
                "sudo",
                "exportfs",
                "-a",
            ],
        )
        .await?;
        Ok(())
    }

    async fn unexport(&self, host: &ServiceHost, client: &str, path: &str) -> Result<(), ShareError> {
        let target = format!("{}:{}", client, path);
        self.run(host, &["sudo", "exportfs", "-u", &target]).await?;
        Ok(())
    }

    fn path_from_location(export_location: &str) -> Result<&str, ShareError> {
        match export_location.rsplit_once(':') {
            Some((address, path)) if !address.is_empty() && path.starts_with('/') => Ok(path),
            _ => Err(ShareError::InvalidExportLocation(export_location.to_string())),
        }
    }
}

#[async_trait]
impl ProtocolExportAdapter for NfsExportAdapter {
    fn protocol(&self) -> ShareProtocol {
        ShareProtocol::Nfs
    }

    async fn init(&self, host: &ServiceHost) -> Result<(), ShareError> {
        match self.channel.execute(host, &["sudo", "exportfs"]).await {
            Ok(_) => Ok(()),
            Err(RemoteCommandError::NonZeroExit { stderr, .. })
                if stderr.contains("command not found") =>
            {
                Err(ShareError::Configuration(format!(
                    "NFS server is not installed on {}",
                    host.instance_id
                )))
            }
            Err(e @ RemoteCommandError::NonZeroExit { .. }) => {
                error!(host = %host.instance_id, error = %e, "exportfs check failed");
                Ok(())
            }
            Err(e) => Err(ShareError::backend_command(&host.instance_id, e)),
        }
    }

    async fn create_export(
        &self,
        host: &ServiceHost,
        share_name: &str,
        recreate: bool,
    ) -> Result<String, ShareError> {
        let path = self.local_path(share_name)?;
        if !recreate {
            let exported = self
                .locks
                .with_lock(LockKey::NfsExports(host.instance_id.clone()), || async {
                    self.export_table(host).await
                })
                .await?
                .iter()
                .any(|e| e.path == path);
            if exported {
                return Err(ShareError::ExportAlreadyExists(share_name.to_string()));
            }
        }
        Ok(format!("{}:{}", host.export_address(), path))
    }

    async fn remove_export(&self, host: &ServiceHost, share_name: &str) -> Result<(), ShareError> {
        let path = self.local_path(share_name)?;
        self.locks
            .with_lock(LockKey::NfsExports(host.instance_id.clone()), || async {
                let clients: Vec<String> = self
                    .export_table(host)
                    .await?
                    .into_iter()
                    .filter(|e| e.path == path)
                    .map(|e| e.client)
                    .collect();
                if clients.is_empty() {
                    return Ok(());
                }

                info!(host = %host.instance_id, path = %path, clients = clients.len(), "Removing NFS export");
                for client in &clients {
                    self.unexport(host, client, &path).await?;
                }
                self.sync_exports(host).await
            })
            .await
    }

    async fn allow_access(
        &self,
        host: &ServiceHost,
        share_name: &str,
        access_type: AccessType,
        access_level: AccessLevel,
        access_to: &str,
    ) -> Result<(), ShareError> {
        if access_type != AccessType::Ip {
            return Err(ShareError::UnsupportedAccessType(access_type.to_string()));
        }
        validate_ip_target(access_to)?;

        let path = self.local_path(share_name)?;
        self.locks
            .with_lock(LockKey::NfsExports(host.instance_id.clone()), || async {
                let table = self.export_table(host).await?;
                if table.iter().any(|e| e.path == path && e.client == access_to) {
                    return Err(ShareError::AccessRuleExists {
                        access_type: access_type.to_string(),
                        access_to: access_to.to_string(),
                    });
                }

                info!(host = %host.instance_id, path = %path, client = access_to, level = %access_level, "Granting NFS access");
                let options = format!("{},no_subtree_check", access_level);
                let target = format!("{}:{}", access_to, path);
                self.run(host, &["sudo", "exportfs", "-o", &options, &target])
                    .await?;
                self.sync_exports(host).await
            })
            .await
    }

    async fn deny_access(
        &self,
        host: &ServiceHost,
        share_name: &str,
        rule: &AccessRule,
        force: bool,
    ) -> Result<(), ShareError> {
        let path = self.local_path(share_name)?;
        let result = self
            .locks
            .with_lock(LockKey::NfsExports(host.instance_id.clone()), || async {
                let table = self.export_table(host).await?;
                if !table.iter().any(|e| e.path == path && e.client == rule.access_to) {
                    return Ok(());
                }

                info!(host = %host.instance_id, path = %path, client = %rule.access_to, "Revoking NFS access");
                self.unexport(host, &rule.access_to, &path).await?;
                self.sync_exports(host).await
            })
            .await;

        match result {
            Err(e) if force && e.command_stderr().is_some() => {
                warn!(host = %host.instance_id, error = %e, "Ignoring NFS deny failure");
                Ok(())
            }
            other => other,
        }
    }

    async fn resolve_exports_for_location(
        &self,
        host: &ServiceHost,
        export_location: &str,
    ) -> Result<Vec<String>, ShareError> {
        let path = Self::path_from_location(export_location)?;
        Ok(vec![format!("{}:{}", host.export_address(), path)])
    }

    async fn resolve_mount_path_for_location(
        &self,
        _host: &ServiceHost,
        export_location: &str,
    ) -> Result<String, ShareError> {
        Self::path_from_location(export_location).map(str::to_string)
    }
}
