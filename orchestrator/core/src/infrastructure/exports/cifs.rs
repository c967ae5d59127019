// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! CIFS export adapter
//!
//! Manages Samba shares through `net conf`, which requires Samba to use the
//! registry as its configuration backend. Client access is the share's
//! `hosts allow` list; new shares deny everyone but localhost.
//!
//! Export locations look like `\\<public address>\<share name>`; the
//! `//address/name` spelling is accepted when importing.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::access::{validate_ip_target, AccessLevel, AccessRule, AccessType};
use crate::domain::driver_config::ShareDriverSpec;
use crate::domain::error::ShareError;
use crate::domain::export::ProtocolExportAdapter;
use crate::domain::host::ServiceHost;
use crate::domain::share::{validate_share_name, ShareProtocol};
use crate::infrastructure::locks::{LockKey, ResourceLockRegistry};
use crate::infrastructure::remote::{CommandOutput, RemoteExecutionChannel};

const HOSTS_ALLOW: &str = "hosts allow";

/// Parameters applied to every newly created share
const SHARE_PARAMETERS: &[(&str, &str)] = &[
    ("browseable", "yes"),
    ("create mask", "0755"),
    ("hosts deny", "0.0.0.0/0"),
    (HOSTS_ALLOW, "127.0.0.1"),
    ("read only", "no"),
];

/// Extract the share name from a `\\addr\name` or `//addr/name` location
pub fn share_name_from_location(export_location: &str) -> Result<&str, ShareError> {
    let invalid = || ShareError::InvalidExportLocation(export_location.to_string());

    if export_location.contains('/') && export_location.contains('\\') {
        return Err(invalid());
    }
    let name = if export_location.starts_with("\\\\") {
        export_location.rsplit('\\').next()
    } else if export_location.starts_with("//") {
        export_location.rsplit('/').next()
    } else {
        None
    };

    match name {
        Some(name) if validate_share_name(name).is_ok() => Ok(name),
        _ => Err(invalid()),
    }
}

pub struct CifsExportAdapter {
    channel: Arc<RemoteExecutionChannel>,
    locks: ResourceLockRegistry,
    mount_root: String,
}

impl CifsExportAdapter {
    pub fn new(
        channel: Arc<RemoteExecutionChannel>,
        locks: ResourceLockRegistry,
        spec: &ShareDriverSpec,
    ) -> Self {
        Self {
            channel,
            locks,
            mount_root: spec.share_mount_path.trim_end_matches('/').to_string(),
        }
    }

    async fn run(&self, host: &ServiceHost, argv: &[&str]) -> Result<CommandOutput, ShareError> {
        self.channel
            .execute(host, argv)
            .await
            .map_err(|e| ShareError::backend_command(&host.instance_id, e))
    }

    fn location(host: &ServiceHost, share_name: &str) -> String {
        format!("\\\\{}\\{}", host.export_address(), share_name)
    }

    async fn add_share(&self, host: &ServiceHost, share_name: &str) -> Result<(), ShareError> {
        let path = format!("{}/{}", self.mount_root, share_name);
        self.run(
            host,
            &[
                "sudo", "net", "conf", "addshare", share_name, &path, "writeable=y", "guest_ok=y",
            ],
        )
        .await?;
        Ok(())
    }

    async fn apply_share_parameters(
        &self,
        host: &ServiceHost,
        share_name: &str,
    ) -> Result<(), ShareError> {
        // One remote process for all parameters; ':' starts the chain.
        let mut argv = vec![":"];
        for &(param, value) in SHARE_PARAMETERS {
            argv.extend(["&&", "sudo", "net", "conf", "setparm", share_name, param, value]);
        }
        self.run(host, &argv).await?;
        Ok(())
    }

    async fn allowed_hosts(
        &self,
        host: &ServiceHost,
        share_name: &str,
    ) -> Result<Vec<String>, ShareError> {
        let output = self
            .run(host, &["sudo", "net", "conf", "getparm", share_name, HOSTS_ALLOW])
            .await?;
        Ok(output.stdout.split_whitespace().map(str::to_string).collect())
    }

    async fn set_allowed_hosts(
        &self,
        host: &ServiceHost,
        share_name: &str,
        hosts: &[String],
    ) -> Result<(), ShareError> {
        let value = hosts.join(" ");
        self.run(
            host,
            &["sudo", "net", "conf", "setparm", share_name, HOSTS_ALLOW, &value],
        )
        .await?;
        Ok(())
    }

    fn share_lock(host: &ServiceHost, share_name: &str) -> Result<LockKey, ShareError> {
        validate_share_name(share_name)?;
        Ok(LockKey::CifsShare(host.instance_id.clone(), share_name.to_string()))
    }
}

#[async_trait]
impl ProtocolExportAdapter for CifsExportAdapter {
    fn protocol(&self) -> ShareProtocol {
        ShareProtocol::Cifs
    }

    async fn init(&self, host: &ServiceHost) -> Result<(), ShareError> {
        self.run(host, &["sudo", "net", "conf", "list"]).await?;
        Ok(())
    }

    async fn create_export(
        &self,
        host: &ServiceHost,
        share_name: &str,
        recreate: bool,
    ) -> Result<String, ShareError> {
        self.locks
            .with_lock(Self::share_lock(host, share_name)?, || async {
                let exists = self
                    .channel
                    .execute(host, &["sudo", "net", "conf", "showshare", share_name])
                    .await
                    .is_ok();

                match (exists, recreate) {
                    (false, _) => self.add_share(host, share_name).await?,
                    (true, true) => {
                        info!(host = %host.instance_id, share = share_name, "Recreating CIFS share");
                        self.run(host, &["sudo", "net", "conf", "delshare", share_name])
                            .await?;
                        self.add_share(host, share_name).await?;
                    }
                    (true, false) => {
                        return Err(ShareError::ExportAlreadyExists(share_name.to_string()));
                    }
                }

                self.apply_share_parameters(host, share_name).await?;
                Ok(Self::location(host, share_name))
            })
            .await
    }

    async fn remove_export(&self, host: &ServiceHost, share_name: &str) -> Result<(), ShareError> {
        self.locks
            .with_lock(Self::share_lock(host, share_name)?, || async {
                if let Err(e) = self
                    .run(host, &["sudo", "net", "conf", "delshare", share_name])
                    .await
                {
                    warn!(
                        host = %host.instance_id,
                        share = share_name,
                        error = %e,
                        "Deleting CIFS share failed, closing it forcibly"
                    );
                    self.run(host, &["sudo", "smbcontrol", "all", "close-share", share_name])
                        .await?;
                }
                Ok(())
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
        if access_level != AccessLevel::Rw {
            return Err(ShareError::InvalidAccessLevel(access_level.to_string()));
        }
        validate_ip_target(access_to)?;

        self.locks
            .with_lock(Self::share_lock(host, share_name)?, || async {
                let mut hosts = self.allowed_hosts(host, share_name).await?;
                if hosts.iter().any(|h| h == access_to) {
                    return Err(ShareError::AccessRuleExists {
                        access_type: access_type.to_string(),
                        access_to: access_to.to_string(),
                    });
                }

                info!(host = %host.instance_id, share = share_name, client = access_to, "Granting CIFS access");
                hosts.push(access_to.to_string());
                self.set_allowed_hosts(host, share_name, &hosts).await
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
        if rule.access_level != AccessLevel::Rw {
            return Ok(());
        }

        let result = self
            .locks
            .with_lock(Self::share_lock(host, share_name)?, || async {
                let mut hosts = self.allowed_hosts(host, share_name).await?;
                let before = hosts.len();
                hosts.retain(|h| h != &rule.access_to);
                if hosts.len() == before {
                    return Ok(());
                }

                info!(host = %host.instance_id, share = share_name, client = %rule.access_to, "Revoking CIFS access");
                self.set_allowed_hosts(host, share_name, &hosts).await
            })
            .await;

        match result {
            Err(e) if force && e.command_stderr().is_some() => {
                warn!(host = %host.instance_id, error = %e, "Ignoring CIFS deny failure");
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
        let share_name = share_name_from_location(export_location)?;
        Ok(vec![Self::location(host, share_name)])
    }

    async fn resolve_mount_path_for_location(
        &self,
        host: &ServiceHost,
        export_location: &str,
    ) -> Result<String, ShareError> {
        let share_name = share_name_from_location(export_location)?;
        let output = self
            .run(host, &["sudo", "net", "conf", "getparm", share_name, "path"])
            .await?;
        Ok(output.stdout.trim().to_string())
    }
}
