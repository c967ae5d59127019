// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mount State Manager
//!
//! Idempotent format/mount/unmount of share volumes on service hosts.
//! Mount state is always read back from the host's mount table; every entry
//! point re-checks it before acting, so a crash between steps heals on the
//! next call.

use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::driver_config::{MountFilesConfig, ShareDriverSpec};
use crate::domain::error::ShareError;
use crate::domain::host::ServiceHost;
use crate::domain::mount::{parse_df_size_gb, parse_mount_table, FilesystemType, MountRecord};
use crate::domain::share::validate_share_name;
use crate::infrastructure::locks::{LockKey, ResourceLockRegistry};
use crate::infrastructure::remote::{CommandOutput, RemoteExecutionChannel};

pub struct MountStateManager {
    channel: Arc<RemoteExecutionChannel>,
    locks: ResourceLockRegistry,
    mount_root: String,
    files: MountFilesConfig,
}

impl MountStateManager {
    pub fn new(
        channel: Arc<RemoteExecutionChannel>,
        locks: ResourceLockRegistry,
        spec: &ShareDriverSpec,
    ) -> Self {
        Self {
            channel,
            locks,
            mount_root: spec.share_mount_path.trim_end_matches('/').to_string(),
            files: spec.mount_files.clone(),
        }
    }

    /// `<mount_root>/<share_name>`
    pub fn mount_path(&self, share_name: &str) -> Result<String, ShareError> {
        validate_share_name(share_name)?;
        Ok(format!("{}/{}", self.mount_root, share_name))
    }

    async fn run(&self, host: &ServiceHost, argv: &[&str]) -> Result<CommandOutput, ShareError> {
        self.channel
            .execute(host, argv)
            .await
            .map_err(|e| ShareError::backend_command(&host.instance_id, e))
    }

    pub async fn list_mounts(&self, host: &ServiceHost) -> Result<Vec<MountRecord>, ShareError> {
        let output = self.run(host, &["sudo", "mount"]).await?;
        Ok(parse_mount_table(&output.stdout))
    }

    /// Whether `path` is mounted on `host`; with `device`, whether that
    /// device is what is mounted there.
    pub async fn is_mounted(
        &self,
        host: &ServiceHost,
        path: &str,
        device: Option<&str>,
    ) -> Result<bool, ShareError> {
        let mounts = self.list_mounts(host).await?;
        Ok(mounts.iter().any(|m| m.matches(path, device)))
    }

    pub async fn format_volume(
        &self,
        host: &ServiceHost,
        device: &str,
        fstype: FilesystemType,
    ) -> Result<(), ShareError> {
        info!(host = %host.instance_id, device, fstype = fstype.as_str(), "Formatting volume");
        let mkfs = fstype.mkfs_command();
        self.run(host, &["sudo", &mkfs, device]).await?;
        Ok(())
    }

    /// Mount `device` at the share's mount path. No-op when already mounted.
    ///
    /// # Returns
    /// * `Ok(String)` - The mount path
    pub async fn mount(
        &self,
        host: &ServiceHost,
        share_name: &str,
        device: &str,
    ) -> Result<String, ShareError> {
        let path = self.mount_path(share_name)?;
        self.locks
            .with_lock(LockKey::Mount(host.instance_id.clone()), || async {
                if self.is_mounted(host, &path, Some(device)).await? {
                    debug!(host = %host.instance_id, path = %path, "Share is already mounted");
                    return Ok(());
                }

                info!(host = %host.instance_id, device, path = %path, "Mounting share volume");
                self.run(
                    host,
                    &[
                        "sudo", "mkdir", "-p", &path, "&&", "sudo", "mount", device, &path, "&&",
                        "sudo", "chmod", "777", &path,
                    ],
                )
                .await?;
                self.sync_mount_table(host).await
            })
            .await?;
        Ok(path)
    }

    /// Unmount the share and remove its mount directory. No-op when not
    /// mounted.
    pub async fn unmount(&self, host: &ServiceHost, share_name: &str) -> Result<(), ShareError> {
        let path = self.mount_path(share_name)?;
        self.locks
            .with_lock(LockKey::Mount(host.instance_id.clone()), || async {
                if !self.is_mounted(host, &path, None).await? {
                    debug!(host = %host.instance_id, path = %path, "Share is not mounted");
                    return Ok(());
                }

                info!(host = %host.instance_id, path = %path, "Unmounting share");
                self.run(host, &["sudo", "umount", &path, "&&", "sudo", "rmdir", &path])
                    .await?;
                self.sync_mount_table(host).await
            })
            .await
    }

    /// Copy the live mount table (`/etc/mtab` by default) over the boot-time
    /// table, then remount everything so a broken entry fails now instead of
    /// at the next boot.
    async fn sync_mount_table(&self, host: &ServiceHost) -> Result<(), ShareError> {
        self.run(
            host,
            &[
                "sudo",
                "cp",
                &self.files.staged,
                &self.files.fstab,
                "&&",
                "sudo",
                "mount",
                "-a",
            ],
        )
        .await?;
        Ok(())
    }

    /// Size in GiB of the filesystem mounted at `path`
    pub async fn mounted_size_gb(&self, host: &ServiceHost, path: &str) -> Result<u64, ShareError> {
        let output = self.run(host, &["sudo", "df", "-PBG", path]).await?;
        parse_df_size_gb(&output.stdout).map_err(ShareError::ManageInvalidShare)
    }
}
