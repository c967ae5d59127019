// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Share Orchestrator Application Service
//!
//! Drives the share lifecycle state machine:
//!
//! ```text
//! Requested -> VolumeAllocating -> VolumeAttaching -> Mounting -> Exporting -> Ready
//! Ready -> ExportRemoving -> Unmounting -> Detaching -> VolumeDeallocating -> Deleted
//! ```
//!
//! Coordinates:
//! - Domain layer: VolumeBackend / ComputeBackend / ProtocolExportAdapter contracts
//! - Application layer: MountStateManager, CompletionWaiter
//! - Infrastructure layer: RemoteExecutionChannel, ResourceLockRegistry
//! - Event bus: publishing ShareEvents for observability
//!
//! Any failure aborts the request and surfaces the error; no compensating
//! rollback is attempted. Every step is idempotent or re-checks host state,
//! so retrying the whole request is safe. The one exception is deletion:
//! host-side teardown failures are logged and skipped so the volume is
//! always deallocated.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::completion::CompletionWaiter;
use crate::application::mount_manager::MountStateManager;
use crate::domain::access::AccessRule;
use crate::domain::driver_config::ShareDriverSpec;
use crate::domain::error::ShareError;
use crate::domain::events::ShareEvent;
use crate::domain::export::ProtocolExportAdapter;
use crate::domain::host::{HostId, ServiceHost};
use crate::domain::share::{
    validate_share_name, ManagedShare, Share, ShareId, ShareSnapshot, ShareState,
};
use crate::domain::storage::{BackendError, ComputeBackend, VolumeBackend};
use crate::domain::volume::{
    BackendVolume, CreateVolumeRequest, SnapshotStatus, VolumeId, VolumeSnapshot,
    VolumeSnapshotId, VolumeStatus,
};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::exports::ExportAdapterRegistry;
use crate::infrastructure::locks::{LockKey, ResourceLockRegistry};
use crate::infrastructure::remote::RemoteExecutionChannel;

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait ShareService: Send + Sync {
    /// Allocate, attach, format, mount and export a new share.
    ///
    /// # Returns
    /// * `Ok(Vec<String>)` - Export locations of the share
    async fn create_share(&self, share: &Share, host: &ServiceHost) -> Result<Vec<String>, ShareError>;

    /// Like `create_share`, with the volume cloned from a share snapshot
    /// (no format: the filesystem already exists).
    async fn create_share_from_snapshot(
        &self,
        share: &Share,
        snapshot: &ShareSnapshot,
        host: &ServiceHost,
    ) -> Result<Vec<String>, ShareError>;

    /// Tear a share down. `host` is `None` when the share has no service
    /// host any more; host-side steps are then skipped.
    async fn delete_share(&self, share: &Share, host: Option<&ServiceHost>) -> Result<(), ShareError>;

    async fn create_snapshot(&self, snapshot: &ShareSnapshot) -> Result<VolumeSnapshotId, ShareError>;

    async fn delete_snapshot(&self, snapshot: &ShareSnapshot) -> Result<(), ShareError>;

    /// Re-run attach, mount and export for a share believed ready. A share
    /// without a backend volume is left alone.
    async fn ensure_share(&self, share: &Share, host: &ServiceHost) -> Result<(), ShareError>;

    /// Import a share that was mounted out of band.
    ///
    /// # Arguments
    /// * `volume_id` - Backend volume holding the share data, if known. It
    ///   must be attached to `host`; it is renamed to the share's
    ///   deterministic volume name.
    async fn manage_existing(
        &self,
        share: &Share,
        host: &ServiceHost,
        volume_id: Option<&VolumeId>,
    ) -> Result<ManagedShare, ShareError>;

    async fn allow_access(&self, share: &Share, host: &ServiceHost, rule: &AccessRule) -> Result<(), ShareError>;

    async fn deny_access(
        &self,
        share: &Share,
        host: &ServiceHost,
        rule: &AccessRule,
        force: bool,
    ) -> Result<(), ShareError>;

    /// Check that the host carries the tooling of every enabled protocol
    async fn prepare_host(&self, host: &ServiceHost) -> Result<(), ShareError>;

    /// Forget the pooled session of a host being torn down
    async fn release_host(&self, host: &HostId);

    /// Instance is `Active` on the compute backend and accepts SSH connections
    async fn is_host_active(&self, host: &ServiceHost) -> Result<bool, ShareError>;
}

// ============================================================================
// Standard Implementation
// ============================================================================

pub struct StandardShareService {
    volumes: Arc<dyn VolumeBackend>,
    compute: Arc<dyn ComputeBackend>,
    channel: Arc<RemoteExecutionChannel>,
    locks: ResourceLockRegistry,
    mounts: MountStateManager,
    exports: ExportAdapterRegistry,
    waiter: CompletionWaiter,
    event_bus: Arc<EventBus>,
    spec: ShareDriverSpec,
}

impl StandardShareService {
    pub fn new(
        spec: ShareDriverSpec,
        volumes: Arc<dyn VolumeBackend>,
        compute: Arc<dyn ComputeBackend>,
        channel: Arc<RemoteExecutionChannel>,
        locks: ResourceLockRegistry,
        exports: ExportAdapterRegistry,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let mounts = MountStateManager::new(Arc::clone(&channel), locks.clone(), &spec);
        let waiter = CompletionWaiter::new(spec.timeouts.poll_interval);
        Self {
            volumes,
            compute,
            channel,
            locks,
            mounts,
            exports,
            waiter,
            event_bus,
            spec,
        }
    }

    pub fn mounts(&self) -> &MountStateManager {
        &self.mounts
    }

    fn transition(&self, share_id: ShareId, state: ShareState) {
        debug!(share = %share_id, state = ?state, "Share state transition");
        self.event_bus.publish_share_event(ShareEvent::StateChanged {
            share_id,
            state,
            changed_at: Utc::now(),
        });
    }

    fn adapter(&self, share: &Share) -> Result<Arc<dyn ProtocolExportAdapter>, ShareError> {
        self.exports.get(share.protocol)
    }

    async fn require_active(&self, host: &ServiceHost) -> Result<(), ShareError> {
        if self.is_host_active(host).await? {
            Ok(())
        } else {
            Err(ShareError::BackendUnavailable(format!(
                "service host {} is not active",
                host.instance_id
            )))
        }
    }

    // ------------------------------------------------------------------------
    // Backend lookups
    // ------------------------------------------------------------------------

    async fn find_share_volume(&self, share_id: &ShareId) -> Result<Option<BackendVolume>, ShareError> {
        let name = self.spec.volume_name(&share_id.to_string());
        let mut volumes = self.volumes.list_volumes_by_name(&name, true).await?;
        match volumes.len() {
            0 => Ok(None),
            1 => Ok(volumes.pop()),
            count => Err(ShareError::AmbiguousVolumeName { name, count }),
        }
    }

    async fn find_volume_snapshot(&self, snapshot: &ShareSnapshot) -> Result<Option<VolumeSnapshot>, ShareError> {
        let name = self.spec.snapshot_name(&snapshot.id.to_string());
        let mut snapshots = self.volumes.list_snapshots_by_name(&name).await?;
        match snapshots.len() {
            0 => Ok(None),
            1 => Ok(snapshots.pop()),
            count => Err(ShareError::AmbiguousSnapshotName { name, count }),
        }
    }

    /// `Ok(None)` once the backend no longer knows the volume
    async fn poll_volume_presence(&self, id: &VolumeId) -> Result<Option<BackendVolume>, ShareError> {
        match self.volumes.get_volume(id).await {
            Ok(volume) => Ok(Some(volume)),
            Err(BackendError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ------------------------------------------------------------------------
    // Volume lifecycle steps
    // ------------------------------------------------------------------------

    async fn allocate_volume(
        &self,
        share: &Share,
        source_snapshot: Option<VolumeSnapshotId>,
    ) -> Result<BackendVolume, ShareError> {
        self.transition(share.id, ShareState::VolumeAllocating);

        let request = CreateVolumeRequest {
            name: self.spec.volume_name(&share.id.to_string()),
            size_gb: share.size_gb,
            source_snapshot,
            volume_type: self.spec.volume_type.clone(),
        };
        info!(share = %share.id, volume = %request.name, size_gb = request.size_gb, "Allocating volume");
        let volume = self.volumes.create_volume(request).await?;

        let id = volume.id.clone();
        self.waiter
            .wait_for(
                "volume creation",
                self.spec.timeouts.volume_create,
                || async { self.volumes.get_volume(&id).await.map_err(ShareError::from) },
                |v| v.status == VolumeStatus::Available,
                |v| (v.status == VolumeStatus::Error).then(|| format!("volume {} is in error state", v.id)),
            )
            .await
    }

    async fn attach_volume(
        &self,
        share: &Share,
        host: &ServiceHost,
        volume: BackendVolume,
    ) -> Result<BackendVolume, ShareError> {
        self.transition(share.id, ShareState::VolumeAttaching);

        self.locks
            .with_lock(LockKey::AttachDetach(host.instance_id.clone()), || async {
                if volume.is_in_use() {
                    let attached = self.compute.list_attached_volumes(&host.instance_id).await?;
                    if attached.contains(&volume.id) {
                        debug!(volume = %volume.id, host = %host.instance_id, "Volume is already attached");
                        return Ok(volume);
                    }
                    return Err(ShareError::failed(
                        "volume attach",
                        format!("volume {} is already attached to another instance", volume.id),
                    ));
                }

                info!(volume = %volume.id, host = %host.instance_id, "Attaching volume");
                self.compute.attach_volume(&host.instance_id, &volume.id).await?;

                self.waiter
                    .wait_for(
                        "volume attach",
                        self.spec.timeouts.volume_attach,
                        || async { self.volumes.get_volume(&volume.id).await.map_err(ShareError::from) },
                        BackendVolume::is_in_use,
                        |v| {
                            (v.status != VolumeStatus::Attaching).then(|| {
                                format!("failed to attach volume {}: status {}", v.id, v.status)
                            })
                        },
                    )
                    .await
            })
            .await
    }

    async fn detach_volume(&self, share: &Share, host: &ServiceHost) -> Result<(), ShareError> {
        self.locks
            .with_lock(LockKey::AttachDetach(host.instance_id.clone()), || async {
                let Some(volume) = self.find_share_volume(&share.id).await? else {
                    debug!(share = %share.id, "No volume to detach");
                    return Ok(());
                };

                let attached = self.compute.list_attached_volumes(&host.instance_id).await?;
                if !attached.contains(&volume.id) {
                    debug!(volume = %volume.id, host = %host.instance_id, "Volume is not attached to host");
                    return Ok(());
                }

                info!(volume = %volume.id, host = %host.instance_id, "Detaching volume");
                self.compute.detach_volume(&host.instance_id, &volume.id).await?;

                self.waiter
                    .wait_for(
                        "volume detach",
                        self.spec.timeouts.volume_attach,
                        || async { self.volumes.get_volume(&volume.id).await.map_err(ShareError::from) },
                        |v| v.status.is_detached(),
                        |_| None,
                    )
                    .await
                    .map(|_| ())
            })
            .await
    }

    async fn deallocate_volume(&self, share: &Share) -> Result<(), ShareError> {
        let Some(volume) = self.find_share_volume(&share.id).await? else {
            debug!(share = %share.id, "No volume to deallocate");
            return Ok(());
        };

        if volume.is_in_use() {
            return Err(ShareError::failed(
                "volume deletion",
                format!("volume {} is still in use and cannot be deleted now", volume.id),
            ));
        }

        info!(share = %share.id, volume = %volume.id, "Deleting volume");
        self.volumes.delete_volume(&volume.id).await?;
        self.waiter
            .wait_for_absence("volume deletion", self.spec.timeouts.volume_create, || {
                self.poll_volume_presence(&volume.id)
            })
            .await
    }

    fn device_path(volume: &BackendVolume) -> Result<&str, ShareError> {
        volume.device_path.as_deref().ok_or_else(|| {
            ShareError::failed(
                "volume attach",
                format!("attached volume {} reports no device path", volume.id),
            )
        })
    }

    /// Attach (if needed), optionally format, mount and export
    async fn provision_on_host(
        &self,
        share: &Share,
        host: &ServiceHost,
        volume: BackendVolume,
        format: bool,
        recreate_export: bool,
    ) -> Result<(VolumeId, String), ShareError> {
        let adapter = self.adapter(share)?;
        let volume = self.attach_volume(share, host, volume).await?;
        let device = Self::device_path(&volume)?;

        self.transition(share.id, ShareState::Mounting);
        if format {
            self.mounts
                .format_volume(host, device, self.spec.volume_fstype)
                .await?;
        }
        self.mounts.mount(host, &share.name, device).await?;

        self.transition(share.id, ShareState::Exporting);
        let location = adapter
            .create_export(host, &share.name, recreate_export)
            .await?;
        Ok((volume.id, location))
    }

    fn publish_created(&self, share: &Share, host: &ServiceHost, volume_id: VolumeId, location: &str) {
        self.event_bus.publish_share_event(ShareEvent::ShareCreated {
            share_id: share.id,
            host_id: host.instance_id.clone(),
            volume_id,
            protocol: share.protocol,
            export_location: location.to_string(),
            created_at: Utc::now(),
        });
    }

    /// Run one host-side teardown step; failures are logged and skipped.
    async fn teardown_step<F>(&self, share: &Share, state: ShareState, step: F)
    where
        F: std::future::Future<Output = Result<(), ShareError>> + Send,
    {
        self.transition(share.id, state);
        if let Err(e) = step.await {
            warn!(share = %share.id, state = ?state, error = %e, "Teardown step failed, continuing");
            self.event_bus.publish_share_event(ShareEvent::TeardownStepFailed {
                share_id: share.id,
                state,
                error: e.to_string(),
                failed_at: Utc::now(),
            });
        }
    }
}

#[async_trait]
impl ShareService for StandardShareService {
    async fn create_share(&self, share: &Share, host: &ServiceHost) -> Result<Vec<String>, ShareError> {
        info!(share = %share.id, name = %share.name, protocol = %share.protocol, host = %host.instance_id, "Creating share");
        self.transition(share.id, ShareState::Requested);
        validate_share_name(&share.name)?;
        self.adapter(share)?;
        self.require_active(host).await?;

        let volume = self.allocate_volume(share, None).await?;
        let (volume_id, location) = self
            .provision_on_host(share, host, volume, true, false)
            .await?;

        self.transition(share.id, ShareState::Ready);
        self.publish_created(share, host, volume_id, &location);
        info!(share = %share.id, location = %location, "Share created");
        Ok(vec![location])
    }

    async fn create_share_from_snapshot(
        &self,
        share: &Share,
        snapshot: &ShareSnapshot,
        host: &ServiceHost,
    ) -> Result<Vec<String>, ShareError> {
        info!(share = %share.id, snapshot = %snapshot.id, "Creating share from snapshot");
        self.transition(share.id, ShareState::Requested);
        validate_share_name(&share.name)?;
        self.adapter(share)?;
        self.require_active(host).await?;

        let source = self
            .find_volume_snapshot(snapshot)
            .await?
            .ok_or_else(|| {
                ShareError::SnapshotNotFound(self.spec.snapshot_name(&snapshot.id.to_string()))
            })?;

        let volume = self.allocate_volume(share, Some(source.id)).await?;
        let (volume_id, location) = self
            .provision_on_host(share, host, volume, false, false)
            .await?;

        self.transition(share.id, ShareState::Ready);
        self.publish_created(share, host, volume_id, &location);
        Ok(vec![location])
    }

    async fn delete_share(&self, share: &Share, host: Option<&ServiceHost>) -> Result<(), ShareError> {
        info!(share = %share.id, name = %share.name, "Deleting share");

        let host = match host {
            Some(host) => match self.is_host_active(host).await {
                Ok(true) => Some(host),
                Ok(false) => {
                    warn!(share = %share.id, host = %host.instance_id, "Service host is not active, skipping host-side teardown");
                    None
                }
                Err(e) => {
                    warn!(share = %share.id, host = %host.instance_id, error = %e, "Cannot determine host state, skipping host-side teardown");
                    None
                }
            },
            None => None,
        };

        if let Some(host) = host {
            match self.adapter(share) {
                Ok(adapter) => {
                    self.teardown_step(
                        share,
                        ShareState::ExportRemoving,
                        adapter.remove_export(host, &share.name),
                    )
                    .await;
                }
                Err(e) => warn!(share = %share.id, error = %e, "No export adapter, skipping export removal"),
            }
            self.teardown_step(share, ShareState::Unmounting, self.mounts.unmount(host, &share.name))
                .await;
            self.teardown_step(share, ShareState::Detaching, self.detach_volume(share, host))
                .await;
        }

        self.transition(share.id, ShareState::VolumeDeallocating);
        self.deallocate_volume(share).await?;

        self.transition(share.id, ShareState::Deleted);
        self.event_bus.publish_share_event(ShareEvent::ShareDeleted {
            share_id: share.id,
            deleted_at: Utc::now(),
        });
        info!(share = %share.id, "Share deleted");
        Ok(())
    }

    async fn create_snapshot(&self, snapshot: &ShareSnapshot) -> Result<VolumeSnapshotId, ShareError> {
        let volume = self.find_share_volume(&snapshot.share_id).await?.ok_or_else(|| {
            ShareError::VolumeNotFound(self.spec.volume_name(&snapshot.share_id.to_string()))
        })?;

        let name = self.spec.snapshot_name(&snapshot.id.to_string());
        info!(share = %snapshot.share_id, volume = %volume.id, snapshot = %name, "Creating volume snapshot");
        let created = self.volumes.create_snapshot(&volume.id, &name).await?;

        let id = created.id.clone();
        let ready = self
            .waiter
            .wait_for(
                "snapshot creation",
                self.spec.timeouts.volume_create,
                || async { self.volumes.get_snapshot(&id).await.map_err(ShareError::from) },
                |s| s.status == SnapshotStatus::Available,
                |s| (s.status == SnapshotStatus::Error).then(|| format!("snapshot {} is in error state", s.id)),
            )
            .await?;

        self.event_bus.publish_share_event(ShareEvent::SnapshotCreated {
            share_id: snapshot.share_id,
            snapshot_id: snapshot.id,
            volume_snapshot_id: ready.id.clone(),
            created_at: Utc::now(),
        });
        Ok(ready.id)
    }

    async fn delete_snapshot(&self, snapshot: &ShareSnapshot) -> Result<(), ShareError> {
        let Some(existing) = self.find_volume_snapshot(snapshot).await? else {
            debug!(snapshot = %snapshot.id, "No volume snapshot to delete");
            return Ok(());
        };

        info!(snapshot = %snapshot.id, volume_snapshot = %existing.id, "Deleting volume snapshot");
        self.volumes.delete_snapshot(&existing.id).await?;
        self.waiter
            .wait_for_absence("snapshot deletion", self.spec.timeouts.volume_create, || async {
                match self.volumes.get_snapshot(&existing.id).await {
                    Ok(s) => Ok(Some(s)),
                    Err(BackendError::NotFound(_)) => Ok(None),
                    Err(e) => Err(ShareError::from(e)),
                }
            })
            .await?;

        self.event_bus.publish_share_event(ShareEvent::SnapshotDeleted {
            share_id: snapshot.share_id,
            snapshot_id: snapshot.id,
            deleted_at: Utc::now(),
        });
        Ok(())
    }

    async fn ensure_share(&self, share: &Share, host: &ServiceHost) -> Result<(), ShareError> {
        let Some(volume) = self.find_share_volume(&share.id).await? else {
            warn!(share = %share.id, "Share has no backend volume, nothing to ensure");
            return Ok(());
        };

        info!(share = %share.id, host = %host.instance_id, "Ensuring share");
        self.require_active(host).await?;
        self.provision_on_host(share, host, volume, false, true).await?;
        self.transition(share.id, ShareState::Ready);

        self.event_bus.publish_share_event(ShareEvent::ShareEnsured {
            share_id: share.id,
            host_id: host.instance_id.clone(),
            ensured_at: Utc::now(),
        });
        Ok(())
    }

    async fn manage_existing(
        &self,
        share: &Share,
        host: &ServiceHost,
        volume_id: Option<&VolumeId>,
    ) -> Result<ManagedShare, ShareError> {
        let adapter = self.adapter(share)?;
        let location = share.primary_export_location().ok_or_else(|| {
            ShareError::ManageInvalidShare(format!("share {} has no export location", share.id))
        })?;

        let mount_path = adapter.resolve_mount_path_for_location(host, location).await?;
        if !self.mounts.is_mounted(host, &mount_path, None).await? {
            return Err(ShareError::ManageInvalidShare(format!(
                "share {} is not mounted at {} on {}",
                share.id, mount_path, host.instance_id
            )));
        }

        let size_gb = match volume_id {
            Some(volume_id) => {
                let volume = match self.volumes.get_volume(volume_id).await {
                    Ok(volume) => volume,
                    Err(BackendError::NotFound(_)) => {
                        return Err(ShareError::ManageInvalidShare(format!(
                            "volume {} does not exist",
                            volume_id
                        )))
                    }
                    Err(e) => return Err(e.into()),
                };

                let attached = self.compute.list_attached_volumes(&host.instance_id).await?;
                if !attached.contains(&volume.id) {
                    return Err(ShareError::ManageInvalidShare(format!(
                        "volume {} is not attached to service host {}",
                        volume.id, host.instance_id
                    )));
                }

                let linked_name = self.spec.volume_name(&share.id.to_string());
                if volume.name != linked_name {
                    info!(volume = %volume.id, from = %volume.name, to = %linked_name, "Renaming managed volume");
                    self.volumes.rename_volume(&volume.id, &linked_name).await?;
                }
                volume.size_gb
            }
            None => self.mounts.mounted_size_gb(host, &mount_path).await?,
        };

        let export_locations = adapter.resolve_exports_for_location(host, location).await?;

        info!(share = %share.id, size_gb, "Managed existing share");
        self.event_bus.publish_share_event(ShareEvent::ShareManaged {
            share_id: share.id,
            size_gb,
            managed_at: Utc::now(),
        });
        Ok(ManagedShare {
            size_gb,
            export_locations,
        })
    }

    async fn allow_access(&self, share: &Share, host: &ServiceHost, rule: &AccessRule) -> Result<(), ShareError> {
        let adapter = self.adapter(share)?;
        self.require_active(host).await?;

        adapter
            .allow_access(host, &share.name, rule.access_type, rule.access_level, &rule.access_to)
            .await?;

        self.event_bus.publish_share_event(ShareEvent::AccessGranted {
            share_id: share.id,
            rule: rule.clone(),
            granted_at: Utc::now(),
        });
        Ok(())
    }

    async fn deny_access(
        &self,
        share: &Share,
        host: &ServiceHost,
        rule: &AccessRule,
        force: bool,
    ) -> Result<(), ShareError> {
        let adapter = self.adapter(share)?;
        adapter.deny_access(host, &share.name, rule, force).await?;

        self.event_bus.publish_share_event(ShareEvent::AccessRevoked {
            share_id: share.id,
            rule: rule.clone(),
            revoked_at: Utc::now(),
        });
        Ok(())
    }

    async fn prepare_host(&self, host: &ServiceHost) -> Result<(), ShareError> {
        try_join_all(self.exports.adapters().map(|adapter| {
            debug!(host = %host.instance_id, protocol = %adapter.protocol(), "Checking export tooling");
            adapter.init(host)
        }))
        .await?;
        info!(host = %host.instance_id, protocols = ?self.exports.protocols(), "Service host prepared");
        Ok(())
    }

    async fn release_host(&self, host: &HostId) {
        self.channel.release(host).await;
    }

    async fn is_host_active(&self, host: &ServiceHost) -> Result<bool, ShareError> {
        let status = match self.compute.instance_status(&host.instance_id).await {
            Ok(status) => status,
            Err(BackendError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if !status.is_active() {
            debug!(host = %host.instance_id, status = ?status, "Service host instance is not active");
            return Ok(false);
        }
        Ok(self.channel.probe(host).await)
    }
}
