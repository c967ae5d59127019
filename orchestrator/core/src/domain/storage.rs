// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Storage and Compute Backend Traits - Anti-Corruption Layer
//!
//! The block-storage service (volumes, snapshots) and the compute service
//! (instance volume attachments) are opaque remote collaborators. Every
//! mutating call is asynchronous on the backend side: it returns as soon as
//! the request is accepted and completion is observed only by polling the
//! `get_*` calls (see `application::completion`).
//!
//! The traits isolate the orchestration core from the concrete cloud APIs and
//! allow testing with in-memory mocks.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::host::{HostId, InstanceStatus};
use crate::domain::volume::{
    BackendVolume, CreateVolumeRequest, VolumeId, VolumeSnapshot, VolumeSnapshotId,
};

/// Block-storage backend contract
#[async_trait]
pub trait VolumeBackend: Send + Sync {
    /// Request a new volume, optionally cloned from a snapshot.
    ///
    /// # Returns
    /// * `Ok(BackendVolume)` - The volume as first reported (usually `creating`)
    async fn create_volume(&self, request: CreateVolumeRequest) -> Result<BackendVolume, BackendError>;

    /// Get current volume state
    ///
    /// # Returns
    /// * `Err(BackendError::NotFound)` once the volume has been deleted
    async fn get_volume(&self, id: &VolumeId) -> Result<BackendVolume, BackendError>;

    /// Request volume deletion
    async fn delete_volume(&self, id: &VolumeId) -> Result<(), BackendError>;

    /// Change the display name of a volume
    async fn rename_volume(&self, id: &VolumeId, name: &str) -> Result<(), BackendError>;

    /// List volumes whose name equals `name`
    ///
    /// # Arguments
    /// * `all_tenants` - Search across every tenant (admin context)
    async fn list_volumes_by_name(
        &self,
        name: &str,
        all_tenants: bool,
    ) -> Result<Vec<BackendVolume>, BackendError>;

    /// Request a snapshot of a volume, even if the volume is attached
    async fn create_snapshot(
        &self,
        volume_id: &VolumeId,
        name: &str,
    ) -> Result<VolumeSnapshot, BackendError>;

    /// Get current snapshot state
    ///
    /// # Returns
    /// * `Err(BackendError::NotFound)` once the snapshot has been deleted
    async fn get_snapshot(&self, id: &VolumeSnapshotId) -> Result<VolumeSnapshot, BackendError>;

    /// Request snapshot deletion
    async fn delete_snapshot(&self, id: &VolumeSnapshotId) -> Result<(), BackendError>;

    /// List snapshots whose name equals `name`
    async fn list_snapshots_by_name(&self, name: &str) -> Result<Vec<VolumeSnapshot>, BackendError>;
}

/// Compute backend contract (instance volume attachments)
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    async fn attach_volume(&self, host: &HostId, volume: &VolumeId) -> Result<(), BackendError>;

    async fn detach_volume(&self, host: &HostId, volume: &VolumeId) -> Result<(), BackendError>;

    /// Volumes currently attached to the instance
    async fn list_attached_volumes(&self, host: &HostId) -> Result<Vec<VolumeId>, BackendError>;

    /// Compute-level status of the instance
    ///
    /// # Returns
    /// * `Err(BackendError::NotFound)` if the instance no longer exists
    async fn instance_status(&self, host: &HostId) -> Result<InstanceStatus, BackendError>;
}

/// Errors reported by backend collaborators
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected by backend: {0}")]
    Rejected(String),

    #[error("Unknown backend error: {0}")]
    Unknown(String),
}

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
