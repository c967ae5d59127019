// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Backend Volume and Snapshot Value Objects
//!
//! Cached copies of what the block-storage backend reports. These are never
//! written locally except as a snapshot of backend-reported state; every
//! transition happens through a backend call and is observed by polling.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// Value Objects
// ============================================================================

/// Backend-assigned volume identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VolumeId(pub String);

impl VolumeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend-assigned volume snapshot identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VolumeSnapshotId(pub String);

impl VolumeSnapshotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for VolumeSnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Volume status as reported by the block-storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolumeStatus {
    Creating,
    Available,
    Attaching,
    InUse,
    Detaching,
    Deleting,
    Error,
    Deleted,
}

impl VolumeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Available => "available",
            Self::Attaching => "attaching",
            Self::InUse => "in-use",
            Self::Detaching => "detaching",
            Self::Deleting => "deleting",
            Self::Error => "error",
            Self::Deleted => "deleted",
        }
    }

    /// Terminal states of a detach request
    pub fn is_detached(&self) -> bool {
        matches!(self, Self::Available | Self::Error)
    }
}

impl std::fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Volume snapshot status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Creating,
    Available,
    Deleting,
    Error,
}

// ============================================================================
// Backend resources
// ============================================================================

/// Block volume as last reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendVolume {
    pub id: VolumeId,
    pub name: String,
    pub size_gb: u64,
    pub status: VolumeStatus,

    /// Device path on the host the volume is attached to (e.g. `/dev/vdb`).
    /// Only set once the volume is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_path: Option<String>,
}

impl BackendVolume {
    pub fn is_in_use(&self) -> bool {
        self.status == VolumeStatus::InUse
    }
}

/// Point-in-time copy of a backend volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSnapshot {
    pub id: VolumeSnapshotId,
    pub volume_id: VolumeId,
    pub name: String,
    pub status: SnapshotStatus,

    /// Entities currently depending on this snapshot (clones, mirrors).
    /// A snapshot with owners cannot be deleted.
    #[serde(default)]
    pub owners: BTreeSet<String>,
}

/// Parameters for a volume allocation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVolumeRequest {
    pub name: String,
    pub size_gb: u64,
    pub source_snapshot: Option<VolumeSnapshotId>,
    pub volume_type: Option<String>,
}
