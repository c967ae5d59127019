// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Share Aggregate
//!
//! A share is a network file share backed by exactly one block volume that is
//! attached to at most one service host at a time. Its lifecycle is driven by
//! the share orchestrator through the states in [`ShareState`].

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::error::ShareError;

// ============================================================================
// Value Objects
// ============================================================================

/// Unique identifier for a share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShareId(pub Uuid);

impl ShareId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ShareId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ShareId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a share snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShareSnapshotId(pub Uuid);

impl ShareSnapshotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ShareSnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ShareSnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// File sharing protocol a share is exported over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShareProtocol {
    Nfs,
    Cifs,
}

impl ShareProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nfs => "NFS",
            Self::Cifs => "CIFS",
        }
    }
}

impl std::fmt::Display for ShareProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShareProtocol {
    type Err = ShareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NFS" => Ok(Self::Nfs),
            "CIFS" => Ok(Self::Cifs),
            other => Err(ShareError::Configuration(format!(
                "Wrong, unsupported or disabled protocol '{}'",
                other
            ))),
        }
    }
}

/// Lifecycle states a share passes through during one lifecycle request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareState {
    Requested,
    VolumeAllocating,
    VolumeAttaching,
    Mounting,
    Exporting,
    Ready,
    ExportRemoving,
    Unmounting,
    Detaching,
    VolumeDeallocating,
    Deleted,
}

impl ShareState {
    /// Whether the state belongs to the teardown half of the lifecycle
    pub fn is_teardown(&self) -> bool {
        matches!(
            self,
            Self::ExportRemoving
                | Self::Unmounting
                | Self::Detaching
                | Self::VolumeDeallocating
                | Self::Deleted
        )
    }
}

// ============================================================================
// Aggregate Root: Share
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub id: ShareId,

    /// Share name; also the last component of its mount path on the host
    pub name: String,

    /// Requested size in GiB
    pub size_gb: u64,

    pub protocol: ShareProtocol,

    #[serde(default)]
    pub export_locations: Vec<String>,
}

impl Share {
    pub fn new(name: impl Into<String>, size_gb: u64, protocol: ShareProtocol) -> Self {
        Self {
            id: ShareId::new(),
            name: name.into(),
            size_gb,
            protocol,
            export_locations: Vec::new(),
        }
    }

    pub fn with_export_location(mut self, location: impl Into<String>) -> Self {
        self.export_locations.push(location.into());
        self
    }

    pub fn primary_export_location(&self) -> Option<&str> {
        self.export_locations.first().map(String::as_str)
    }
}

/// Check that `name` can be used as a path component and as a Samba share
/// name. Only ASCII letters, digits, `-`, `_` and `.` are accepted.
pub fn validate_share_name(name: &str) -> Result<(), ShareError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ShareError::InvalidShareName(name.to_string()))
    }
}

/// Snapshot of a share, backed by a volume snapshot of the share's volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareSnapshot {
    pub id: ShareSnapshotId,
    pub share_id: ShareId,
}

impl ShareSnapshot {
    pub fn new(share_id: ShareId) -> Self {
        Self {
            id: ShareSnapshotId::new(),
            share_id,
        }
    }
}

/// Result of importing an out-of-band share into the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedShare {
    pub size_gb: u64,
    pub export_locations: Vec<String>,
}
