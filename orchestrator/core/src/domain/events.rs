// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Share Domain Events
//!
//! Published on the in-process event bus for observability of share
//! lifecycle requests. Events are informational only; no orchestration
//! decision depends on a subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::access::AccessRule;
use crate::domain::host::HostId;
use crate::domain::share::{ShareId, ShareProtocol, ShareSnapshotId, ShareState};
use crate::domain::volume::{VolumeId, VolumeSnapshotId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ShareEvent {
    StateChanged {
        share_id: ShareId,
        state: ShareState,
        changed_at: DateTime<Utc>,
    },
    ShareCreated {
        share_id: ShareId,
        host_id: HostId,
        volume_id: VolumeId,
        protocol: ShareProtocol,
        export_location: String,
        created_at: DateTime<Utc>,
    },
    ShareDeleted {
        share_id: ShareId,
        deleted_at: DateTime<Utc>,
    },
    ShareEnsured {
        share_id: ShareId,
        host_id: HostId,
        ensured_at: DateTime<Utc>,
    },
    ShareManaged {
        share_id: ShareId,
        size_gb: u64,
        managed_at: DateTime<Utc>,
    },
    SnapshotCreated {
        share_id: ShareId,
        snapshot_id: ShareSnapshotId,
        volume_snapshot_id: VolumeSnapshotId,
        created_at: DateTime<Utc>,
    },
    SnapshotDeleted {
        share_id: ShareId,
        snapshot_id: ShareSnapshotId,
        deleted_at: DateTime<Utc>,
    },
    AccessGranted {
        share_id: ShareId,
        rule: AccessRule,
        granted_at: DateTime<Utc>,
    },
    AccessRevoked {
        share_id: ShareId,
        rule: AccessRule,
        revoked_at: DateTime<Utc>,
    },
    /// A host-side teardown step failed and was skipped so the volume could
    /// still be deallocated.
    TeardownStepFailed {
        share_id: ShareId,
        state: ShareState,
        error: String,
        failed_at: DateTime<Utc>,
    },
}

impl ShareEvent {
    pub fn share_id(&self) -> ShareId {
        match self {
            Self::StateChanged { share_id, .. }
            | Self::ShareCreated { share_id, .. }
            | Self::ShareDeleted { share_id, .. }
            | Self::ShareEnsured { share_id, .. }
            | Self::ShareManaged { share_id, .. }
            | Self::SnapshotCreated { share_id, .. }
            | Self::SnapshotDeleted { share_id, .. }
            | Self::AccessGranted { share_id, .. }
            | Self::AccessRevoked { share_id, .. }
            | Self::TeardownStepFailed { share_id, .. } => *share_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::access::AccessLevel;

    #[test]
    fn test_state_changed_serialization() {
        let event = ShareEvent::StateChanged {
            share_id: ShareId::new(),
            state: ShareState::VolumeAttaching,
            changed_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "state_changed");
        assert_eq!(json["state"], "volume_attaching");
    }

    #[test]
    fn test_share_id_accessor() {
        let share_id = ShareId::new();
        let event = ShareEvent::AccessGranted {
            share_id,
            rule: AccessRule::ip("10.0.0.8", AccessLevel::Rw),
            granted_at: Utc::now(),
        };
        assert_eq!(event.share_id(), share_id);

        let json = serde_json::to_string(&event).unwrap();
        let parsed: ShareEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.share_id(), share_id);
    }
}
