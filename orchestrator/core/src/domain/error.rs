// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Share Error Taxonomy
//!
//! Every failure surfaced by the orchestration core is one of the variants of
//! [`ShareError`]. Callers decide on retries by kind:
//!
//! | Kind | Meaning | Retry? |
//! |------|---------|--------|
//! | `Configuration` | Adapter wiring or settings are wrong | No, fatal at startup |
//! | `BackendUnavailable` | Host or backend service unreachable | Later |
//! | `OperationTimeout` | Backend never reached the target state | Wait longer |
//! | `OperationFailed` | Backend reported an error state | No |
//! | `RemoteCommand` / `BackendCommand` | Privileged command exited non-zero | Caller decides |
//! | `AccessRuleExists` / `ExportAlreadyExists` / `ManageInvalidShare` | Caller-correctable precondition | No |

use std::time::Duration;
use thiserror::Error;

use crate::domain::storage::BackendError;
use crate::domain::host::HostId;
use crate::infrastructure::remote::RemoteCommandError;

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("{operation} did not complete within {}s. Giving up", .waited.as_secs())]
    OperationTimeout {
        operation: String,
        waited: Duration,
    },

    #[error("{operation} failed: {reason}")]
    OperationFailed {
        operation: String,
        reason: String,
    },

    #[error(transparent)]
    RemoteCommand(RemoteCommandError),

    #[error("Command failed on service host '{host}': {source}")]
    BackendCommand {
        host: HostId,
        #[source]
        source: RemoteCommandError,
    },

    #[error("Access rule of type '{access_type}' for '{access_to}' already exists")]
    AccessRuleExists {
        access_type: String,
        access_to: String,
    },

    #[error("Export '{0}' already exists")]
    ExportAlreadyExists(String),

    #[error("Cannot manage share: {0}")]
    ManageInvalidShare(String),

    #[error("Unsupported access type '{0}': only 'ip' access is allowed")]
    UnsupportedAccessType(String),

    #[error("Invalid access level '{0}'")]
    InvalidAccessLevel(String),

    #[error("Invalid access target '{0}': expected an IP address or CIDR block")]
    InvalidAccessTarget(String),

    #[error("Invalid export location '{0}'")]
    InvalidExportLocation(String),

    #[error("Invalid share name '{0}'")]
    InvalidShareName(String),

    #[error("Ambiguous volumes for name '{name}': {count} matches")]
    AmbiguousVolumeName {
        name: String,
        count: usize,
    },

    #[error("Ambiguous volume snapshots for name '{name}': {count} matches")]
    AmbiguousSnapshotName {
        name: String,
        count: usize,
    },

    #[error("Backend volume not found: {0}")]
    VolumeNotFound(String),

    #[error("Backend volume snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("Backend error: {0}")]
    Backend(BackendError),
}

impl ShareError {
    pub fn failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a command failure as a host-side backend failure.
    pub fn backend_command(host: &HostId, source: RemoteCommandError) -> Self {
        match source {
            RemoteCommandError::Connection { .. } => Self::BackendUnavailable(source.to_string()),
            source => Self::BackendCommand {
                host: host.clone(),
                source,
            },
        }
    }

    /// Stderr captured from a failed privileged command, if this error carries one.
    pub fn command_stderr(&self) -> Option<&str> {
        match self {
            Self::RemoteCommand(e) | Self::BackendCommand { source: e, .. } => e.stderr(),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::OperationTimeout { .. })
    }
}

impl From<BackendError> for ShareError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Unavailable(msg) => ShareError::BackendUnavailable(msg),
            other => ShareError::Backend(other),
        }
    }
}

impl From<RemoteCommandError> for ShareError {
    fn from(err: RemoteCommandError) -> Self {
        match err {
            RemoteCommandError::Connection { .. } => ShareError::BackendUnavailable(err.to_string()),
            other => ShareError::RemoteCommand(other),
        }
    }
}
