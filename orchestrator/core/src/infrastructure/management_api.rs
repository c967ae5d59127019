// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Vendor Storage Management Client
//!
//! Thin client for storage controllers that expose an iterator-style
//! management API: each request is an operation name plus an argument tree,
//! each response an attribute tree with a `num-records` count. Failures carry
//! a numeric error code.
//!
//! Idempotent operations swallow the error code meaning "already in the
//! desired state" and propagate everything else:
//!
//! | Operation | Tolerated code |
//! |-----------|----------------|
//! | `offline_volume` | [`EVOLUMEOFFLINE`] |
//! | `unmount_volume` | [`EVOL_NOT_MOUNTED`] |
//! | `create_export_policy` | [`EDUPLICATEENTRY`] |
//! | `delete_export_policy`, `remove_export_rule` | [`EOBJECTNOTFOUND`] |

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::storage::BackendError;

pub const ESNAPSHOTNOTALLOWED: u32 = 13023;
pub const EVOLUMEOFFLINE: u32 = 13042;
pub const EDUPLICATEENTRY: u32 = 13130;
pub const EVOL_NOT_MOUNTED: u32 = 14716;
pub const EOBJECTNOTFOUND: u32 = 15661;

/// Prefix given to export policies that could not be deleted yet
pub const DELETED_PREFIX: &str = "deleted_manila_";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagementApiError {
    #[error("Management API error {code}: {message}")]
    Api { code: u32, message: String },

    #[error("Management API transport error: {0}")]
    Transport(String),

    #[error("Malformed response to {api}: {reason}")]
    MalformedResponse { api: String, reason: String },

    #[error("Snapshot {snapshot} not found on volume {volume}")]
    SnapshotNotFound { volume: String, snapshot: String },

    #[error("Snapshot {snapshot} is unavailable: {reason}")]
    SnapshotUnavailable { snapshot: String, reason: String },

    #[error("Snapshot {snapshot} is busy (owners: {owners:?})")]
    SnapshotBusy {
        snapshot: String,
        owners: BTreeSet<String>,
    },
}

impl ManagementApiError {
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<ManagementApiError> for BackendError {
    fn from(err: ManagementApiError) -> Self {
        match err {
            ManagementApiError::Transport(msg) => BackendError::Unavailable(msg),
            e @ ManagementApiError::SnapshotNotFound { .. } => BackendError::NotFound(e.to_string()),
            e @ ManagementApiError::Api {
                code: EOBJECTNOTFOUND,
                ..
            } => BackendError::NotFound(e.to_string()),
            e @ ManagementApiError::MalformedResponse { .. } => BackendError::Unknown(e.to_string()),
            e => BackendError::Rejected(e.to_string()),
        }
    }
}

/// Sends one management request and returns the raw response tree
#[async_trait]
pub trait ManagementTransport: Send + Sync {
    async fn invoke(&self, api: &str, args: Value) -> Result<Value, ManagementApiError>;
}

/// Snapshot details as reported by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub name: String,
    pub volume: String,
    pub busy: bool,
    pub owners: BTreeSet<String>,
}

pub struct ManagementClient {
    transport: Arc<dyn ManagementTransport>,
}

fn tolerate(result: Result<Value, ManagementApiError>, code: u32) -> Result<(), ManagementApiError> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.code() == Some(code) => {
            debug!(code, "Tolerating management API error: {}", e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Whether a response carries at least one record
pub fn has_records(response: &Value) -> bool {
    let count = match response.get("num-records") {
        Some(Value::String(s)) => s.parse::<u64>().unwrap_or(0),
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        _ => 0,
    };
    count > 0
}

fn attributes_list(response: &Value) -> &[Value] {
    response
        .get("attributes-list")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn parse_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

impl ManagementClient {
    pub fn new(transport: Arc<dyn ManagementTransport>) -> Self {
        Self { transport }
    }

    async fn send(&self, api: &str, args: Value) -> Result<Value, ManagementApiError> {
        debug!(api, "Sending management request");
        self.transport.invoke(api, args).await
    }

    pub async fn volume_exists(&self, volume_name: &str) -> Result<bool, ManagementApiError> {
        let args = json!({
            "query": {"volume-attributes": {"volume-id-attributes": {"name": volume_name}}},
            "desired-attributes": {"volume-attributes": {"volume-id-attributes": {"name": null}}},
        });
        let response = self.send("volume-get-iter", args).await?;
        Ok(has_records(&response))
    }

    pub async fn offline_volume(&self, volume_name: &str) -> Result<(), ManagementApiError> {
        let result = self.send("volume-offline", json!({"name": volume_name})).await;
        tolerate(result, EVOLUMEOFFLINE)
    }

    pub async fn unmount_volume(&self, volume_name: &str, force: bool) -> Result<(), ManagementApiError> {
        let args = json!({"volume-name": volume_name, "force": force.to_string()});
        let result = self.send("volume-unmount", args).await;
        tolerate(result, EVOL_NOT_MOUNTED)
    }

    pub async fn delete_volume(&self, volume_name: &str) -> Result<(), ManagementApiError> {
        self.send("volume-destroy", json!({"name": volume_name})).await?;
        Ok(())
    }

    pub async fn create_export_policy(&self, policy_name: &str) -> Result<(), ManagementApiError> {
        let result = self
            .send("export-policy-create", json!({"policy-name": policy_name}))
            .await;
        tolerate(result, EDUPLICATEENTRY)
    }

    pub async fn delete_export_policy(&self, policy_name: &str) -> Result<(), ManagementApiError> {
        let result = self
            .send("export-policy-destroy", json!({"policy-name": policy_name}))
            .await;
        tolerate(result, EOBJECTNOTFOUND)
    }

    /// Delete a policy; if the controller refuses (it may still be bound to a
    /// volume), rename it with [`DELETED_PREFIX`] for later cleanup.
    pub async fn soft_delete_export_policy(&self, policy_name: &str) -> Result<(), ManagementApiError> {
        if let Err(e) = self.delete_export_policy(policy_name).await {
            warn!(policy = policy_name, error = %e, "Export policy deletion failed, renaming it");
            let args = json!({
                "policy-name": policy_name,
                "new-policy-name": format!("{}{}", DELETED_PREFIX, policy_name),
            });
            self.send("export-policy-rename", args).await?;
        }
        Ok(())
    }

    async fn export_rule_indices(
        &self,
        policy_name: &str,
        client_match: &str,
    ) -> Result<Vec<u64>, ManagementApiError> {
        let args = json!({
            "query": {"export-rule-info": {"policy-name": policy_name, "client-match": client_match}},
            "desired-attributes": {"export-rule-info": {"rule-index": null}},
        });
        let response = self.send("export-rule-get-iter", args).await?;

        let mut indices = attributes_list(&response)
            .iter()
            .map(|rule| {
                let index = rule.get("rule-index");
                index
                    .and_then(Value::as_u64)
                    .or_else(|| index.and_then(Value::as_str).and_then(|s| s.parse().ok()))
                    .ok_or_else(|| ManagementApiError::MalformedResponse {
                        api: "export-rule-get-iter".to_string(),
                        reason: format!("bad rule-index in {}", rule),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        indices.sort_unstable();
        Ok(indices)
    }

    /// Remove every rule of the policy matching `client_match`. Rules that
    /// disappear concurrently are ignored.
    pub async fn remove_export_rule(
        &self,
        policy_name: &str,
        client_match: &str,
    ) -> Result<(), ManagementApiError> {
        for index in self.export_rule_indices(policy_name, client_match).await? {
            let args = json!({"policy-name": policy_name, "rule-index": index.to_string()});
            let result = self.send("export-rule-destroy", args).await;
            tolerate(result, EOBJECTNOTFOUND)?;
        }
        Ok(())
    }

    pub async fn get_snapshot(
        &self,
        volume_name: &str,
        snapshot_name: &str,
    ) -> Result<ControllerSnapshot, ManagementApiError> {
        let args = json!({
            "query": {"snapshot-info": {"name": snapshot_name, "volume": volume_name}},
            "desired-attributes": {"snapshot-info": {
                "name": null, "volume": null, "busy": null,
                "snapshot-owners-list": {"snapshot-owner": null},
            }},
        });
        let response = self.send("snapshot-get-iter", args).await?;

        if let Some(error) = response
            .get("volume-errors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
        {
            let code = error
                .get("errno")
                .and_then(|c| c.as_u64().or_else(|| c.as_str().and_then(|s| s.parse().ok())));
            let reason = error
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(match code {
                Some(c) if c == u64::from(ESNAPSHOTNOTALLOWED) => {
                    ManagementApiError::SnapshotUnavailable {
                        snapshot: snapshot_name.to_string(),
                        reason,
                    }
                }
                Some(c) => ManagementApiError::Api {
                    code: u32::try_from(c).unwrap_or(u32::MAX),
                    message: reason,
                },
                None => ManagementApiError::MalformedResponse {
                    api: "snapshot-get-iter".to_string(),
                    reason: format!("volume error without errno: {}", reason),
                },
            });
        }

        if !has_records(&response) {
            return Err(ManagementApiError::SnapshotNotFound {
                volume: volume_name.to_string(),
                snapshot: snapshot_name.to_string(),
            });
        }

        let records = attributes_list(&response);
        let info = match records {
            [info] => info,
            _ => {
                return Err(ManagementApiError::MalformedResponse {
                    api: "snapshot-get-iter".to_string(),
                    reason: format!(
                        "expected one snapshot {} on volume {}, got {}",
                        snapshot_name,
                        volume_name,
                        records.len()
                    ),
                })
            }
        };

        let owners = info
            .get("snapshot-owners-list")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|o| o.get("owner").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(ControllerSnapshot {
            name: info
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(snapshot_name)
                .to_string(),
            volume: info
                .get("volume")
                .and_then(Value::as_str)
                .unwrap_or(volume_name)
                .to_string(),
            busy: parse_bool(info.get("busy")),
            owners,
        })
    }

    /// Delete a snapshot that no other entity depends on
    pub async fn delete_snapshot(
        &self,
        volume_name: &str,
        snapshot_name: &str,
    ) -> Result<(), ManagementApiError> {
        let snapshot = self.get_snapshot(volume_name, snapshot_name).await?;
        if snapshot.busy || !snapshot.owners.is_empty() {
            return Err(ManagementApiError::SnapshotBusy {
                snapshot: snapshot_name.to_string(),
                owners: snapshot.owners,
            });
        }

        let args = json!({"volume": volume_name, "snapshot": snapshot_name});
        self.send("snapshot-delete", args).await?;
        Ok(())
    }
}
