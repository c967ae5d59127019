// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service Host Value Objects
//!
//! A service host is the compute instance that carries mounted share
//! filesystems and serves their exports. Hosts are allocated by an external
//! provisioning collaborator; the orchestrator only receives a handle with
//! enough connection metadata to reach the host over SSH.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Opaque compute instance identifier of a service host
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId(pub String);

impl HostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Login material for the privileged service account on a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCredentials {
    pub username: String,

    /// Private key used for the SSH login. When absent the agent or the
    /// user's default identities are used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,

    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

fn default_ssh_port() -> u16 {
    22
}

impl HostCredentials {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            private_key_path: None,
            port: default_ssh_port(),
        }
    }

    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

/// Handle to a service host, as supplied by the provisioning collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHost {
    pub instance_id: HostId,

    /// Address used for the management (SSH) connection
    pub address: String,

    /// Address advertised to share clients in export locations. Falls back
    /// to `address` when the host has a single network.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_address: Option<String>,

    pub credentials: HostCredentials,
}

impl ServiceHost {
    pub fn new(
        instance_id: impl Into<String>,
        address: impl Into<String>,
        credentials: HostCredentials,
    ) -> Self {
        Self {
            instance_id: HostId::new(instance_id),
            address: address.into(),
            public_address: None,
            credentials,
        }
    }

    pub fn with_public_address(mut self, address: impl Into<String>) -> Self {
        self.public_address = Some(address.into());
        self
    }

    pub fn export_address(&self) -> &str {
        self.public_address.as_deref().unwrap_or(&self.address)
    }

    /// `user@address` destination string for SSH
    pub fn ssh_destination(&self) -> String {
        format!("{}@{}", self.credentials.username, self.address)
    }
}

/// Compute-level state of the instance backing a service host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Active,
    Building,
    Shutoff,
    Error,
    Other(String),
}

impl InstanceStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_address_fallback() {
        let host = ServiceHost::new("inst-1", "10.254.0.3", HostCredentials::new("manila"));
        assert_eq!(host.export_address(), "10.254.0.3");

        let host = host.with_public_address("192.168.10.7");
        assert_eq!(host.export_address(), "192.168.10.7");
        assert_eq!(host.ssh_destination(), "manila@10.254.0.3");
    }

    #[test]
    fn test_credentials_default_port() {
        let creds: HostCredentials = serde_yaml::from_str("username: manila\n").unwrap();
        assert_eq!(creds.port, 22);
        assert!(creds.private_key_path.is_none());
    }
}
