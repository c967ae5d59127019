// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Share Driver Configuration
//
// Defines the static configuration of the share orchestration engine:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Mount root and filesystem choice for share volumes
// - Deterministic naming templates for backend volumes and snapshots
// - Completion budgets for backend state transitions
// - Enabled export protocols and their persistence files
// - SSH connection policy for service hosts

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::mount::FilesystemType;
use crate::domain::share::ShareProtocol;

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "ShareDriverConfig";

/// Top-level Kubernetes-style driver configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareDriverConfig {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ShareDriverConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: ShareDriverSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareDriverSpec {
    /// Parent directory for share mount points on service hosts
    #[serde(default = "default_share_mount_path")]
    pub share_mount_path: String,

    #[serde(default)]
    pub volume_fstype: FilesystemType,

    /// Backend volume name for a share; `{id}` is replaced by the share id
    #[serde(default = "default_volume_name_template")]
    pub volume_name_template: String,

    /// Backend snapshot name for a share snapshot; `{id}` is replaced by the
    /// share snapshot id
    #[serde(default = "default_snapshot_name_template")]
    pub snapshot_name_template: String,

    /// Backend volume type requested for new volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,

    #[serde(default = "default_enabled_protocols")]
    pub enabled_protocols: Vec<ShareProtocol>,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub mount_files: MountFilesConfig,

    #[serde(default)]
    pub nfs: NfsConfig,

    #[serde(default)]
    pub ssh: SshConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Budget for volume creation and deletion
    #[serde(default = "default_volume_create_timeout", with = "humantime_serde")]
    pub volume_create: Duration,

    /// Budget for volume attach and detach
    #[serde(default = "default_volume_attach_timeout", with = "humantime_serde")]
    pub volume_attach: Duration,

    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

/// Mount table files on the service host. `staged` is the live table the
/// `mount` command maintains; it is copied over `fstab` after every change so
/// mounts survive a reboot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountFilesConfig {
    #[serde(default = "default_fstab")]
    pub fstab: String,

    #[serde(default = "default_staged_fstab")]
    pub staged: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NfsConfig {
    #[serde(default = "default_exports_file")]
    pub exports_file: String,

    /// Kernel export table that `exportfs` maintains
    #[serde(default = "default_etab_file")]
    pub etab_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnownHostsPolicy {
    /// Reject hosts whose key is not already known
    Strict,
    /// Record unknown host keys, reject changed ones
    Add,
    /// Accept any host key
    Accept,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    #[serde(default = "default_known_hosts")]
    pub known_hosts: KnownHostsPolicy,
}

fn default_share_mount_path() -> String {
    "/shares".to_string()
}

fn default_volume_name_template() -> String {
    "manila-share-{id}".to_string()
}

fn default_snapshot_name_template() -> String {
    "manila-snapshot-{id}".to_string()
}

fn default_enabled_protocols() -> Vec<ShareProtocol> {
    vec![ShareProtocol::Nfs, ShareProtocol::Cifs]
}

fn default_volume_create_timeout() -> Duration {
    Duration::from_secs(180)
}

fn default_volume_attach_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_fstab() -> String {
    "/etc/fstab".to_string()
}

fn default_staged_fstab() -> String {
    "/etc/mtab".to_string()
}

fn default_exports_file() -> String {
    "/etc/exports".to_string()
}

fn default_etab_file() -> String {
    "/var/lib/nfs/etab".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_known_hosts() -> KnownHostsPolicy {
    KnownHostsPolicy::Add
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            volume_create: default_volume_create_timeout(),
            volume_attach: default_volume_attach_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl Default for MountFilesConfig {
    fn default() -> Self {
        Self {
            fstab: default_fstab(),
            staged: default_staged_fstab(),
        }
    }
}

impl Default for NfsConfig {
    fn default() -> Self {
        Self {
            exports_file: default_exports_file(),
            etab_file: default_etab_file(),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            known_hosts: default_known_hosts(),
        }
    }
}

impl Default for ShareDriverSpec {
    fn default() -> Self {
        Self {
            share_mount_path: default_share_mount_path(),
            volume_fstype: FilesystemType::default(),
            volume_name_template: default_volume_name_template(),
            snapshot_name_template: default_snapshot_name_template(),
            volume_type: None,
            enabled_protocols: default_enabled_protocols(),
            timeouts: TimeoutConfig::default(),
            mount_files: MountFilesConfig::default(),
            nfs: NfsConfig::default(),
            ssh: SshConfig::default(),
        }
    }
}

impl Default for ShareDriverConfig {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "aegis-shares".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: ShareDriverSpec::default(),
        }
    }
}

impl ShareDriverSpec {
    /// Mount path of a share on its service host
    pub fn mount_path(&self, share_name: &str) -> String {
        format!("{}/{}", self.share_mount_path.trim_end_matches('/'), share_name)
    }

    pub fn volume_name(&self, share_id: &str) -> String {
        self.volume_name_template.replace("{id}", share_id)
    }

    pub fn snapshot_name(&self, snapshot_id: &str) -> String {
        self.snapshot_name_template.replace("{id}", snapshot_id)
    }
}

impl ShareDriverConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. AEGIS_SHARES_CONFIG_PATH environment variable
    /// 2. ./aegis-shares.yaml (working directory)
    /// 3. ~/.aegis/shares.yaml (user home)
    /// 4. /etc/aegis/shares.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AEGIS_SHARES_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./aegis-shares.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".aegis").join("shares.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/aegis/shares.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AEGIS_SHARES_MOUNT_PATH") {
            tracing::info!("Environment override: AEGIS_SHARES_MOUNT_PATH={}", val);
            self.spec.share_mount_path = val;
        }

        if let Ok(val) = std::env::var("AEGIS_SHARES_VOLUME_FSTYPE") {
            match val.parse::<FilesystemType>() {
                Ok(fstype) => {
                    tracing::info!("Environment override: AEGIS_SHARES_VOLUME_FSTYPE={}", val);
                    self.spec.volume_fstype = fstype;
                }
                Err(e) => {
                    tracing::warn!(
                        "Invalid value for AEGIS_SHARES_VOLUME_FSTYPE: {}. Ignoring.",
                        e
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;
        if spec.share_mount_path.is_empty() {
            anyhow::bail!("spec.share_mount_path cannot be empty");
        }
        if !spec.share_mount_path.starts_with('/') {
            anyhow::bail!(
                "spec.share_mount_path must be absolute: '{}'",
                spec.share_mount_path
            );
        }

        if !spec.volume_name_template.contains("{id}") {
            anyhow::bail!("spec.volume_name_template must contain '{{id}}'");
        }
        if !spec.snapshot_name_template.contains("{id}") {
            anyhow::bail!("spec.snapshot_name_template must contain '{{id}}'");
        }

        if spec.enabled_protocols.is_empty() {
            anyhow::bail!("spec.enabled_protocols must list at least one protocol");
        }

        let timeouts = &spec.timeouts;
        for (name, value) in [
            ("volume_create", timeouts.volume_create),
            ("volume_attach", timeouts.volume_attach),
            ("poll_interval", timeouts.poll_interval),
            ("ssh.connect_timeout", spec.ssh.connect_timeout),
        ] {
            if value.is_zero() {
                anyhow::bail!("spec.timeouts.{} must be greater than zero", name);
            }
        }

        Ok(())
    }
}
