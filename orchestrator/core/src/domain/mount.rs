// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mount Records and Host Report Parsing
//!
//! A [`MountRecord`] is the live fact "device D is mounted at path P" on a
//! service host. Records are derived from the host's mount table on every
//! query and never cached across operations, since administrators and reboots
//! change them out-of-band.

use serde::{Deserialize, Serialize};

/// Filesystem created on freshly allocated share volumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilesystemType {
    #[default]
    Ext4,
    Ext3,
}

impl FilesystemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ext4 => "ext4",
            Self::Ext3 => "ext3",
        }
    }

    /// Name of the `mkfs` helper for this filesystem
    pub fn mkfs_command(&self) -> String {
        format!("mkfs.{}", self.as_str())
    }
}

impl std::str::FromStr for FilesystemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ext4" => Ok(Self::Ext4),
            "ext3" => Ok(Self::Ext3),
            other => Err(format!("unsupported filesystem type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRecord {
    pub device: String,
    pub mount_path: String,
}

impl MountRecord {
    pub fn matches(&self, mount_path: &str, device: Option<&str>) -> bool {
        if self.mount_path != mount_path {
            return false;
        }
        match device {
            Some(device) => self.device == device,
            None => true,
        }
    }
}

/// Parse `mount` output: whitespace separated columns, device in the first
/// column and mount path in the third (`/dev/vdb on /shares/s1 type ext4 (rw)`).
pub fn parse_mount_table(output: &str) -> Vec<MountRecord> {
    output
        .lines()
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() > 2 {
                Some(MountRecord {
                    device: columns[0].to_string(),
                    mount_path: columns[2].to_string(),
                })
            } else {
                None
            }
        })
        .collect()
}

/// Parse the size in GiB from `df -PBG <path>` output: second line, second
/// field, trailing unit character stripped.
pub fn parse_df_size_gb(output: &str) -> Result<u64, String> {
    let line = output
        .lines()
        .nth(1)
        .ok_or_else(|| "free-space report has no data line".to_string())?;
    let field = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| format!("free-space report line '{}' has no size column", line))?;

    let mut digits = field.chars();
    digits.next_back();
    digits
        .as_str()
        .parse::<u64>()
        .map_err(|e| format!("cannot parse size '{}': {}", field, e))
}
