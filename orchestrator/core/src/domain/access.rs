// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Access Rules
//!
//! An access rule grants one client (identified by `access_to`) read-write or
//! read-only access to exactly one share. Only IP-based rules are enforced by
//! the export adapters; other types are parsed so they can be rejected with a
//! precise error.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;

use crate::domain::error::ShareError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    Ip,
    User,
    Cert,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::User => "user",
            Self::Cert => "cert",
        }
    }
}

impl std::fmt::Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessType {
    type Err = ShareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ip" => Ok(Self::Ip),
            "user" => Ok(Self::User),
            "cert" => Ok(Self::Cert),
            other => Err(ShareError::UnsupportedAccessType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Rw,
    Ro,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rw => "rw",
            Self::Ro => "ro",
        }
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = ShareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rw" => Ok(Self::Rw),
            "ro" => Ok(Self::Ro),
            other => Err(ShareError::InvalidAccessLevel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessRule {
    pub access_type: AccessType,
    pub access_level: AccessLevel,
    /// Client identifier, an IP address or CIDR for `ip` rules
    pub access_to: String,
}

impl AccessRule {
    pub fn ip(access_to: impl Into<String>, access_level: AccessLevel) -> Self {
        Self {
            access_type: AccessType::Ip,
            access_level,
            access_to: access_to.into(),
        }
    }

    /// Parse a rule from its wire representation
    pub fn parse(access_type: &str, access_level: &str, access_to: &str) -> Result<Self, ShareError> {
        let access_type: AccessType = access_type.parse()?;
        if access_type == AccessType::Ip {
            validate_ip_target(access_to)?;
        }
        Ok(Self {
            access_type,
            access_level: access_level.parse()?,
            access_to: access_to.to_string(),
        })
    }
}

/// Accept a single IP address or a CIDR block (`10.0.0.0/24`, `fd00::/64`)
pub fn validate_ip_target(access_to: &str) -> Result<(), ShareError> {
    let invalid = || ShareError::InvalidAccessTarget(access_to.to_string());

    let (address, prefix) = match access_to.split_once('/') {
        Some((address, prefix)) => (address, Some(prefix)),
        None => (access_to, None),
    };
    let address: IpAddr = address.parse().map_err(|_| invalid())?;

    if let Some(prefix) = prefix {
        let max_bits = if address.is_ipv4() { 32 } else { 128 };
        let bits: u8 = prefix.parse().map_err(|_| invalid())?;
        if !prefix.bytes().all(|b| b.is_ascii_digit()) || bits > max_bits {
            return Err(invalid());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rule() {
        let rule = AccessRule::parse("ip", "ro", "10.0.0.0/24").unwrap();
        assert_eq!(rule, AccessRule::ip("10.0.0.0/24", AccessLevel::Ro));
    }

    #[test]
    fn test_parse_rejects_unknown_level() {
        let result = AccessRule::parse("ip", "admin", "10.0.0.1");
        assert!(matches!(result, Err(ShareError::InvalidAccessLevel(level)) if level == "admin"));
    }

    #[test]
    fn test_ip_targets() {
        for target in ["10.0.0.8", "10.0.0.0/24", "0.0.0.0/0", "fd00::1", "fd00::/64"] {
            assert!(validate_ip_target(target).is_ok(), "rejected {}", target);
        }
        for target in [
            "",
            "client.example.com",
            "10.0.0.0/33",
            "10.0.0.0/",
            "10.0.0.0/+8",
            "10.0.0.8:/tmp",
            "10.0.0.8 && sudo reboot",
            "10.0.0.8;id",
            "$(id)",
        ] {
            assert!(
                matches!(validate_ip_target(target), Err(ShareError::InvalidAccessTarget(_))),
                "accepted {:?}",
                target
            );
        }
    }

    #[test]
    fn test_parse_rejects_hostile_ip_target() {
        let result = AccessRule::parse("ip", "rw", "10.0.0.8:/tmp && sudo umount /shares/other");
        assert!(matches!(result, Err(ShareError::InvalidAccessTarget(_))));
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        let result = AccessRule::parse("kerberos", "rw", "alice");
        assert!(matches!(result, Err(ShareError::UnsupportedAccessType(_))));
    }
}
