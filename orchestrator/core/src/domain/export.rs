// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Protocol Export Adapter Contract
//!
//! An export adapter publishes a mounted share directory over one file
//! sharing protocol and manages per-client access grants on it. Two variants
//! ship in `infrastructure::exports`: an NFS adapter driving `exportfs` and a
//! CIFS adapter driving the Samba registry through `net conf`.
//!
//! Adapters are stateless with respect to shares: everything they know about
//! an export is read back from the service host on each call.

use async_trait::async_trait;

use crate::domain::access::{AccessLevel, AccessRule, AccessType};
use crate::domain::error::ShareError;
use crate::domain::host::ServiceHost;
use crate::domain::share::ShareProtocol;

#[async_trait]
pub trait ProtocolExportAdapter: Send + Sync {
    /// Protocol served by this adapter
    fn protocol(&self) -> ShareProtocol;

    /// Verify the host carries the tooling this adapter drives.
    async fn init(&self, host: &ServiceHost) -> Result<(), ShareError>;

    /// Publish the export for `share_name`.
    ///
    /// # Returns
    /// * `Ok(String)` - Export location in the protocol's addressing scheme
    /// * `Err(ShareError::ExportAlreadyExists)` - An export with this name
    ///   exists and `recreate` is false
    async fn create_export(
        &self,
        host: &ServiceHost,
        share_name: &str,
        recreate: bool,
    ) -> Result<String, ShareError>;

    /// Remove the export for `share_name`.
    async fn remove_export(&self, host: &ServiceHost, share_name: &str) -> Result<(), ShareError>;

    /// Grant `access_to` access to the export.
    ///
    /// # Returns
    /// * `Err(ShareError::UnsupportedAccessType)` - `access_type` is not `ip`
    /// * `Err(ShareError::AccessRuleExists)` - The target already has a grant
    async fn allow_access(
        &self,
        host: &ServiceHost,
        share_name: &str,
        access_type: AccessType,
        access_level: AccessLevel,
        access_to: &str,
    ) -> Result<(), ShareError>;

    /// Revoke a grant. A grant that is already gone is not an error; command
    /// failures propagate unless `force` is set.
    async fn deny_access(
        &self,
        host: &ServiceHost,
        share_name: &str,
        rule: &AccessRule,
        force: bool,
    ) -> Result<(), ShareError>;

    /// Rebuild the export locations of an existing export for this host.
    ///
    /// # Returns
    /// * `Err(ShareError::InvalidExportLocation)` - `export_location` does not
    ///   match the protocol's addressing grammar
    async fn resolve_exports_for_location(
        &self,
        host: &ServiceHost,
        export_location: &str,
    ) -> Result<Vec<String>, ShareError>;

    /// Resolve the directory on the host that an export location publishes.
    async fn resolve_mount_path_for_location(
        &self,
        host: &ServiceHost,
        export_location: &str,
    ) -> Result<String, ShareError>;
}
