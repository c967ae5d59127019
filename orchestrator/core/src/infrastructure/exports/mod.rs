// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Export adapters and their registry
//!
//! The registry holds one adapter per enabled protocol. It is built once at
//! startup; a share whose protocol has no adapter is a configuration error.

pub mod cifs;
pub mod nfs;

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::driver_config::ShareDriverSpec;
use crate::domain::error::ShareError;
use crate::domain::export::ProtocolExportAdapter;
use crate::domain::share::ShareProtocol;
use crate::infrastructure::locks::ResourceLockRegistry;
use crate::infrastructure::remote::RemoteExecutionChannel;

pub use cifs::CifsExportAdapter;
pub use nfs::NfsExportAdapter;

#[derive(Clone, Default)]
pub struct ExportAdapterRegistry {
    adapters: HashMap<ShareProtocol, Arc<dyn ProtocolExportAdapter>>,
}

impl ExportAdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the adapters for every protocol enabled in `spec`
    pub fn from_spec(
        spec: &ShareDriverSpec,
        channel: Arc<RemoteExecutionChannel>,
        locks: ResourceLockRegistry,
    ) -> Result<Self, ShareError> {
        if spec.enabled_protocols.is_empty() {
            return Err(ShareError::Configuration(
                "no share protocols are enabled".to_string(),
            ));
        }

        let mut registry = Self::new();
        for protocol in &spec.enabled_protocols {
            let adapter: Arc<dyn ProtocolExportAdapter> = match protocol {
                ShareProtocol::Nfs => Arc::new(NfsExportAdapter::new(
                    Arc::clone(&channel),
                    locks.clone(),
                    spec,
                )),
                ShareProtocol::Cifs => Arc::new(CifsExportAdapter::new(
                    Arc::clone(&channel),
                    locks.clone(),
                    spec,
                )),
            };
            registry.register(adapter);
        }
        Ok(registry)
    }

    /// Add an adapter, replacing any adapter for the same protocol
    pub fn register(&mut self, adapter: Arc<dyn ProtocolExportAdapter>) {
        self.adapters.insert(adapter.protocol(), adapter);
    }

    pub fn get(&self, protocol: ShareProtocol) -> Result<Arc<dyn ProtocolExportAdapter>, ShareError> {
        self.adapters.get(&protocol).cloned().ok_or_else(|| {
            ShareError::Configuration(format!("share protocol {} is not enabled", protocol))
        })
    }

    pub fn protocols(&self) -> Vec<ShareProtocol> {
        let mut protocols: Vec<_> = self.adapters.keys().copied().collect();
        protocols.sort_by_key(|p| p.as_str());
        protocols
    }

    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn ProtocolExportAdapter>> {
        self.adapters.values()
    }
}
