// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod exports;
pub mod locks;
pub mod management_api;
pub mod remote;

pub use event_bus::{EventBus, EventBusError};
pub use exports::ExportAdapterRegistry;
pub use locks::{LockKey, ResourceLockRegistry};
pub use remote::{RemoteExecutionChannel, SshConnector};
