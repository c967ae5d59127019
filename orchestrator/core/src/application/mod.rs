// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod completion;
pub mod mount_manager;
pub mod share_orchestrator;

pub use completion::CompletionWaiter;
pub use mount_manager::MountStateManager;
pub use share_orchestrator::{ShareService, StandardShareService};
