// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the AEGIS Shares CLI

pub mod config;
pub mod host;

pub use self::config::ConfigCommand;
pub use self::host::HostCommand;
