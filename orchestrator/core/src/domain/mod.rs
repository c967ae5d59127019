// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Value objects, collaborator contracts and the error taxonomy of the
//! share provisioning engine.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Shares, volumes, hosts and the contracts the orchestrator consumes

pub mod access;
pub mod driver_config;
pub mod error;
pub mod events;
pub mod export;
pub mod host;
pub mod mount;
pub mod share;
pub mod storage;
pub mod volume;
