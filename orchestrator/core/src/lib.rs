// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Aegis Shares
//!
//! Provisions file shares on service hosts: a backend block volume is
//! allocated, attached to the host, formatted, mounted and exported over
//! NFS or CIFS. Every host-side step runs over SSH.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Share lifecycle orchestration

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
