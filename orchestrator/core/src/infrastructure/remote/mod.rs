// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Remote Execution Channel
//!
//! Runs privileged shell commands on service hosts over pooled sessions.
//!
//! # Session lifecycle
//!
//! - At most one session per host id is pooled.
//! - A session is opened on the first command for a host.
//! - Before every command the pooled session's transport is checked; a dead
//!   session is discarded and replaced before the command is issued.
//! - Replacement happens under a per-host guard, so concurrent callers
//!   never race to reconnect the same host.
//! - Pools are owned by one channel instance and never shared.
//!
//! The channel does not retry commands. Not every command is idempotent, so
//! retry policy belongs to callers.
//!
//! Commands are given as argv slices. Every word except the `&&` and `:`
//! operators is shell-quoted before the line is sent, so arguments reach the
//! remote program verbatim.

pub mod ssh;

use async_trait::async_trait;
use dashmap::DashMap;
use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::host::{HostId, ServiceHost};

pub use ssh::SshConnector;

/// Captured result of a remote command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the remote process was killed by a signal
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum RemoteCommandError {
    #[error("Command '{command}' exited with status {}: {stderr}", display_code(.exit_code))]
    NonZeroExit {
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Cannot connect to {host}: {reason}")]
    Connection { host: String, reason: String },

    #[error("Transport failure while running '{command}': {reason}")]
    Transport { command: String, reason: String },

    #[error("Cannot build command line: {0}")]
    InvalidArgument(String),
}

fn display_code(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

impl RemoteCommandError {
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    pub fn stdout(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { stdout, .. } => Some(stdout),
            _ => None,
        }
    }
}

/// Words passed to the remote shell as operators rather than arguments
const SHELL_OPERATORS: &[&str] = &["&&", ":"];

/// Join `argv` into one shell command line, quoting every word that is not
/// an operator.
pub fn command_line(argv: &[&str]) -> Result<String, RemoteCommandError> {
    let words = argv
        .iter()
        .map(|word| {
            if SHELL_OPERATORS.contains(word) {
                Ok(Cow::Borrowed(*word))
            } else {
                shlex::try_quote(word)
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RemoteCommandError::InvalidArgument(e.to_string()))?;
    Ok(words.join(" "))
}

/// An established command session to one host
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run a shell command line. A non-zero exit is reported in the output,
    /// not as an error.
    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteCommandError>;

    /// Whether the underlying transport is still usable
    async fn is_alive(&self) -> bool;
}

/// Opens sessions to service hosts
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self, host: &ServiceHost) -> Result<Arc<dyn RemoteSession>, RemoteCommandError>;

    /// Whether the host accepts management connections at all
    async fn probe(&self, host: &ServiceHost) -> bool;
}

type SessionSlot = Arc<Mutex<Option<Arc<dyn RemoteSession>>>>;

pub struct RemoteExecutionChannel {
    connector: Arc<dyn SessionConnector>,
    sessions: DashMap<HostId, SessionSlot>,
}

impl RemoteExecutionChannel {
    pub fn new(connector: Arc<dyn SessionConnector>) -> Self {
        Self {
            connector,
            sessions: DashMap::new(),
        }
    }

    fn slot(&self, host: &HostId) -> SessionSlot {
        self.sessions
            .entry(host.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    async fn session_for(
        &self,
        host: &ServiceHost,
    ) -> Result<Arc<dyn RemoteSession>, RemoteCommandError> {
        let slot = self.slot(&host.instance_id);
        let mut pooled = slot.lock().await;

        if let Some(session) = pooled.as_ref() {
            if session.is_alive().await {
                return Ok(Arc::clone(session));
            }
            debug!(host = %host.instance_id, "Pooled session is dead, reconnecting");
            *pooled = None;
        }

        info!(host = %host.instance_id, address = %host.address, "Opening remote session");
        let session = self.connector.connect(host).await?;
        *pooled = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Run `argv` on `host` as one shell command line (see [`command_line`]).
    ///
    /// # Returns
    /// * `Ok(CommandOutput)` - The command exited with status 0
    /// * `Err(RemoteCommandError::NonZeroExit)` - Any other exit, with the
    ///   captured stdout and stderr
    pub async fn execute(
        &self,
        host: &ServiceHost,
        argv: &[&str],
    ) -> Result<CommandOutput, RemoteCommandError> {
        let command = command_line(argv)?;
        let session = self.session_for(host).await?;

        debug!(host = %host.instance_id, command = %command, "Executing remote command");
        let output = session.run(&command).await?;

        if !output.success() {
            debug!(
                host = %host.instance_id,
                exit_code = ?output.exit_code,
                stderr = %output.stderr.trim(),
                "Remote command failed"
            );
            return Err(RemoteCommandError::NonZeroExit {
                command,
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(output)
    }

    /// Whether the host currently accepts management connections
    pub async fn probe(&self, host: &ServiceHost) -> bool {
        self.connector.probe(host).await
    }

    /// Drop the pooled session of a host, if any
    pub async fn release(&self, host: &HostId) {
        if let Some((_, slot)) = self.sessions.remove(host) {
            if slot.lock().await.take().is_some() {
                info!(host = %host, "Released remote session");
            }
        }
    }

    /// Number of hosts with a pooled session slot
    pub fn pooled_hosts(&self) -> usize {
        self.sessions.len()
    }
}
