// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! OpenSSH-backed sessions
//!
//! Each session is an OpenSSH control master (`openssh` process mux), so
//! every command reuses one authenticated TCP connection. Liveness is the
//! control master's own `check`.

use async_trait::async_trait;
use openssh::{KnownHosts, Session, SessionBuilder};
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::debug;

use super::{CommandOutput, RemoteCommandError, RemoteSession, SessionConnector};
use crate::domain::driver_config::{KnownHostsPolicy, SshConfig};
use crate::domain::host::ServiceHost;

pub struct SshSession {
    session: Session,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run(&self, command: &str) -> Result<CommandOutput, RemoteCommandError> {
        let output = self
            .session
            .raw_command(command)
            .output()
            .await
            .map_err(|e| RemoteCommandError::Transport {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        })
    }

    async fn is_alive(&self) -> bool {
        self.session.check().await.is_ok()
    }
}

/// Connects to service hosts with the system `ssh` client
pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn known_hosts(&self) -> KnownHosts {
        match self.config.known_hosts {
            KnownHostsPolicy::Strict => KnownHosts::Strict,
            KnownHostsPolicy::Add => KnownHosts::Add,
            KnownHostsPolicy::Accept => KnownHosts::Accept,
        }
    }
}

#[async_trait]
impl SessionConnector for SshConnector {
    async fn connect(&self, host: &ServiceHost) -> Result<Arc<dyn RemoteSession>, RemoteCommandError> {
        let credentials = &host.credentials;

        let mut builder = SessionBuilder::default();
        builder
            .user(credentials.username.clone())
            .port(credentials.port)
            .connect_timeout(self.config.connect_timeout)
            .known_hosts_check(self.known_hosts());
        if let Some(key) = &credentials.private_key_path {
            builder.keyfile(key);
        }

        let session = builder
            .connect(&host.address)
            .await
            .map_err(|e| RemoteCommandError::Connection {
                host: host.ssh_destination(),
                reason: e.to_string(),
            })?;

        Ok(Arc::new(SshSession { session }))
    }

    async fn probe(&self, host: &ServiceHost) -> bool {
        let target = (host.address.as_str(), host.credentials.port);
        match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(host = %host.instance_id, error = %e, "SSH port is not reachable");
                false
            }
            Err(_) => {
                debug!(host = %host.instance_id, "SSH port probe timed out");
                false
            }
        }
    }
}
