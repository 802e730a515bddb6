// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH transport: the agent as a child process on a remote host.
//!
//! The local child is `ssh`; stdio piping, frame decoding, and process
//! supervision are identical to the local variant. Signals address the
//! local `ssh` process — OpenSSH forwards the hangup to the remote command,
//! and stdin EOF reaches the agent either way.

use crate::command::AgentCommand;
use crate::process::ProcessCore;
use crate::{ProcessStatus, Transport, TransportError, TransportMetrics};
use async_trait::async_trait;
use iris_cache::CacheEntry;
use iris_core::{IrisError, TeamConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Agent reached through the team's `remote` prefix (`ssh <opts…> <host>`).
pub struct SshTransport {
    core: ProcessCore,
}

impl SshTransport {
    pub fn new(team_name: &str, team: &TeamConfig, session_id: &str) -> Result<Self, IrisError> {
        let remote = team
            .remote
            .as_deref()
            .ok_or_else(|| IrisError::Configuration(format!("{team_name} has no remote prefix")))?;
        let command = AgentCommand::for_team(team, session_id);
        let spec = command.remote_spec(remote, command.spawn_args(), &team.path)?;
        Ok(Self { core: ProcessCore::new(team_name, "ssh", spec) })
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn spawn(
        &self,
        spawn_entry: Arc<CacheEntry>,
        timeout: Duration,
    ) -> Result<(), IrisError> {
        self.core.spawn(spawn_entry, timeout).await
    }

    async fn execute_tell(&self, entry: Arc<CacheEntry>) -> Result<(), IrisError> {
        self.core.execute_tell(entry).await
    }

    async fn terminate(&self) -> Result<(), IrisError> {
        self.core.terminate().await
    }

    async fn cancel(&self) -> Result<bool, IrisError> {
        self.core.cancel().await
    }

    fn status(&self) -> ProcessStatus {
        self.core.status()
    }

    fn watch_status(&self) -> watch::Receiver<ProcessStatus> {
        self.core.watch_status()
    }

    fn subscribe_errors(&self) -> broadcast::Receiver<TransportError> {
        self.core.subscribe_errors()
    }

    fn metrics(&self) -> TransportMetrics {
        self.core.metrics()
    }

    fn pid(&self) -> Option<u32> {
        self.core.pid()
    }
}
