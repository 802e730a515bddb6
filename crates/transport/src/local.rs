// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local transport: the agent as a direct child process.

use crate::command::AgentCommand;
use crate::process::ProcessCore;
use crate::{ProcessStatus, Transport, TransportError, TransportMetrics};
use async_trait::async_trait;
use iris_cache::CacheEntry;
use iris_core::{IrisError, TeamConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Agent spawned directly in the team's directory with piped stdio.
pub struct LocalTransport {
    core: ProcessCore,
}

impl LocalTransport {
    pub fn new(team_name: &str, team: &TeamConfig, session_id: &str) -> Self {
        let command = AgentCommand::for_team(team, session_id);
        let spec = command.local_spec(command.spawn_args(), &team.path);
        Self { core: ProcessCore::new(team_name, "local", spec) }
    }
}

#[async_trait]
impl Transport for LocalTransport {
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

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
