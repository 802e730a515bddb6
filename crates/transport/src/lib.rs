// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! iris-transport: the polymorphic handle over a live agent subprocess.
//!
//! A transport owns one long-lived agent process for a pool slot — launched
//! directly with piped stdio for local teams, or through SSH for remote
//! ones. Both variants speak the same newline-delimited JSON protocol:
//! framed user messages go down the child's stdin, and every line of stdout
//! is decoded into a [`iris_core::Frame`] and appended to the current cache
//! entry.

pub mod command;
mod process;

pub mod local;
pub mod remote;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeReply, FakeTransport, FakeTransportFactory, TransportCall};

use async_trait::async_trait;
use iris_cache::CacheEntry;
use iris_core::{IrisError, TeamConfig};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch};

pub use local::LocalTransport;
pub use remote::SshTransport;

/// Pool-visible process state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Stopped,
    Spawning,
    Idle,
    Processing,
}

/// Failures surfaced on the transport's error stream. Observers get these
/// without replay; the transport also refuses further tells after any of
/// them.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("agent init timed out after {0}ms")]
    InitTimeout(u64),
    #[error("process exited unexpectedly (status {0:?})")]
    UnexpectedExit(Option<i32>),
    #[error("write to agent failed: {0}")]
    WriteFailed(String),
}

/// Point-in-time counters for one transport.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TransportMetrics {
    pub uptime_ms: u64,
    pub messages_processed: u64,
    pub last_response_at_ms: Option<u64>,
}

/// Capability set shared by the local and SSH variants (and the scripted
/// fake in tests). The variant is chosen from team config at construction
/// and fixed for the life of the transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Launch the agent, write the spawn entry's tell (`"ping"`), and
    /// resolve once the agent's `init` frame arrives. Fails with
    /// `InitTimeout` when `timeout` elapses first.
    async fn spawn(&self, spawn_entry: Arc<CacheEntry>, timeout: Duration)
        -> Result<(), IrisError>;

    /// Write one framed tell. Non-blocking: requires IDLE, refuses with
    /// `ProcessBusy` otherwise, and returns as soon as the frame is on the
    /// wire; the entry is completed asynchronously by the pump when the
    /// `result` frame arrives.
    async fn execute_tell(&self, entry: Arc<CacheEntry>) -> Result<(), IrisError>;

    /// Graceful stop: SIGTERM, five seconds of grace, then SIGKILL.
    /// Idempotent.
    async fn terminate(&self) -> Result<(), IrisError>;

    /// Best-effort interrupt: a single ESC byte on the agent's stdin. The
    /// agent may ignore it. Returns whether the byte was written.
    async fn cancel(&self) -> Result<bool, IrisError>;

    fn status(&self) -> ProcessStatus;

    /// Current status plus subsequent changes (replays the current value).
    fn watch_status(&self) -> watch::Receiver<ProcessStatus>;

    /// Error events. No replay.
    fn subscribe_errors(&self) -> broadcast::Receiver<TransportError>;

    fn metrics(&self) -> TransportMetrics;

    fn pid(&self) -> Option<u32>;

    fn is_ready(&self) -> bool {
        self.status() == ProcessStatus::Idle
    }

    fn is_busy(&self) -> bool {
        self.status() == ProcessStatus::Processing
    }
}

/// Construct the right variant for a team: SSH when the config names a
/// `remote` prefix, local otherwise.
pub fn for_team(
    team_name: &str,
    team: &TeamConfig,
    session_id: &str,
) -> Result<Arc<dyn Transport>, IrisError> {
    if team.is_remote() {
        Ok(Arc::new(SshTransport::new(team_name, team, session_id)?))
    } else {
        Ok(Arc::new(LocalTransport::new(team_name, team, session_id)))
    }
}

/// Creates transports for teams. The pool owns one factory; tests swap in
/// a scripted one.
pub trait TransportFactory: Send + Sync + 'static {
    fn create(
        &self,
        team_name: &str,
        team: &TeamConfig,
        session_id: &str,
    ) -> Result<Arc<dyn Transport>, IrisError>;
}

/// Production factory backed by [`for_team`]. Local team directories are
/// validated here, at the last point before a process would run in them;
/// remote paths can only be checked by the remote host.
#[derive(Debug, Default)]
pub struct DefaultTransportFactory;

impl TransportFactory for DefaultTransportFactory {
    fn create(
        &self,
        team_name: &str,
        team: &TeamConfig,
        session_id: &str,
    ) -> Result<Arc<dyn Transport>, IrisError> {
        if !team.is_remote() {
            iris_core::validate_project_path(&team.path)?;
        }
        for_team(team_name, team, session_id)
    }
}
