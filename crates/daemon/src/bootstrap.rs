// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot agent invocations.
//!
//! Two orchestrator operations shell out to the agent in `--print` mode
//! rather than talking to a pooled process: creating a brand-new session
//! file on disk (the bootstrap ping) and compacting an existing session.
//! Both run to completion with a timeout and are trivially fake-able for
//! tests.

use async_trait::async_trait;
use iris_core::{IrisError, TeamConfig};
use iris_transport::command::{AgentCommand, CommandSpec};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Runs the agent's one-shot `--print` forms for a team.
#[async_trait]
pub trait SessionBootstrap: Send + Sync + 'static {
    /// Force creation of the agent's session file for a freshly generated
    /// id by running one ping in the team directory.
    async fn create_session_file(
        &self,
        team_name: &str,
        team: &TeamConfig,
        session_id: &str,
        timeout: Duration,
    ) -> Result<(), IrisError>;

    /// Run a one-shot command against an existing session (`/compact`)
    /// and return the agent's stdout.
    async fn run_print(
        &self,
        team_name: &str,
        team: &TeamConfig,
        session_id: &str,
        text: &str,
        timeout: Duration,
    ) -> Result<String, IrisError>;
}

/// Production bootstrap: spawns the real agent, over SSH for remote teams.
#[derive(Debug, Default)]
pub struct AgentBootstrap;

impl AgentBootstrap {
    fn spec_for(
        team: &TeamConfig,
        session_id: &str,
        args: Vec<String>,
    ) -> Result<CommandSpec, IrisError> {
        let command = AgentCommand::for_team(team, session_id);
        match team.remote.as_deref().filter(|r| !r.trim().is_empty()) {
            Some(remote) => command.remote_spec(remote, args, &team.path),
            None => Ok(command.local_spec(args, &team.path)),
        }
    }

    async fn run(
        team_name: &str,
        spec: CommandSpec,
        timeout: Duration,
        what: &str,
    ) -> Result<String, IrisError> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args).stdin(Stdio::null());
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        let output = tokio::time::timeout(timeout, command.output())
            .await
            .map_err(|_| IrisError::InitTimeout(timeout.as_millis() as u64))?
            .map_err(|e| IrisError::Transport(format!("{team_name}: {what} failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(team = team_name, what, %stderr, "one-shot agent call failed");
            return Err(IrisError::Transport(format!(
                "{team_name}: {what} exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl SessionBootstrap for AgentBootstrap {
    async fn create_session_file(
        &self,
        team_name: &str,
        team: &TeamConfig,
        session_id: &str,
        timeout: Duration,
    ) -> Result<(), IrisError> {
        if !team.is_remote() {
            iris_core::validate_project_path(&team.path)?;
        }
        let command = AgentCommand::for_team(team, session_id);
        let spec = Self::spec_for(team, session_id, command.bootstrap_args("ping"))?;
        Self::run(team_name, spec, timeout, "session bootstrap").await?;
        Ok(())
    }

    async fn run_print(
        &self,
        team_name: &str,
        team: &TeamConfig,
        session_id: &str,
        text: &str,
        timeout: Duration,
    ) -> Result<String, IrisError> {
        let command = AgentCommand::for_team(team, session_id);
        let spec = Self::spec_for(team, session_id, command.resume_print_args(text))?;
        Self::run(team_name, spec, timeout, "one-shot print").await
    }
}

/// Recorded bootstrap call (test support).
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapCall {
    CreateSessionFile { team: String, session_id: String },
    RunPrint { team: String, session_id: String, text: String },
}

/// Scripted bootstrap for tests: records calls, optionally fails per team.
#[cfg(any(test, feature = "test-support"))]
#[derive(Default)]
pub struct FakeBootstrap {
    calls: parking_lot::Mutex<Vec<BootstrapCall>>,
    fail_teams: parking_lot::Mutex<std::collections::HashSet<String>>,
    /// Remaining `run_print` failures before it starts succeeding.
    print_failures: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeBootstrap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for_team(&self, team: &str) {
        self.fail_teams.lock().insert(team.to_string());
    }

    pub fn fail_prints(&self, count: usize) {
        self.print_failures.store(count, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<BootstrapCall> {
        self.calls.lock().clone()
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl SessionBootstrap for FakeBootstrap {
    async fn create_session_file(
        &self,
        team_name: &str,
        _team: &TeamConfig,
        session_id: &str,
        _timeout: Duration,
    ) -> Result<(), IrisError> {
        self.calls.lock().push(BootstrapCall::CreateSessionFile {
            team: team_name.to_string(),
            session_id: session_id.to_string(),
        });
        if self.fail_teams.lock().contains(team_name) {
            return Err(IrisError::Transport(format!("{team_name}: scripted bootstrap failure")));
        }
        Ok(())
    }

    async fn run_print(
        &self,
        team_name: &str,
        _team: &TeamConfig,
        session_id: &str,
        text: &str,
        _timeout: Duration,
    ) -> Result<String, IrisError> {
        self.calls.lock().push(BootstrapCall::RunPrint {
            team: team_name.to_string(),
            session_id: session_id.to_string(),
            text: text.to_string(),
        });
        let remaining = self.print_failures.load(std::sync::atomic::Ordering::SeqCst);
        if remaining > 0 {
            self.print_failures.store(remaining - 1, std::sync::atomic::Ordering::SeqCst);
            return Err(IrisError::Transport(format!("{team_name}: scripted print failure")));
        }
        Ok("done".to_string())
    }
}
