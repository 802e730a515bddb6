// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent command assembly.
//!
//! One builder produces every argv shape the orchestrator needs: the
//! long-lived stream-JSON process, the one-shot session-file bootstrap, and
//! the one-shot `--resume --print` form used by compaction. For remote
//! teams the same command is re-expressed as an SSH invocation with every
//! remote-side word shell-quoted.

use iris_core::{IrisError, TeamConfig};
use std::path::{Path, PathBuf};

/// Env toggle for built commands: with `NODE_ENV=test`, `--resume` is
/// omitted so a scripted stand-in agent can run without pre-existing
/// session state.
pub const TEST_MODE_ENV: &str = "NODE_ENV";

/// Whether `NODE_ENV=test` is in effect.
pub fn test_mode() -> bool {
    std::env::var(TEST_MODE_ENV).is_ok_and(|v| v == "test")
}

/// A fully resolved program invocation: what to run, with what, and where.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

/// Builder for agent invocations against one team + session.
#[derive(Debug, Clone)]
pub struct AgentCommand {
    program: String,
    session_id: String,
    skip_permissions: bool,
    allowed_tools: Vec<String>,
    disallowed_tools: Vec<String>,
}

impl AgentCommand {
    pub fn for_team(team: &TeamConfig, session_id: &str) -> Self {
        Self {
            program: team.agent_executable().to_string(),
            session_id: session_id.to_string(),
            skip_permissions: team.skip_permissions,
            allowed_tools: team.allowed_tools.clone(),
            disallowed_tools: team.disallowed_tools.clone(),
        }
    }

    /// Argv for the long-lived process speaking stream-JSON on both
    /// directions.
    pub fn spawn_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if !test_mode() {
            args.push("--resume".to_string());
            args.push(self.session_id.clone());
        }
        args.push("--print".to_string());
        args.push("--verbose".to_string());
        args.push("--input-format".to_string());
        args.push("stream-json".to_string());
        args.push("--output-format".to_string());
        args.push("stream-json".to_string());
        self.push_permission_args(&mut args);
        args
    }

    /// Argv for the one-shot ping that makes the agent create the session
    /// file for a freshly generated id.
    pub fn bootstrap_args(&self, text: &str) -> Vec<String> {
        let mut args =
            vec!["--print".to_string(), "--session-id".to_string(), self.session_id.clone()];
        self.push_permission_args(&mut args);
        args.push(text.to_string());
        args
    }

    /// Argv for a one-shot command against the existing session
    /// (`/compact`).
    pub fn resume_print_args(&self, text: &str) -> Vec<String> {
        let mut args =
            vec!["--resume".to_string(), self.session_id.clone(), "--print".to_string()];
        self.push_permission_args(&mut args);
        args.push(text.to_string());
        args
    }

    fn push_permission_args(&self, args: &mut Vec<String>) {
        if self.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        if !self.allowed_tools.is_empty() {
            args.push("--allowedTools".to_string());
            args.push(self.allowed_tools.join(","));
        }
        if !self.disallowed_tools.is_empty() {
            args.push("--disallowedTools".to_string());
            args.push(self.disallowed_tools.join(","));
        }
    }

    /// Run directly in the team's directory.
    pub fn local_spec(&self, args: Vec<String>, cwd: &Path) -> CommandSpec {
        CommandSpec {
            program: self.program.clone(),
            args,
            cwd: Some(cwd.to_path_buf()),
        }
    }

    /// Re-express as an SSH invocation. `remote` is the team's prefix in
    /// `ssh <opts…> <host>` form; the agent command rides as one quoted
    /// shell line that changes into the team directory first.
    pub fn remote_spec(
        &self,
        remote: &str,
        args: Vec<String>,
        cwd: &Path,
    ) -> Result<CommandSpec, IrisError> {
        let mut prefix = shlex::split(remote).ok_or_else(|| {
            IrisError::Configuration(format!("unparseable remote prefix: {remote:?}"))
        })?;
        if prefix.is_empty() {
            return Err(IrisError::Configuration("empty remote prefix".to_string()));
        }
        let program = prefix.remove(0);

        let mut words = Vec::with_capacity(args.len() + 1);
        words.push(self.program.clone());
        words.extend(args);
        let remote_cmd = shlex::try_join(words.iter().map(String::as_str))
            .map_err(|e| IrisError::Transport(format!("cannot quote remote command: {e}")))?;
        let cwd_quoted = shlex::try_quote(&cwd.to_string_lossy())
            .map_err(|e| IrisError::Transport(format!("cannot quote remote cwd: {e}")))?
            .into_owned();

        prefix.push(format!("cd {cwd_quoted} && exec {remote_cmd}"));
        Ok(CommandSpec { program, args: prefix, cwd: None })
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
