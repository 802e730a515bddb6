// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Team configuration.
//!
//! A team is a named directory (local, or reachable through SSH) in which
//! the agent runs. Teams are loaded once from the config file and are
//! immutable for the lifetime of an orchestrator run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Per-team settings from the `teams` section of the config file.
///
/// Field names mirror the JSON config (camelCase on the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamConfig {
    /// Project directory the agent runs in. Absolute after config loading.
    pub path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Idle cutoff in ms before the health sweep terminates this team's
    /// process. Falls back to the global setting when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<u64>,

    /// Spawn-to-init deadline override in ms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_init_timeout: Option<u64>,

    #[serde(default)]
    pub skip_permissions: bool,

    /// SSH prefix for remote teams, e.g. `"ssh -p 2222 build-host"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,

    /// Agent executable override. Defaults to `claude` on PATH.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_path: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disallowed_tools: Vec<String>,

    /// Dashboard accent color, `#RRGGBB`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl TeamConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            description: None,
            idle_timeout: None,
            session_init_timeout: None,
            skip_permissions: false,
            remote: None,
            claude_path: None,
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            color: None,
        }
    }

    pub fn is_remote(&self) -> bool {
        self.remote.as_deref().is_some_and(|r| !r.trim().is_empty())
    }

    pub fn agent_executable(&self) -> &str {
        self.claude_path.as_deref().unwrap_or("claude")
    }
}

#[cfg(test)]
#[path = "team_tests.rs"]
mod tests;
