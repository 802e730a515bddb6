// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator configuration.
//!
//! One JSON file (`config.json` under the iris home) declares global
//! settings, the optional dashboard block consumed by the outer layers,
//! and the team map. Loading is strict: syntax errors and semantic
//! violations both surface as Configuration errors before anything runs.

use indexmap::IndexMap;
use iris_core::{validate_team_name, IrisError, TeamConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::env::DEFAULT_HTTP_PORT;

pub const MIN_PROCESSES: usize = 1;
pub const MAX_PROCESSES: usize = 50;

const fn default_idle_timeout() -> u64 {
    1_800_000 // 30 minutes
}

const fn default_max_processes() -> usize {
    10
}

const fn default_health_check_interval() -> u64 {
    30_000
}

const fn default_session_init_timeout() -> u64 {
    30_000
}

const fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

/// Which transport the outer RPC surface speaks by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcTransport {
    #[default]
    Stdio,
    Http,
}

/// Global settings, all in milliseconds where durations are concerned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
    #[serde(default = "default_max_processes")]
    pub max_processes: usize,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: u64,
    #[serde(default = "default_session_init_timeout")]
    pub session_init_timeout: u64,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub default_transport: RpcTransport,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            idle_timeout: default_idle_timeout(),
            max_processes: default_max_processes(),
            health_check_interval: default_health_check_interval(),
            session_init_timeout: default_session_init_timeout(),
            http_port: default_http_port(),
            default_transport: RpcTransport::default(),
        }
    }
}

/// Dashboard block. Owned by the outer HTTP layer; carried and validated
/// here so a bad config fails at load rather than at dashboard startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// The whole config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IrisConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard: Option<DashboardConfig>,
    #[serde(default)]
    pub teams: IndexMap<String, TeamConfig>,
}

impl IrisConfig {
    /// Load and validate. Relative team paths are resolved against the
    /// config file's directory.
    pub fn load(path: &Path) -> Result<Self, IrisError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IrisError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config: Self = serde_json::from_str(&raw).map_err(|e| {
            IrisError::Configuration(format!("invalid JSON in {}: {e}", path.display()))
        })?;

        if let Some(base) = path.parent() {
            for team in config.teams.values_mut() {
                if team.path.is_relative() {
                    team.path = base.join(&team.path);
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IrisError> {
        let max = self.settings.max_processes;
        if !(MIN_PROCESSES..=MAX_PROCESSES).contains(&max) {
            return Err(IrisError::Configuration(format!(
                "maxProcesses must be between {MIN_PROCESSES} and {MAX_PROCESSES}, got {max}"
            )));
        }
        if self.settings.http_port == 0 {
            return Err(IrisError::Configuration("httpPort must be between 1 and 65535".into()));
        }
        if self.settings.health_check_interval == 0 {
            return Err(IrisError::Configuration("healthCheckInterval must be positive".into()));
        }
        if self.settings.session_init_timeout == 0 {
            return Err(IrisError::Configuration("sessionInitTimeout must be positive".into()));
        }

        for (name, team) in &self.teams {
            validate_team_name(name).map_err(|e| {
                IrisError::Configuration(format!("invalid team name {name:?}: {e}"))
            })?;
            if !team.path.is_absolute() {
                return Err(IrisError::Configuration(format!(
                    "team {name}: path must be absolute after resolution"
                )));
            }
            if let Some(color) = &team.color {
                if !is_hex_color(color) {
                    return Err(IrisError::Configuration(format!(
                        "team {name}: color must be #RRGGBB, got {color:?}"
                    )));
                }
            }
            if let Some(remote) = &team.remote {
                if !remote.trim().is_empty() && shlex::split(remote).is_none() {
                    return Err(IrisError::Configuration(format!(
                        "team {name}: unparseable remote prefix {remote:?}"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn team(&self, name: &str) -> Option<&TeamConfig> {
        self.teams.get(name)
    }

    /// Spawn-to-init deadline for one team, honoring its override.
    pub fn session_init_timeout(&self, team: &TeamConfig) -> u64 {
        team.session_init_timeout.unwrap_or(self.settings.session_init_timeout)
    }

    /// Idle cutoff for one team, honoring its override.
    pub fn idle_timeout(&self, team: &TeamConfig) -> u64 {
        team.idle_timeout.unwrap_or(self.settings.idle_timeout)
    }
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
