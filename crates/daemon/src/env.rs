// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

/// Default HTTP port for the outer RPC surface.
pub const DEFAULT_HTTP_PORT: u16 = 1615;

/// Resolve the iris home directory: `IRIS_HOME` > `~/.iris`.
pub fn iris_home() -> PathBuf {
    if let Ok(dir) = std::env::var("IRIS_HOME") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".iris")
}

/// Config file location: `IRIS_CONFIG_PATH` > `<iris-home>/config.json`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("IRIS_CONFIG_PATH") {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    iris_home().join("config.json")
}

/// Session store location under the iris home.
pub fn store_path() -> PathBuf {
    iris_home().join("session-manager.db")
}

/// HTTP port override: `IRIS_HTTP_PORT`, default 1615.
pub fn http_port() -> u16 {
    std::env::var("IRIS_HTTP_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(DEFAULT_HTTP_PORT)
}

/// Log filter: `LOG_LEVEL` wins; the legacy `DEBUG` toggle maps to
/// `debug`; default `info`.
pub fn log_filter() -> String {
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        if !level.is_empty() {
            return level;
        }
    }
    match std::env::var("DEBUG") {
        Ok(v) if !v.is_empty() && v != "0" => "debug".to_string(),
        _ => "info".to_string(),
    }
}

/// Test-mode toggle (`NODE_ENV=test`), shared with the command builder
/// where it drops `--resume`.
pub fn test_mode() -> bool {
    iris_transport::command::test_mode()
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
