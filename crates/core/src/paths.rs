// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent-storage path math.
//!
//! The agent keeps one JSONL transcript per session under
//! `<agent-home>/projects/<escaped-project-path>/<session-id>.jsonl`, where
//! the escaped name is the project path with every separator turned into a
//! dash. This module reproduces that convention; the files themselves are
//! owned by the agent and only ever read or deleted here.

use crate::error::IrisError;
use std::path::{Path, PathBuf};

/// Escape an absolute project path into the agent's directory name:
/// `/a/b/c` becomes `-a-b-c`.
pub fn escape_project_path(path: &str) -> Result<String, IrisError> {
    if !path.starts_with('/') {
        return Err(IrisError::validation("path", "must be absolute"));
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        // Root itself escapes to a single dash.
        return Ok("-".to_string());
    }
    Ok(trimmed.replace('/', "-"))
}

/// The agent's home directory: `$CLAUDE_CONFIG_DIR`, else `~/.claude`.
pub fn agent_home() -> PathBuf {
    if let Ok(dir) = std::env::var("CLAUDE_CONFIG_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".claude")
}

/// Directory holding all of a project's session transcripts.
pub fn project_sessions_dir(project_path: &Path) -> Result<PathBuf, IrisError> {
    let escaped = escape_project_path(&project_path.to_string_lossy())?;
    Ok(agent_home().join("projects").join(escaped))
}

/// Full path of one session's transcript file.
pub fn session_file_path(project_path: &Path, session_id: &str) -> Result<PathBuf, IrisError> {
    Ok(project_sessions_dir(project_path)?.join(format!("{session_id}.jsonl")))
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
