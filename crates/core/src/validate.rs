// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Input validation.
//!
//! Pure checks applied at the orchestrator boundary. Every failure is a
//! [`IrisError::Validation`] tagged with the offending field so the outer
//! surface can map it to a 400-class reply.

use crate::error::IrisError;
use std::path::{Component, Path, PathBuf};

/// Sentinel: run the tell asynchronously and return a task id.
pub const TIMEOUT_ASYNC: i64 = -1;
/// Sentinel: wait with no bound.
pub const TIMEOUT_UNBOUNDED: i64 = 0;
/// Upper bound for a per-request timeout (one hour).
pub const MAX_TIMEOUT_MS: i64 = 3_600_000;

/// Maximum length of a team name in characters.
pub const MAX_TEAM_NAME_LEN: usize = 100;

/// Prefixes under which a team path is never accepted.
const SENSITIVE_PREFIXES: &[&str] =
    &["/etc/", "/usr/bin/", "/usr/sbin/", "/bin/", "/sbin/", "/boot/", "/proc/", "/sys/"];

/// Team names: non-empty, at most 100 chars, `[A-Za-z0-9_\-@.]` only, and
/// never containing a `..` run.
pub fn validate_team_name(name: &str) -> Result<(), IrisError> {
    if name.is_empty() {
        return Err(IrisError::validation("teamName", "must not be empty"));
    }
    if name.chars().count() > MAX_TEAM_NAME_LEN {
        return Err(IrisError::validation(
            "teamName",
            format!("must be at most {MAX_TEAM_NAME_LEN} characters"),
        ));
    }
    if name.contains("..") {
        return Err(IrisError::validation("teamName", "must not contain '..'"));
    }
    if let Some(bad) =
        name.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '@' | '.')))
    {
        return Err(IrisError::validation(
            "teamName",
            format!("contains disallowed character {bad:?}"),
        ));
    }
    Ok(())
}

/// Canonical hyphenated UUID v4: `xxxxxxxx-xxxx-4xxx-Nxxx-xxxxxxxxxxxx`
/// where `N` has the RFC 4122 variant bits set.
pub fn is_uuid_v4(id: &str) -> bool {
    let bytes = id.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    for (i, &b) in bytes.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if b != b'-' {
                    return false;
                }
            }
            14 => {
                if b != b'4' {
                    return false;
                }
            }
            19 => {
                if !matches!(b, b'8' | b'9' | b'a' | b'b' | b'A' | b'B') {
                    return false;
                }
            }
            _ => {
                if !b.is_ascii_hexdigit() {
                    return false;
                }
            }
        }
    }
    true
}

pub fn validate_session_id(id: &str) -> Result<(), IrisError> {
    if is_uuid_v4(id) {
        Ok(())
    } else {
        Err(IrisError::validation("sessionId", "must be a canonical UUID v4"))
    }
}

/// Team project paths: absolute, no `..` segment, an existing readable
/// directory, and not under a system-sensitive prefix.
///
/// Returns the canonicalized path.
pub fn validate_project_path(path: &Path) -> Result<PathBuf, IrisError> {
    if !path.is_absolute() {
        return Err(IrisError::validation("path", "must be absolute"));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(IrisError::validation("path", "must not contain '..'"));
    }

    let display = path.to_string_lossy();
    let with_slash = format!("{}/", display.trim_end_matches('/'));
    if SENSITIVE_PREFIXES.iter().any(|p| with_slash.starts_with(p)) || with_slash.contains("/.ssh/")
    {
        return Err(IrisError::validation("path", "is under a protected system prefix"));
    }

    let resolved = path
        .canonicalize()
        .map_err(|e| IrisError::validation("path", format!("cannot resolve: {e}")))?;
    if !resolved.is_dir() {
        return Err(IrisError::validation("path", "is not a directory"));
    }
    std::fs::read_dir(&resolved)
        .map_err(|e| IrisError::validation("path", format!("not readable: {e}")))?;
    Ok(resolved)
}

/// Per-request timeouts in ms: `-1` (async), `0` (unbounded), or a positive
/// bound of at most one hour.
pub fn validate_timeout(timeout_ms: i64) -> Result<(), IrisError> {
    match timeout_ms {
        TIMEOUT_ASYNC | TIMEOUT_UNBOUNDED => Ok(()),
        ms if (1..=MAX_TIMEOUT_MS).contains(&ms) => Ok(()),
        ms if ms > MAX_TIMEOUT_MS => {
            Err(IrisError::validation("timeout", format!("must be at most {MAX_TIMEOUT_MS}ms")))
        }
        _ => Err(IrisError::validation("timeout", "must be -1, 0, or a positive bound")),
    }
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
