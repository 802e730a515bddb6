// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session records.
//!
//! A session is the persistent conversation between one ordered team pair
//! and the agent, identified by a UUID v4 that the agent also uses for its
//! on-disk JSONL file.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    CompactPending,
    Archived,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::CompactPending => "compact_pending",
            Self::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "compact_pending" => Some(Self::CompactPending),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// One row of the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Monotonic row id assigned by the store.
    pub id: i64,
    /// Caller identity; any non-empty string, not required to be configured.
    pub from_team: String,
    /// Target team; must be configured.
    pub to_team: String,
    /// UUID v4, globally unique, never reused.
    pub session_id: String,
    pub created_at_ms: u64,
    pub last_used_at_ms: u64,
    pub message_count: u64,
    pub status: SessionStatus,
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
