// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-wide error type.
//!
//! One enum carries the uniform error kinds shared by every component, so a
//! caller can branch on [`IrisError::kind`] without knowing which layer the
//! failure came from. Messages are the short human string surfaced to
//! callers; anything noisier belongs in a `debug!` log next to the raise.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IrisError {
    /// Input violated a documented constraint. Caller-visible.
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("team not found: {0}")]
    TeamNotFound(String),

    #[error("no session for {0}")]
    SessionNotFound(String),

    /// A tell was attempted against a transport that is already processing.
    #[error("process busy: {0}")]
    ProcessBusy(String),

    /// Pool at capacity and no candidate was evictable.
    #[error("process pool at capacity ({0})")]
    ProcessPoolLimit(usize),

    /// Agent did not emit its init frame within the spawn timeout.
    #[error("agent init timed out after {0}ms")]
    InitTimeout(u64),

    /// Per-request timeout expired before a result frame arrived.
    #[error("no response after {0}ms")]
    ResponseTimeout(u64),

    /// Subprocess exited while a request was in flight.
    #[error("agent process crashed: {0}")]
    ProcessCrashed(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    /// Generic I/O failure at the transport layer.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Async queue soft bound exceeded.
    #[error("task queue full ({0} pending)")]
    QueueFull(usize),
}

impl IrisError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), message: message.into() }
    }

    /// Stable snake_case discriminator for reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::TeamNotFound(_) => "team_not_found",
            Self::SessionNotFound(_) => "session_not_found",
            Self::ProcessBusy(_) => "process_busy",
            Self::ProcessPoolLimit(_) => "process_pool_limit",
            Self::InitTimeout(_) => "init_timeout",
            Self::ResponseTimeout(_) => "response_timeout",
            Self::ProcessCrashed(_) => "process_crashed",
            Self::Configuration(_) => "configuration",
            Self::Transport(_) => "transport",
            Self::Storage(_) => "storage",
            Self::QueueFull(_) => "queue_full",
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
