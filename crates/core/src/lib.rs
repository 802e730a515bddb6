// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! iris-core: shared types and pure utilities for the iris orchestrator.
//!
//! Everything here is I/O-free: frame classification, session and team
//! records, input validation, agent-storage path math, the clock
//! abstraction, and the workspace-wide error type.

pub mod clock;
pub mod error;
pub mod frame;
pub mod paths;
pub mod session;
pub mod team;
pub mod validate;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::IrisError;
pub use frame::{Frame, FrameType};
pub use paths::{agent_home, escape_project_path, session_file_path};
pub use session::{Session, SessionStatus};
pub use team::TeamConfig;
pub use validate::{
    validate_project_path, validate_session_id, validate_team_name, validate_timeout,
    MAX_TIMEOUT_MS, TIMEOUT_ASYNC, TIMEOUT_UNBOUNDED,
};

/// Generate a fresh v4 session ID in canonical hyphenated form.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
