// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level scenario specs.
//!
//! These drive the orchestrator end-to-end through the public crate APIs,
//! with scripted fake transports and bootstraps in place of the real agent.

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/cache.rs"]
mod cache;
#[path = "specs/pool.rs"]
mod pool;
#[path = "specs/sessions.rs"]
mod sessions;
#[path = "specs/tell.rs"]
mod tell;
