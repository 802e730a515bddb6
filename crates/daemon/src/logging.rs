// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide tracing setup.
//!
//! Initialized once at startup; every component receives explicit handles
//! to everything else, so logging is the only ambient global.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber, honoring `LOG_LEVEL` / `DEBUG`.
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let _ = try_init();
}

pub fn try_init() -> Result<(), String> {
    let filter = EnvFilter::try_new(crate::env::log_filter())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| e.to_string())
}
