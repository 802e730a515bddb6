// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! iris-daemon: the orchestrator core.
//!
//! Ties the session store, cache layer, and transports into the public
//! operation surface (`tell`, `wake`, `sleep`, `reboot`, `compact`,
//! `cancel`, plus the read-only queries). The outer RPC/dashboard layers
//! sit above this crate and call into [`Orchestrator`].

pub mod bootstrap;
pub mod config;
pub mod env;
pub mod logging;
pub mod orchestrator;
pub mod pool;
pub mod queue;
pub mod sessions;

pub use bootstrap::{AgentBootstrap, SessionBootstrap};
pub use config::{DashboardConfig, IrisConfig, RpcTransport, Settings};
pub use orchestrator::{
    CompactOptions, CompactOutcome, Orchestrator, RebootOutcome, Report, SleepOptions,
    SleepOutcome, TeamStatus, TellOptions, TellOutcome, WakeOutcome, DEFAULT_TELL_TIMEOUT_MS,
};
pub use pool::{pool_key, HealthReport, ProcessPool, ProcessSnapshot};
pub use queue::{AsyncQueue, QueuedTell};
pub use sessions::{SessionManager, EXTERNAL_FROM};

#[cfg(any(test, feature = "test-support"))]
pub use bootstrap::{BootstrapCall, FakeBootstrap};
