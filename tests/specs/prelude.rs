// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the scenario specs.

pub use iris_core::{FakeClock, TeamConfig};
pub use iris_daemon::{
    FakeBootstrap, IrisConfig, Orchestrator, SessionBootstrap, SleepOptions, TellOptions,
    TellOutcome,
};
pub use iris_transport::{
    FakeReply, FakeTransport, FakeTransportFactory, Transport, TransportFactory,
};
pub use std::sync::Arc;
pub use std::time::Duration;

pub struct World {
    pub orchestrator: Orchestrator<FakeClock>,
    pub factory: Arc<FakeTransportFactory>,
    pub bootstrap: Arc<FakeBootstrap>,
    pub clock: FakeClock,
}

/// Orchestrator wired to fakes, with one local team per name.
pub fn world(teams: &[&str], max_processes: usize) -> World {
    let mut config = IrisConfig::default();
    config.settings.max_processes = max_processes;
    for team in teams {
        config.teams.insert(team.to_string(), TeamConfig::new(format!("/work/{team}")));
    }

    let factory = Arc::new(FakeTransportFactory::new());
    let bootstrap = Arc::new(FakeBootstrap::new());
    let clock = FakeClock::new();
    let orchestrator = Orchestrator::new(
        config,
        iris_store::SessionStore::open_in_memory().expect("in-memory store"),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
        Arc::clone(&bootstrap) as Arc<dyn SessionBootstrap>,
        clock.clone(),
    );
    World { orchestrator, factory, bootstrap, clock }
}
