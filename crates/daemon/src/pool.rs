// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded pool of live agent processes.
//!
//! One transport per pool key (`"<fromTeam|external>-><toTeam>"`), at most
//! `maxProcesses` at a time. When full, the least recently used idle slot
//! is evicted; with nothing idle, the least recently touched slot goes
//! regardless. All mutations run under one async mutex so the three maps
//! stay mutually consistent; the lock is deliberately held across spawn
//! and terminate.

use crate::config::IrisConfig;
use iris_cache::{CacheManager, EntryKind, EntryStatus};
use iris_core::{Clock, IrisError};
use iris_transport::{ProcessStatus, Transport, TransportFactory, TransportMetrics};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Canonical key for a transport slot.
pub fn pool_key(from_team: Option<&str>, to_team: &str) -> String {
    let from = from_team.filter(|s| !s.is_empty()).unwrap_or(crate::sessions::EXTERNAL_FROM);
    format!("{from}->{to_team}")
}

struct Slot {
    transport: Arc<dyn Transport>,
    team: String,
    session_id: String,
}

struct PoolState {
    processes: HashMap<String, Slot>,
    session_to_pool: HashMap<String, String>,
    /// Most recently used last.
    access_order: VecDeque<String>,
    shut_down: bool,
}

/// One live process slot, for reports.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSnapshot {
    pub pool_key: String,
    pub team: String,
    pub session_id: String,
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    pub metrics: TransportMetrics,
}

/// Outcome of one health sweep.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct HealthReport {
    pub processes: usize,
    pub removed_stopped: usize,
    pub terminated_idle: usize,
}

pub struct ProcessPool<C: Clock> {
    config: Arc<IrisConfig>,
    factory: Arc<dyn TransportFactory>,
    caches: Arc<CacheManager>,
    clock: C,
    state: Mutex<PoolState>,
}

impl<C: Clock> ProcessPool<C> {
    pub fn new(
        config: Arc<IrisConfig>,
        factory: Arc<dyn TransportFactory>,
        caches: Arc<CacheManager>,
        clock: C,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            factory,
            caches,
            clock,
            state: Mutex::new(PoolState {
                processes: HashMap::new(),
                session_to_pool: HashMap::new(),
                access_order: VecDeque::new(),
                shut_down: false,
            }),
        })
    }

    /// Return the live transport for the pair, spawning (and possibly
    /// evicting) as needed.
    pub async fn get_or_create_process(
        self: &Arc<Self>,
        to_team: &str,
        session_id: &str,
        from_team: Option<&str>,
    ) -> Result<Arc<dyn Transport>, IrisError> {
        let team = self
            .config
            .team(to_team)
            .ok_or_else(|| IrisError::TeamNotFound(to_team.to_string()))?
            .clone();
        let key = pool_key(from_team, to_team);

        let mut state = self.state.lock().await;
        if state.shut_down {
            return Err(IrisError::Transport("process pool is shut down".to_string()));
        }
        touch(&mut state.access_order, &key);

        if let Some(slot) = state.processes.get(&key) {
            if slot.transport.status() != ProcessStatus::Stopped {
                return Ok(Arc::clone(&slot.transport));
            }
            // Stale slot left by a dead process; replace it.
            remove_key(&mut state, &key);
            touch(&mut state.access_order, &key);
        }

        if state.processes.len() >= self.config.settings.max_processes {
            self.evict_one(&mut state).await?;
        }

        let transport = match self.factory.create(to_team, &team, session_id) {
            Ok(transport) => transport,
            Err(e) => {
                state.access_order.retain(|k| k != &key);
                return Err(e);
            }
        };

        let cache = self.caches.get_or_create(
            session_id,
            from_team.filter(|s| !s.is_empty()).unwrap_or(crate::sessions::EXTERNAL_FROM),
            to_team,
        );
        let spawn_entry = cache.create_entry(EntryKind::Spawn, "ping", self.clock.epoch_ms());
        let timeout = Duration::from_millis(self.config.session_init_timeout(&team));

        if let Err(e) = transport.spawn(Arc::clone(&spawn_entry), timeout).await {
            state.access_order.retain(|k| k != &key);
            return Err(e);
        }

        // Let the handshake's own result land before the first real tell
        // can race it.
        let mut handshake = spawn_entry.watch_status();
        let settled = tokio::time::timeout(timeout, async {
            while *handshake.borrow_and_update() == EntryStatus::Active {
                if handshake.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        if settled.is_err() {
            tracing::warn!(key, "spawn handshake still pending after init timeout");
        }

        tracing::info!(key, team = to_team, pid = transport.pid(), "process ready");
        state.processes.insert(
            key.clone(),
            Slot {
                transport: Arc::clone(&transport),
                team: to_team.to_string(),
                session_id: session_id.to_string(),
            },
        );
        state.session_to_pool.insert(session_id.to_string(), key.clone());
        drop(state);

        self.spawn_removal_watcher(key, Arc::clone(&transport));
        Ok(transport)
    }

    /// Evict per LRU policy: oldest idle, else oldest overall.
    async fn evict_one(&self, state: &mut PoolState) -> Result<(), IrisError> {
        let live: Vec<String> = state
            .access_order
            .iter()
            .filter(|k| state.processes.contains_key(*k))
            .cloned()
            .collect();
        let victim = live
            .iter()
            .find(|k| {
                state.processes.get(*k).is_some_and(|s| {
                    s.transport.status() == ProcessStatus::Idle
                })
            })
            .or_else(|| live.first())
            .cloned();
        let Some(victim) = victim else {
            return Err(IrisError::ProcessPoolLimit(self.config.settings.max_processes));
        };

        if let Some(slot) = remove_key(state, &victim) {
            tracing::info!(key = victim, "evicting process (pool at capacity)");
            if let Err(e) = slot.transport.terminate().await {
                tracing::warn!(key = victim, error = %e, "eviction terminate failed");
            }
        }
        Ok(())
    }

    /// Terminate and remove the slot for a pair. Returns whether one
    /// existed.
    pub async fn terminate_process(
        &self,
        from_team: Option<&str>,
        to_team: &str,
    ) -> Result<bool, IrisError> {
        let key = pool_key(from_team, to_team);
        let slot = {
            let mut state = self.state.lock().await;
            remove_key(&mut state, &key)
        };
        match slot {
            Some(slot) => {
                slot.transport.terminate().await?;
                tracing::info!(key, "process terminated");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Terminate everything. The pool refuses new processes afterwards.
    pub async fn terminate_all(&self) {
        let slots: Vec<Slot> = {
            let mut state = self.state.lock().await;
            state.shut_down = true;
            state.access_order.clear();
            state.session_to_pool.clear();
            state.processes.drain().map(|(_, slot)| slot).collect()
        };
        let terminations = slots.iter().map(|slot| slot.transport.terminate());
        for result in futures_util::future::join_all(terminations).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "terminate during shutdown failed");
            }
        }
    }

    /// Drop stopped slots and enforce per-team idle timeouts.
    pub async fn health_sweep(&self) -> HealthReport {
        let now_ms = self.clock.epoch_ms();
        let mut state = self.state.lock().await;
        let keys: Vec<String> = state.processes.keys().cloned().collect();
        let mut report = HealthReport::default();

        for key in keys {
            let Some(slot) = state.processes.get(&key) else { continue };
            match slot.transport.status() {
                ProcessStatus::Stopped => {
                    remove_key(&mut state, &key);
                    report.removed_stopped += 1;
                }
                ProcessStatus::Idle => {
                    let Some(team) = self.config.team(&slot.team) else { continue };
                    let limit = self.config.idle_timeout(team);
                    let metrics = slot.transport.metrics();
                    let idle_ms = metrics
                        .last_response_at_ms
                        .map(|at| now_ms.saturating_sub(at))
                        .unwrap_or(metrics.uptime_ms);
                    if idle_ms >= limit {
                        if let Some(slot) = remove_key(&mut state, &key) {
                            tracing::info!(key, idle_ms, "terminating idle process");
                            if let Err(e) = slot.transport.terminate().await {
                                tracing::warn!(key, error = %e, "idle terminate failed");
                            }
                            report.terminated_idle += 1;
                        }
                    }
                }
                _ => {}
            }
        }

        report.processes = state.processes.len();
        tracing::info!(
            processes = report.processes,
            removed_stopped = report.removed_stopped,
            terminated_idle = report.terminated_idle,
            "health check"
        );
        report
    }

    /// Periodic health sweeps until the token fires.
    pub fn spawn_monitor(
        self: &Arc<Self>,
        interval_ms: u64,
        token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick is immediate; skip it so the sweep cadence
            // starts one interval after startup.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        pool.health_sweep().await;
                    }
                }
            }
        })
    }

    pub async fn process_for(
        &self,
        from_team: Option<&str>,
        to_team: &str,
    ) -> Option<Arc<dyn Transport>> {
        let key = pool_key(from_team, to_team);
        let state = self.state.lock().await;
        state.processes.get(&key).map(|slot| Arc::clone(&slot.transport))
    }

    pub async fn key_for_session(&self, session_id: &str) -> Option<String> {
        self.state.lock().await.session_to_pool.get(session_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.processes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn snapshot(&self) -> Vec<ProcessSnapshot> {
        let state = self.state.lock().await;
        state
            .access_order
            .iter()
            .filter_map(|key| {
                let slot = state.processes.get(key)?;
                Some(ProcessSnapshot {
                    pool_key: key.clone(),
                    team: slot.team.clone(),
                    session_id: slot.session_id.clone(),
                    status: slot.transport.status(),
                    pid: slot.transport.pid(),
                    metrics: slot.transport.metrics(),
                })
            })
            .collect()
    }

    fn spawn_removal_watcher(self: &Arc<Self>, key: String, transport: Arc<dyn Transport>) {
        let weak = Arc::downgrade(self);
        let mut status = transport.watch_status();
        tokio::spawn(async move {
            loop {
                if *status.borrow_and_update() == ProcessStatus::Stopped {
                    break;
                }
                if status.changed().await.is_err() {
                    break;
                }
            }
            let Some(pool) = weak.upgrade() else { return };
            let mut state = pool.state.lock().await;
            let same = state.processes.get(&key).is_some_and(|slot| {
                // Compare data pointers only; the slot may hold a newer
                // transport under the same key.
                Arc::as_ptr(&slot.transport) as *const () == Arc::as_ptr(&transport) as *const ()
            });
            if same {
                remove_key(&mut state, &key);
                tracing::info!(key, "removed stopped process from pool");
            }
        });
    }
}

fn touch(order: &mut VecDeque<String>, key: &str) {
    order.retain(|k| k != key);
    order.push_back(key.to_string());
}

fn remove_key(state: &mut PoolState, key: &str) -> Option<Slot> {
    let slot = state.processes.remove(key);
    state.access_order.retain(|k| k != key);
    state.session_to_pool.retain(|_, v| v != key);
    slot
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
