// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The orchestrator state machine.
//!
//! One request flows: validate → resolve session → acquire process →
//! write the tell → observe the entry's frame stream until a result,
//! a timeout, or a crash. At most one tell is in flight per process; a
//! busy process yields a logical `busy` outcome instead of disturbing the
//! in-flight work.

use crate::bootstrap::SessionBootstrap;
use crate::config::IrisConfig;
use crate::pool::{pool_key, ProcessPool, ProcessSnapshot};
use crate::queue::{AsyncQueue, QueuedTell, DEFAULT_QUEUE_CAPACITY};
use crate::sessions::SessionManager;
use iris_cache::{CacheManager, EntryKind, ManagerStats, TerminationReason};
use iris_core::{
    validate_team_name, validate_timeout, Clock, IrisError, Session, SessionStatus, SystemClock,
    TIMEOUT_ASYNC, TIMEOUT_UNBOUNDED,
};
use iris_store::{SessionFilter, SessionStore, StoreStats};
use iris_transport::{DefaultTransportFactory, ProcessStatus, Transport, TransportFactory};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default bound for a synchronous tell.
pub const DEFAULT_TELL_TIMEOUT_MS: i64 = 30_000;

/// Options for [`Orchestrator::tell`].
#[derive(Debug, Clone)]
pub struct TellOptions {
    /// Milliseconds; `-1` switches to async mode, `0` waits unbounded.
    pub timeout_ms: i64,
    pub wait_for_response: bool,
    /// Drop the session's closed cache entries before sending.
    pub clear_cache: bool,
}

impl Default for TellOptions {
    fn default() -> Self {
        Self { timeout_ms: DEFAULT_TELL_TIMEOUT_MS, wait_for_response: true, clear_cache: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TellOutcome {
    /// The agent replied.
    Reply { text: String, duration_ms: u64 },
    /// Queued for background processing.
    Async { task_id: String },
    /// The process is mid-request; retry later or go async.
    Busy { team: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WakeOutcome {
    Woken { team: String, session_id: String },
    AlreadyAwake { team: String, session_id: String },
    Failed { team: String, error: String },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SleepOptions {
    /// Terminate even when a request is in flight.
    pub force: bool,
    pub clear_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SleepOutcome {
    Slept { team: String, lost_messages: usize },
    AlreadyAsleep { team: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebootOutcome {
    pub previous_session_id: Option<String>,
    pub session_id: String,
}

#[derive(Debug, Clone)]
pub struct CompactOptions {
    pub timeout_ms: u64,
    pub retries: u32,
}

impl Default for CompactOptions {
    fn default() -> Self {
        Self { timeout_ms: 60_000, retries: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompactOutcome {
    pub session_id: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamStatus {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub path: String,
    pub remote: bool,
    pub awake: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub teams: Vec<TeamStatus>,
    pub sessions: Vec<Session>,
    pub session_stats: StoreStats,
    pub processes: Vec<ProcessSnapshot>,
    pub cache_stats: ManagerStats,
}

struct Inner<C: Clock> {
    config: Arc<IrisConfig>,
    clock: C,
    sessions: SessionManager<C>,
    pool: Arc<ProcessPool<C>>,
    caches: Arc<CacheManager>,
    bootstrap: Arc<dyn SessionBootstrap>,
    queue: AsyncQueue,
    /// Per-session gates serializing the create-entry/execute window.
    tell_gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    monitor: Mutex<Option<(CancellationToken, tokio::task::JoinHandle<()>)>>,
}

/// Public operation surface of the core.
pub struct Orchestrator<C: Clock = SystemClock> {
    inner: Arc<Inner<C>>,
}

impl Orchestrator<SystemClock> {
    /// Production wiring: config and store from the environment, real
    /// transports and bootstrap.
    pub fn from_env() -> Result<Self, IrisError> {
        let config = IrisConfig::load(&crate::env::config_path())?;
        let store = SessionStore::open(&crate::env::store_path())?;
        Ok(Self::new(
            config,
            store,
            Arc::new(DefaultTransportFactory),
            Arc::new(crate::bootstrap::AgentBootstrap),
            SystemClock,
        ))
    }
}

impl<C: Clock> Orchestrator<C> {
    pub fn new(
        config: IrisConfig,
        store: SessionStore,
        factory: Arc<dyn TransportFactory>,
        bootstrap: Arc<dyn SessionBootstrap>,
        clock: C,
    ) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(store);
        let caches = Arc::new(CacheManager::new());
        let pool =
            ProcessPool::new(Arc::clone(&config), factory, Arc::clone(&caches), clock.clone());
        let sessions = SessionManager::new(
            Arc::clone(&config),
            store,
            Arc::clone(&bootstrap),
            clock.clone(),
        );

        let inner = Arc::new_cyclic(|weak: &Weak<Inner<C>>| {
            let handler_ref = weak.clone();
            let queue = AsyncQueue::new(DEFAULT_QUEUE_CAPACITY, move |task: QueuedTell| {
                let orchestrator = handler_ref.clone();
                async move {
                    let Some(inner) = orchestrator.upgrade() else {
                        return Err(IrisError::Transport("orchestrator is gone".to_string()));
                    };
                    let timeout_ms = if task.timeout_ms == TIMEOUT_ASYNC {
                        DEFAULT_TELL_TIMEOUT_MS
                    } else {
                        task.timeout_ms
                    };
                    match inner
                        .tell_sync(&task.from_team, &task.to_team, &task.content, timeout_ms, true)
                        .await?
                    {
                        TellOutcome::Reply { text, .. } => Ok(text),
                        TellOutcome::Busy { team } => Err(IrisError::ProcessBusy(team)),
                        TellOutcome::Async { .. } => {
                            Err(IrisError::Transport("queued tell re-queued itself".to_string()))
                        }
                    }
                }
            });

            Inner {
                config,
                clock,
                sessions,
                pool,
                caches,
                bootstrap,
                queue,
                tell_gates: Mutex::new(HashMap::new()),
                monitor: Mutex::new(None),
            }
        });
        Self { inner }
    }

    /// Ensure per-team sessions exist and start the health monitor.
    pub async fn initialize(&self) -> Result<(), IrisError> {
        self.inner.sessions.initialize().await?;
        let token = CancellationToken::new();
        let handle = self
            .inner
            .pool
            .spawn_monitor(self.inner.config.settings.health_check_interval, token.clone());
        *self.inner.monitor.lock() = Some((token, handle));
        Ok(())
    }

    /// Stop background work and terminate every process.
    pub async fn shutdown(&self) {
        if let Some((token, handle)) = self.inner.monitor.lock().take() {
            token.cancel();
            handle.abort();
        }
        self.inner.queue.shutdown();
        self.inner.pool.terminate_all().await;
        self.inner.caches.destroy_all(self.inner.clock.epoch_ms());
    }

    /// Primary path: deliver a message on the pair's session and return
    /// the agent's reply (or a task id in async mode).
    pub async fn tell(
        &self,
        from_team: &str,
        to_team: &str,
        message: &str,
        options: TellOptions,
    ) -> Result<TellOutcome, IrisError> {
        validate_names(from_team, to_team)?;
        validate_timeout(options.timeout_ms)?;
        if message.trim().is_empty() {
            return Err(IrisError::validation("message", "must not be empty"));
        }
        if self.inner.config.team(to_team).is_none() {
            return Err(IrisError::TeamNotFound(to_team.to_string()));
        }

        if !options.wait_for_response || options.timeout_ms == TIMEOUT_ASYNC {
            let task_id =
                self.inner.queue.enqueue(from_team, to_team, message, options.timeout_ms)?;
            tracing::info!(from_team, to_team, task_id, "tell queued");
            return Ok(TellOutcome::Async { task_id });
        }

        self.inner
            .tell_sync(from_team, to_team, message, options.timeout_ms, options.clear_cache)
            .await
    }

    /// Ensure a session and a running process for each team. Sequential
    /// and idempotent.
    pub async fn wake(&self, teams: &[String]) -> Vec<WakeOutcome> {
        let mut outcomes = Vec::with_capacity(teams.len());
        for team in teams {
            outcomes.push(self.inner.wake_one(team).await);
        }
        outcomes
    }

    /// Terminate the `(external, team)` process, if any.
    pub async fn sleep(
        &self,
        team: &str,
        options: SleepOptions,
    ) -> Result<SleepOutcome, IrisError> {
        validate_team_name(team)?;
        if self.inner.config.team(team).is_none() {
            return Err(IrisError::TeamNotFound(team.to_string()));
        }

        let Some(transport) = self.inner.pool.process_for(None, team).await else {
            return Ok(SleepOutcome::AlreadyAsleep { team: team.to_string() });
        };
        let busy = transport.is_busy();
        if busy && !options.force {
            return Err(IrisError::ProcessBusy(team.to_string()));
        }

        let session = self.inner.sessions.get_by_team_pair(crate::sessions::EXTERNAL_FROM, team)?;
        let lost_messages = match &session {
            Some(session) => self
                .inner
                .caches
                .get(&session.session_id)
                .and_then(|cache| cache.active_entry())
                .map(|entry| entry.message_count().max(1))
                .unwrap_or(0),
            None => usize::from(busy),
        };

        self.inner.pool.terminate_process(None, team).await?;
        if options.clear_cache {
            if let Some(session) = &session {
                if let Some(cache) = self.inner.caches.get(&session.session_id) {
                    cache.clear();
                }
            }
        }
        if busy {
            tracing::warn!(team, lost_messages, "force-slept a busy process");
        }
        Ok(SleepOutcome::Slept { team: team.to_string(), lost_messages })
    }

    /// Terminate the pair's process, archive away the old session (row and
    /// on-disk file), and allocate a fresh one.
    pub async fn reboot(
        &self,
        from_team: &str,
        to_team: &str,
    ) -> Result<RebootOutcome, IrisError> {
        validate_names(from_team, to_team)?;
        if self.inner.config.team(to_team).is_none() {
            return Err(IrisError::TeamNotFound(to_team.to_string()));
        }

        if let Err(e) = self.inner.pool.terminate_process(Some(from_team), to_team).await {
            tracing::warn!(from_team, to_team, error = %e, "reboot: terminate failed, continuing");
        }

        let old = self.inner.sessions.get_by_team_pair(from_team, to_team)?;
        if let Some(old) = &old {
            self.inner.caches.delete(&old.session_id, self.inner.clock.epoch_ms());
            if let Err(e) = self.inner.sessions.delete_session(&old.session_id, true).await {
                tracing::warn!(
                    session_id = %old.session_id,
                    error = %e,
                    "reboot: session delete failed, continuing"
                );
            }
        }

        let fresh = self.inner.sessions.get_or_create_session(from_team, to_team).await?;
        tracing::info!(
            from_team,
            to_team,
            old_session_id = old.as_ref().map(|s| s.session_id.as_str()),
            new_session_id = %fresh.session_id,
            "rebooted"
        );
        Ok(RebootOutcome {
            previous_session_id: old.map(|s| s.session_id),
            session_id: fresh.session_id,
        })
    }

    /// One-shot `/compact` against the pair's session, with retries.
    pub async fn compact(
        &self,
        from_team: &str,
        to_team: &str,
        options: CompactOptions,
    ) -> Result<CompactOutcome, IrisError> {
        validate_names(from_team, to_team)?;
        let team = self
            .inner
            .config
            .team(to_team)
            .ok_or_else(|| IrisError::TeamNotFound(to_team.to_string()))?
            .clone();
        let session = self
            .inner
            .sessions
            .get_by_team_pair(from_team, to_team)?
            .ok_or_else(|| IrisError::SessionNotFound(format!("{from_team}->{to_team}")))?;
        let session_id = session.session_id;

        self.inner.sessions.set_status(&session_id, SessionStatus::CompactPending)?;
        let timeout = Duration::from_millis(options.timeout_ms);
        let mut last_error: Option<IrisError> = None;

        // One initial try plus `retries` retries.
        for attempt in 1..=options.retries + 1 {
            match self
                .inner
                .bootstrap
                .run_print(to_team, &team, &session_id, "/compact", timeout)
                .await
            {
                Ok(_) => {
                    self.inner.sessions.set_status(&session_id, SessionStatus::Active)?;
                    self.inner.sessions.touch(&session_id)?;
                    return Ok(CompactOutcome { session_id, attempts: attempt });
                }
                Err(e) => {
                    tracing::warn!(to_team, attempt, error = %e, "compact attempt failed");
                    last_error = Some(e);
                }
            }
        }

        // Do not leave the session stuck in compact_pending.
        self.inner.sessions.set_status(&session_id, SessionStatus::Active)?;
        Err(last_error
            .unwrap_or_else(|| IrisError::Transport("compact failed without attempts".into())))
    }

    /// Best-effort interrupt. Returns whether a process was found; the
    /// interrupt's effect is not guaranteed either way.
    pub async fn cancel(&self, from_team: &str, to_team: &str) -> Result<bool, IrisError> {
        validate_names(from_team, to_team)?;
        match self.inner.pool.process_for(Some(from_team), to_team).await {
            Some(transport) => {
                let delivered = transport.cancel().await.unwrap_or(false);
                tracing::info!(from_team, to_team, delivered, "cancel requested");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn is_awake(&self, from_team: Option<&str>, to_team: &str) -> bool {
        self.inner
            .pool
            .process_for(from_team, to_team)
            .await
            .is_some_and(|t| t.status() != ProcessStatus::Stopped)
    }

    /// Configured teams with their live/asleep state.
    pub async fn teams(&self) -> Vec<TeamStatus> {
        let mut teams = Vec::with_capacity(self.inner.config.teams.len());
        for (name, team) in &self.inner.config.teams {
            teams.push(TeamStatus {
                name: name.clone(),
                description: team.description.clone(),
                path: team.path.to_string_lossy().into_owned(),
                remote: team.is_remote(),
                awake: self.is_awake(None, name).await,
                color: team.color.clone(),
            });
        }
        teams
    }

    /// Composite status over teams, sessions, processes, and caches.
    pub async fn report(&self) -> Result<Report, IrisError> {
        Ok(Report {
            teams: self.teams().await,
            sessions: self.inner.sessions.list(&SessionFilter::default())?,
            session_stats: self.inner.sessions.store().stats()?,
            processes: self.inner.pool.snapshot().await,
            cache_stats: self.inner.caches.stats(),
        })
    }

    pub fn sessions(&self) -> &SessionManager<C> {
        &self.inner.sessions
    }

    pub fn pool(&self) -> &Arc<ProcessPool<C>> {
        &self.inner.pool
    }

    pub fn caches(&self) -> &Arc<CacheManager> {
        &self.inner.caches
    }

    pub fn config(&self) -> &Arc<IrisConfig> {
        &self.inner.config
    }
}

impl<C: Clock> Inner<C> {
    fn tell_gate(&self, session_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.tell_gates
                .lock()
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    async fn tell_sync(
        &self,
        from_team: &str,
        to_team: &str,
        message: &str,
        timeout_ms: i64,
        clear_cache: bool,
    ) -> Result<TellOutcome, IrisError> {
        let started = self.clock.now();
        let session = self.sessions.get_or_create_session(from_team, to_team).await?;
        let session_id = session.session_id.clone();

        let cache = self.caches.get_or_create(&session_id, from_team, to_team);
        if clear_cache {
            let removed = cache.clear();
            if removed > 0 {
                tracing::debug!(%session_id, removed, "cleared cache entries before tell");
            }
        }

        let transport =
            self.pool.get_or_create_process(to_team, &session_id, Some(from_team)).await?;

        let entry = {
            let gate = self.tell_gate(&session_id);
            let _guard = gate.lock().await;

            if transport.is_busy() || cache.active_entry().is_some() {
                return Ok(TellOutcome::Busy { team: to_team.to_string() });
            }
            self.sessions.touch(&session_id)?;
            let entry = cache.create_entry(EntryKind::Tell, message, self.clock.epoch_ms());
            match transport.execute_tell(Arc::clone(&entry)).await {
                Ok(()) => entry,
                Err(IrisError::ProcessBusy(team)) => {
                    entry.terminate(TerminationReason::ManualTermination, self.clock.epoch_ms());
                    return Ok(TellOutcome::Busy { team });
                }
                Err(e) => return Err(e),
            }
        };

        let wait_for_result = async {
            let mut frames = entry.subscribe();
            while let Some(frame) = frames.next().await {
                if frame.is_result() {
                    return Some(frame);
                }
            }
            None
        };
        let bounded = timeout_ms != TIMEOUT_UNBOUNDED;
        let outcome = if bounded {
            tokio::time::timeout(Duration::from_millis(timeout_ms as u64), wait_for_result).await
        } else {
            Ok(wait_for_result.await)
        };

        match outcome {
            Err(_elapsed) => {
                entry.terminate(TerminationReason::ResponseTimeout, self.clock.epoch_ms());
                tracing::warn!(from_team, to_team, timeout_ms, "tell timed out");
                Err(IrisError::ResponseTimeout(timeout_ms as u64))
            }
            Ok(None) => match entry.termination_reason() {
                Some(TerminationReason::ProcessCrashed) => Err(IrisError::ProcessCrashed(
                    format!("{to_team} agent exited before replying"),
                )),
                reason => Err(IrisError::Transport(format!(
                    "request terminated before a result ({reason:?})"
                ))),
            },
            Ok(Some(frame)) => {
                self.sessions.record_exchange(&session_id)?;
                let text = frame.result_text().unwrap_or_default().to_string();
                let duration_ms = self.clock.now().duration_since(started).as_millis() as u64;
                tracing::info!(from_team, to_team, duration_ms, "tell complete");
                Ok(TellOutcome::Reply { text, duration_ms })
            }
        }
    }

    async fn wake_one(&self, team: &str) -> WakeOutcome {
        if let Err(e) = validate_team_name(team) {
            return WakeOutcome::Failed { team: team.to_string(), error: e.to_string() };
        }
        let already = self
            .pool
            .process_for(None, team)
            .await
            .is_some_and(|t| t.status() != ProcessStatus::Stopped);

        let session =
            match self.sessions.get_or_create_session(crate::sessions::EXTERNAL_FROM, team).await
            {
                Ok(session) => session,
                Err(e) => {
                    return WakeOutcome::Failed { team: team.to_string(), error: e.to_string() }
                }
            };
        if already {
            return WakeOutcome::AlreadyAwake {
                team: team.to_string(),
                session_id: session.session_id,
            };
        }
        match self.pool.get_or_create_process(team, &session.session_id, None).await {
            Ok(_) => {
                WakeOutcome::Woken { team: team.to_string(), session_id: session.session_id }
            }
            Err(e) => WakeOutcome::Failed { team: team.to_string(), error: e.to_string() },
        }
    }
}

fn validate_names(from_team: &str, to_team: &str) -> Result<(), IrisError> {
    validate_team_name(from_team)
        .map_err(|_| IrisError::validation("fromTeam", format!("invalid name {from_team:?}")))?;
    validate_team_name(to_team)
        .map_err(|_| IrisError::validation("toTeam", format!("invalid name {to_team:?}")))?;
    Ok(())
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
