// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted fake transport for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::{ProcessStatus, Transport, TransportError, TransportFactory, TransportMetrics};
use async_trait::async_trait;
use iris_cache::{CacheEntry, TerminationReason};
use iris_core::{Clock, Frame, IrisError, SystemClock, TeamConfig};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Recorded transport call
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Spawn { tell: String },
    ExecuteTell { tell: String },
    Terminate,
    Cancel,
}

/// What the fake agent does with the next tell.
#[derive(Debug, Clone)]
pub enum FakeReply {
    /// Emit an assistant frame then a successful result with this text.
    Result(String),
    /// Emit these raw frames verbatim.
    Frames(Vec<serde_json::Value>),
    /// Never respond (for timeout paths).
    Silence,
}

struct FakeState {
    calls: Vec<TransportCall>,
    replies: VecDeque<FakeReply>,
    fail_spawn: bool,
    reply_delay: Duration,
    current_entry: Option<Arc<CacheEntry>>,
    messages_processed: u64,
    last_response_at_ms: Option<u64>,
}

/// Transport double driven by a reply script instead of a subprocess.
#[derive(Clone)]
pub struct FakeTransport {
    team: String,
    state: Arc<Mutex<FakeState>>,
    status_tx: Arc<watch::Sender<ProcessStatus>>,
    errors_tx: broadcast::Sender<TransportError>,
    clock: SystemClock,
}

impl FakeTransport {
    pub fn new(team: impl Into<String>) -> Self {
        let (status_tx, _) = watch::channel(ProcessStatus::Stopped);
        let (errors_tx, _) = broadcast::channel(16);
        Self {
            team: team.into(),
            state: Arc::new(Mutex::new(FakeState {
                calls: Vec::new(),
                replies: VecDeque::new(),
                fail_spawn: false,
                reply_delay: Duration::ZERO,
                current_entry: None,
                messages_processed: 0,
                last_response_at_ms: None,
            })),
            status_tx: Arc::new(status_tx),
            errors_tx,
            clock: SystemClock,
        }
    }

    /// Queue a reply for the next tell. Replies are consumed in order; once
    /// the queue is empty every tell gets `"ok"`.
    pub fn push_reply(&self, reply: FakeReply) -> &Self {
        self.state.lock().replies.push_back(reply);
        self
    }

    pub fn fail_spawn(&self) -> &Self {
        self.state.lock().fail_spawn = true;
        self
    }

    pub fn set_reply_delay(&self, delay: Duration) -> &Self {
        self.state.lock().reply_delay = delay;
        self
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.clone()
    }

    /// Backdate the last-response timestamp (for idle-timeout tests).
    pub fn set_last_response_at_ms(&self, ms: u64) {
        self.state.lock().last_response_at_ms = Some(ms);
    }

    /// Pretend the underlying process died.
    pub fn simulate_crash(&self) {
        let entry = self.state.lock().current_entry.take();
        if let Some(entry) = entry.filter(|e| e.is_active()) {
            entry.terminate(TerminationReason::ProcessCrashed, self.clock.epoch_ms());
        }
        self.status_tx.send_replace(ProcessStatus::Stopped);
        let _ = self.errors_tx.send(TransportError::UnexpectedExit(Some(1)));
    }

    fn deliver(&self, entry: &Arc<CacheEntry>, reply: FakeReply) {
        let now_ms = self.clock.epoch_ms();
        let frames: Vec<Frame> = match reply {
            FakeReply::Silence => return,
            FakeReply::Result(text) => vec![
                Frame::from_json(
                    serde_json::json!({"type": "assistant", "message": {"content": []}}),
                    now_ms,
                ),
                Frame::from_json(
                    serde_json::json!({"type": "result", "subtype": "success", "result": text}),
                    now_ms,
                ),
            ],
            FakeReply::Frames(values) => {
                values.into_iter().map(|v| Frame::from_json(v, now_ms)).collect()
            }
        };

        let transport = self.clone();
        let entry = Arc::clone(entry);
        let delay = self.state.lock().reply_delay;
        tokio::spawn(async move {
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
            for frame in frames {
                // Settle status before publishing a result, as the real
                // pump does: observers wake on the frame.
                if frame.is_result() {
                    let mut state = transport.state.lock();
                    state.messages_processed += 1;
                    state.last_response_at_ms = Some(transport.clock.epoch_ms());
                    state.current_entry = None;
                    drop(state);
                    transport.status_tx.send_if_modified(|s| {
                        if *s == ProcessStatus::Processing {
                            *s = ProcessStatus::Idle;
                            true
                        } else {
                            false
                        }
                    });
                }
                entry.add_message(frame);
            }
        });
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn spawn(
        &self,
        spawn_entry: Arc<CacheEntry>,
        timeout: Duration,
    ) -> Result<(), IrisError> {
        let fail = {
            let mut state = self.state.lock();
            state.calls.push(TransportCall::Spawn { tell: spawn_entry.tell_string().to_string() });
            state.fail_spawn
        };
        if fail {
            self.status_tx.send_replace(ProcessStatus::Stopped);
            let ms = timeout.as_millis() as u64;
            let _ = self.errors_tx.send(TransportError::InitTimeout(ms));
            return Err(IrisError::InitTimeout(ms));
        }
        self.status_tx.send_replace(ProcessStatus::Spawning);
        let now_ms = self.clock.epoch_ms();
        spawn_entry.add_message(Frame::from_json(
            serde_json::json!({"type": "system", "subtype": "init", "session_id": "fake"}),
            now_ms,
        ));
        spawn_entry.add_message(Frame::from_json(
            serde_json::json!({"type": "result", "subtype": "success", "result": "pong"}),
            now_ms,
        ));
        self.status_tx.send_replace(ProcessStatus::Idle);
        Ok(())
    }

    async fn execute_tell(&self, entry: Arc<CacheEntry>) -> Result<(), IrisError> {
        let reply = {
            let mut state = self.state.lock();
            state.calls.push(TransportCall::ExecuteTell {
                tell: entry.tell_string().to_string(),
            });
            if *self.status_tx.borrow() != ProcessStatus::Idle {
                return Err(IrisError::ProcessBusy(self.team.clone()));
            }
            state.current_entry = Some(Arc::clone(&entry));
            state.replies.pop_front().unwrap_or_else(|| FakeReply::Result("ok".to_string()))
        };
        self.status_tx.send_replace(ProcessStatus::Processing);
        self.deliver(&entry, reply);
        Ok(())
    }

    async fn terminate(&self) -> Result<(), IrisError> {
        let entry = {
            let mut state = self.state.lock();
            state.calls.push(TransportCall::Terminate);
            state.current_entry.take()
        };
        if let Some(entry) = entry.filter(|e| e.is_active()) {
            entry.terminate(TerminationReason::ManualTermination, self.clock.epoch_ms());
        }
        self.status_tx.send_replace(ProcessStatus::Stopped);
        Ok(())
    }

    async fn cancel(&self) -> Result<bool, IrisError> {
        self.state.lock().calls.push(TransportCall::Cancel);
        Ok(*self.status_tx.borrow() != ProcessStatus::Stopped)
    }

    fn status(&self) -> ProcessStatus {
        *self.status_tx.borrow()
    }

    fn watch_status(&self) -> watch::Receiver<ProcessStatus> {
        self.status_tx.subscribe()
    }

    fn subscribe_errors(&self) -> broadcast::Receiver<TransportError> {
        self.errors_tx.subscribe()
    }

    fn metrics(&self) -> TransportMetrics {
        let state = self.state.lock();
        TransportMetrics {
            uptime_ms: 0,
            messages_processed: state.messages_processed,
            last_response_at_ms: state.last_response_at_ms,
        }
    }

    fn pid(&self) -> Option<u32> {
        match *self.status_tx.borrow() {
            ProcessStatus::Stopped => None,
            _ => Some(4242),
        }
    }
}

/// Factory that hands out [`FakeTransport`]s and remembers them by team.
#[derive(Default)]
pub struct FakeTransportFactory {
    created: Mutex<Vec<(String, FakeTransport)>>,
    prepared: Mutex<Vec<(String, FakeTransport)>>,
}

impl FakeTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-stage a scripted transport for the next `create` of `team`.
    pub fn prepare(&self, team: &str, transport: FakeTransport) {
        self.prepared.lock().push((team.to_string(), transport));
    }

    /// Transports created so far for `team`, oldest first.
    pub fn created_for(&self, team: &str) -> Vec<FakeTransport> {
        self.created
            .lock()
            .iter()
            .filter(|(name, _)| name == team)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }
}

impl TransportFactory for FakeTransportFactory {
    fn create(
        &self,
        team_name: &str,
        _team: &TeamConfig,
        _session_id: &str,
    ) -> Result<Arc<dyn Transport>, IrisError> {
        let transport = {
            let mut prepared = self.prepared.lock();
            match prepared.iter().position(|(name, _)| name == team_name) {
                Some(at) => prepared.remove(at).1,
                None => FakeTransport::new(team_name),
            }
        };
        self.created.lock().push((team_name.to_string(), transport.clone()));
        Ok(Arc::new(transport))
    }
}
