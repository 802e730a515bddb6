// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One request's frame log.
//!
//! A [`CacheEntry`] accumulates the frames the agent emits for a single
//! request (or for the initial spawn handshake) and fans them out to any
//! number of observers. The owning transport is the sole writer; readers
//! subscribe via [`CacheEntry::subscribe`] and never race the writer: the
//! history snapshot and the live subscription are taken under one lock, so
//! a frame is delivered through exactly one of the two.

use iris_core::Frame;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::{broadcast, watch};

/// Capacity of the live fan-out channel. A lagging reader loses frames from
/// its live tail (logged), never from the replayed history.
const LIVE_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// The spawn handshake (`"ping"` + init frame).
    Spawn,
    /// A user-initiated tell.
    Tell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Active,
    Completed,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    ResponseTimeout,
    ProcessCrashed,
    ManualTermination,
}

struct EntryState {
    messages: Vec<Frame>,
    /// Live fan-out; dropped on the terminal transition so subscribers see
    /// end-of-stream after draining.
    live: Option<broadcast::Sender<Frame>>,
    status: EntryStatus,
    termination_reason: Option<TerminationReason>,
    completed_at_ms: Option<u64>,
}

/// Record of one tell (or the spawn handshake): request string, received
/// frames, status, timestamps.
pub struct CacheEntry {
    kind: EntryKind,
    tell: String,
    created_at_ms: u64,
    state: Mutex<EntryState>,
    status_tx: watch::Sender<EntryStatus>,
}

impl CacheEntry {
    pub fn new(kind: EntryKind, tell: impl Into<String>, now_ms: u64) -> Self {
        let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        let (status_tx, _) = watch::channel(EntryStatus::Active);
        Self {
            kind,
            tell: tell.into(),
            created_at_ms: now_ms,
            state: Mutex::new(EntryState {
                messages: Vec::new(),
                live: Some(live),
                status: EntryStatus::Active,
                termination_reason: None,
                completed_at_ms: None,
            }),
            status_tx,
        }
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// The initial write for this entry (`"ping"` for spawn entries).
    pub fn tell_string(&self) -> &str {
        &self.tell
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at_ms
    }

    pub fn completed_at_ms(&self) -> Option<u64> {
        self.state.lock().completed_at_ms
    }

    pub fn status(&self) -> EntryStatus {
        self.state.lock().status
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.state.lock().termination_reason
    }

    pub fn is_active(&self) -> bool {
        self.status() == EntryStatus::Active
    }

    /// Snapshot of the frames received so far, in arrival order.
    pub fn messages(&self) -> Vec<Frame> {
        self.state.lock().messages.clone()
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Append a frame and publish it to subscribers.
    ///
    /// Ignored (with a debug log) once the entry has left ACTIVE. A `result`
    /// frame is appended and then closes the entry. Returns whether the
    /// frame was accepted.
    pub fn add_message(&self, frame: Frame) -> bool {
        let mut state = self.state.lock();
        if state.status != EntryStatus::Active {
            tracing::debug!(
                kind = ?self.kind,
                status = ?state.status,
                "dropping frame for non-active entry"
            );
            return false;
        }
        let closes = frame.is_result();
        let frame_ts = frame.timestamp_ms;
        if let Some(live) = &state.live {
            // Send after cloning into the log; a send error only means no
            // subscriber is currently listening.
            let _ = live.send(frame.clone());
        }
        state.messages.push(frame);
        if closes {
            self.transition(&mut state, EntryStatus::Completed, None, frame_ts);
        }
        true
    }

    /// Subscribe to this entry's frames: the full history replays first,
    /// then live frames follow. After a terminal transition the stream ends.
    pub fn subscribe(&self) -> MessageStream {
        let state = self.state.lock();
        MessageStream {
            replay: state.messages.iter().cloned().collect(),
            live: state.live.as_ref().map(|tx| tx.subscribe()),
        }
    }

    /// Current status plus every later change. The receiver observes the
    /// value at subscription time immediately.
    pub fn watch_status(&self) -> watch::Receiver<EntryStatus> {
        self.status_tx.subscribe()
    }

    /// ACTIVE → COMPLETED. Returns false if already terminal.
    pub fn complete(&self, now_ms: u64) -> bool {
        let mut state = self.state.lock();
        if state.status != EntryStatus::Active {
            return false;
        }
        self.transition(&mut state, EntryStatus::Completed, None, now_ms);
        true
    }

    /// ACTIVE or COMPLETED → TERMINATED. Returns false if already
    /// terminated.
    pub fn terminate(&self, reason: TerminationReason, now_ms: u64) -> bool {
        let mut state = self.state.lock();
        if state.status == EntryStatus::Terminated {
            return false;
        }
        self.transition(&mut state, EntryStatus::Terminated, Some(reason), now_ms);
        true
    }

    fn transition(
        &self,
        state: &mut EntryState,
        to: EntryStatus,
        reason: Option<TerminationReason>,
        now_ms: u64,
    ) {
        state.status = to;
        state.termination_reason = reason;
        state.completed_at_ms.get_or_insert(now_ms);
        // Dropping the sender ends every subscriber's live tail.
        state.live = None;
        self.status_tx.send_replace(to);
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("kind", &self.kind)
            .field("status", &self.status())
            .field("messages", &self.message_count())
            .finish()
    }
}

/// Reader over a [`CacheEntry`]: replayed history, then live frames, then
/// end-of-stream once the entry reaches a terminal status.
pub struct MessageStream {
    replay: VecDeque<Frame>,
    live: Option<broadcast::Receiver<Frame>>,
}

impl MessageStream {
    /// Next frame, or `None` once the entry is terminal and the history is
    /// drained.
    pub async fn next(&mut self) -> Option<Frame> {
        if let Some(frame) = self.replay.pop_front() {
            return Some(frame);
        }
        let live = self.live.as_mut()?;
        loop {
            match live.recv().await {
                Ok(frame) => return Some(frame),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "message stream lagged, frames skipped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.live = None;
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
