// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session sequence of cache entries.

use crate::entry::{CacheEntry, EntryKind, EntryStatus, TerminationReason};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

const ENTRY_CHANNEL_CAPACITY: usize = 64;

/// Counts over a cache's entries, by kind and status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub active: usize,
    pub completed: usize,
    pub terminated: usize,
    pub spawn_entries: usize,
    pub tell_entries: usize,
    pub total_messages: usize,
}

struct CacheState {
    entries: Vec<Arc<CacheEntry>>,
    entries_tx: Option<broadcast::Sender<Arc<CacheEntry>>>,
}

/// Ordered entry log for one session.
///
/// At most one entry is ACTIVE at a time; creating a new entry force-closes
/// a stale predecessor rather than letting two requests interleave.
pub struct MessageCache {
    session_id: String,
    from_team: String,
    to_team: String,
    state: Mutex<CacheState>,
}

impl MessageCache {
    pub fn new(
        session_id: impl Into<String>,
        from_team: impl Into<String>,
        to_team: impl Into<String>,
    ) -> Self {
        let (entries_tx, _) = broadcast::channel(ENTRY_CHANNEL_CAPACITY);
        Self {
            session_id: session_id.into(),
            from_team: from_team.into(),
            to_team: to_team.into(),
            state: Mutex::new(CacheState { entries: Vec::new(), entries_tx: Some(entries_tx) }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn from_team(&self) -> &str {
        &self.from_team
    }

    pub fn to_team(&self) -> &str {
        &self.to_team
    }

    /// Append a new entry, publishing it on the entries stream.
    ///
    /// A still-active predecessor is terminated first (manual termination)
    /// so the single-active-entry invariant holds even when a previous
    /// request was abandoned.
    pub fn create_entry(
        &self,
        kind: EntryKind,
        tell: impl Into<String>,
        now_ms: u64,
    ) -> Arc<CacheEntry> {
        let mut state = self.state.lock();
        if let Some(stale) = state.entries.iter().find(|e| e.is_active()) {
            tracing::warn!(
                session_id = %self.session_id,
                "terminating stale active entry before creating a new one"
            );
            stale.terminate(TerminationReason::ManualTermination, now_ms);
        }
        let entry = Arc::new(CacheEntry::new(kind, tell, now_ms));
        state.entries.push(Arc::clone(&entry));
        if let Some(tx) = &state.entries_tx {
            let _ = tx.send(Arc::clone(&entry));
        }
        entry
    }

    /// The lone ACTIVE entry, if any.
    pub fn active_entry(&self) -> Option<Arc<CacheEntry>> {
        self.state.lock().entries.iter().find(|e| e.is_active()).cloned()
    }

    pub fn entries(&self) -> Vec<Arc<CacheEntry>> {
        self.state.lock().entries.clone()
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// New entries as they are created. No replay.
    pub fn subscribe_entries(&self) -> Option<broadcast::Receiver<Arc<CacheEntry>>> {
        self.state.lock().entries_tx.as_ref().map(|tx| tx.subscribe())
    }

    /// Drop non-active history. Returns how many entries were removed.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|e| e.is_active());
        before - state.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let mut stats = CacheStats { total_entries: state.entries.len(), ..Default::default() };
        for entry in &state.entries {
            match entry.status() {
                EntryStatus::Active => stats.active += 1,
                EntryStatus::Completed => stats.completed += 1,
                EntryStatus::Terminated => stats.terminated += 1,
            }
            match entry.kind() {
                EntryKind::Spawn => stats.spawn_entries += 1,
                EntryKind::Tell => stats.tell_entries += 1,
            }
            stats.total_messages += entry.message_count();
        }
        stats
    }

    /// Complete any still-active entries and close the entries stream. The
    /// cache keeps its history but accepts no further entries.
    pub fn destroy(&self, now_ms: u64) {
        let mut state = self.state.lock();
        for entry in &state.entries {
            entry.complete(now_ms);
        }
        state.entries_tx = None;
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().entries_tx.is_none()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
