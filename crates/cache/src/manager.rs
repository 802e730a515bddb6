// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-id → message-cache table.

use crate::cache::{CacheStats, MessageCache};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Aggregate counts across all live caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub caches: usize,
    pub total_entries: usize,
    pub total_messages: usize,
}

/// Owns one [`MessageCache`] per session.
#[derive(Default)]
pub struct CacheManager {
    caches: Mutex<HashMap<String, Arc<MessageCache>>>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(
        &self,
        session_id: &str,
        from_team: &str,
        to_team: &str,
    ) -> Arc<MessageCache> {
        let mut caches = self.caches.lock();
        Arc::clone(
            caches
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(MessageCache::new(session_id, from_team, to_team))),
        )
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<MessageCache>> {
        self.caches.lock().get(session_id).cloned()
    }

    /// Destroy and remove one session's cache. Returns whether it existed.
    pub fn delete(&self, session_id: &str, now_ms: u64) -> bool {
        match self.caches.lock().remove(session_id) {
            Some(cache) => {
                cache.destroy(now_ms);
                true
            }
            None => false,
        }
    }

    pub fn destroy_all(&self, now_ms: u64) {
        let drained: Vec<_> = self.caches.lock().drain().collect();
        for (_, cache) in drained {
            cache.destroy(now_ms);
        }
    }

    pub fn cache_count(&self) -> usize {
        self.caches.lock().len()
    }

    pub fn stats(&self) -> ManagerStats {
        let caches = self.caches.lock();
        let mut stats = ManagerStats { caches: caches.len(), ..Default::default() };
        for cache in caches.values() {
            let CacheStats { total_entries, total_messages, .. } = cache.stats();
            stats.total_entries += total_entries;
            stats.total_messages += total_messages;
        }
        stats
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
