// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool specs: LRU eviction and sleep idempotency.

use crate::prelude::*;
use iris_daemon::WakeOutcome;

#[tokio::test]
async fn wake_past_capacity_evicts_the_oldest_idle_team() {
    let w = world(&["a", "b", "c"], 2);
    let outcomes = w
        .orchestrator
        .wake(&["a".to_string(), "b".to_string(), "c".to_string()])
        .await;
    assert!(outcomes.iter().all(|o| matches!(o, WakeOutcome::Woken { .. })));

    // maxProcesses=2: waking c evicted a; the pool holds {b, c}.
    assert_eq!(w.orchestrator.pool().len().await, 2);
    assert!(!w.orchestrator.is_awake(None, "a").await);
    assert!(w.orchestrator.is_awake(None, "b").await);
    assert!(w.orchestrator.is_awake(None, "c").await);
}

#[tokio::test]
async fn second_sleep_reports_already_asleep_and_changes_nothing() {
    let w = world(&["a", "b"], 5);
    w.orchestrator.wake(&["a".to_string(), "b".to_string()]).await;
    assert_eq!(w.orchestrator.pool().len().await, 2);

    let first = w.orchestrator.sleep("a", SleepOptions::default()).await.unwrap();
    assert!(matches!(first, iris_daemon::SleepOutcome::Slept { .. }));
    assert_eq!(w.orchestrator.pool().len().await, 1);

    let second = w.orchestrator.sleep("a", SleepOptions::default()).await.unwrap();
    assert!(matches!(second, iris_daemon::SleepOutcome::AlreadyAsleep { .. }));
    assert_eq!(w.orchestrator.pool().len().await, 1);
    assert!(w.orchestrator.is_awake(None, "b").await);
}

#[tokio::test]
async fn woken_team_survives_wake_of_same_team() {
    let w = world(&["a"], 2);
    w.orchestrator.wake(&["a".to_string()]).await;
    let first = w.factory.created_count();
    w.orchestrator.wake(&["a".to_string()]).await;
    assert_eq!(w.factory.created_count(), first, "wake must be idempotent");
}
