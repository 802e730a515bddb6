// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::bootstrap::{BootstrapCall, FakeBootstrap};
use iris_core::{FakeClock, TeamConfig};
use iris_transport::{FakeReply, FakeTransport, FakeTransportFactory};

struct Harness {
    orchestrator: Orchestrator<FakeClock>,
    factory: Arc<FakeTransportFactory>,
    bootstrap: Arc<FakeBootstrap>,
    clock: FakeClock,
}

fn harness(teams: &[&str]) -> Harness {
    let mut config = IrisConfig::default();
    for team in teams {
        config.teams.insert(team.to_string(), TeamConfig::new(format!("/work/{team}")));
    }
    harness_with_config(config)
}

fn harness_with_config(config: IrisConfig) -> Harness {
    let factory = Arc::new(FakeTransportFactory::new());
    let bootstrap = Arc::new(FakeBootstrap::new());
    let clock = FakeClock::new();
    let orchestrator = Orchestrator::new(
        config,
        SessionStore::open_in_memory().unwrap(),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
        Arc::clone(&bootstrap) as Arc<dyn SessionBootstrap>,
        clock.clone(),
    );
    Harness { orchestrator, factory, bootstrap, clock }
}

#[tokio::test]
async fn tell_returns_reply_and_bumps_message_count() {
    let h = harness(&["beta"]);
    let outcome = h
        .orchestrator
        .tell("alpha", "beta", "hello", TellOptions::default())
        .await
        .unwrap();

    match outcome {
        TellOutcome::Reply { text, .. } => assert_eq!(text, "ok"),
        other => panic!("expected reply, got {other:?}"),
    }
    let session = h.orchestrator.sessions().get_by_team_pair("alpha", "beta").unwrap().unwrap();
    assert_eq!(session.message_count, 1);
}

#[tokio::test]
async fn tell_scripted_reply_round_trips() {
    let h = harness(&["beta"]);
    let scripted = FakeTransport::new("beta");
    scripted.push_reply(FakeReply::Frames(vec![
        serde_json::json!({"type": "assistant", "message": {"content": []}}),
        serde_json::json!({"type": "stream_event", "event": "tick"}),
        serde_json::json!({"type": "result", "subtype": "success", "result": "scripted!"}),
    ]));
    h.factory.prepare("beta", scripted);

    let outcome = h
        .orchestrator
        .tell("alpha", "beta", "run it", TellOptions::default())
        .await
        .unwrap();
    assert!(matches!(outcome, TellOutcome::Reply { text, .. } if text == "scripted!"));
}

#[tokio::test]
async fn unknown_team_and_bad_input_fail_validation() {
    let h = harness(&["beta"]);
    let err = h
        .orchestrator
        .tell("alpha", "ghost", "hi", TellOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "team_not_found");

    let err = h
        .orchestrator
        .tell("alpha", "beta", "   ", TellOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    let err = h
        .orchestrator
        .tell("bad/name", "beta", "hi", TellOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    let err = h
        .orchestrator
        .tell("alpha", "beta", "hi", TellOptions { timeout_ms: 3_600_001, ..Default::default() })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn async_mode_returns_task_id_without_reply() {
    let h = harness(&["beta"]);
    let outcome = h
        .orchestrator
        .tell("x", "beta", "ping", TellOptions { timeout_ms: -1, ..Default::default() })
        .await
        .unwrap();

    match outcome {
        TellOutcome::Async { task_id } => assert_eq!(task_id, "task-1"),
        other => panic!("expected async outcome, got {other:?}"),
    }

    // The worker eventually runs the same path and records the exchange.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let session = h.orchestrator.sessions().get_by_team_pair("x", "beta").unwrap();
            if session.is_some_and(|s| s.message_count == 1) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("queued tell never completed");
}

#[tokio::test]
async fn wait_false_also_queues() {
    let h = harness(&["beta"]);
    let outcome = h
        .orchestrator
        .tell("x", "beta", "ping", TellOptions { wait_for_response: false, ..Default::default() })
        .await
        .unwrap();
    assert!(matches!(outcome, TellOutcome::Async { .. }));
}

#[tokio::test]
async fn timeout_terminates_entry_with_response_timeout() {
    let h = harness(&["beta"]);
    let silent = FakeTransport::new("beta");
    silent.push_reply(FakeReply::Silence);
    h.factory.prepare("beta", silent);

    let options = TellOptions { timeout_ms: 50, ..Default::default() };
    let err = h.orchestrator.tell("alpha", "beta", "anyone there?", options).await.unwrap_err();
    assert_eq!(err.kind(), "response_timeout");

    let session = h.orchestrator.sessions().get_by_team_pair("alpha", "beta").unwrap().unwrap();
    let cache = h.orchestrator.caches().get(&session.session_id).unwrap();
    let entry = cache.entries().into_iter().last().unwrap();
    assert_eq!(entry.status(), iris_cache::EntryStatus::Terminated);
    assert_eq!(
        entry.termination_reason(),
        Some(iris_cache::TerminationReason::ResponseTimeout)
    );
    assert_eq!(session.message_count, 0);
}

#[tokio::test]
async fn busy_process_yields_busy_outcome_without_killing_it() {
    let h = harness(&["beta"]);
    let slow = FakeTransport::new("beta");
    slow.push_reply(FakeReply::Silence);
    h.factory.prepare("beta", slow);

    // First tell times out but leaves the process processing.
    let err = h
        .orchestrator
        .tell("alpha", "beta", "slow one", TellOptions { timeout_ms: 50, ..Default::default() })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "response_timeout");
    let transport = h.factory.created_for("beta").remove(0);
    assert!(transport.is_busy(), "per-request timeout must not kill the process");

    // A follow-up tell sees a logical busy reply, not an error.
    let outcome = h
        .orchestrator
        .tell("alpha", "beta", "second", TellOptions::default())
        .await
        .unwrap();
    assert!(matches!(outcome, TellOutcome::Busy { .. }));
}

#[tokio::test]
async fn crash_mid_tell_is_process_crashed() {
    let h = harness(&["beta"]);
    let doomed = FakeTransport::new("beta");
    doomed.push_reply(FakeReply::Silence);
    h.factory.prepare("beta", doomed.clone());

    let tell = {
        let orchestrator = &h.orchestrator;
        async move {
            orchestrator
                .tell("alpha", "beta", "boom", TellOptions { timeout_ms: 0, ..Default::default() })
                .await
        }
    };
    let crash = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        doomed.simulate_crash();
    };
    let (result, ()) = tokio::join!(tell, crash);
    assert_eq!(result.unwrap_err().kind(), "process_crashed");
}

#[tokio::test]
async fn wake_is_sequential_and_idempotent() {
    let h = harness(&["a", "b"]);
    let outcomes = h.orchestrator.wake(&["a".to_string(), "b".to_string()]).await;
    assert!(matches!(outcomes[0], WakeOutcome::Woken { .. }));
    assert!(matches!(outcomes[1], WakeOutcome::Woken { .. }));
    assert_eq!(h.orchestrator.pool().len().await, 2);

    let again = h.orchestrator.wake(&["a".to_string()]).await;
    assert!(matches!(again[0], WakeOutcome::AlreadyAwake { .. }));
    assert_eq!(h.factory.created_count(), 2);
}

#[tokio::test]
async fn wake_reports_unknown_team_as_failed() {
    let h = harness(&["a"]);
    let outcomes = h.orchestrator.wake(&["ghost".to_string()]).await;
    assert!(matches!(&outcomes[0], WakeOutcome::Failed { team, .. } if team == "ghost"));
}

#[tokio::test]
async fn sleep_is_idempotent() {
    let h = harness(&["a"]);
    h.orchestrator.wake(&["a".to_string()]).await;

    let slept = h.orchestrator.sleep("a", SleepOptions::default()).await.unwrap();
    assert!(matches!(slept, SleepOutcome::Slept { lost_messages: 0, .. }));
    assert_eq!(h.orchestrator.pool().len().await, 0);

    let again = h.orchestrator.sleep("a", SleepOptions::default()).await.unwrap();
    assert!(matches!(again, SleepOutcome::AlreadyAsleep { .. }));
}

#[tokio::test]
async fn sleep_busy_requires_force() {
    let h = harness(&["a"]);
    let slow = FakeTransport::new("a");
    slow.push_reply(FakeReply::Silence);
    h.factory.prepare("a", slow);

    h.orchestrator.wake(&["a".to_string()]).await;
    let session = h
        .orchestrator
        .sessions()
        .get_by_team_pair(crate::sessions::EXTERNAL_FROM, "a")
        .unwrap()
        .unwrap();
    let cache = h.orchestrator.caches().get_or_create(&session.session_id, "external", "a");
    let entry = cache.create_entry(EntryKind::Tell, "stuck", 0);
    h.factory.created_for("a")[0].execute_tell(entry).await.unwrap();

    let err = h.orchestrator.sleep("a", SleepOptions::default()).await.unwrap_err();
    assert_eq!(err.kind(), "process_busy");

    let outcome = h
        .orchestrator
        .sleep("a", SleepOptions { force: true, clear_cache: false })
        .await
        .unwrap();
    match outcome {
        SleepOutcome::Slept { lost_messages, .. } => assert!(lost_messages >= 1),
        other => panic!("expected slept, got {other:?}"),
    }
}

#[tokio::test]
async fn reboot_allocates_fresh_session() {
    let h = harness(&["beta"]);
    h.orchestrator.tell("alpha", "beta", "hi", TellOptions::default()).await.unwrap();
    let old = h.orchestrator.sessions().get_by_team_pair("alpha", "beta").unwrap().unwrap();
    assert_eq!(old.message_count, 1);

    let outcome = h.orchestrator.reboot("alpha", "beta").await.unwrap();
    assert_eq!(outcome.previous_session_id.as_deref(), Some(old.session_id.as_str()));
    assert_ne!(outcome.session_id, old.session_id);

    let fresh = h.orchestrator.sessions().get_by_team_pair("alpha", "beta").unwrap().unwrap();
    assert_eq!(fresh.session_id, outcome.session_id);
    assert_eq!(fresh.message_count, 0);
    assert!(h.orchestrator.sessions().get_by_session_id(&old.session_id).unwrap().is_none());
    // The pair's process was torn down with the old session.
    assert!(!h.orchestrator.is_awake(Some("alpha"), "beta").await);
}

#[tokio::test]
async fn compact_retries_then_succeeds() {
    let h = harness(&["beta"]);
    h.orchestrator.tell("alpha", "beta", "hi", TellOptions::default()).await.unwrap();
    h.bootstrap.fail_prints(2);

    let outcome = h
        .orchestrator
        .compact("alpha", "beta", CompactOptions { timeout_ms: 1_000, retries: 2 })
        .await
        .unwrap();
    assert_eq!(outcome.attempts, 3);

    let prints = h
        .bootstrap
        .calls()
        .into_iter()
        .filter(|c| matches!(c, BootstrapCall::RunPrint { text, .. } if text == "/compact"))
        .count();
    assert_eq!(prints, 3);

    let session = h.orchestrator.sessions().get_by_team_pair("alpha", "beta").unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Active);
}

#[tokio::test]
async fn compact_exhausts_retries_and_restores_status() {
    let h = harness(&["beta"]);
    h.orchestrator.tell("alpha", "beta", "hi", TellOptions::default()).await.unwrap();
    h.bootstrap.fail_prints(10);

    let err = h
        .orchestrator
        .compact("alpha", "beta", CompactOptions { timeout_ms: 1_000, retries: 1 })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "transport");

    let session = h.orchestrator.sessions().get_by_team_pair("alpha", "beta").unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Active);
}

#[tokio::test]
async fn compact_without_session_is_session_not_found() {
    let h = harness(&["beta"]);
    let err = h
        .orchestrator
        .compact("alpha", "beta", CompactOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "session_not_found");
}

#[tokio::test]
async fn cancel_reports_whether_a_process_exists() {
    let h = harness(&["beta"]);
    assert!(!h.orchestrator.cancel("alpha", "beta").await.unwrap());

    h.orchestrator.tell("alpha", "beta", "hi", TellOptions::default()).await.unwrap();
    assert!(h.orchestrator.cancel("alpha", "beta").await.unwrap());

    let transport = h.factory.created_for("beta").remove(0);
    assert!(transport.calls().contains(&iris_transport::TransportCall::Cancel));
}

#[tokio::test]
async fn report_composes_all_layers() {
    let h = harness(&["a", "b"]);
    h.orchestrator.initialize().await.unwrap();
    h.orchestrator.wake(&["a".to_string()]).await;

    let report = h.orchestrator.report().await.unwrap();
    assert_eq!(report.teams.len(), 2);
    assert!(report.teams.iter().any(|t| t.name == "a" && t.awake));
    assert!(report.teams.iter().any(|t| t.name == "b" && !t.awake));
    assert_eq!(report.session_stats.total, 2);
    assert_eq!(report.processes.len(), 1);
    assert_eq!(report.sessions.len(), 2);

    h.orchestrator.shutdown().await;
    assert_eq!(h.orchestrator.pool().len().await, 0);
}

#[tokio::test]
async fn initialize_bootstraps_every_team_once() {
    let h = harness(&["a", "b"]);
    h.orchestrator.initialize().await.unwrap();
    assert_eq!(h.bootstrap.calls().len(), 2);
    h.orchestrator.initialize().await.unwrap();
    assert_eq!(h.bootstrap.calls().len(), 2);
    h.orchestrator.shutdown().await;
}

#[tokio::test]
async fn clock_drives_last_used_timestamps() {
    let h = harness(&["beta"]);
    h.orchestrator.tell("alpha", "beta", "one", TellOptions::default()).await.unwrap();
    let first = h.orchestrator.sessions().get_by_team_pair("alpha", "beta").unwrap().unwrap();

    h.clock.advance(Duration::from_millis(750));
    h.orchestrator.tell("alpha", "beta", "two", TellOptions::default()).await.unwrap();
    let second = h.orchestrator.sessions().get_by_team_pair("alpha", "beta").unwrap().unwrap();

    assert_eq!(second.last_used_at_ms, first.last_used_at_ms + 750);
    assert_eq!(second.message_count, 2);
}
