// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tell-path specs: async mode, timeout semantics, scripted replies.

use crate::prelude::*;
use iris_cache::{EntryStatus, TerminationReason};

#[tokio::test]
async fn async_tell_returns_task_id_and_no_reply() {
    let w = world(&["y"], 5);
    let outcome = w
        .orchestrator
        .tell("x", "y", "ping", TellOptions { timeout_ms: -1, ..Default::default() })
        .await
        .unwrap();

    let TellOutcome::Async { task_id } = outcome else {
        panic!("expected async outcome, got {outcome:?}");
    };
    assert!(task_id.starts_with("task-"));

    let json = serde_json::to_value(TellOutcome::Async { task_id }).unwrap();
    assert_eq!(json["status"], "async");
    assert!(json.get("text").is_none(), "async outcome must carry no reply field");
}

#[tokio::test]
async fn timeout_against_a_mute_agent_terminates_the_entry() {
    let w = world(&["y"], 5);
    let mute = FakeTransport::new("y");
    mute.push_reply(FakeReply::Silence);
    w.factory.prepare("y", mute);

    let err = w
        .orchestrator
        .tell("x", "y", "ping", TellOptions { timeout_ms: 5, ..Default::default() })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "response_timeout");

    let session = w.orchestrator.sessions().get_by_team_pair("x", "y").unwrap().unwrap();
    let cache = w.orchestrator.caches().get(&session.session_id).unwrap();
    let entry = cache.entries().into_iter().last().unwrap();
    assert_eq!(entry.status(), EntryStatus::Terminated);
    assert_eq!(entry.termination_reason(), Some(TerminationReason::ResponseTimeout));
}

#[tokio::test]
async fn scripted_init_then_result_yields_the_reply_text() {
    let w = world(&["y"], 5);
    let scripted = FakeTransport::new("y");
    scripted.push_reply(FakeReply::Frames(vec![serde_json::json!({
        "type": "result", "subtype": "success", "text": "ok"
    })]));
    w.factory.prepare("y", scripted);

    let before = w
        .orchestrator
        .sessions()
        .get_or_create_session("x", "y")
        .await
        .unwrap()
        .message_count;

    let outcome = w
        .orchestrator
        .tell("x", "y", "hello", TellOptions::default())
        .await
        .unwrap();
    let TellOutcome::Reply { text, .. } = outcome else {
        panic!("expected reply, got {outcome:?}");
    };
    assert_eq!(text, "ok");

    let after = w.orchestrator.sessions().get_by_team_pair("x", "y").unwrap().unwrap();
    assert_eq!(after.message_count, before + 1, "exactly one exchange recorded");
}

#[tokio::test]
async fn unbounded_tell_waits_out_a_slow_agent() {
    let w = world(&["y"], 5);
    let slow = FakeTransport::new("y");
    slow.set_reply_delay(Duration::from_millis(80));
    w.factory.prepare("y", slow);

    let outcome = w
        .orchestrator
        .tell("x", "y", "take your time", TellOptions { timeout_ms: 0, ..Default::default() })
        .await
        .unwrap();
    assert!(matches!(outcome, TellOutcome::Reply { .. }));
}

#[tokio::test]
async fn queue_overflow_surfaces_as_typed_error() {
    let w = world(&["y"], 5);
    // A silent transport keeps the single worker stuck on the first task.
    let mute = FakeTransport::new("y");
    for _ in 0..200 {
        mute.push_reply(FakeReply::Silence);
    }
    w.factory.prepare("y", mute);

    let mut overflowed = None;
    for n in 0..200 {
        match w
            .orchestrator
            .tell("x", "y", &format!("m{n}"), TellOptions { timeout_ms: -1, ..Default::default() })
            .await
        {
            Ok(_) => {}
            Err(e) => {
                overflowed = Some(e);
                break;
            }
        }
    }
    let err = overflowed.expect("soft bound never tripped");
    assert_eq!(err.kind(), "queue_full");
}
