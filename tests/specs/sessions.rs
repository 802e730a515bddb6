// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle specs: UUID validity, pair uniqueness, reboot
//! freshness.

use crate::prelude::*;
use iris_core::validate_session_id;
use iris_store::SessionFilter;

#[tokio::test]
async fn ordered_pairs_get_distinct_sessions() {
    let w = world(&["alpha", "beta"], 5);
    let ab = w
        .orchestrator
        .sessions()
        .get_or_create_session("alpha", "beta")
        .await
        .unwrap();
    let ba = w
        .orchestrator
        .sessions()
        .get_or_create_session("beta", "alpha")
        .await
        .unwrap();

    assert_ne!(ab.session_id, ba.session_id);
    assert!(validate_session_id(&ab.session_id).is_ok());
    assert!(validate_session_id(&ba.session_id).is_ok());

    let to_beta = w
        .orchestrator
        .sessions()
        .list(&SessionFilter { to_team: Some("beta".into()), ..Default::default() })
        .unwrap();
    assert_eq!(to_beta.len(), 1);
    assert_eq!(to_beta[0].session_id, ab.session_id);

    let to_alpha = w
        .orchestrator
        .sessions()
        .list(&SessionFilter { to_team: Some("alpha".into()), ..Default::default() })
        .unwrap();
    assert_eq!(to_alpha.len(), 1);
    assert_eq!(to_alpha[0].session_id, ba.session_id);
}

#[tokio::test]
async fn team_pair_rows_stay_unique() {
    let w = world(&["beta"], 5);
    for _ in 0..3 {
        w.orchestrator.sessions().get_or_create_session("alpha", "beta").await.unwrap();
    }
    let all = w.orchestrator.sessions().list(&SessionFilter::default()).unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn every_created_session_id_is_a_valid_uuid_v4() {
    let w = world(&["a", "b", "c"], 5);
    w.orchestrator.initialize().await.unwrap();
    for session in w.orchestrator.sessions().list(&Default::default()).unwrap() {
        assert!(
            validate_session_id(&session.session_id).is_ok(),
            "bad session id {}",
            session.session_id
        );
    }
    w.orchestrator.shutdown().await;
}

#[tokio::test]
async fn reboot_with_live_process_replaces_everything() {
    let w = world(&["beta"], 5);
    w.orchestrator.tell("alpha", "beta", "hi", TellOptions::default()).await.unwrap();
    let old = w.orchestrator.sessions().get_by_team_pair("alpha", "beta").unwrap().unwrap();
    assert!(w.orchestrator.is_awake(Some("alpha"), "beta").await);

    let outcome = w.orchestrator.reboot("alpha", "beta").await.unwrap();

    // Old process terminated, old row gone, fresh identity in place.
    let transport = w.factory.created_for("beta").remove(0);
    assert_eq!(transport.status(), iris_transport::ProcessStatus::Stopped);
    assert!(w.orchestrator.sessions().get_by_session_id(&old.session_id).unwrap().is_none());

    let fresh = w.orchestrator.sessions().get_by_team_pair("alpha", "beta").unwrap().unwrap();
    assert_eq!(fresh.session_id, outcome.session_id);
    assert_ne!(fresh.session_id, old.session_id);
    assert_eq!(fresh.message_count, 0);
    assert!(validate_session_id(&fresh.session_id).is_ok());
}

#[tokio::test]
async fn last_used_follows_the_clock() {
    let w = world(&["beta"], 5);
    w.orchestrator.tell("alpha", "beta", "one", TellOptions::default()).await.unwrap();
    let first = w.orchestrator.sessions().get_by_team_pair("alpha", "beta").unwrap().unwrap();

    w.clock.advance(Duration::from_millis(1234));
    w.orchestrator.tell("alpha", "beta", "two", TellOptions::default()).await.unwrap();
    let second = w.orchestrator.sessions().get_by_team_pair("alpha", "beta").unwrap().unwrap();
    assert_eq!(second.last_used_at_ms, first.last_used_at_ms + 1234);
}

#[tokio::test]
async fn failed_bootstrap_leaves_no_row_behind() {
    let w = world(&["beta"], 5);
    w.bootstrap.fail_for_team("beta");

    let err = w
        .orchestrator
        .tell("alpha", "beta", "hi", TellOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "transport");
    assert!(w.orchestrator.sessions().get_by_team_pair("alpha", "beta").unwrap().is_none());
}
