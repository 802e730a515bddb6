// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-crate invariants: replay, terminal writes, path escaping,
//! timeout validation.

use iris_cache::{CacheEntry, EntryKind, EntryStatus, MessageCache};
use iris_core::{escape_project_path, validate_timeout, Frame};

fn frame(json: &str, ts: u64) -> Frame {
    Frame::parse_line(json, ts).expect("test frame")
}

#[tokio::test]
async fn late_subscriber_sees_all_frames_then_end_of_stream() {
    let entry = CacheEntry::new(EntryKind::Tell, "t", 0);
    for ts in 1..=4 {
        entry.add_message(frame(r#"{"type":"assistant","message":{}}"#, ts));
    }
    entry.add_message(frame(r#"{"type":"result","subtype":"success","result":"done"}"#, 5));
    assert_eq!(entry.status(), EntryStatus::Completed);

    // Subscribe strictly after completion: exactly five frames, then end.
    let mut stream = entry.subscribe();
    let mut seen = Vec::new();
    while let Some(frame) = stream.next().await {
        seen.push(frame.timestamp_ms);
    }
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
}

#[test]
fn no_write_after_terminal_produces_no_change() {
    let entry = CacheEntry::new(EntryKind::Tell, "t", 0);
    entry.add_message(frame(r#"{"type":"result","subtype":"success","result":"x"}"#, 1));
    let before = entry.message_count();

    assert!(!entry.add_message(frame(r#"{"type":"assistant","message":{}}"#, 2)));
    assert_eq!(entry.message_count(), before);
}

#[tokio::test]
async fn no_emission_after_terminal() {
    let entry = CacheEntry::new(EntryKind::Tell, "t", 0);
    let mut stream = entry.subscribe();
    entry.add_message(frame(r#"{"type":"result","subtype":"success","result":"x"}"#, 1));
    entry.add_message(frame(r#"{"type":"assistant","message":{}}"#, 2));

    assert_eq!(stream.next().await.map(|f| f.timestamp_ms), Some(1));
    assert!(stream.next().await.is_none(), "rejected frame must not be emitted");
}

#[test]
fn at_most_one_active_entry_per_cache() {
    let cache = MessageCache::new("11111111-2222-4333-8444-555555555555", "a", "b");
    for n in 0..5 {
        cache.create_entry(EntryKind::Tell, format!("m{n}"), n);
        assert_eq!(cache.stats().active, 1);
    }
}

#[test]
fn path_escape_round_trip() {
    assert_eq!(escape_project_path("/a/b/c").unwrap(), "-a-b-c");
    assert!(escape_project_path("a/b/c").is_err());
}

#[test]
fn timeout_sentinels_and_bounds() {
    assert!(validate_timeout(-1).is_ok());
    assert!(validate_timeout(0).is_ok());
    assert!(validate_timeout(3_600_000).is_ok());
    assert!(validate_timeout(3_600_001).is_err());
}
