// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;
use yare::parameterized;

#[parameterized(
    plain = { "backend" },
    dotted = { "team.prod" },
    email_ish = { "ops@nightly" },
    hyphen_underscore = { "a-b_c" },
    single_char = { "x" },
)]
fn team_name_accepts(name: &str) {
    assert!(validate_team_name(name).is_ok());
}

#[parameterized(
    empty = { "" },
    slash = { "a/b" },
    backslash = { "a\\b" },
    dotdot = { "a..b" },
    space = { "a b" },
    unicode = { "équipe" },
)]
fn team_name_rejects(name: &str) {
    let err = validate_team_name(name).unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[test]
fn team_name_length_bound() {
    assert!(validate_team_name(&"a".repeat(100)).is_ok());
    assert!(validate_team_name(&"a".repeat(101)).is_err());
}

#[test]
fn session_id_accepts_generated_uuids() {
    for _ in 0..64 {
        let id = uuid::Uuid::new_v4().to_string();
        assert!(validate_session_id(&id).is_ok(), "rejected {id}");
    }
}

#[parameterized(
    empty = { "" },
    short = { "d9f7f292-9e4c-4a0b-8f31" },
    wrong_version = { "d9f7f292-9e4c-1a0b-8f31-5f0f7a4be1c2" },
    wrong_variant = { "d9f7f292-9e4c-4a0b-0f31-5f0f7a4be1c2" },
    not_hex = { "d9f7f292-9e4c-4a0b-8f31-5f0f7a4bezzz" },
    missing_hyphens = { "d9f7f2929e4c4a0b8f315f0f7a4be1c2" },
)]
fn session_id_rejects(id: &str) {
    assert!(validate_session_id(id).is_err());
}

#[test]
fn project_path_must_be_absolute() {
    let err = validate_project_path(Path::new("relative/dir")).unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[test]
fn project_path_rejects_parent_segments() {
    assert!(validate_project_path(Path::new("/tmp/../etc")).is_err());
}

#[parameterized(
    etc = { "/etc/passwd-home" },
    usr_bin = { "/usr/bin/payload" },
    ssh = { "/home/user/.ssh/keys" },
)]
fn project_path_rejects_sensitive_prefixes(path: &str) {
    assert!(validate_project_path(Path::new(path)).is_err());
}

#[test]
fn project_path_accepts_real_directory() {
    let dir = tempfile::tempdir().unwrap();
    let resolved = validate_project_path(dir.path()).unwrap();
    assert!(resolved.is_dir());
}

#[test]
fn project_path_rejects_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let gone = dir.path().join("nope");
    assert!(validate_project_path(&gone).is_err());
}

#[test]
fn project_path_rejects_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("f.txt");
    std::fs::write(&file, "x").unwrap();
    assert!(validate_project_path(&file).is_err());
}

#[parameterized(
    async_sentinel = { -1 },
    unbounded = { 0 },
    one_ms = { 1 },
    one_hour = { 3_600_000 },
)]
fn timeout_accepts(ms: i64) {
    assert!(validate_timeout(ms).is_ok());
}

#[parameterized(
    over_limit = { 3_600_001 },
    negative = { -2 },
    very_negative = { i64::MIN },
)]
fn timeout_rejects(ms: i64) {
    assert!(validate_timeout(ms).is_err());
}

proptest! {
    #[test]
    fn uuid_check_never_panics(s in "\\PC*") {
        let _ = is_uuid_v4(&s);
    }

    #[test]
    fn generated_uuids_always_validate(seed in any::<u128>()) {
        let id = uuid::Builder::from_random_bytes(seed.to_be_bytes()).into_uuid().to_string();
        prop_assert!(is_uuid_v4(&id));
    }
}
