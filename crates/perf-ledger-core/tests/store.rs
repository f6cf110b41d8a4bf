// crates/perf-ledger-core/tests/store.rs
// ============================================================================
// Module: In-Memory Store Tests
// Description: Conditional write semantics for the in-memory store.
// Purpose: Ensure put/update preconditions match the store contract.
// ============================================================================

//! In-memory record store tests.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;

use perf_ledger_core::AttributeDelta;
use perf_ledger_core::InMemoryRecordStore;
use perf_ledger_core::PartialResult;
use perf_ledger_core::Record;
use perf_ledger_core::RecordKey;
use perf_ledger_core::RecordStore;
use perf_ledger_core::RevisionHash;
use perf_ledger_core::StoreErrorKind;
use perf_ledger_core::TestSettingKey;
use perf_ledger_core::VersionToken;

fn record(hash: &str, commit_date: i64) -> Record {
    PartialResult::new(
        RevisionHash::new(hash),
        RecordKey {
            year_partition: 2024,
            commit_date,
        },
        TestSettingKey::new("A"),
        BTreeMap::new(),
    )
    .into_record()
}

#[tokio::test]
async fn put_if_absent_rejects_existing_key_and_hash() {
    let store = InMemoryRecordStore::new();
    store.put_if_absent(&record("abc", 1)).await.unwrap();

    let err = store.put_if_absent(&record("other", 1)).await.unwrap_err();
    assert_eq!(err.kind(), StoreErrorKind::Conflict);
    let err = store.put_if_absent(&record("abc", 2)).await.unwrap_err();
    assert_eq!(err.kind(), StoreErrorKind::Conflict);
    assert_eq!(store.writes(), 1);
}

#[tokio::test]
async fn query_by_hash_matches_exactly() {
    let store = InMemoryRecordStore::new();
    store.put_if_absent(&record("abc", 1)).await.unwrap();
    store.put_if_absent(&record("abcd", 2)).await.unwrap();

    let found = store.query_by_hash("Hash-index", &RevisionHash::new("abc")).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].commit_date, 1);
    assert!(store.query_by_hash("Hash-index", &RevisionHash::new("zzz")).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_checks_version_token() {
    let store = InMemoryRecordStore::new();
    let original = record("abc", 1);
    store.put_if_absent(&original).await.unwrap();

    let mut delta = AttributeDelta::new(VersionToken::new("t2"));
    delta.is_release = Some(true);
    let err = store
        .update_if_version_matches(&original.key(), &delta, &VersionToken::new("stale"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), StoreErrorKind::Conflict);

    store.update_if_version_matches(&original.key(), &delta, &original.version_token).await.unwrap();
    let stored = store.get(&original.key()).unwrap().unwrap();
    assert!(stored.is_release);
    assert_eq!(stored.version_token, VersionToken::new("t2"));
}

#[tokio::test]
async fn update_missing_key_is_not_found() {
    let store = InMemoryRecordStore::new();
    let delta = AttributeDelta::new(VersionToken::new("t2"));
    let key = RecordKey {
        year_partition: 2024,
        commit_date: 9,
    };
    let err = store.update_if_version_matches(&key, &delta, &VersionToken::new("t1")).await.unwrap_err();
    assert_eq!(err.kind(), StoreErrorKind::NotFound);
}

#[tokio::test]
async fn hash_rotation_cannot_steal_another_hash() {
    let store = InMemoryRecordStore::new();
    let first = record("abc", 1);
    store.put_if_absent(&first).await.unwrap();
    store.put_if_absent(&record("def", 2)).await.unwrap();

    let mut delta = AttributeDelta::new(VersionToken::new("t2"));
    delta.revision_hash = Some(RevisionHash::new("def"));
    let err =
        store.update_if_version_matches(&first.key(), &delta, &first.version_token).await.unwrap_err();
    assert_eq!(err.kind(), StoreErrorKind::Unavailable);
}
