// crates/perf-ledger-core/tests/release.rs
// ============================================================================
// Module: Release Tagger Tests
// Description: Tests for release flag updates.
// Purpose: Ensure tagging never creates records and preserves results.
// ============================================================================

//! Release tagger tests.

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
use std::sync::Arc;

use perf_ledger_core::CallContext;
use perf_ledger_core::DEFAULT_HASH_INDEX;
use perf_ledger_core::InMemoryRecordStore;
use perf_ledger_core::MemoryAuditSink;
use perf_ledger_core::OptimisticTransmitter;
use perf_ledger_core::PartialResult;
use perf_ledger_core::RecordKey;
use perf_ledger_core::RecordStore;
use perf_ledger_core::ReleaseTagger;
use perf_ledger_core::RetryPolicy;
use perf_ledger_core::RevisionHash;
use perf_ledger_core::SharedRecordStore;
use perf_ledger_core::TestSettingKey;
use perf_ledger_core::TransmitErrorKind;

fn key() -> RecordKey {
    RecordKey {
        year_partition: 2024,
        commit_date: 42,
    }
}

fn setup() -> (InMemoryRecordStore, OptimisticTransmitter, Arc<MemoryAuditSink>) {
    let store = InMemoryRecordStore::new();
    let audit = Arc::new(MemoryAuditSink::new());
    let transmitter =
        OptimisticTransmitter::new(SharedRecordStore::from_store(store.clone()), RetryPolicy::default())
            .with_audit_sink(audit.clone());
    (store, transmitter, audit)
}

#[tokio::test]
async fn missing_hash_is_not_found_without_writes() {
    let (store, transmitter, _) = setup();
    let tagger = ReleaseTagger::new(transmitter);

    let err =
        tagger.tag_release(&RevisionHash::new("missing"), "v1.300.0", &CallContext::new()).await.unwrap_err();
    assert_eq!(err.kind(), TransmitErrorKind::NotFound);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn tag_sets_flag_and_keeps_results() {
    let (store, transmitter, audit) = setup();
    let ctx = CallContext::new();
    let partial = PartialResult::new(
        RevisionHash::new("abc"),
        key(),
        TestSettingKey::new("100-1000"),
        BTreeMap::new(),
    );
    transmitter.send(partial, &ctx).await.unwrap();

    let tagger = ReleaseTagger::new(transmitter);
    let outcome = tagger.tag_release(&RevisionHash::new("abc"), "v1.300.0", &ctx).await.unwrap();
    assert!(outcome.is_sent());

    let record = store.get(&key()).unwrap().unwrap();
    assert!(record.is_release);
    assert_eq!(record.release_label.as_deref(), Some("v1.300.0"));
    assert!(record.has_test_setting(&TestSettingKey::new("100-1000")));
    assert_eq!(audit.count("release_tagged"), 1);
}

#[tokio::test]
async fn repeated_tag_still_writes() {
    let (store, transmitter, _) = setup();
    let ctx = CallContext::new();
    let partial = PartialResult::new(
        RevisionHash::new("abc"),
        key(),
        TestSettingKey::new("100-1000"),
        BTreeMap::new(),
    );
    transmitter.send(partial, &ctx).await.unwrap();
    let tagger = ReleaseTagger::new(transmitter);

    tagger.tag_release(&RevisionHash::new("abc"), "v1", &ctx).await.unwrap();
    tagger.tag_release(&RevisionHash::new("abc"), "v1", &ctx).await.unwrap();
    assert_eq!(store.writes(), 3);
}

#[tokio::test]
async fn blank_label_is_invalid() {
    let (store, transmitter, audit) = setup();
    let tagger = ReleaseTagger::new(transmitter);
    let err = tagger.tag_release(&RevisionHash::new("abc"), "  ", &CallContext::new()).await.unwrap_err();
    assert_eq!(err.kind(), TransmitErrorKind::Invalid);
    assert_eq!(store.writes(), 0);
    assert_eq!(audit.count("transmit_failed"), 1);
}

#[tokio::test]
async fn blank_hash_is_invalid_and_audited() {
    let (store, transmitter, audit) = setup();
    let tagger = ReleaseTagger::new(transmitter);
    let err = tagger.tag_release(&RevisionHash::new(" "), "v1", &CallContext::new()).await.unwrap_err();
    assert_eq!(err.kind(), TransmitErrorKind::Invalid);
    assert_eq!(store.writes(), 0);

    let events = audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "transmit_failed");
    assert_eq!(events[0].error_kind, Some(TransmitErrorKind::Invalid.label()));
}

#[tokio::test]
async fn tag_keeps_revision_hash_lookup() {
    let (store, transmitter, _) = setup();
    let ctx = CallContext::new();
    let partial = PartialResult::new(
        RevisionHash::new("abc"),
        key(),
        TestSettingKey::new("100-1000"),
        BTreeMap::new(),
    );
    transmitter.send(partial, &ctx).await.unwrap();
    ReleaseTagger::new(transmitter).tag_release(&RevisionHash::new("abc"), "v2.0.0", &ctx).await.unwrap();

    let found = store.query_by_hash(DEFAULT_HASH_INDEX, &RevisionHash::new("abc")).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].revision_hash, RevisionHash::new("abc"));
    assert!(store.query_by_hash(DEFAULT_HASH_INDEX, &RevisionHash::new("v2.0.0")).await.unwrap().is_empty());
}
