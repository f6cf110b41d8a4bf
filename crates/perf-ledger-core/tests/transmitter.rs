// crates/perf-ledger-core/tests/transmitter.rs
// ============================================================================
// Module: Optimistic Transmitter Tests
// Description: Protocol, concurrency, and retry tests for the transmitter.
// Purpose: Ensure no lost updates, first-writer-wins, and bounded retries.
// ============================================================================

//! Optimistic transmitter tests.

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
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use perf_ledger_core::AttributeDelta;
use perf_ledger_core::CallContext;
use perf_ledger_core::InMemoryRecordStore;
use perf_ledger_core::MemoryAuditSink;
use perf_ledger_core::MetricResults;
use perf_ledger_core::OptimisticTransmitter;
use perf_ledger_core::PartialResult;
use perf_ledger_core::Record;
use perf_ledger_core::RecordKey;
use perf_ledger_core::RecordStore;
use perf_ledger_core::RetryPolicy;
use perf_ledger_core::RevisionHash;
use perf_ledger_core::SendOutcome;
use perf_ledger_core::SharedRecordStore;
use perf_ledger_core::StoreError;
use perf_ledger_core::TestSettingKey;
use perf_ledger_core::TransmitError;
use perf_ledger_core::TransmitErrorKind;
use perf_ledger_core::VersionToken;
use perf_ledger_core::summarize;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn key() -> RecordKey {
    RecordKey {
        year_partition: 2024,
        commit_date: 1_700_000_000,
    }
}

fn metrics(value: f64) -> MetricResults {
    let mut metrics = BTreeMap::new();
    metrics.insert("procstat_cpu_usage".to_string(), summarize(&[value, value * 2.0], 300));
    metrics
}

fn partial(hash: &str, setting: &str) -> PartialResult {
    PartialResult::new(RevisionHash::new(hash), key(), TestSettingKey::new(setting), metrics(1.0))
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        update_delay_threshold: Duration::from_millis(5),
        jitter_seed: None,
    }
}

/// In-memory store that yields between operations so writers interleave.
#[derive(Clone, Default)]
struct YieldingStore {
    inner: InMemoryRecordStore,
}

#[async_trait]
impl RecordStore for YieldingStore {
    async fn query_by_hash(
        &self,
        index: &str,
        hash: &RevisionHash,
    ) -> Result<Vec<Record>, StoreError> {
        tokio::task::yield_now().await;
        let records = self.inner.query_by_hash(index, hash).await;
        tokio::task::yield_now().await;
        records
    }

    async fn put_if_absent(&self, record: &Record) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.put_if_absent(record).await
    }

    async fn update_if_version_matches(
        &self,
        key: &RecordKey,
        delta: &AttributeDelta,
        expected: &VersionToken,
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.update_if_version_matches(key, delta, expected).await
    }
}

/// Store that always reports an existing record and fails every update.
struct ScriptedStore {
    update_error: StoreError,
    update_delay: Option<Duration>,
    updates: Arc<AtomicUsize>,
    cancel_on_update: Option<CallContext>,
}

impl ScriptedStore {
    fn new(update_error: StoreError) -> Self {
        Self {
            update_error,
            update_delay: None,
            updates: Arc::new(AtomicUsize::new(0)),
            cancel_on_update: None,
        }
    }
}

#[async_trait]
impl RecordStore for ScriptedStore {
    async fn query_by_hash(
        &self,
        _index: &str,
        hash: &RevisionHash,
    ) -> Result<Vec<Record>, StoreError> {
        let mut record = partial(hash.as_str(), "existing").into_record();
        record.version_token = VersionToken::generate();
        Ok(vec![record])
    }

    async fn put_if_absent(&self, _record: &Record) -> Result<(), StoreError> {
        Err(StoreError::Conflict("exists".to_string()))
    }

    async fn update_if_version_matches(
        &self,
        _key: &RecordKey,
        _delta: &AttributeDelta,
        _expected: &VersionToken,
    ) -> Result<(), StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if let Some(ctx) = &self.cancel_on_update {
            ctx.cancel();
        }
        if let Some(delay) = self.update_delay {
            tokio::time::sleep(delay).await;
        }
        Err(self.update_error.clone())
    }
}

// ============================================================================
// SECTION: Sequential Protocol
// ============================================================================

#[tokio::test]
async fn first_send_creates_record() {
    let store = InMemoryRecordStore::new();
    let audit = Arc::new(MemoryAuditSink::new());
    let transmitter =
        OptimisticTransmitter::new(SharedRecordStore::from_store(store.clone()), RetryPolicy::default())
            .with_audit_sink(audit.clone());

    let outcome = transmitter.send(partial("abc", "A"), &CallContext::new()).await.unwrap();
    assert_eq!(outcome, SendOutcome::Sent {
        identifier: RevisionHash::new("abc"),
        created: true,
        attempts: 1,
    });
    assert_eq!(store.writes(), 1);
    assert_eq!(audit.count("record_created"), 1);
}

#[tokio::test]
async fn second_setting_updates_existing_record() {
    let store = InMemoryRecordStore::new();
    let transmitter =
        OptimisticTransmitter::new(SharedRecordStore::from_store(store.clone()), RetryPolicy::default());
    let ctx = CallContext::new();

    transmitter.send(partial("abc", "A"), &ctx).await.unwrap();
    let first_token = store.get(&key()).unwrap().unwrap().version_token;
    let outcome = transmitter.send(partial("abc", "B"), &ctx).await.unwrap();
    assert!(outcome.is_sent());

    let record = store.get(&key()).unwrap().unwrap();
    assert_eq!(record.results.len(), 2);
    assert_ne!(record.version_token, first_token);
    assert_eq!(store.writes(), 2);
}

#[tokio::test]
async fn duplicate_setting_is_skipped_without_write() {
    let store = InMemoryRecordStore::new();
    let audit = Arc::new(MemoryAuditSink::new());
    let transmitter =
        OptimisticTransmitter::new(SharedRecordStore::from_store(store.clone()), RetryPolicy::default())
            .with_audit_sink(audit.clone());
    let ctx = CallContext::new();

    transmitter.send(partial("abc", "A"), &ctx).await.unwrap();
    let outcome = transmitter.send(partial("abc", "A"), &ctx).await.unwrap();
    assert!(outcome.is_skipped());
    assert_eq!(outcome.attempts(), 0);
    assert_eq!(store.writes(), 1);
    assert_eq!(audit.count("record_skipped"), 1);
}

#[tokio::test]
async fn partial_without_single_setting_is_invalid() {
    let store = InMemoryRecordStore::new();
    let transmitter =
        OptimisticTransmitter::new(SharedRecordStore::from_store(store.clone()), RetryPolicy::default());
    let ctx = CallContext::new();

    let mut empty = partial("abc", "A");
    empty.results.clear();
    let err = transmitter.send(empty, &ctx).await.unwrap_err();
    assert_eq!(err.kind(), TransmitErrorKind::Invalid);

    let mut double = partial("abc", "A");
    double.results.insert(TestSettingKey::new("B"), metrics(2.0));
    let err = transmitter.send(double, &ctx).await.unwrap_err();
    assert_eq!(err.kind(), TransmitErrorKind::Invalid);

    let err = transmitter.send(partial("  ", "A"), &ctx).await.unwrap_err();
    assert_eq!(err.kind(), TransmitErrorKind::Invalid);
    assert_eq!(store.writes(), 0);
}

// ============================================================================
// SECTION: Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_distinct_settings_are_all_recorded() {
    let writers = 8;
    let store = YieldingStore::default();
    let transmitter =
        OptimisticTransmitter::new(SharedRecordStore::from_store(store.clone()), fast_policy(64));

    let mut handles = Vec::new();
    for index in 0 .. writers {
        let transmitter = transmitter.clone();
        handles.push(tokio::spawn(async move {
            let setting = format!("{index}-1000");
            transmitter.send(partial("rev", &setting), &CallContext::new()).await
        }));
    }
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.is_sent());
    }

    let record = store.inner.get(&key()).unwrap().unwrap();
    assert_eq!(record.results.len(), writers);
    for index in 0 .. writers {
        assert!(record.has_test_setting(&TestSettingKey::new(format!("{index}-1000"))));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_same_setting_has_single_winner() {
    let writers = 8;
    let store = YieldingStore::default();
    let transmitter =
        OptimisticTransmitter::new(SharedRecordStore::from_store(store.clone()), fast_policy(64));

    let mut handles = Vec::new();
    for _ in 0 .. writers {
        let transmitter = transmitter.clone();
        handles.push(tokio::spawn(async move {
            transmitter.send(partial("rev", "100-1000"), &CallContext::new()).await
        }));
    }
    let mut sent = 0;
    let mut skipped = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            SendOutcome::Sent {
                ..
            } => sent += 1,
            SendOutcome::Skipped {
                ..
            } => skipped += 1,
        }
    }
    assert_eq!(sent, 1);
    assert_eq!(skipped, writers - 1);
    assert_eq!(store.inner.writes(), 1);
}

// ============================================================================
// SECTION: Retry and Failure
// ============================================================================

#[tokio::test(start_paused = true)]
async fn persistent_conflict_exhausts_attempts() {
    let store = ScriptedStore::new(StoreError::Conflict("token moved".to_string()));
    let updates = Arc::clone(&store.updates);
    let policy = RetryPolicy::default();
    let transmitter = OptimisticTransmitter::new(SharedRecordStore::from_store(store), policy);

    let started = tokio::time::Instant::now();
    let err = transmitter.send(partial("abc", "A"), &CallContext::new()).await.unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(updates.load(Ordering::SeqCst), 5);
    assert!(elapsed <= policy.update_delay_threshold * policy.max_attempts);
    match err {
        TransmitError::MaxAttemptsExceeded {
            revision_hash,
            attempts,
            last_error,
            last_conflict_at_ms,
        } => {
            assert_eq!(revision_hash, RevisionHash::new("abc"));
            assert_eq!(attempts, 5);
            assert!(matches!(last_error, Some(StoreError::Conflict(_))));
            assert!(last_conflict_at_ms.is_some());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn non_conflict_error_is_not_retried() {
    let store = ScriptedStore::new(StoreError::Io("connection reset".to_string()));
    let updates = Arc::clone(&store.updates);
    let transmitter =
        OptimisticTransmitter::new(SharedRecordStore::from_store(store), RetryPolicy::default());

    let err = transmitter.send(partial("abc", "A"), &CallContext::new()).await.unwrap_err();
    assert_eq!(err.kind(), TransmitErrorKind::StoreUnavailable);
    assert_eq!(updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_key_on_update_is_not_found() {
    let store = ScriptedStore::new(StoreError::NotFound("gone".to_string()));
    let updates = Arc::clone(&store.updates);
    let transmitter =
        OptimisticTransmitter::new(SharedRecordStore::from_store(store), RetryPolicy::default());

    let err = transmitter.send(partial("abc", "A"), &CallContext::new()).await.unwrap_err();
    assert_eq!(err.kind(), TransmitErrorKind::NotFound);
    assert_eq!(updates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn seeded_policy_repeats_jitter_sequence() {
    let policy = RetryPolicy {
        jitter_seed: Some(42),
        ..RetryPolicy::default()
    };
    let mut first = policy.rng();
    let mut second = policy.rng();
    for _ in 0 .. 4 {
        let delay = policy.jitter(&mut first);
        assert_eq!(delay, policy.jitter(&mut second));
        assert!(delay <= policy.update_delay_threshold);
    }
}

// ============================================================================
// SECTION: Cancellation
// ============================================================================

#[tokio::test]
async fn cancelled_context_stops_before_store_calls() {
    let store = InMemoryRecordStore::new();
    let transmitter =
        OptimisticTransmitter::new(SharedRecordStore::from_store(store.clone()), RetryPolicy::default());
    let ctx = CallContext::new();
    ctx.cancel();

    let err = transmitter.send(partial("abc", "A"), &ctx).await.unwrap_err();
    assert_eq!(err.kind(), TransmitErrorKind::Cancelled);
    assert_eq!(store.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_retry_sleep() {
    let ctx = CallContext::new();
    let mut store = ScriptedStore::new(StoreError::Conflict("token moved".to_string()));
    store.cancel_on_update = Some(ctx.clone());
    let updates = Arc::clone(&store.updates);
    let transmitter =
        OptimisticTransmitter::new(SharedRecordStore::from_store(store), RetryPolicy::default());

    let err = transmitter.send(partial("abc", "A"), &ctx).await.unwrap_err();
    assert_eq!(err.kind(), TransmitErrorKind::Cancelled);
    assert_eq!(updates.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_abandons_unacknowledged_write() {
    let mut store = ScriptedStore::new(StoreError::Conflict("token moved".to_string()));
    store.update_delay = Some(Duration::from_secs(10));
    let transmitter =
        OptimisticTransmitter::new(SharedRecordStore::from_store(store), RetryPolicy::default());
    let ctx = CallContext::new().with_timeout(Duration::from_secs(1));

    let err = transmitter.send(partial("abc", "A"), &ctx).await.unwrap_err();
    assert!(matches!(err, TransmitError::Cancelled { attempts: 1, .. }));
}
