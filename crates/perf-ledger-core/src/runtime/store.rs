// crates/perf-ledger-core/src/runtime/store.rs
// ============================================================================
// Module: Perf Ledger In-Memory Store
// Description: Mutex-guarded record store for tests and local runs.
// Purpose: Provide atomic conditional writes without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryRecordStore`] checks preconditions and applies writes under a
//! single lock, so every conditional write is atomic. It is intended for
//! tests and single-host demos, not for coordinating separate processes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;

use crate::core::AttributeDelta;
use crate::core::Record;
use crate::core::RecordKey;
use crate::core::RevisionHash;
use crate::core::VersionToken;
use crate::interfaces::RecordStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory record store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    /// Records keyed by primary key.
    records: Arc<Mutex<BTreeMap<RecordKey, Record>>>,
    /// Count of acknowledged writes.
    writes: Arc<AtomicUsize>,
}

impl InMemoryRecordStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of acknowledged writes (puts and updates).
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the record stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the store mutex is poisoned.
    pub fn get(&self, key: &RecordKey) -> Result<Option<Record>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.get(key).cloned())
    }

    /// Locks the record map.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<RecordKey, Record>>, StoreError> {
        self.records.lock().map_err(|_| StoreError::Io("record store mutex poisoned".to_string()))
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn query_by_hash(
        &self,
        _index: &str,
        hash: &RevisionHash,
    ) -> Result<Vec<Record>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.values().filter(|record| record.revision_hash == *hash).cloned().collect())
    }

    async fn put_if_absent(&self, record: &Record) -> Result<(), StoreError> {
        let key = record.key();
        let mut guard = self.lock()?;
        if guard.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "record exists for key {}/{}",
                key.year_partition, key.commit_date
            )));
        }
        if guard.values().any(|existing| existing.revision_hash == record.revision_hash) {
            return Err(StoreError::Conflict(format!(
                "record exists for hash {}",
                record.revision_hash
            )));
        }
        guard.insert(key, record.clone());
        drop(guard);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_if_version_matches(
        &self,
        key: &RecordKey,
        delta: &AttributeDelta,
        expected: &VersionToken,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let Some(current) = guard.get(key) else {
            return Err(StoreError::NotFound(format!(
                "no record for key {}/{}",
                key.year_partition, key.commit_date
            )));
        };
        if current.version_token != *expected {
            return Err(StoreError::Conflict(format!(
                "version token mismatch for key {}/{}",
                key.year_partition, key.commit_date
            )));
        }
        if let Some(hash) = &delta.revision_hash
            && guard.iter().any(|(other, record)| other != key && record.revision_hash == *hash)
        {
            return Err(StoreError::Invalid(format!("hash {hash} already owned by another record")));
        }
        let next = delta.apply_to(current);
        guard.insert(*key, next);
        drop(guard);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// SECTION: Shared Store Wrapper
// ============================================================================

/// Shared record store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedRecordStore {
    /// Inner store implementation.
    inner: Arc<dyn RecordStore>,
}

impl SharedRecordStore {
    /// Wraps a record store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl RecordStore + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            inner: store,
        }
    }
}

#[async_trait]
impl RecordStore for SharedRecordStore {
    async fn query_by_hash(
        &self,
        index: &str,
        hash: &RevisionHash,
    ) -> Result<Vec<Record>, StoreError> {
        self.inner.query_by_hash(index, hash).await
    }

    async fn put_if_absent(&self, record: &Record) -> Result<(), StoreError> {
        self.inner.put_if_absent(record).await
    }

    async fn update_if_version_matches(
        &self,
        key: &RecordKey,
        delta: &AttributeDelta,
        expected: &VersionToken,
    ) -> Result<(), StoreError> {
        self.inner.update_if_version_matches(key, delta, expected).await
    }
}
