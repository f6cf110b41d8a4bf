// crates/perf-ledger-core/src/core/record.rs
// ============================================================================
// Module: Perf Ledger Records
// Description: Per-revision records, partial results, and attribute deltas.
// Purpose: Define the shapes exchanged between runners, merger, and stores.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`Record`] holds every test-setting result recorded for one source
//! revision. Runners submit a [`PartialResult`] for a single test setting;
//! the merger turns it into an [`AttributeDelta`] that stores apply
//! atomically behind a version-token check.
//!
//! `results` is append-only at test-setting granularity: a delta only ever
//! adds keys and never replaces an existing one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::RevisionHash;
use crate::core::identifiers::TestSettingKey;
use crate::core::identifiers::VersionToken;
use crate::core::statistics::Statistics;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Statistics keyed by metric name for one test setting.
pub type MetricResults = BTreeMap<String, Statistics>;

/// Primary key of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    /// Coarse partition key (calendar year).
    pub year_partition: i32,
    /// Commit date rank used as the range key.
    pub commit_date: i64,
}

/// Durable performance record for one source revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Revision hash (hash index key).
    pub revision_hash: RevisionHash,
    /// Commit date rank (range key).
    pub commit_date: i64,
    /// Coarse partition key.
    pub year_partition: i32,
    /// Whether the revision is a tagged release.
    pub is_release: bool,
    /// Release label recorded by the release tagger.
    #[serde(default)]
    pub release_label: Option<String>,
    /// Optimistic-concurrency fencing token.
    pub version_token: VersionToken,
    /// Results keyed by test setting.
    pub results: BTreeMap<TestSettingKey, MetricResults>,
}

impl Record {
    /// Returns the primary key for this record.
    #[must_use]
    pub const fn key(&self) -> RecordKey {
        RecordKey {
            year_partition: self.year_partition,
            commit_date: self.commit_date,
        }
    }

    /// Returns true when results for the test setting are already recorded.
    #[must_use]
    pub fn has_test_setting(&self, test_setting: &TestSettingKey) -> bool {
        self.results.contains_key(test_setting)
    }
}

/// Partial result produced by one test runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialResult {
    /// Revision hash the result belongs to.
    pub revision_hash: RevisionHash,
    /// Commit date rank.
    pub commit_date: i64,
    /// Coarse partition key.
    pub year_partition: i32,
    /// Release flag, when explicitly set by the caller.
    #[serde(default)]
    pub is_release: Option<bool>,
    /// Candidate version token for the next write.
    pub version_token: VersionToken,
    /// Results keyed by test setting (exactly one entry per send).
    pub results: BTreeMap<TestSettingKey, MetricResults>,
}

impl PartialResult {
    /// Builds a single-setting partial result with a fresh version token.
    #[must_use]
    pub fn new(
        revision_hash: RevisionHash,
        key: RecordKey,
        test_setting: TestSettingKey,
        metrics: MetricResults,
    ) -> Self {
        let mut results = BTreeMap::new();
        results.insert(test_setting, metrics);
        Self {
            revision_hash,
            commit_date: key.commit_date,
            year_partition: key.year_partition,
            is_release: None,
            version_token: VersionToken::generate(),
            results,
        }
    }

    /// Sets the release flag explicitly.
    #[must_use]
    pub const fn with_release(mut self, is_release: bool) -> Self {
        self.is_release = Some(is_release);
        self
    }

    /// Returns the primary key for the record this result targets.
    #[must_use]
    pub const fn key(&self) -> RecordKey {
        RecordKey {
            year_partition: self.year_partition,
            commit_date: self.commit_date,
        }
    }

    /// Returns the single test setting carried by this result.
    ///
    /// Returns `None` when the result carries zero or several settings.
    #[must_use]
    pub fn single_test_setting(&self) -> Option<&TestSettingKey> {
        let mut keys = self.results.keys();
        match (keys.next(), keys.next()) {
            (Some(key), None) => Some(key),
            _ => None,
        }
    }

    /// Converts the partial result into a brand-new record.
    #[must_use]
    pub fn into_record(self) -> Record {
        Record {
            revision_hash: self.revision_hash,
            commit_date: self.commit_date,
            year_partition: self.year_partition,
            is_release: self.is_release.unwrap_or(false),
            release_label: None,
            version_token: self.version_token,
            results: self.results,
        }
    }
}

// ============================================================================
// SECTION: Attribute Delta
// ============================================================================

/// Minimal attribute set written by one conditional update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDelta {
    /// Test-setting results to add.
    pub added_results: BTreeMap<TestSettingKey, MetricResults>,
    /// Release flag to set.
    pub is_release: Option<bool>,
    /// Release label to set.
    pub release_label: Option<String>,
    /// Replacement revision hash.
    pub revision_hash: Option<RevisionHash>,
    /// Token written with the update.
    pub version_token: VersionToken,
}

impl AttributeDelta {
    /// Creates a delta that only rotates the version token.
    #[must_use]
    pub const fn new(version_token: VersionToken) -> Self {
        Self {
            added_results: BTreeMap::new(),
            is_release: None,
            release_label: None,
            revision_hash: None,
            version_token,
        }
    }

    /// Returns true when the delta changes nothing besides the token.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_results.is_empty()
            && self.is_release.is_none()
            && self.release_label.is_none()
            && self.revision_hash.is_none()
    }

    /// Applies the delta to a record snapshot, returning the updated record.
    ///
    /// Existing test-setting keys are never replaced.
    #[must_use]
    pub fn apply_to(&self, current: &Record) -> Record {
        let mut next = current.clone();
        for (key, metrics) in &self.added_results {
            next.results.entry(key.clone()).or_insert_with(|| metrics.clone());
        }
        if let Some(is_release) = self.is_release {
            next.is_release = is_release;
        }
        if let Some(label) = &self.release_label {
            next.release_label = Some(label.clone());
        }
        if let Some(hash) = &self.revision_hash {
            next.revision_hash = hash.clone();
        }
        next.version_token = self.version_token.clone();
        next
    }
}
