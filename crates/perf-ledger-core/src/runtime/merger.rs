// crates/perf-ledger-core/src/runtime/merger.rs
// ============================================================================
// Module: Perf Ledger Record Merger
// Description: Minimal attribute delta between a partial result and a record.
// Purpose: Enforce first-writer-wins per test setting without mutation.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! [`merge`] compares one runner's partial result with the stored record and
//! returns the smallest delta that adds the runner's test setting. When the
//! setting is already present the merge is a no-op: another runner recorded
//! it first and the caller must stop without writing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::AttributeDelta;
use crate::core::PartialResult;
use crate::core::Record;
use crate::core::TestSettingKey;

// ============================================================================
// SECTION: Merge Outcome
// ============================================================================

/// Result of merging a partial result into a stored record.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// The delta adds new data and should be written.
    Mergeable(AttributeDelta),
    /// The test setting is already recorded; nothing to write.
    AlreadyRecorded,
    /// The partial carries no results for the test setting; nothing to write.
    NothingToMerge,
}

impl MergeOutcome {
    /// Returns true when the outcome carries a delta to write.
    #[must_use]
    pub const fn is_mergeable(&self) -> bool {
        matches!(self, Self::Mergeable(_))
    }

    /// Returns the delta, if any.
    #[must_use]
    pub const fn delta(&self) -> Option<&AttributeDelta> {
        match self {
            Self::Mergeable(delta) => Some(delta),
            Self::AlreadyRecorded | Self::NothingToMerge => None,
        }
    }
}

// ============================================================================
// SECTION: Merge
// ============================================================================

/// Computes the delta that records `test_setting` from `incoming` on `current`.
///
/// Other test settings already on `current` are left untouched. A partial
/// without results for `test_setting` never yields a write. The release
/// flag is carried only when the caller set it, and the revision hash only
/// when it differs from the stored one.
#[must_use]
pub fn merge(
    incoming: &PartialResult,
    current: &Record,
    test_setting: &TestSettingKey,
) -> MergeOutcome {
    if current.has_test_setting(test_setting) {
        return MergeOutcome::AlreadyRecorded;
    }
    let Some(metrics) = incoming.results.get(test_setting) else {
        return MergeOutcome::NothingToMerge;
    };
    let mut delta = AttributeDelta::new(incoming.version_token.clone());
    delta.added_results.insert(test_setting.clone(), metrics.clone());
    delta.is_release = incoming.is_release;
    if incoming.revision_hash != current.revision_hash {
        delta.revision_hash = Some(incoming.revision_hash.clone());
    }
    MergeOutcome::Mergeable(delta)
}
