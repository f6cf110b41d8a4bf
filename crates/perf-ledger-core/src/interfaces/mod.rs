// crates/perf-ledger-core/src/interfaces/mod.rs
// ============================================================================
// Module: Perf Ledger Interfaces
// Description: Backend-agnostic record store contract.
// Purpose: Define the conditional-write surface used by the merge protocol.
// Dependencies: crate::core, async-trait
// ============================================================================

//! ## Overview
//! The record store is an external collaborator. Implementations must apply
//! each conditional write atomically on the server side; the transmitter's
//! correctness rests entirely on that compare-and-swap guarantee.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::AttributeDelta;
use crate::core::Record;
use crate::core::RecordKey;
use crate::core::RevisionHash;
use crate::core::VersionToken;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Dispatch classification for store errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// A conditional check failed; the caller may retry.
    Conflict,
    /// The addressed record does not exist.
    NotFound,
    /// Any other store-layer failure.
    Unavailable,
}

impl StoreErrorKind {
    /// Returns a stable label for audit events.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Record store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Conditional write precondition failed.
    #[error("record store conflict: {0}")]
    Conflict(String),
    /// Record not found for the given key.
    #[error("record store not found: {0}")]
    NotFound(String),
    /// Store I/O or transport error.
    #[error("record store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("record store corruption: {0}")]
    Corrupt(String),
    /// Store data is invalid.
    #[error("record store invalid data: {0}")]
    Invalid(String),
}

impl StoreError {
    /// Returns the dispatch kind for this error.
    #[must_use]
    pub const fn kind(&self) -> StoreErrorKind {
        match self {
            Self::Conflict(_) => StoreErrorKind::Conflict,
            Self::NotFound(_) => StoreErrorKind::NotFound,
            Self::Io(_) | Self::Corrupt(_) | Self::Invalid(_) => StoreErrorKind::Unavailable,
        }
    }
}

// ============================================================================
// SECTION: Record Store
// ============================================================================

/// Keyed record store with per-item conditional writes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns records whose revision hash equals `hash` on the named index.
    ///
    /// At most one record is expected; order is unspecified.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    async fn query_by_hash(
        &self,
        index: &str,
        hash: &RevisionHash,
    ) -> Result<Vec<Record>, StoreError>;

    /// Inserts a record when neither its primary key nor its hash exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when a matching record exists.
    async fn put_if_absent(&self, record: &Record) -> Result<(), StoreError>;

    /// Applies `delta` when the stored token equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] on token mismatch and
    /// [`StoreError::NotFound`] when the key does not exist.
    async fn update_if_version_matches(
        &self,
        key: &RecordKey,
        delta: &AttributeDelta,
        expected: &VersionToken,
    ) -> Result<(), StoreError>;
}
