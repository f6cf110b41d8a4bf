// crates/perf-ledger-store-sqlite/src/snapshot.rs
// ============================================================================
// Module: Record Snapshots
// Description: Canonical record encoding with an integrity digest.
// Purpose: Make stored rows self-verifying so corruption fails closed.
// Dependencies: perf-ledger-core, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Each row stores the record as RFC 8785 canonical JSON next to a SHA-256
//! digest of those bytes and the digest label. Equal records always encode to
//! identical bytes, so the digest is stable across writers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use perf_ledger_core::Record;
use sha2::Digest;
use sha2::Sha256;

use crate::store::MAX_RECORD_BYTES;
use crate::store::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Digest label written alongside every snapshot.
pub const SNAPSHOT_DIGEST: &str = "sha256";

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Canonical bytes of one record plus their digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordSnapshot {
    /// Canonical JSON bytes.
    pub(crate) json: Vec<u8>,
    /// Lowercase hex SHA-256 of `json`.
    pub(crate) digest: String,
}

impl RecordSnapshot {
    /// Encodes `record` canonically, enforcing the size limit.
    pub(crate) fn encode(record: &Record) -> Result<Self, SqliteStoreError> {
        let json =
            serde_jcs::to_vec(record).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        check_size(json.len())?;
        let digest = snapshot_digest(&json);
        Ok(Self {
            json,
            digest,
        })
    }

    /// Verifies stored bytes against their digest and decodes the record.
    pub(crate) fn decode(
        json: &[u8],
        label: &str,
        digest: &str,
        revision_hash: &str,
    ) -> Result<Record, SqliteStoreError> {
        check_size(json.len())?;
        if label != SNAPSHOT_DIGEST {
            return Err(SqliteStoreError::Invalid(format!("unsupported hash algorithm: {label}")));
        }
        if snapshot_digest(json) != digest {
            return Err(SqliteStoreError::Corrupt(format!(
                "hash mismatch for record {revision_hash}"
            )));
        }
        serde_json::from_slice(json)
            .map_err(|err| SqliteStoreError::Corrupt(format!("record decode failed: {err}")))
    }
}

/// Returns the lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn snapshot_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes).iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Rejects payloads over [`MAX_RECORD_BYTES`].
fn check_size(actual_bytes: usize) -> Result<(), SqliteStoreError> {
    if actual_bytes > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_RECORD_BYTES,
            actual_bytes,
        });
    }
    Ok(())
}
