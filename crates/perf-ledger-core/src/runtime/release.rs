// crates/perf-ledger-core/src/runtime/release.rs
// ============================================================================
// Module: Perf Ledger Release Tagger
// Description: Marks an existing revision record as a release.
// Purpose: Reuse the fenced update path for release flag writes.
// Dependencies: crate::runtime::transmitter
// ============================================================================

//! ## Overview
//! Release tagging never creates records and never skips: setting the flag
//! is idempotent, so every call attempts the write under the same retry
//! policy as [`OptimisticTransmitter::send`].
//!
//! The label is stored in `release_label`. The revision hash is never
//! rewritten with the label, so hash lookups keep resolving after tagging.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::RevisionHash;
use crate::runtime::context::CallContext;
use crate::runtime::transmitter::OptimisticTransmitter;
use crate::runtime::transmitter::SendOutcome;
use crate::runtime::transmitter::TransmitError;
use crate::runtime::transmitter::UpdateIntent;

// ============================================================================
// SECTION: Release Tagger
// ============================================================================

/// Flags revision records as releases.
#[derive(Clone)]
pub struct ReleaseTagger {
    /// Transmitter providing the update loop.
    transmitter: OptimisticTransmitter,
}

impl ReleaseTagger {
    /// Creates a tagger that shares the transmitter's store and policy.
    #[must_use]
    pub const fn new(transmitter: OptimisticTransmitter) -> Self {
        Self {
            transmitter,
        }
    }

    /// Sets `is_release` and records `label` on the revision's record.
    ///
    /// # Errors
    ///
    /// Returns [`TransmitError::Invalid`] for a blank hash or label and
    /// [`TransmitError::NotFound`] when no record exists; other failures
    /// follow [`OptimisticTransmitter::send`].
    pub async fn tag_release(
        &self,
        revision_hash: &RevisionHash,
        label: &str,
        ctx: &CallContext,
    ) -> Result<SendOutcome, TransmitError> {
        if revision_hash.as_str().trim().is_empty() {
            return Err(self.transmitter.fail(TransmitError::Invalid {
                revision_hash: revision_hash.clone(),
                reason: "revision hash is empty".to_string(),
            }));
        }
        let label = label.trim();
        if label.is_empty() {
            return Err(self.transmitter.fail(TransmitError::Invalid {
                revision_hash: revision_hash.clone(),
                reason: "release label is empty".to_string(),
            }));
        }
        let intent = UpdateIntent::Release {
            label,
        };
        self.transmitter.update(revision_hash, &intent, ctx, 0).await
    }
}
