// crates/perf-ledger-core/src/runtime/transmitter.rs
// ============================================================================
// Module: Perf Ledger Optimistic Transmitter
// Description: Create-or-merge protocol over conditional store writes.
// Purpose: Record partial results without locks or lost updates.
// Dependencies: crate::{core, interfaces, runtime}, rand, thiserror
// ============================================================================

//! ## Overview
//! [`OptimisticTransmitter::send`] looks a revision up by hash, creates the
//! record when it is absent, and otherwise merges into it with an update
//! fenced by the version token it just read. A conflict means another writer
//! got there first: the transmitter sleeps a uniformly random delay in
//! `[0, update_delay_threshold]` and retries from a fresh read, up to
//! `max_attempts` times.
//!
//! Only [`StoreErrorKind::Conflict`] is retried. Every other store failure is
//! returned on first occurrence.
//!
//! Security posture: store contents are untrusted input; a hash lookup that
//! returns more than one record is reported as invalid store data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

use crate::core::AttributeDelta;
use crate::core::PartialResult;
use crate::core::Record;
use crate::core::RevisionHash;
use crate::core::TestSettingKey;
use crate::core::VersionToken;
use crate::interfaces::RecordStore;
use crate::interfaces::StoreError;
use crate::interfaces::StoreErrorKind;
use crate::runtime::audit::AuditEventParams;
use crate::runtime::audit::NoopAuditSink;
use crate::runtime::audit::SharedAuditSink;
use crate::runtime::audit::TransmitAuditEvent;
use crate::runtime::context::CallContext;
use crate::runtime::merger::MergeOutcome;
use crate::runtime::merger::merge;
use crate::runtime::store::SharedRecordStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default bound on conditional update attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default jitter ceiling between conflicting attempts.
pub const DEFAULT_UPDATE_DELAY_THRESHOLD: Duration = Duration::from_secs(60);
/// Default name of the secondary index keyed by revision hash.
pub const DEFAULT_HASH_INDEX: &str = "Hash-index";

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Bounded, jittered retry policy for conditional updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum conditional update attempts per call.
    pub max_attempts: u32,
    /// Upper bound of the uniform jitter delay.
    pub update_delay_threshold: Duration,
    /// Optional seed for the per-call jitter source.
    pub jitter_seed: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            update_delay_threshold: DEFAULT_UPDATE_DELAY_THRESHOLD,
            jitter_seed: None,
        }
    }
}

impl RetryPolicy {
    /// Builds a fresh random source for one call.
    ///
    /// Seeded policies produce the same delay sequence on every call.
    #[must_use]
    pub fn rng(&self) -> StdRng {
        self.jitter_seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
    }

    /// Draws one delay uniformly from `[0, update_delay_threshold]`.
    #[must_use]
    pub fn jitter(&self, rng: &mut StdRng) -> Duration {
        rng.gen_range(Duration::ZERO ..= self.update_delay_threshold)
    }
}

// ============================================================================
// SECTION: Outcomes and Errors
// ============================================================================

/// Successful terminal state of a transmit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The record was created or updated.
    Sent {
        /// Revision hash identifying the record.
        identifier: RevisionHash,
        /// True when this call created the record.
        created: bool,
        /// Conditional writes issued by this call.
        attempts: u32,
    },
    /// The test setting was already recorded by another writer.
    Skipped {
        /// Revision hash identifying the record.
        identifier: RevisionHash,
        /// Test setting found already present.
        test_setting: TestSettingKey,
        /// Conditional writes issued by this call.
        attempts: u32,
    },
}

impl SendOutcome {
    /// Returns the record identifier.
    #[must_use]
    pub const fn identifier(&self) -> &RevisionHash {
        match self {
            Self::Sent {
                identifier, ..
            }
            | Self::Skipped {
                identifier, ..
            } => identifier,
        }
    }

    /// Returns true when this call wrote to the store.
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }

    /// Returns true when the call ended without writing.
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Returns the number of conditional writes issued.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Sent {
                attempts, ..
            }
            | Self::Skipped {
                attempts, ..
            } => *attempts,
        }
    }
}

/// Dispatch classification for transmit errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransmitErrorKind {
    /// The caller's input was rejected before any store call.
    Invalid,
    /// The record to update does not exist.
    NotFound,
    /// A non-conflict store failure.
    StoreUnavailable,
    /// Every attempt lost the write race.
    MaxAttemptsExceeded,
    /// The call context was cancelled or timed out.
    Cancelled,
}

impl TransmitErrorKind {
    /// Returns a stable label for audit events.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::NotFound => "not_found",
            Self::StoreUnavailable => "store_unavailable",
            Self::MaxAttemptsExceeded => "max_attempts_exceeded",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Transmit failures surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransmitError {
    /// The partial result is malformed.
    #[error("invalid partial result for revision {revision_hash}: {reason}")]
    Invalid {
        /// Revision hash from the request.
        revision_hash: RevisionHash,
        /// Rejection reason.
        reason: String,
    },
    /// No record exists for the revision hash.
    #[error("no record found for revision {revision_hash}")]
    NotFound {
        /// Revision hash from the request.
        revision_hash: RevisionHash,
    },
    /// The store failed with a non-conflict error.
    #[error("record store unavailable for revision {revision_hash}: {source}")]
    Store {
        /// Revision hash from the request.
        revision_hash: RevisionHash,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
    /// Every conditional update attempt conflicted.
    #[error("max attempts exceeded for revision {revision_hash} after {attempts} attempts")]
    MaxAttemptsExceeded {
        /// Revision hash from the request.
        revision_hash: RevisionHash,
        /// Update attempts made.
        attempts: u32,
        /// Last conflict reported by the store.
        last_error: Option<StoreError>,
        /// Wall-clock time of the last conflict (milliseconds since epoch).
        last_conflict_at_ms: Option<u128>,
    },
    /// The caller cancelled the call or its deadline passed.
    #[error("transmit cancelled for revision {revision_hash} after {attempts} attempts")]
    Cancelled {
        /// Revision hash from the request.
        revision_hash: RevisionHash,
        /// Conditional writes issued before cancellation.
        attempts: u32,
    },
}

impl TransmitError {
    /// Returns the dispatch kind for this error.
    #[must_use]
    pub const fn kind(&self) -> TransmitErrorKind {
        match self {
            Self::Invalid {
                ..
            } => TransmitErrorKind::Invalid,
            Self::NotFound {
                ..
            } => TransmitErrorKind::NotFound,
            Self::Store {
                ..
            } => TransmitErrorKind::StoreUnavailable,
            Self::MaxAttemptsExceeded {
                ..
            } => TransmitErrorKind::MaxAttemptsExceeded,
            Self::Cancelled {
                ..
            } => TransmitErrorKind::Cancelled,
        }
    }
}

// ============================================================================
// SECTION: Update Intents
// ============================================================================

/// What the update loop writes on each attempt.
pub(crate) enum UpdateIntent<'a> {
    /// Merge one test setting from a partial result.
    Merge {
        /// Caller's partial result.
        partial: &'a PartialResult,
        /// Test setting being recorded.
        test_setting: &'a TestSettingKey,
    },
    /// Mark the record as a release.
    Release {
        /// Release label to store.
        label: &'a str,
    },
}

impl UpdateIntent<'_> {
    /// Builds the delta for one attempt.
    ///
    /// Returns the already-recorded test setting when nothing needs writing.
    fn delta(
        &self,
        current: &Record,
        token: VersionToken,
    ) -> Result<AttributeDelta, TestSettingKey> {
        match self {
            Self::Merge {
                partial,
                test_setting,
            } => match merge(partial, current, test_setting) {
                MergeOutcome::Mergeable(mut delta) => {
                    delta.version_token = token;
                    Ok(delta)
                }
                MergeOutcome::AlreadyRecorded | MergeOutcome::NothingToMerge => {
                    Err((*test_setting).clone())
                }
            },
            Self::Release {
                label,
            } => {
                let mut delta = AttributeDelta::new(token);
                delta.is_release = Some(true);
                delta.release_label = Some((*label).to_string());
                Ok(delta)
            }
        }
    }

    /// Returns the test setting the intent concerns, if any.
    fn test_setting(&self) -> Option<&TestSettingKey> {
        match self {
            Self::Merge {
                test_setting, ..
            } => Some(test_setting),
            Self::Release {
                ..
            } => None,
        }
    }

    /// Returns the audit event name for a successful update.
    const fn updated_event(&self) -> &'static str {
        match self {
            Self::Merge {
                ..
            } => "record_updated",
            Self::Release {
                ..
            } => "release_tagged",
        }
    }
}

// ============================================================================
// SECTION: Transmitter
// ============================================================================

/// Optimistic-concurrency transmitter for partial results.
#[derive(Clone)]
pub struct OptimisticTransmitter {
    /// Backing record store.
    store: SharedRecordStore,
    /// Retry policy for conflicting updates.
    policy: RetryPolicy,
    /// Secondary index name used for hash lookups.
    hash_index: String,
    /// Audit sink for transmit events.
    audit: SharedAuditSink,
}

impl OptimisticTransmitter {
    /// Creates a transmitter over `store` with the given retry policy.
    #[must_use]
    pub fn new(store: SharedRecordStore, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            hash_index: DEFAULT_HASH_INDEX.to_string(),
            audit: Arc::new(NoopAuditSink),
        }
    }

    /// Overrides the hash index name.
    #[must_use]
    pub fn with_hash_index(mut self, hash_index: impl Into<String>) -> Self {
        self.hash_index = hash_index.into();
        self
    }

    /// Overrides the audit sink.
    #[must_use]
    pub fn with_audit_sink(mut self, audit: SharedAuditSink) -> Self {
        self.audit = audit;
        self
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Records one partial result.
    ///
    /// # Errors
    ///
    /// Returns [`TransmitError`] when the input is malformed, the store
    /// fails, every attempt conflicts, or `ctx` finishes first.
    pub async fn send(
        &self,
        partial: PartialResult,
        ctx: &CallContext,
    ) -> Result<SendOutcome, TransmitError> {
        let revision_hash = partial.revision_hash.clone();
        if revision_hash.as_str().trim().is_empty() {
            return Err(self.fail(TransmitError::Invalid {
                revision_hash,
                reason: "revision hash is empty".to_string(),
            }));
        }
        let Some(test_setting) = partial.single_test_setting().cloned() else {
            return Err(self.fail(TransmitError::Invalid {
                revision_hash,
                reason: format!(
                    "expected exactly one test setting, found {}",
                    partial.results.len()
                ),
            }));
        };

        let mut writes = 0;
        if self.lookup(&revision_hash, ctx, writes).await?.is_none() {
            let record = partial.clone().into_record();
            writes += 1;
            match ctx.run(self.store.put_if_absent(&record)).await {
                None => return Err(self.cancelled(revision_hash, writes)),
                Some(Ok(())) => {
                    self.emit("record_created", AuditEventParams {
                        revision_hash: revision_hash.to_string(),
                        test_setting: Some(test_setting.to_string()),
                        attempt: writes,
                        ..AuditEventParams::default()
                    });
                    return Ok(SendOutcome::Sent {
                        identifier: revision_hash,
                        created: true,
                        attempts: writes,
                    });
                }
                Some(Err(err)) if err.kind() == StoreErrorKind::Conflict => {
                    self.emit("update_conflict", AuditEventParams {
                        revision_hash: revision_hash.to_string(),
                        test_setting: Some(test_setting.to_string()),
                        attempt: 0,
                        error_kind: Some(err.kind().label()),
                        message: Some(err.to_string()),
                        ..AuditEventParams::default()
                    });
                }
                Some(Err(err)) => {
                    return Err(self.fail(TransmitError::Store {
                        revision_hash,
                        source: err,
                    }));
                }
            }
        }

        let intent = UpdateIntent::Merge {
            partial: &partial,
            test_setting: &test_setting,
        };
        self.update(&revision_hash, &intent, ctx, writes).await
    }

    /// Runs the fenced update loop for an existing record.
    pub(crate) async fn update(
        &self,
        revision_hash: &RevisionHash,
        intent: &UpdateIntent<'_>,
        ctx: &CallContext,
        mut writes: u32,
    ) -> Result<SendOutcome, TransmitError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut rng = self.policy.rng();
        let mut last_error = None;
        let mut last_conflict_at_ms = None;
        let test_setting = intent.test_setting().map(ToString::to_string);

        for attempt in 1 ..= max_attempts {
            let Some(current) = self.lookup(revision_hash, ctx, writes).await? else {
                return Err(self.fail(TransmitError::NotFound {
                    revision_hash: revision_hash.clone(),
                }));
            };
            let delta = match intent.delta(&current, VersionToken::generate()) {
                Ok(delta) => delta,
                Err(recorded) => {
                    self.emit("record_skipped", AuditEventParams {
                        revision_hash: revision_hash.to_string(),
                        test_setting: Some(recorded.to_string()),
                        attempt,
                        ..AuditEventParams::default()
                    });
                    return Ok(SendOutcome::Skipped {
                        identifier: revision_hash.clone(),
                        test_setting: recorded,
                        attempts: writes,
                    });
                }
            };

            writes += 1;
            let key = current.key();
            let write = self.store.update_if_version_matches(
                &key,
                &delta,
                &current.version_token,
            );
            let Some(result) = ctx.run(write).await else {
                return Err(self.cancelled(revision_hash.clone(), writes));
            };
            match result {
                Ok(()) => {
                    self.emit(intent.updated_event(), AuditEventParams {
                        revision_hash: revision_hash.to_string(),
                        test_setting,
                        attempt,
                        ..AuditEventParams::default()
                    });
                    return Ok(SendOutcome::Sent {
                        identifier: revision_hash.clone(),
                        created: false,
                        attempts: writes,
                    });
                }
                Err(err) => match err.kind() {
                    StoreErrorKind::Conflict => {
                        last_conflict_at_ms = Some(now_ms());
                        let delay = (attempt < max_attempts).then(|| self.policy.jitter(&mut rng));
                        self.emit("update_conflict", AuditEventParams {
                            revision_hash: revision_hash.to_string(),
                            test_setting: test_setting.clone(),
                            attempt,
                            delay_ms: delay.map(|delay| delay.as_millis()),
                            error_kind: Some(err.kind().label()),
                            message: Some(err.to_string()),
                        });
                        last_error = Some(err);
                        if let Some(delay) = delay
                            && !ctx.sleep(delay).await
                        {
                            return Err(self.cancelled(revision_hash.clone(), writes));
                        }
                    }
                    StoreErrorKind::NotFound => {
                        return Err(self.fail(TransmitError::NotFound {
                            revision_hash: revision_hash.clone(),
                        }));
                    }
                    StoreErrorKind::Unavailable => {
                        return Err(self.fail(TransmitError::Store {
                            revision_hash: revision_hash.clone(),
                            source: err,
                        }));
                    }
                },
            }
        }

        Err(self.fail(TransmitError::MaxAttemptsExceeded {
            revision_hash: revision_hash.clone(),
            attempts: max_attempts,
            last_error,
            last_conflict_at_ms,
        }))
    }

    /// Reads the record for `revision_hash`, expecting at most one match.
    async fn lookup(
        &self,
        revision_hash: &RevisionHash,
        ctx: &CallContext,
        writes: u32,
    ) -> Result<Option<Record>, TransmitError> {
        let query = self.store.query_by_hash(&self.hash_index, revision_hash);
        let Some(result) = ctx.run(query).await else {
            return Err(self.cancelled(revision_hash.clone(), writes));
        };
        let mut records = result.map_err(|source| {
            self.fail(TransmitError::Store {
                revision_hash: revision_hash.clone(),
                source,
            })
        })?;
        if records.len() > 1 {
            return Err(self.fail(TransmitError::Store {
                revision_hash: revision_hash.clone(),
                source: StoreError::Invalid(format!(
                    "{} records share hash {revision_hash}",
                    records.len()
                )),
            }));
        }
        Ok(records.pop())
    }

    /// Builds and audits a cancellation error.
    fn cancelled(&self, revision_hash: RevisionHash, attempts: u32) -> TransmitError {
        self.fail(TransmitError::Cancelled {
            revision_hash,
            attempts,
        })
    }

    /// Audits a terminal failure and returns it.
    pub(crate) fn fail(&self, err: TransmitError) -> TransmitError {
        let (revision_hash, attempt) = match &err {
            TransmitError::Invalid {
                revision_hash, ..
            }
            | TransmitError::NotFound {
                revision_hash,
            }
            | TransmitError::Store {
                revision_hash, ..
            } => (revision_hash, 0),
            TransmitError::MaxAttemptsExceeded {
                revision_hash,
                attempts,
                ..
            }
            | TransmitError::Cancelled {
                revision_hash,
                attempts,
            } => (revision_hash, *attempts),
        };
        self.emit("transmit_failed", AuditEventParams {
            revision_hash: revision_hash.to_string(),
            attempt,
            error_kind: Some(err.kind().label()),
            message: Some(err.to_string()),
            ..AuditEventParams::default()
        });
        err
    }

    /// Records an audit event.
    fn emit(&self, event: &'static str, params: AuditEventParams) {
        self.audit.record(&TransmitAuditEvent::new(event, params));
    }
}

/// Returns the current wall-clock time in milliseconds since epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}
