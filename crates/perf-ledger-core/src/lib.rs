// crates/perf-ledger-core/src/lib.rs
// ============================================================================
// Module: Perf Ledger Core Library
// Description: Public API surface for the Perf Ledger core.
// Purpose: Expose record types, store interfaces, and the merge protocol.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Perf Ledger core merges partial performance results from many independent
//! test runners into one durable record per source revision. Writers never
//! take locks: every write is a conditional update fenced by a version token,
//! and lost races are retried with jittered backoff.
//!
//! The store is an external collaborator reached through [`RecordStore`];
//! it must provide atomic per-item conditional writes. An eventually
//! consistent get/put store cannot satisfy the protocol.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::RecordStore;
pub use interfaces::StoreError;
pub use interfaces::StoreErrorKind;
pub use runtime::AuditEventParams;
pub use runtime::CallContext;
pub use runtime::DEFAULT_HASH_INDEX;
pub use runtime::DEFAULT_MAX_ATTEMPTS;
pub use runtime::DEFAULT_UPDATE_DELAY_THRESHOLD;
pub use runtime::FileAuditSink;
pub use runtime::InMemoryRecordStore;
pub use runtime::MemoryAuditSink;
pub use runtime::MergeOutcome;
pub use runtime::NoopAuditSink;
pub use runtime::OptimisticTransmitter;
pub use runtime::ReleaseTagger;
pub use runtime::RetryPolicy;
pub use runtime::SendOutcome;
pub use runtime::SharedAuditSink;
pub use runtime::SharedRecordStore;
pub use runtime::StderrAuditSink;
pub use runtime::TransmitAuditEvent;
pub use runtime::TransmitAuditSink;
pub use runtime::TransmitError;
pub use runtime::TransmitErrorKind;
pub use runtime::merge;
