// crates/perf-ledger-core/src/runtime/mod.rs
// ============================================================================
// Module: Perf Ledger Runtime
// Description: Merge protocol, transmitter, release tagger, and stores.
// Purpose: Execute the optimistic-concurrency write protocol.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The runtime turns partial results into fenced conditional writes. It holds
//! no state between calls; the record store is the only source of truth.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod context;
pub mod merger;
pub mod release;
pub mod store;
pub mod transmitter;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditEventParams;
pub use audit::FileAuditSink;
pub use audit::MemoryAuditSink;
pub use audit::NoopAuditSink;
pub use audit::SharedAuditSink;
pub use audit::StderrAuditSink;
pub use audit::TransmitAuditEvent;
pub use audit::TransmitAuditSink;
pub use context::CallContext;
pub use merger::MergeOutcome;
pub use merger::merge;
pub use release::ReleaseTagger;
pub use store::InMemoryRecordStore;
pub use store::SharedRecordStore;
pub use transmitter::DEFAULT_HASH_INDEX;
pub use transmitter::DEFAULT_MAX_ATTEMPTS;
pub use transmitter::DEFAULT_UPDATE_DELAY_THRESHOLD;
pub use transmitter::OptimisticTransmitter;
pub use transmitter::RetryPolicy;
pub use transmitter::SendOutcome;
pub use transmitter::TransmitError;
pub use transmitter::TransmitErrorKind;
