// crates/perf-ledger-core/src/core/mod.rs
// ============================================================================
// Module: Perf Ledger Core Types
// Description: Canonical record, statistics, and identifier structures.
// Purpose: Provide stable, serializable types shared by stores and runtime.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types describe the per-revision performance record, the partial
//! results produced by a single test runner, the attribute deltas written by
//! conditional updates, and the statistics summarizer that feeds them.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod bounds;
pub mod identifiers;
pub mod record;
pub mod statistics;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use bounds::BoundsViolation;
pub use bounds::DEFAULT_ERROR_BOUND;
pub use bounds::MetricBoundsTable;
pub use identifiers::RevisionHash;
pub use identifiers::TestSettingKey;
pub use identifiers::VersionToken;
pub use record::AttributeDelta;
pub use record::MetricResults;
pub use record::PartialResult;
pub use record::Record;
pub use record::RecordKey;
pub use statistics::DEFAULT_COLLECTION_WINDOW_SECS;
pub use statistics::Statistics;
pub use statistics::StatisticsSummarizer;
pub use statistics::summarize;
