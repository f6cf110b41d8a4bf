// crates/perf-ledger-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Record Store
// Description: Durable RecordStore backend using SQLite WAL.
// Purpose: Provide conditional-write persistence for Perf Ledger records.
// Dependencies: perf-ledger-core, rusqlite, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`RecordStore`] that applies every
//! conditional write inside an immediate transaction, so version-token checks
//! and writes are atomic across processes sharing the database file. Stored
//! records are canonical JSON with an integrity hash verified on every load.
//!
//! [`RecordStore`]: perf_ledger_core::RecordStore

// ============================================================================
// SECTION: Modules
// ============================================================================

mod snapshot;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use snapshot::SNAPSHOT_DIGEST;
pub use snapshot::snapshot_digest;
pub use store::MAX_RECORD_BYTES;
pub use store::SqliteRecordStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
