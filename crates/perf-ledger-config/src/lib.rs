// crates/perf-ledger-config/src/lib.rs
// ============================================================================
// Module: Perf Ledger Config Library
// Description: Canonical config model, validation, and runtime builders.
// Purpose: Single source of truth for perf-ledger.toml semantics.
// Dependencies: perf-ledger-core, perf-ledger-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `perf-ledger-config` defines the configuration model for Perf Ledger
//! runners. It validates strictly and fails closed, then builds the retry
//! policy, summarizer, bounds table, audit sink, and record store the
//! runtime needs.
//!
//! Security posture: config inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
