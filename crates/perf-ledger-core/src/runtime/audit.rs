// crates/perf-ledger-core/src/runtime/audit.rs
// ============================================================================
// Module: Perf Ledger Audit Logging
// Description: Structured audit events for transmit and release operations.
// Purpose: Emit JSON-line events without hard logging dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Every terminal transmit outcome and every lost write race produces a
//! [`TransmitAuditEvent`]. Sinks serialize events as JSON lines so runners
//! can route them to whatever pipeline collects their test logs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Transmit audit event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransmitAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Revision hash the event concerns.
    pub revision_hash: String,
    /// Test setting when the event concerns one.
    pub test_setting: Option<String>,
    /// Conditional-write attempt number (1-based, 0 before any write).
    pub attempt: u32,
    /// Jitter delay chosen before the next attempt.
    pub delay_ms: Option<u128>,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
    /// Human-readable detail.
    pub message: Option<String>,
}

/// Inputs required to construct a transmit audit event.
#[derive(Debug, Clone, Default)]
pub struct AuditEventParams {
    /// Revision hash the event concerns.
    pub revision_hash: String,
    /// Test setting when the event concerns one.
    pub test_setting: Option<String>,
    /// Conditional-write attempt number.
    pub attempt: u32,
    /// Jitter delay chosen before the next attempt.
    pub delay_ms: Option<u128>,
    /// Normalized error kind label.
    pub error_kind: Option<&'static str>,
    /// Human-readable detail.
    pub message: Option<String>,
}

impl TransmitAuditEvent {
    /// Creates a new audit event with a consistent timestamp.
    #[must_use]
    pub fn new(event: &'static str, params: AuditEventParams) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            revision_hash: params.revision_hash,
            test_setting: params.test_setting,
            attempt: params.attempt,
            delay_ms: params.delay_ms,
            error_kind: params.error_kind,
            message: params.message,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for transmit events.
pub trait TransmitAuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &TransmitAuditEvent);
}

/// Shared audit sink handle.
pub type SharedAuditSink = Arc<dyn TransmitAuditSink>;

/// Audit sink that discards events.
pub struct NoopAuditSink;

impl TransmitAuditSink for NoopAuditSink {
    fn record(&self, _event: &TransmitAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl TransmitAuditSink for StderrAuditSink {
    fn record(&self, event: &TransmitAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl TransmitAuditSink for FileAuditSink {
    fn record(&self, event: &TransmitAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// Audit sink that keeps events in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    /// Recorded events in emission order.
    events: Mutex<Vec<TransmitAuditEvent>>,
}

impl MemoryAuditSink {
    /// Creates an empty in-memory sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<TransmitAuditEvent> {
        self.events.lock().map(|guard| guard.clone()).unwrap_or_default()
    }

    /// Returns how many events carry the given identifier.
    #[must_use]
    pub fn count(&self, event: &str) -> usize {
        self.events
            .lock()
            .map(|guard| guard.iter().filter(|entry| entry.event == event).count())
            .unwrap_or_default()
    }
}

impl TransmitAuditSink for MemoryAuditSink {
    fn record(&self, event: &TransmitAuditEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event.clone());
        }
    }
}
