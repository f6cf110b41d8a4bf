// crates/perf-ledger-core/src/core/identifiers.rs
// ============================================================================
// Module: Perf Ledger Identifiers
// Description: Opaque identifiers for revisions, test settings, and versions.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: rand, serde
// ============================================================================

//! ## Overview
//! Identifiers are opaque strings on the wire. [`TestSettingKey`] has a
//! composite `"<logVolume>-<throughput>"` form, and [`VersionToken`] values
//! are random fencing tokens that carry no meaning to readers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Source revision (commit) hash identifying one record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionHash(String);

impl RevisionHash {
    /// Creates a new revision hash.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RevisionHash {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RevisionHash {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Experiment configuration identifier within a revision's record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestSettingKey(String);

impl TestSettingKey {
    /// Creates a test-setting key from a raw string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds the composite `"<logVolume>-<throughput>"` key.
    #[must_use]
    pub fn from_parts(log_volume: impl fmt::Display, throughput: impl fmt::Display) -> Self {
        Self(format!("{log_volume}-{throughput}"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestSettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TestSettingKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TestSettingKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Optimistic-concurrency fencing token.
///
/// # Invariants
/// - Rewritten on every successful write; compared only for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

/// Number of random bytes in a generated version token.
const VERSION_TOKEN_BYTES: usize = 16;

impl VersionToken {
    /// Wraps an existing token value.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Generates a fresh random token from the OS entropy source.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0_u8; VERSION_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes.iter().map(|byte| format!("{byte:02x}")).collect())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
