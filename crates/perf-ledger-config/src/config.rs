// crates/perf-ledger-config/src/config.rs
// ============================================================================
// Module: Perf Ledger Configuration
// Description: Configuration loading and validation for Perf Ledger.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: perf-ledger-core, perf-ledger-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section has defaults, so an empty file yields the stock protocol
//! settings: five attempts, a 60 second jitter ceiling, an in-memory store,
//! and stderr audit logging.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use perf_ledger_core::DEFAULT_COLLECTION_WINDOW_SECS;
use perf_ledger_core::DEFAULT_ERROR_BOUND;
use perf_ledger_core::DEFAULT_HASH_INDEX;
use perf_ledger_core::DEFAULT_MAX_ATTEMPTS;
use perf_ledger_core::FileAuditSink;
use perf_ledger_core::InMemoryRecordStore;
use perf_ledger_core::MetricBoundsTable;
use perf_ledger_core::NoopAuditSink;
use perf_ledger_core::OptimisticTransmitter;
use perf_ledger_core::RetryPolicy;
use perf_ledger_core::SharedAuditSink;
use perf_ledger_core::SharedRecordStore;
use perf_ledger_core::StatisticsSummarizer;
use perf_ledger_core::StderrAuditSink;
use perf_ledger_store_sqlite::SqliteRecordStore;
use perf_ledger_store_sqlite::SqliteStoreConfig;
use perf_ledger_store_sqlite::SqliteStoreMode;
use perf_ledger_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "perf-ledger.toml";
/// Environment variable used to override the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "PERF_LEDGER_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound for `transmitter.max_attempts`.
pub const MAX_ATTEMPTS_LIMIT: u32 = 100;
/// Upper bound for `transmitter.update_delay_threshold_ms` (10 minutes).
pub const MAX_UPDATE_DELAY_THRESHOLD_MS: u64 = 10 * 60 * 1000;
/// Default jitter ceiling in milliseconds.
const DEFAULT_UPDATE_DELAY_THRESHOLD_MS: u64 = 60_000;
/// Default `SQLite` busy timeout in milliseconds.
const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Perf Ledger configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerfLedgerConfig {
    /// Transmitter retry configuration.
    #[serde(default)]
    pub transmitter: TransmitterConfig,
    /// Statistics summarization configuration.
    #[serde(default)]
    pub summary: SummaryConfig,
    /// Record store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Metric bounds table.
    #[serde(default)]
    pub bounds: BoundsConfig,
}

impl PerfLedgerConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_str(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transmitter.validate()?;
        self.summary.validate()?;
        self.store.validate()?;
        self.audit.validate()?;
        self.bounds.validate()?;
        Ok(())
    }

    /// Builds a transmitter over the configured store and audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the store or audit sink cannot be opened.
    pub fn build_transmitter(&self) -> Result<OptimisticTransmitter, ConfigError> {
        let store = self.store.open()?;
        let audit = self.audit.build_sink()?;
        Ok(OptimisticTransmitter::new(store, self.transmitter.retry_policy())
            .with_hash_index(self.transmitter.hash_index.clone())
            .with_audit_sink(audit))
    }
}

// ============================================================================
// SECTION: Transmitter
// ============================================================================

/// Transmitter retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransmitterConfig {
    /// Maximum conditional update attempts per send.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Jitter ceiling between conflicting attempts (milliseconds).
    #[serde(default = "default_update_delay_threshold_ms")]
    pub update_delay_threshold_ms: u64,
    /// Secondary index name used for hash lookups.
    #[serde(default = "default_hash_index")]
    pub hash_index: String,
    /// Optional seed for reproducible jitter.
    #[serde(default)]
    pub jitter_seed: Option<u64>,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            update_delay_threshold_ms: default_update_delay_threshold_ms(),
            hash_index: default_hash_index(),
            jitter_seed: None,
        }
    }
}

impl TransmitterConfig {
    /// Validates transmitter configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "transmitter.max_attempts must be between 1 and {MAX_ATTEMPTS_LIMIT}"
            )));
        }
        if self.update_delay_threshold_ms > MAX_UPDATE_DELAY_THRESHOLD_MS {
            return Err(ConfigError::Invalid(format!(
                "transmitter.update_delay_threshold_ms exceeds {MAX_UPDATE_DELAY_THRESHOLD_MS}"
            )));
        }
        if self.hash_index.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "transmitter.hash_index must be non-empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the retry policy described by this section.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            update_delay_threshold: Duration::from_millis(self.update_delay_threshold_ms),
            jitter_seed: self.jitter_seed,
        }
    }
}

/// Returns the default attempt bound.
const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Returns the default jitter ceiling in milliseconds.
const fn default_update_delay_threshold_ms() -> u64 {
    DEFAULT_UPDATE_DELAY_THRESHOLD_MS
}

/// Returns the default hash index name.
fn default_hash_index() -> String {
    DEFAULT_HASH_INDEX.to_string()
}

// ============================================================================
// SECTION: Summary
// ============================================================================

/// Statistics summarization configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SummaryConfig {
    /// Total collection window in seconds.
    #[serde(default = "default_collection_window_secs")]
    pub collection_window_secs: u64,
    /// Per-metric multipliers applied before summarizing.
    #[serde(default)]
    pub metric_scale: BTreeMap<String, f64>,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            collection_window_secs: default_collection_window_secs(),
            metric_scale: BTreeMap::new(),
        }
    }
}

impl SummaryConfig {
    /// Validates summary configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.collection_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "summary.collection_window_secs must be greater than zero".to_string(),
            ));
        }
        for (metric, scale) in &self.metric_scale {
            if !scale.is_finite() || *scale <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "summary.metric_scale.{metric} must be a positive finite number"
                )));
            }
        }
        Ok(())
    }

    /// Returns the summarizer described by this section.
    #[must_use]
    pub fn summarizer(&self) -> StatisticsSummarizer {
        StatisticsSummarizer::new(self.collection_window_secs)
            .with_metric_scale(self.metric_scale.clone())
    }
}

/// Returns the default collection window in seconds.
const fn default_collection_window_secs() -> u64 {
    DEFAULT_COLLECTION_WINDOW_SECS
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Record store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid("memory store must not set path".to_string()));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite store requires path".to_string())
                })?;
                validate_path_string("store.path", &path.to_string_lossy())
            }
        }
    }

    /// Opens the configured record store.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the store cannot be opened.
    pub fn open(&self) -> Result<SharedRecordStore, ConfigError> {
        match self.store_type {
            StoreType::Memory => Ok(SharedRecordStore::from_store(InMemoryRecordStore::new())),
            StoreType::Sqlite => {
                let path = self.path.clone().ok_or_else(|| {
                    ConfigError::Invalid("sqlite store requires path".to_string())
                })?;
                let store = SqliteRecordStore::new(SqliteStoreConfig {
                    path,
                    busy_timeout_ms: self.busy_timeout_ms,
                    journal_mode: self.journal_mode,
                    sync_mode: self.sync_mode,
                })
                .map_err(|err| ConfigError::Store(err.to_string()))?;
                Ok(SharedRecordStore::from_store(store))
            }
        }
    }
}

/// Record store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory store.
    #[default]
    Memory,
    /// Use `SQLite`-backed durable store.
    Sqlite,
}

/// Returns the default busy timeout for store connections.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Sink selection.
    #[serde(default)]
    pub sink: AuditSinkType,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
            (AuditSinkType::File, Some(path)) => {
                validate_path_string("audit.path", &path.to_string_lossy())
            }
            (_, Some(_)) => {
                Err(ConfigError::Invalid("audit.path is only valid for the file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }

    /// Builds the configured audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the audit file cannot be opened.
    pub fn build_sink(&self) -> Result<SharedAuditSink, ConfigError> {
        match self.sink {
            AuditSinkType::Stderr => Ok(Arc::new(StderrAuditSink)),
            AuditSinkType::None => Ok(Arc::new(NoopAuditSink)),
            AuditSinkType::File => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("file audit sink requires path".to_string())
                })?;
                let sink = FileAuditSink::new(path).map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Arc::new(sink))
            }
        }
    }
}

/// Audit sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkType {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard audit events.
    None,
}

// ============================================================================
// SECTION: Bounds
// ============================================================================

/// Metric bounds configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoundsConfig {
    /// Fractional overshoot tolerated above each expected value.
    #[serde(default = "default_error_bound")]
    pub error_bound: f64,
    /// Expected values: rate -> plugin -> metric -> value.
    #[serde(default)]
    pub rates: BTreeMap<String, BTreeMap<String, BTreeMap<String, f64>>>,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            error_bound: default_error_bound(),
            rates: BTreeMap::new(),
        }
    }
}

impl BoundsConfig {
    /// Validates bounds configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.error_bound.is_finite() || self.error_bound < 0.0 {
            return Err(ConfigError::Invalid(
                "bounds.error_bound must be a non-negative finite number".to_string(),
            ));
        }
        for (rate, plugins) in &self.rates {
            for (plugin, metrics) in plugins {
                for (metric, value) in metrics {
                    if !value.is_finite() || *value < 0.0 {
                        return Err(ConfigError::Invalid(format!(
                            "bounds.rates.{rate}.{plugin}.{metric} must be a non-negative finite \
                             number"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns the bounds table described by this section.
    #[must_use]
    pub fn table(&self) -> MetricBoundsTable {
        MetricBoundsTable {
            error_bound: self.error_bound,
            rates: self.rates.clone(),
        }
    }
}

/// Returns the default error bound.
const fn default_error_bound() -> f64 {
    DEFAULT_ERROR_BOUND
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// Configured store could not be opened.
    #[error("config store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}
