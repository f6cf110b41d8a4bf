// crates/perf-ledger-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Record Store
// Description: Durable RecordStore backed by SQLite WAL.
// Purpose: Persist revision records with atomic conditional writes.
// Dependencies: perf-ledger-core, rusqlite, serde, thiserror, tokio
// ============================================================================

//! ## Overview
//! This module implements a durable [`RecordStore`] using `SQLite`. Each
//! record is stored as canonical JSON next to its hash; loads verify the hash
//! and fail closed on corruption. Conditional updates run inside an
//! immediate transaction that compares the stored version token before
//! writing, and the `revision_hash` column carries a unique constraint so at
//! most one record exists per hash.
//!
//! Blocking database work runs on the tokio blocking pool.
//! Security posture: database contents are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use perf_ledger_core::AttributeDelta;
use perf_ledger_core::Record;
use perf_ledger_core::RecordKey;
use perf_ledger_core::RecordStore;
use perf_ledger_core::RevisionHash;
use perf_ledger_core::StoreError;
use perf_ledger_core::VersionToken;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

use crate::snapshot::RecordSnapshot;
use crate::snapshot::SNAPSHOT_DIGEST;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum canonical record size accepted by the store.
pub const MAX_RECORD_BYTES: usize = 4 * 1024 * 1024;
/// Columns selected for every record read.
const RECORD_COLUMNS: &str =
    "year_partition, commit_date, revision_hash, version_token, record_json, record_hash, \
     hash_algorithm";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` record store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a configuration with default pragmas for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw record payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Record payload exceeded the size limit.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
    /// A conditional write precondition failed.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// The addressed record does not exist.
    #[error("sqlite store not found: {0}")]
    NotFound(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => Self::Io(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) | SqliteStoreError::Invalid(message) => {
                Self::Invalid(message)
            }
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "record_json exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed record store.
#[derive(Clone)]
pub struct SqliteRecordStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded for blocking-pool access.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Opens an `SQLite`-backed record store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Loads the record stored under `key`, verifying its integrity hash.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or the stored
    /// record is corrupt.
    pub fn load(&self, key: &RecordKey) -> Result<Option<Record>, SqliteStoreError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite mutex poisoned".to_string()))?;
        fetch_by_key(&guard, key)?.map(decode_record).transpose()
    }

    /// Runs a blocking database operation on the tokio blocking pool.
    async fn blocking<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, SqliteStoreError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = connection
                .lock()
                .map_err(|_| SqliteStoreError::Io("sqlite mutex poisoned".to_string()))?;
            operation(&mut guard)
        })
        .await
        .map_err(|err| StoreError::Io(format!("sqlite task failed: {err}")))?;
        result.map_err(StoreError::from)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn query_by_hash(
        &self,
        _index: &str,
        hash: &RevisionHash,
    ) -> Result<Vec<Record>, StoreError> {
        let hash = hash.as_str().to_string();
        self.blocking(move |connection| query_records(connection, &hash)).await
    }

    async fn put_if_absent(&self, record: &Record) -> Result<(), StoreError> {
        let record = record.clone();
        self.blocking(move |connection| insert_record(connection, &record)).await
    }

    async fn update_if_version_matches(
        &self,
        key: &RecordKey,
        delta: &AttributeDelta,
        expected: &VersionToken,
    ) -> Result<(), StoreError> {
        let key = *key;
        let delta = delta.clone();
        let expected = expected.clone();
        self.blocking(move |connection| update_record(connection, &key, &delta, &expected)).await
    }
}

// ============================================================================
// SECTION: Record Operations
// ============================================================================

/// Raw record row as stored.
#[derive(Debug)]
struct RecordRow {
    /// Stored partition key.
    year_partition: i32,
    /// Stored range key.
    commit_date: i64,
    /// Stored revision hash column.
    revision_hash: String,
    /// Stored version token column.
    version_token: String,
    /// Canonical JSON bytes.
    record_json: Vec<u8>,
    /// Stored hash of `record_json`.
    record_hash: String,
    /// Stored hash algorithm label.
    hash_algorithm: String,
}

/// Maps a selected row into a [`RecordRow`].
fn map_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        year_partition: row.get(0)?,
        commit_date: row.get(1)?,
        revision_hash: row.get(2)?,
        version_token: row.get(3)?,
        record_json: row.get(4)?,
        record_hash: row.get(5)?,
        hash_algorithm: row.get(6)?,
    })
}

/// Verifies and decodes a stored row.
fn decode_record(row: RecordRow) -> Result<Record, SqliteStoreError> {
    let record = RecordSnapshot::decode(
        &row.record_json,
        &row.hash_algorithm,
        &row.record_hash,
        &row.revision_hash,
    )?;
    let key = record.key();
    if record.revision_hash.as_str() != row.revision_hash
        || record.version_token.as_str() != row.version_token
        || key.year_partition != row.year_partition
        || key.commit_date != row.commit_date
    {
        return Err(SqliteStoreError::Corrupt(format!(
            "record columns disagree with payload for {}",
            row.revision_hash
        )));
    }
    Ok(record)
}

/// Returns every record whose revision hash equals `hash`.
fn query_records(connection: &Connection, hash: &str) -> Result<Vec<Record>, SqliteStoreError> {
    let mut statement = connection
        .prepare(&format!("SELECT {RECORD_COLUMNS} FROM records WHERE revision_hash = ?1"))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let rows = statement
        .query_map(params![hash], map_record_row)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let mut records = Vec::new();
    for row in rows {
        let row = row.map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        records.push(decode_record(row)?);
    }
    Ok(records)
}

/// Fetches the raw row stored under `key`.
fn fetch_by_key(
    connection: &Connection,
    key: &RecordKey,
) -> Result<Option<RecordRow>, SqliteStoreError> {
    connection
        .query_row(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM records WHERE year_partition = ?1 AND commit_date = \
                 ?2"
            ),
            params![key.year_partition, key.commit_date],
            map_record_row,
        )
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Inserts a record when neither its key nor its hash exists.
fn insert_record(connection: &mut Connection, record: &Record) -> Result<(), SqliteStoreError> {
    let snapshot = RecordSnapshot::encode(record)?;
    connection
        .execute(
            "INSERT INTO records (year_partition, commit_date, revision_hash, version_token, \
             record_json, record_hash, hash_algorithm, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, \
             ?6, ?7, ?8)",
            params![
                record.year_partition,
                record.commit_date,
                record.revision_hash.as_str(),
                record.version_token.as_str(),
                snapshot.json,
                snapshot.digest,
                SNAPSHOT_DIGEST,
                unix_millis()
            ],
        )
        .map_err(|err| map_write_error(&err, record.revision_hash.as_str()))?;
    Ok(())
}

/// Applies `delta` when the stored token equals `expected`.
fn update_record(
    connection: &mut Connection,
    key: &RecordKey,
    delta: &AttributeDelta,
    expected: &VersionToken,
) -> Result<(), SqliteStoreError> {
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let Some(row) = fetch_by_key(&tx, key)? else {
        return Err(SqliteStoreError::NotFound(format!(
            "no record for key {}/{}",
            key.year_partition, key.commit_date
        )));
    };
    let current = decode_record(row)?;
    if current.version_token != *expected {
        return Err(SqliteStoreError::Conflict(format!(
            "version token mismatch for key {}/{}",
            key.year_partition, key.commit_date
        )));
    }
    if let Some(hash) = &delta.revision_hash {
        let owner: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM records WHERE revision_hash = ?1 AND NOT (year_partition = ?2 AND \
                 commit_date = ?3)",
                params![hash.as_str(), key.year_partition, key.commit_date],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        if owner.is_some() {
            return Err(SqliteStoreError::Invalid(format!(
                "hash {hash} already owned by another record"
            )));
        }
    }
    let next = delta.apply_to(&current);
    let snapshot = RecordSnapshot::encode(&next)?;
    let changed = tx
        .execute(
            "UPDATE records SET revision_hash = ?1, version_token = ?2, record_json = ?3, \
             record_hash = ?4, hash_algorithm = ?5, updated_at = ?6 WHERE year_partition = ?7 AND \
             commit_date = ?8 AND version_token = ?9",
            params![
                next.revision_hash.as_str(),
                next.version_token.as_str(),
                snapshot.json,
                snapshot.digest,
                SNAPSHOT_DIGEST,
                unix_millis(),
                key.year_partition,
                key.commit_date,
                expected.as_str()
            ],
        )
        .map_err(|err| map_write_error(&err, next.revision_hash.as_str()))?;
    if changed != 1 {
        return Err(SqliteStoreError::Conflict(format!(
            "version token changed for key {}/{}",
            key.year_partition, key.commit_date
        )));
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))
}

/// Maps write failures, treating constraint violations as conflicts.
fn map_write_error(err: &rusqlite::Error, revision_hash: &str) -> SqliteStoreError {
    if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
        return SqliteStoreError::Conflict(format!("record exists for hash {revision_hash}"));
    }
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    if path
        .components()
        .any(|component| component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH)
    {
        return Err(SqliteStoreError::Invalid(
            "store path contains an overlong component".to_string(),
        ));
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(connection)
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS records (
                    year_partition INTEGER NOT NULL,
                    commit_date INTEGER NOT NULL,
                    revision_hash TEXT NOT NULL,
                    version_token TEXT NOT NULL,
                    record_json BLOB NOT NULL,
                    record_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (year_partition, commit_date)
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_records_revision_hash
                    ON records (revision_hash);",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
