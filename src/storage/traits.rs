//! Storage traits and error types
//!
//! This module defines the trait interface for the persistence gateway and
//! associated error types.

use crate::storage::value::{Flag, Predicate, Record, Table};
use crate::storage::{RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Unknown column {column} in table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("Row for table {table} has no primary key")]
    MissingPrimaryKey { table: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result of an idempotent upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// True when no row with this id existed before
    pub created: bool,
}

/// Trait for persistence gateway implementations
///
/// The gateway exclusively owns the transaction boundary. Writes open a
/// transaction lazily; nothing is durable until [`Storage::commit`] returns,
/// and dropping the gateway discards uncommitted work.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new worker run
    ///
    /// # Arguments
    ///
    /// * `stage` - Resource class the run processes
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, stage: &str, config_hash: &str) -> StorageResult<i64>;

    /// Finalizes a run with its status and a finish timestamp
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    // ===== Rows =====

    /// Picks one row matching `predicate`, uniformly at random
    ///
    /// # Returns
    ///
    /// * `Ok(Some(record))` - A row with the requested columns
    /// * `Ok(None)` - No eligible rows remain
    fn select_random_row(
        &self,
        table: Table,
        columns: &[&str],
        predicate: &Predicate,
    ) -> StorageResult<Option<Record>>;

    /// Checks whether a row with `id` exists
    fn row_exists(&self, table: Table, id: i64) -> StorageResult<bool>;

    /// Inserts or fully replaces a row by primary key
    ///
    /// Columns missing from `record` are written as their sentinel, so a
    /// re-encounter never leaves stale fields behind. Flag columns keep their
    /// stored value on conflict.
    fn upsert_row(&mut self, table: Table, record: &Record) -> StorageResult<UpsertOutcome>;

    /// Overwrites only the columns present in `record` on the row with `id`
    ///
    /// # Returns
    ///
    /// The number of rows updated (0 when no such row exists)
    fn update_columns(&mut self, table: Table, id: i64, record: &Record) -> StorageResult<usize>;

    /// Sets a completion flag on every row matching `predicate`
    ///
    /// # Returns
    ///
    /// The number of rows updated
    fn update_flag(
        &mut self,
        table: Table,
        flag: Flag,
        value: bool,
        predicate: &Predicate,
    ) -> StorageResult<usize>;

    /// Counts rows matching `predicate`
    fn count_rows(&self, table: Table, predicate: &Predicate) -> StorageResult<u64>;

    // ===== Transactions =====

    /// Makes all pending writes durable
    fn commit(&mut self) -> StorageResult<()>;

    /// Discards all pending writes
    fn rollback(&mut self) -> StorageResult<()>;
}
