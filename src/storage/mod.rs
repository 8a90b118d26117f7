//! Storage module: the persistence gateway
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Idempotent upserts with sentinel coercion for absent fields
//! - Random selection of eligible rows and flag updates
//! - Run tracking

mod schema;
mod sqlite;
mod traits;
mod value;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult, UpsertOutcome};
pub use value::{
    ColumnKind, Condition, FieldValue, Flag, Predicate, Record, Table, NUMERIC_SENTINEL,
    TEXT_SENTINEL,
};

use std::path::Path;
use std::time::Duration;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
/// * `lock_timeout` - Lock wait for writers shared with other workers
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path, lock_timeout: Duration) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path, lock_timeout)
}

/// Represents a worker run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub stage: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a worker run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
