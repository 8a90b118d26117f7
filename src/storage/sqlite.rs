//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult, UpsertOutcome};
use crate::storage::value::{ColumnKind, FieldValue, Flag, Predicate, Record, Table};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Declared column of a table
#[derive(Debug, Clone)]
struct ColumnInfo {
    name: String,
    kind: ColumnKind,
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
    columns: HashMap<Table, Vec<ColumnInfo>>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `lock_timeout` - How long to wait on a lock held by another worker
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path, lock_timeout: Duration) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(lock_timeout)?;

        // Several stage workers share the file
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        Self::from_connection(conn)
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        initialize_schema(&conn)?;
        let mut columns = HashMap::new();
        for table in Table::all() {
            columns.insert(table, load_columns(&conn, table)?);
        }
        Ok(Self { conn, columns })
    }

    fn table_columns(&self, table: Table) -> &[ColumnInfo] {
        self.columns.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    fn check_column(&self, table: Table, column: &str) -> StorageResult<()> {
        if self.table_columns(table).iter().any(|c| c.name == column) {
            Ok(())
        } else {
            Err(StorageError::UnknownColumn {
                table: table.name().to_string(),
                column: column.to_string(),
            })
        }
    }

    fn check_predicate(&self, table: Table, predicate: &Predicate) -> StorageResult<()> {
        for condition in predicate.conditions() {
            self.check_column(table, condition.column())?;
        }
        Ok(())
    }

    /// Opens a write transaction unless one is already pending
    fn begin_if_needed(&self) -> StorageResult<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
        }
        Ok(())
    }

    /// Returns true while writes are pending
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }
}

fn load_columns(conn: &Connection, table: Table) -> StorageResult<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table.name()))?;
    let columns = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let declared: String = row.get(2)?;
            Ok(ColumnInfo {
                name,
                kind: ColumnKind::from_declared_type(&declared),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn map_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        stage: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Running),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, stage: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (stage, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![stage, now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, stage, started_at, finished_at, config_hash, status
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                map_run,
            )
            .optional()?;
        Ok(run)
    }

    // ===== Rows =====

    fn select_random_row(
        &self,
        table: Table,
        columns: &[&str],
        predicate: &Predicate,
    ) -> StorageResult<Option<Record>> {
        for column in columns {
            self.check_column(table, column)?;
        }
        self.check_predicate(table, predicate)?;

        let (clause, values) = predicate.to_sql();
        let sql = format!(
            "SELECT {} FROM {}{} ORDER BY RANDOM() LIMIT 1",
            columns.join(", "),
            table.name(),
            clause
        );

        let record = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| {
                let mut record = Record::new();
                for (i, column) in columns.iter().enumerate() {
                    record.set(column, FieldValue::from_sql_ref(row.get_ref(i)?));
                }
                Ok(record)
            })
            .optional()?;
        Ok(record)
    }

    fn row_exists(&self, table: Table, id: i64) -> StorageResult<bool> {
        let exists: bool = self.conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table.name()),
            params![id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn upsert_row(&mut self, table: Table, record: &Record) -> StorageResult<UpsertOutcome> {
        let id = record.id().ok_or_else(|| StorageError::MissingPrimaryKey {
            table: table.name().to_string(),
        })?;

        if let Some(unknown) = record
            .columns()
            .find(|c| !self.table_columns(table).iter().any(|info| info.name == *c))
        {
            let err = StorageError::UnknownColumn {
                table: table.name().to_string(),
                column: unknown.to_string(),
            };
            tracing::error!(table = %table, id, values = ?record, "Upsert rejected: {}", err);
            return Err(err);
        }

        let mut names = Vec::new();
        let mut values = Vec::new();
        let mut updates = Vec::new();
        for info in self.table_columns(table) {
            let is_flag = Flag::is_flag_column(&info.name);
            if is_flag && !record.contains(&info.name) {
                continue;
            }
            let value = record
                .get(&info.name)
                .cloned()
                .unwrap_or(FieldValue::Null)
                .coerce_for(info.kind);
            names.push(info.name.as_str());
            values.push(value);
            if info.name != "id" && !is_flag {
                updates.push(format!("{0} = excluded.{0}", info.name));
            }
        }

        let conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT(id) {}",
            table.name(),
            names.join(", "),
            vec!["?"; names.len()].join(", "),
            conflict
        );

        let existed = self.row_exists(table, id)?;
        self.begin_if_needed()?;
        if let Err(e) = self.conn.execute(&sql, params_from_iter(values.iter())) {
            tracing::error!(query = %sql, values = ?values, "Upsert failed: {}", e);
            return Err(e.into());
        }

        Ok(UpsertOutcome { created: !existed })
    }

    fn update_columns(&mut self, table: Table, id: i64, record: &Record) -> StorageResult<usize> {
        let mut assignments = Vec::new();
        let mut values = Vec::new();
        for (column, value) in record.iter().filter(|(column, _)| *column != "id") {
            let info = self
                .table_columns(table)
                .iter()
                .find(|info| info.name == column)
                .ok_or_else(|| StorageError::UnknownColumn {
                    table: table.name().to_string(),
                    column: column.to_string(),
                })?;
            assignments.push(format!("{} = ?", column));
            values.push(value.clone().coerce_for(info.kind));
        }
        if assignments.is_empty() {
            return Ok(0);
        }

        values.push(FieldValue::Integer(id));
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            table.name(),
            assignments.join(", ")
        );

        self.begin_if_needed()?;
        match self.conn.execute(&sql, params_from_iter(values.iter())) {
            Ok(updated) => Ok(updated),
            Err(e) => {
                tracing::error!(query = %sql, values = ?values, "Update failed: {}", e);
                Err(e.into())
            }
        }
    }

    fn update_flag(
        &mut self,
        table: Table,
        flag: Flag,
        value: bool,
        predicate: &Predicate,
    ) -> StorageResult<usize> {
        self.check_column(table, flag.column())?;
        self.check_predicate(table, predicate)?;

        let (clause, mut values) = predicate.to_sql();
        values.insert(0, FieldValue::Bool(value));
        let sql = format!("UPDATE {} SET {} = ?{}", table.name(), flag.column(), clause);

        self.begin_if_needed()?;
        let updated = self.conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(updated)
    }

    fn count_rows(&self, table: Table, predicate: &Predicate) -> StorageResult<u64> {
        self.check_predicate(table, predicate)?;
        let (clause, values) = predicate.to_sql();
        let sql = format!("SELECT COUNT(*) FROM {}{}", table.name(), clause);
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Transactions =====

    fn commit(&mut self) -> StorageResult<()> {
        if self.in_transaction() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}
