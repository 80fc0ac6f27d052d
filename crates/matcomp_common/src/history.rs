//! Comparison history.
//!
//! SQLite-backed store of saved comparison results. Records are immutable:
//! changing a note deletes the record and recreates it under a new id.
//! Location: `[history] db_path`, else ~/.local/share/matcomp/history.db

use crate::comparison::ComparisonResult;
use crate::error::HistoryError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

pub const SCHEMA_VERSION: u32 = 1;

/// A saved comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    pub task_ids: Vec<String>,
    pub target_columns: Vec<String>,
    pub tolerance: f64,
    pub comparison_results: ComparisonResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What a caller submits to create a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHistoryRecord {
    pub task_ids: Vec<String>,
    pub target_columns: Vec<String>,
    pub tolerance: f64,
    pub comparison_results: ComparisonResult,
    #[serde(default)]
    pub note: Option<String>,
}

impl NewHistoryRecord {
    /// Record a result under the request parameters it carries.
    pub fn from_result(result: ComparisonResult, note: Option<String>) -> Self {
        Self {
            task_ids: result.task_ids.clone(),
            target_columns: result.target_columns.clone(),
            tolerance: result.tolerance,
            comparison_results: result,
            note,
        }
    }
}

/// Listing entry without the full result payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub id: String,
    pub task_ids: Vec<String>,
    pub target_columns: Vec<String>,
    pub tolerance: f64,
    pub total_samples: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// History store backed by SQLite
pub struct HistoryStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl HistoryStore {
    /// Open or create the store at a specific path
    pub fn open(path: &Path) -> Result<Self, HistoryError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };
        store.init_schema()?;
        info!("History store opened at {}", path.display());
        Ok(store)
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self, HistoryError> {
        let store = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            db_path: PathBuf::from(":memory:"),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Default database path under the user data directory
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join("matcomp")
            .join("history.db")
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, HistoryError> {
        self.conn.lock().map_err(|_| HistoryError::LockPoisoned)
    }

    fn init_schema(&self) -> Result<(), HistoryError> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS comparison_history (
                id TEXT PRIMARY KEY,
                task_ids TEXT NOT NULL,
                target_columns TEXT NOT NULL,
                tolerance REAL NOT NULL,
                comparison_results TEXT NOT NULL,
                total_samples INTEGER NOT NULL,
                note TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS schema_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('version', ?)",
            params![SCHEMA_VERSION.to_string()],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_history_created_at ON comparison_history(created_at)",
            [],
        )?;

        Ok(())
    }

    /// Persist a new record under a fresh id
    pub fn save(&self, new: NewHistoryRecord) -> Result<HistoryRecord, HistoryError> {
        let record = HistoryRecord {
            id: Uuid::new_v4().to_string(),
            task_ids: new.task_ids,
            target_columns: new.target_columns,
            tolerance: new.tolerance,
            comparison_results: new.comparison_results,
            note: new.note,
            created_at: Utc::now(),
        };

        let conn = self.lock()?;
        insert_record(&conn, &record)?;
        info!("Saved comparison {} ({} tasks)", record.id, record.task_ids.len());
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<Option<HistoryRecord>, HistoryError> {
        let conn = self.lock()?;
        select_record(&conn, id)
    }

    /// Newest first
    pub fn list(&self, limit: usize) -> Result<Vec<HistorySummary>, HistoryError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, task_ids, target_columns, tolerance, total_samples, note, created_at
            FROM comparison_history
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, task_ids, target_columns, tolerance, total_samples, note, created_at) = row?;
            summaries.push(HistorySummary {
                id,
                task_ids: serde_json::from_str(&task_ids)?,
                target_columns: serde_json::from_str(&target_columns)?,
                tolerance,
                total_samples: total_samples.max(0) as usize,
                note,
                created_at: parse_timestamp(&created_at),
            });
        }
        Ok(summaries)
    }

    /// Returns whether a record was removed
    pub fn delete(&self, id: &str) -> Result<bool, HistoryError> {
        let conn = self.lock()?;
        let count = conn.execute("DELETE FROM comparison_history WHERE id = ?", params![id])?;
        if count > 0 {
            info!("Deleted comparison {}", id);
        }
        Ok(count > 0)
    }

    /// Replace a record's note by deleting it and recreating it under a new
    /// id, in one transaction.
    pub fn update_note(&self, id: &str, note: Option<String>) -> Result<HistoryRecord, HistoryError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let existing = select_record(&tx, id)?.ok_or_else(|| HistoryError::NotFound(id.to_string()))?;
        tx.execute("DELETE FROM comparison_history WHERE id = ?", params![id])?;

        let replacement = HistoryRecord {
            id: Uuid::new_v4().to_string(),
            note,
            created_at: Utc::now(),
            ..existing
        };
        insert_record(&tx, &replacement)?;
        tx.commit()?;

        info!("Recreated comparison {} as {}", id, replacement.id);
        Ok(replacement)
    }

    pub fn count(&self) -> Result<usize, HistoryError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM comparison_history", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

fn insert_record(conn: &Connection, record: &HistoryRecord) -> Result<(), HistoryError> {
    conn.execute(
        r#"
        INSERT INTO comparison_history
            (id, task_ids, target_columns, tolerance, comparison_results, total_samples, note, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            &record.id,
            serde_json::to_string(&record.task_ids)?,
            serde_json::to_string(&record.target_columns)?,
            record.tolerance,
            serde_json::to_string(&record.comparison_results)?,
            record.comparison_results.total_samples as i64,
            &record.note,
            record.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn select_record(conn: &Connection, id: &str) -> Result<Option<HistoryRecord>, HistoryError> {
    let raw = conn
        .query_row(
            r#"
            SELECT id, task_ids, target_columns, tolerance, comparison_results, note, created_at
            FROM comparison_history WHERE id = ?
            "#,
            params![id],
            RawRecord::from_row,
        )
        .optional()?;

    raw.map(RawRecord::decode).transpose()
}

struct RawRecord {
    id: String,
    task_ids: String,
    target_columns: String,
    tolerance: f64,
    comparison_results: String,
    note: Option<String>,
    created_at: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            task_ids: row.get(1)?,
            target_columns: row.get(2)?,
            tolerance: row.get(3)?,
            comparison_results: row.get(4)?,
            note: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn decode(self) -> Result<HistoryRecord, HistoryError> {
        Ok(HistoryRecord {
            id: self.id,
            task_ids: serde_json::from_str(&self.task_ids)?,
            target_columns: serde_json::from_str(&self.target_columns)?,
            tolerance: self.tolerance,
            comparison_results: serde_json::from_str(&self.comparison_results)?,
            note: self.note,
            created_at: parse_timestamp(&self.created_at),
        })
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}
