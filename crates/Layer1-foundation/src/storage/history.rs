//! Execution history
//!
//! 도구 실행 기록 (append-only). SQLite 또는 메모리에 저장한다.

use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One finished tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Option<i64>,
    pub tool_id: String,
    pub args: Value,
    pub success: bool,
    pub output: Option<Value>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn success(tool_id: impl Into<String>, args: Value, output: Value, duration_ms: u64) -> Self {
        Self {
            id: None,
            tool_id: tool_id.into(),
            args,
            success: true,
            output: Some(output),
            error_kind: None,
            error_message: None,
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(tool_id: impl Into<String>, args: Value, error: &Error, duration_ms: u64) -> Self {
        Self {
            id: None,
            tool_id: tool_id.into(),
            args,
            success: false,
            output: None,
            error_kind: Some(error.kind().to_string()),
            error_message: Some(error.to_string()),
            duration_ms,
            timestamp: Utc::now(),
        }
    }
}

/// 실행 기록 sink
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn record(&self, record: ExecutionRecord) -> Result<()>;
}

// ============================================================================
// SQLite
// ============================================================================

/// SQLite-backed history
#[derive(Clone)]
pub struct SqliteHistory {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistory {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .map_err(|e| Error::Storage(format!("Failed to create data directory: {}", e)))?;

        let db_path = data_dir.join("history.db");
        let conn = Connection::open(&db_path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| Error::Storage(format!("Failed to set pragmas: {}", e)))?;

        Self::from_connection(conn)
    }

    /// Create an in-memory history (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to create in-memory database: {}", e)))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tool_executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tool_id TEXT NOT NULL,
                args_json TEXT NOT NULL,
                success INTEGER NOT NULL,
                output_json TEXT,
                error_kind TEXT,
                error_message TEXT,
                duration_ms INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tool_executions_tool
                ON tool_executions(tool_id, created_at);
            "#,
        )
        .map_err(|e| Error::Storage(format!("Failed to initialize schema: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn insert(&self, record: &ExecutionRecord) -> Result<i64> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))?;

        let output = record.output.as_ref().map(|v| v.to_string());
        conn.execute(
            r#"
            INSERT INTO tool_executions (tool_id, args_json, success, output_json,
                                         error_kind, error_message, duration_ms, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.tool_id,
                record.args.to_string(),
                record.success,
                output,
                record.error_kind,
                record.error_message,
                record.duration_ms as i64,
                record.timestamp.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Storage(format!("Failed to record tool execution: {}", e)))?;

        Ok(conn.last_insert_rowid())
    }

    /// Most recent first
    pub fn recent(&self, limit: u32) -> Result<Vec<ExecutionRecord>> {
        self.query("1 = 1", limit)
    }

    pub fn failures(&self, limit: u32) -> Result<Vec<ExecutionRecord>> {
        self.query("success = 0", limit)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))?;
        Ok(conn.query_row("SELECT COUNT(*) FROM tool_executions", [], |row| row.get(0))?)
    }

    fn query(&self, filter: &str, limit: u32) -> Result<Vec<ExecutionRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))?;

        let sql = format!(
            r#"
            SELECT id, tool_id, args_json, success, output_json, error_kind,
                   error_message, duration_ms, created_at
            FROM tool_executions
            WHERE {}
            ORDER BY id DESC
            LIMIT ?1
            "#,
            filter
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Storage(format!("Failed to prepare query: {}", e)))?;

        let records = stmt
            .query_map(params![limit], |row| {
                let args: String = row.get(2)?;
                let output: Option<String> = row.get(4)?;
                let created_at: String = row.get(8)?;
                let duration: i64 = row.get(7)?;
                Ok(ExecutionRecord {
                    id: row.get(0)?,
                    tool_id: row.get(1)?,
                    args: serde_json::from_str(&args).unwrap_or(Value::Null),
                    success: row.get(3)?,
                    output: output.and_then(|o| serde_json::from_str(&o).ok()),
                    error_kind: row.get(5)?,
                    error_message: row.get(6)?,
                    duration_ms: duration.max(0) as u64,
                    timestamp: DateTime::parse_from_rfc3339(&created_at)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                })
            })
            .map_err(|e| Error::Storage(format!("Failed to query tool executions: {}", e)))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }
}

#[async_trait]
impl HistorySink for SqliteHistory {
    async fn record(&self, record: ExecutionRecord) -> Result<()> {
        let id = self.insert(&record)?;
        debug!(tool_id = %record.tool_id, id, "Recorded tool execution");
        Ok(())
    }
}

// ============================================================================
// Memory
// ============================================================================

/// In-memory history
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: Mutex<Vec<ExecutionRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HistorySink for MemoryHistory {
    async fn record(&self, record: ExecutionRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| Error::Internal("Lock poisoned".to_string()))?;
        records.push(record);
        Ok(())
    }
}
