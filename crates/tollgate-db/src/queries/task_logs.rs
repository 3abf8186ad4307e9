//! Scheduled task log query functions.
//!
//! Logs are append-only: one row per completed sweep run, never updated.

use rusqlite::Connection;

use tollgate_types::task::{TaskLog, TaskStatus};

use crate::{DbError, Result};

/// Append a completed run record.
pub fn insert(conn: &Connection, log: &TaskLog) -> Result<()> {
    let detail = serde_json::to_string(&log.detail)
        .map_err(|e| DbError::Serialization(e.to_string()))?;
    conn.execute(
        "INSERT INTO scheduled_task_logs (
            task_name, status, started_at, completed_at, duration_ms,
            checked_count, affected_count, detail
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            log.task_name,
            log.status.as_str(),
            log.started_at as i64,
            log.completed_at as i64,
            log.duration_ms as i64,
            log.checked_count as i64,
            log.affected_count as i64,
            detail,
        ],
    )?;
    Ok(())
}

/// Most recent runs of one task, newest first.
pub fn recent(conn: &Connection, task_name: &str, limit: u32) -> Result<Vec<TaskLog>> {
    let mut stmt = conn.prepare(
        "SELECT task_name, status, started_at, completed_at, duration_ms,
                checked_count, affected_count, detail
         FROM scheduled_task_logs
         WHERE task_name = ?1
         ORDER BY started_at DESC, id DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![task_name, limit], |row| {
            let status_str: String = row.get(1)?;
            let status = TaskStatus::from_str(&status_str).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    rusqlite::types::Type::Text,
                    format!("unknown task status: {status_str}").into(),
                )
            })?;
            let detail_str: Option<String> = row.get(7)?;
            let detail = detail_str
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or(serde_json::Value::Null);
            Ok(TaskLog {
                task_name: row.get(0)?,
                status,
                started_at: row.get::<_, i64>(2)? as u64,
                completed_at: row.get::<_, i64>(3)? as u64,
                duration_ms: row.get::<_, i64>(4)? as u64,
                checked_count: row.get::<_, i64>(5)? as u64,
                affected_count: row.get::<_, i64>(6)? as u64,
                detail,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
