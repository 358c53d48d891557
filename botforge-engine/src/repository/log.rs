//! Build log repository
//!
//! Handles all database operations related to build job logs. Lines are
//! append-only with a monotonic `seq`, which doubles as the offset cursor
//! for incremental polling.

use botforge_core::domain::log::{LogEntry, LogLevel};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Append a single log line for a job
pub async fn append(
    pool: &SqlitePool,
    job_id: Uuid,
    level: LogLevel,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO build_logs (job_id, timestamp, level, message)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(job_id.to_string())
    .bind(chrono::Utc::now())
    .bind(level_to_string(level))
    .bind(message)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get log entries appended since `offset`, oldest first
pub async fn find_since(
    pool: &SqlitePool,
    job_id: Uuid,
    offset: i64,
) -> Result<Vec<LogEntry>, sqlx::Error> {
    let rows = sqlx::query_as::<_, LogRow>(
        r#"
        SELECT seq, timestamp, level, message
        FROM build_logs
        WHERE job_id = $1 AND seq > $2
        ORDER BY seq ASC
        "#,
    )
    .bind(job_id.to_string())
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Delete all logs for a job
pub async fn delete_by_job(pool: &SqlitePool, job_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM build_logs WHERE job_id = $1")
        .bind(job_id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Get log count for a job
pub async fn count_by_job(pool: &SqlitePool, job_id: Uuid) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM build_logs WHERE job_id = $1")
        .bind(job_id.to_string())
        .fetch_one(pool)
        .await?;

    Ok(row.0)
}

// =============================================================================
// Helper Functions
// =============================================================================

fn level_to_string(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Debug => "Debug",
        LogLevel::Info => "Info",
        LogLevel::Warning => "Warning",
        LogLevel::Error => "Error",
    }
}

fn string_to_level(s: &str) -> LogLevel {
    match s {
        "Debug" => LogLevel::Debug,
        "Info" => LogLevel::Info,
        "Warning" => LogLevel::Warning,
        "Error" => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct LogRow {
    seq: i64,
    timestamp: chrono::DateTime<chrono::Utc>,
    level: String,
    message: String,
}

impl From<LogRow> for LogEntry {
    fn from(row: LogRow) -> Self {
        LogEntry {
            seq: row.seq,
            timestamp: row.timestamp,
            level: string_to_level(&row.level),
            message: row.message,
        }
    }
}
