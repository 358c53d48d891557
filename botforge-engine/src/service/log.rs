//! Log service
//!
//! Incremental log retrieval for build jobs.

use botforge_core::dto::build::LogChunk;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::repository::{job_repository, log_repository};

/// Service error type
#[derive(Debug)]
pub enum LogServiceError {
    JobNotFound(Uuid),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for LogServiceError {
    fn from(err: sqlx::Error) -> Self {
        LogServiceError::DatabaseError(err)
    }
}

/// Log content appended since `offset`, plus the offset for the next poll
///
/// An unchanged offset with no entries means nothing new was written; clients
/// poll with the returned `next_offset` until the job is terminal.
pub async fn get_log_chunk(
    pool: &SqlitePool,
    job_id: Uuid,
    offset: i64,
) -> Result<LogChunk, LogServiceError> {
    if job_repository::find_by_id(pool, job_id).await?.is_none() {
        return Err(LogServiceError::JobNotFound(job_id));
    }

    let entries = log_repository::find_since(pool, job_id, offset).await?;
    let next_offset = entries.last().map(|e| e.seq).unwrap_or(offset);

    Ok(LogChunk {
        entries,
        next_offset,
    })
}
