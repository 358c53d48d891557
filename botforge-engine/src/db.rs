use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

pub async fn create_pool(database_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(database_path)
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
}

/// In-memory pool for tests
///
/// A single connection, since each in-memory SQLite connection is its own
/// database.
#[cfg(test)]
pub async fn create_test_pool() -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Create build jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS build_jobs (
            id TEXT PRIMARY KEY,
            chatbot_id TEXT NOT NULL,
            template TEXT NOT NULL,
            config TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL,
            image_tag TEXT,
            container_id TEXT,
            deployment_endpoint TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            worker_id TEXT,
            error_stage TEXT,
            error_kind TEXT,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create build logs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS build_logs (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL REFERENCES build_jobs(id) ON DELETE CASCADE,
            timestamp TEXT NOT NULL,
            level TEXT NOT NULL,
            message TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_build_jobs_status ON build_jobs(status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_build_jobs_chatbot_id ON build_jobs(chatbot_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_build_jobs_created_at ON build_jobs(created_at DESC)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_build_logs_job_id ON build_logs(job_id, seq)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
