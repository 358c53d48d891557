//! Build job repository
//!
//! Handles all database operations related to build jobs. Every state
//! transition is its own committed UPDATE guarded by the expected current
//! status, so a crash between transitions leaves the last-committed state
//! intact and no illegal edge is ever persisted.

use botforge_core::domain::job::{BuildError, BuildErrorKind, BuildJob, BuildStage, BuildStatus};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Create a new job in Queued state
pub async fn create(
    pool: &SqlitePool,
    chatbot_id: Uuid,
    template: &str,
    config: &std::collections::HashMap<String, serde_json::Value>,
) -> Result<BuildJob, sqlx::Error> {
    let id = Uuid::new_v4();
    let now = chrono::Utc::now();

    let job = BuildJob {
        id,
        chatbot_id,
        template: template.to_string(),
        config: config.clone(),
        status: BuildStatus::Queued,
        image_tag: None,
        container_id: None,
        deployment_endpoint: None,
        created_at: now,
        started_at: None,
        completed_at: None,
        worker_id: None,
        error: None,
    };

    let config_json = serde_json::to_string(config).unwrap_or_else(|_| "{}".to_string());

    sqlx::query(
        r#"
        INSERT INTO build_jobs (id, chatbot_id, template, config, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id.to_string())
    .bind(chatbot_id.to_string())
    .bind(template)
    .bind(config_json)
    .bind("Queued")
    .bind(now)
    .execute(pool)
    .await?;

    Ok(job)
}

/// Find a job by ID
pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<BuildJob>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, chatbot_id, template, config, status, image_tag, container_id,
               deployment_endpoint, created_at, started_at, completed_at,
               worker_id, error_stage, error_kind, error_message
        FROM build_jobs
        WHERE id = $1
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Find jobs for a chatbot, newest first
pub async fn find_by_chatbot(
    pool: &SqlitePool,
    chatbot_id: Uuid,
) -> Result<Vec<BuildJob>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, chatbot_id, template, config, status, image_tag, container_id,
               deployment_endpoint, created_at, started_at, completed_at,
               worker_id, error_stage, error_kind, error_message
        FROM build_jobs
        WHERE chatbot_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(chatbot_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Find jobs by status, oldest first (FIFO dispatch order)
pub async fn find_by_status(
    pool: &SqlitePool,
    status: BuildStatus,
) -> Result<Vec<BuildJob>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, chatbot_id, template, config, status, image_tag, container_id,
               deployment_endpoint, created_at, started_at, completed_at,
               worker_id, error_stage, error_kind, error_message
        FROM build_jobs
        WHERE status = $1
        ORDER BY created_at ASC
        "#,
    )
    .bind(status_to_string(status))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// List all jobs, newest first
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<BuildJob>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, chatbot_id, template, config, status, image_tag, container_id,
               deployment_endpoint, created_at, started_at, completed_at,
               worker_id, error_stage, error_kind, error_message
        FROM build_jobs
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Chatbot IDs with a non-terminal job; used to rebuild the in-flight set
/// after a restart
pub async fn find_active_chatbots(pool: &SqlitePool) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT chatbot_id FROM build_jobs
        WHERE status IN ('Queued', 'Building', 'Testing', 'Deploying')
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(s,)| Uuid::parse_str(&s).ok())
        .collect())
}

/// True if the chatbot already has a non-terminal job
pub async fn has_active_job(pool: &SqlitePool, chatbot_id: Uuid) -> Result<bool, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM build_jobs
        WHERE chatbot_id = $1
          AND status IN ('Queued', 'Building', 'Testing', 'Deploying')
        "#,
    )
    .bind(chatbot_id.to_string())
    .fetch_one(pool)
    .await?;

    Ok(row.0 > 0)
}

// =============================================================================
// State Transitions
//
// Each returns whether the transition was committed; false means the job was
// not in the expected state (already cancelled, already terminal, ...).
// =============================================================================

/// Queued -> Building: worker claims the job
pub async fn claim_for_building(
    pool: &SqlitePool,
    job_id: Uuid,
    worker_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE build_jobs
        SET status = 'Building', started_at = $1, worker_id = $2
        WHERE id = $3 AND status = 'Queued'
        "#,
    )
    .bind(chrono::Utc::now())
    .bind(worker_id)
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Building -> Testing: image build succeeded
pub async fn transition_to_testing(
    pool: &SqlitePool,
    job_id: Uuid,
    image_tag: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE build_jobs
        SET status = 'Testing', image_tag = $1
        WHERE id = $2 AND status = 'Building'
        "#,
    )
    .bind(image_tag)
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Testing -> Deploying: health check passed
pub async fn transition_to_deploying(
    pool: &SqlitePool,
    job_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE build_jobs
        SET status = 'Deploying'
        WHERE id = $1 AND status = 'Testing'
        "#,
    )
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Deploying -> Deployed: deployment succeeded
pub async fn transition_to_deployed(
    pool: &SqlitePool,
    job_id: Uuid,
    container_id: &str,
    endpoint: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE build_jobs
        SET status = 'Deployed', container_id = $1, deployment_endpoint = $2,
            completed_at = $3
        WHERE id = $4 AND status = 'Deploying'
        "#,
    )
    .bind(container_id)
    .bind(endpoint)
    .bind(chrono::Utc::now())
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Any non-terminal -> Failed, recording the structured error
pub async fn transition_to_failed(
    pool: &SqlitePool,
    job_id: Uuid,
    error: &BuildError,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE build_jobs
        SET status = 'Failed', completed_at = $1,
            error_stage = $2, error_kind = $3, error_message = $4
        WHERE id = $5 AND status IN ('Queued', 'Building', 'Testing', 'Deploying')
        "#,
    )
    .bind(chrono::Utc::now())
    .bind(stage_to_string(error.stage))
    .bind(kind_to_string(error.kind))
    .bind(&error.message)
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Any non-terminal -> Cancelled
pub async fn transition_to_cancelled(
    pool: &SqlitePool,
    job_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE build_jobs
        SET status = 'Cancelled', completed_at = $1
        WHERE id = $2 AND status IN ('Queued', 'Building', 'Testing', 'Deploying')
        "#,
    )
    .bind(chrono::Utc::now())
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Queued -> Cancelled, refusing once a worker has claimed the job
///
/// The immediate-cancel path must not steal a job from its owning worker;
/// a refusal here means the caller falls back to cooperative cancellation.
pub async fn cancel_if_queued(pool: &SqlitePool, job_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE build_jobs
        SET status = 'Cancelled', completed_at = $1
        WHERE id = $2 AND status = 'Queued'
        "#,
    )
    .bind(chrono::Utc::now())
    .bind(job_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Helper Functions
// =============================================================================

fn status_to_string(status: BuildStatus) -> &'static str {
    match status {
        BuildStatus::Queued => "Queued",
        BuildStatus::Building => "Building",
        BuildStatus::Testing => "Testing",
        BuildStatus::Deploying => "Deploying",
        BuildStatus::Deployed => "Deployed",
        BuildStatus::Failed => "Failed",
        BuildStatus::Cancelled => "Cancelled",
    }
}

fn string_to_status(s: &str) -> BuildStatus {
    match s {
        "Queued" => BuildStatus::Queued,
        "Building" => BuildStatus::Building,
        "Testing" => BuildStatus::Testing,
        "Deploying" => BuildStatus::Deploying,
        "Deployed" => BuildStatus::Deployed,
        "Failed" => BuildStatus::Failed,
        "Cancelled" => BuildStatus::Cancelled,
        _ => BuildStatus::Queued,
    }
}

fn stage_to_string(stage: BuildStage) -> &'static str {
    match stage {
        BuildStage::Render => "Render",
        BuildStage::Build => "Build",
        BuildStage::Test => "Test",
        BuildStage::Deploy => "Deploy",
    }
}

fn string_to_stage(s: &str) -> BuildStage {
    match s {
        "Render" => BuildStage::Render,
        "Build" => BuildStage::Build,
        "Test" => BuildStage::Test,
        "Deploy" => BuildStage::Deploy,
        _ => BuildStage::Build,
    }
}

fn kind_to_string(kind: BuildErrorKind) -> &'static str {
    match kind {
        BuildErrorKind::Input => "Input",
        BuildErrorKind::Build => "Build",
        BuildErrorKind::Validation => "Validation",
        BuildErrorKind::Deployment => "Deployment",
        BuildErrorKind::Timeout => "Timeout",
        BuildErrorKind::Infrastructure => "Infrastructure",
    }
}

fn string_to_kind(s: &str) -> BuildErrorKind {
    match s {
        "Input" => BuildErrorKind::Input,
        "Build" => BuildErrorKind::Build,
        "Validation" => BuildErrorKind::Validation,
        "Deployment" => BuildErrorKind::Deployment,
        "Timeout" => BuildErrorKind::Timeout,
        "Infrastructure" => BuildErrorKind::Infrastructure,
        _ => BuildErrorKind::Build,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    chatbot_id: String,
    template: String,
    config: String,
    status: String,
    image_tag: Option<String>,
    container_id: Option<String>,
    deployment_endpoint: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    worker_id: Option<String>,
    error_stage: Option<String>,
    error_kind: Option<String>,
    error_message: Option<String>,
}

impl From<JobRow> for BuildJob {
    fn from(row: JobRow) -> Self {
        let error = match (row.error_stage, row.error_kind, row.error_message) {
            (Some(stage), Some(kind), Some(message)) => Some(BuildError {
                stage: string_to_stage(&stage),
                kind: string_to_kind(&kind),
                message,
            }),
            _ => None,
        };

        BuildJob {
            id: Uuid::parse_str(&row.id).unwrap_or_else(|_| Uuid::nil()),
            chatbot_id: Uuid::parse_str(&row.chatbot_id).unwrap_or_else(|_| Uuid::nil()),
            template: row.template,
            config: serde_json::from_str(&row.config).unwrap_or_default(),
            status: string_to_status(&row.status),
            image_tag: row.image_tag,
            container_id: row.container_id,
            deployment_endpoint: row.deployment_endpoint,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            worker_id: row.worker_id,
            error,
        }
    }
}
