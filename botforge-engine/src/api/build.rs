//! Build API handlers
//!
//! HTTP endpoints for queueing builds and inspecting their progress.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use botforge_core::dto::build::{BuildJobDto, DeploymentInfo, LogChunk, QueueBuild};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::{build_service, log_service};

/// POST /build/queue
/// Validate and queue a new build
pub async fn queue_build(
    State(state): State<AppState>,
    Json(req): Json<QueueBuild>,
) -> ApiResult<(StatusCode, Json<BuildJobDto>)> {
    tracing::info!(
        "Queue request for chatbot {} (template '{}')",
        req.chatbot_id,
        req.template
    );

    let job = build_service::enqueue(&state.pool, &state.queue, &state.templates, req).await?;

    Ok((StatusCode::CREATED, Json(job.into())))
}

/// GET /build/list
/// List all jobs, newest first
pub async fn list_builds(State(state): State<AppState>) -> ApiResult<Json<Vec<BuildJobDto>>> {
    let jobs = build_service::list_jobs(&state.pool).await?;
    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}

/// GET /build/chatbot/{chatbot_id}
/// Build history for one chatbot
pub async fn list_builds_for_chatbot(
    State(state): State<AppState>,
    Path(chatbot_id): Path<Uuid>,
) -> ApiResult<Json<Vec<BuildJobDto>>> {
    let jobs = build_service::jobs_for_chatbot(&state.pool, chatbot_id).await?;
    Ok(Json(jobs.into_iter().map(Into::into).collect()))
}

/// GET /build/{id}
/// Full job snapshot, including error details for failed jobs
pub async fn get_build(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<botforge_core::domain::job::BuildJob>> {
    let job = build_service::get_job(&state.pool, id).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default)]
    pub offset: i64,
}

/// GET /build/{id}/logs?offset=
/// Log entries appended since the offset
pub async fn get_build_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<LogsQuery>,
) -> ApiResult<Json<LogChunk>> {
    let chunk = log_service::get_log_chunk(&state.pool, id, params.offset).await?;
    Ok(Json(chunk))
}

/// POST /build/{id}/cancel
/// Cancel a queued or in-flight build
pub async fn cancel_build(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BuildJobDto>> {
    tracing::info!("Cancel request for job {}", id);

    let job = build_service::cancel(&state.pool, state.queue.state(), id).await?;

    Ok(Json(job.into()))
}

/// GET /build/{id}/deployment
/// Deployment info for a deployed build
pub async fn get_deployment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeploymentInfo>> {
    let info = build_service::deployment_info(&state.pool, id).await?;
    Ok(Json(info))
}

/// POST /build/{id}/cleanup
/// Remove a terminal job's retained artifacts
pub async fn cleanup_build(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Cleanup request for job {}", id);

    build_service::cleanup(
        &state.pool,
        &state.config,
        &state.runtime,
        &state.deployer,
        id,
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
