//! Build service
//!
//! Business logic for queueing, inspecting, cancelling, and cleaning up
//! build jobs.

use botforge_core::domain::job::{
    BuildError, BuildErrorKind, BuildJob, BuildStage, BuildStatus,
};
use botforge_core::domain::log::LogLevel;
use botforge_core::dto::build::{DeploymentInfo, QueueBuild};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::deploy::DeploymentManager;
use crate::queue::{BuildQueue, DispatchState};
use crate::repository::{job_repository, log_repository};
use crate::runtime::ContainerRuntime;
use crate::template::TemplateStore;

/// Service error type
#[derive(Debug)]
pub enum BuildServiceError {
    NotFound(Uuid),
    TemplateNotFound(String),
    MissingFields(Vec<String>),
    /// The chatbot already has a build in flight
    DuplicateInFlight(Uuid),
    /// Cancel requested for a job that already reached a terminal state
    AlreadyTerminal(Uuid),
    /// Deployment info requested for a job that is not `Deployed`
    NotDeployed(Uuid),
    /// Cleanup requested for a job that is still in flight
    NotTerminal(Uuid),
    QueueFull,
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for BuildServiceError {
    fn from(err: sqlx::Error) -> Self {
        BuildServiceError::DatabaseError(err)
    }
}

/// Validates and enqueues a build request
///
/// The template must exist and the configuration must cover every
/// substitution point before a record is created; a chatbot with a build
/// already in flight is rejected.
pub async fn enqueue(
    pool: &SqlitePool,
    queue: &BuildQueue,
    templates: &TemplateStore,
    req: QueueBuild,
) -> Result<BuildJob, BuildServiceError> {
    let template = templates
        .get(&req.template)
        .map_err(|_| BuildServiceError::TemplateNotFound(req.template.clone()))?;

    let missing = template.missing_fields(&req.config);
    if !missing.is_empty() {
        return Err(BuildServiceError::MissingFields(missing));
    }

    // One in-flight build per chatbot; the slot is held until the job is
    // terminal
    if !queue.state().reserve_chatbot(req.chatbot_id) {
        return Err(BuildServiceError::DuplicateInFlight(req.chatbot_id));
    }

    // Registry backstop: an active record the dispatch state does not know
    // about (engine restarted mid-build) must still block a second enqueue.
    // The slot stays reserved, matching how restore re-reserves for jobs it
    // finds in flight.
    match job_repository::has_active_job(pool, req.chatbot_id).await {
        Ok(true) => return Err(BuildServiceError::DuplicateInFlight(req.chatbot_id)),
        Ok(false) => {}
        Err(e) => {
            queue.state().release_chatbot(req.chatbot_id);
            return Err(e.into());
        }
    }

    let job = match job_repository::create(pool, req.chatbot_id, &req.template, &req.config).await
    {
        Ok(job) => job,
        Err(e) => {
            queue.state().release_chatbot(req.chatbot_id);
            return Err(e.into());
        }
    };

    queue.state().register_job(job.id);

    if queue.submit(job.id).is_err() {
        // Channel full: fail the record rather than strand it in Queued
        let error = BuildError::new(
            BuildStage::Render,
            BuildErrorKind::Infrastructure,
            "dispatch queue full",
        );
        job_repository::transition_to_failed(pool, job.id, &error).await?;
        queue.state().forget_job(job.id);
        queue.state().release_chatbot(req.chatbot_id);
        return Err(BuildServiceError::QueueFull);
    }

    log_repository::append(pool, job.id, LogLevel::Info, "Build queued").await?;

    tracing::info!(
        "Queued build {} for chatbot {} (template '{}')",
        job.id,
        job.chatbot_id,
        job.template
    );

    Ok(job)
}

/// Get a job by ID
pub async fn get_job(pool: &SqlitePool, id: Uuid) -> Result<BuildJob, BuildServiceError> {
    let job = job_repository::find_by_id(pool, id)
        .await?
        .ok_or(BuildServiceError::NotFound(id))?;

    Ok(job)
}

/// List all jobs, newest first
pub async fn list_jobs(pool: &SqlitePool) -> Result<Vec<BuildJob>, BuildServiceError> {
    let jobs = job_repository::list_all(pool).await?;
    Ok(jobs)
}

/// Build history for one chatbot
pub async fn jobs_for_chatbot(
    pool: &SqlitePool,
    chatbot_id: Uuid,
) -> Result<Vec<BuildJob>, BuildServiceError> {
    let jobs = job_repository::find_by_chatbot(pool, chatbot_id).await?;
    Ok(jobs)
}

/// Cancel a job
///
/// A still-`Queued` job is finalized immediately; a job already claimed by a
/// worker gets its cancellation flag set and is stopped at the next stage
/// checkpoint.
pub async fn cancel(
    pool: &SqlitePool,
    state: &DispatchState,
    job_id: Uuid,
) -> Result<BuildJob, BuildServiceError> {
    let job = job_repository::find_by_id(pool, job_id)
        .await?
        .ok_or(BuildServiceError::NotFound(job_id))?;

    if !job.is_active() {
        return Err(BuildServiceError::AlreadyTerminal(job_id));
    }

    // Guarded on `Queued` so a worker that claimed the job between our read
    // and this write keeps ownership; we fall through to the flag instead
    if job.status == BuildStatus::Queued
        && job_repository::cancel_if_queued(pool, job_id).await?
    {
        log_repository::append(pool, job_id, LogLevel::Info, "Build cancelled while queued")
            .await?;
        state.forget_job(job_id);
        state.release_chatbot(job.chatbot_id);
        tracing::info!("Cancelled queued job {}", job_id);
        return get_job(pool, job_id).await;
    }

    // In flight: the owning worker observes the flag at its next checkpoint
    if !state.request_cancel(job_id) {
        // No live worker tracks this job (left over from a previous run);
        // finalize it directly
        if job_repository::transition_to_cancelled(pool, job_id).await? {
            state.release_chatbot(job.chatbot_id);
            tracing::info!("Cancelled untracked job {}", job_id);
        } else {
            return Err(BuildServiceError::AlreadyTerminal(job_id));
        }
    } else {
        tracing::info!("Cancellation requested for in-flight job {}", job_id);
    }

    get_job(pool, job_id).await
}

/// Deployment info for a `Deployed` job
pub async fn deployment_info(
    pool: &SqlitePool,
    job_id: Uuid,
) -> Result<DeploymentInfo, BuildServiceError> {
    let job = job_repository::find_by_id(pool, job_id)
        .await?
        .ok_or(BuildServiceError::NotFound(job_id))?;

    match (job.status, job.container_id, job.deployment_endpoint) {
        (BuildStatus::Deployed, Some(container_id), Some(endpoint)) => Ok(DeploymentInfo {
            job_id: job.id,
            chatbot_id: job.chatbot_id,
            container_id,
            endpoint,
        }),
        _ => Err(BuildServiceError::NotDeployed(job_id)),
    }
}

/// Removes a terminal job's retained artifacts
///
/// Deletes the build context and image, and for a deployed job tears down
/// the deployment container. The registry record and logs are preserved.
pub async fn cleanup(
    pool: &SqlitePool,
    config: &Config,
    runtime: &Arc<dyn ContainerRuntime>,
    deployer: &DeploymentManager,
    job_id: Uuid,
) -> Result<(), BuildServiceError> {
    let job = job_repository::find_by_id(pool, job_id)
        .await?
        .ok_or(BuildServiceError::NotFound(job_id))?;

    if !job.status.is_terminal() {
        return Err(BuildServiceError::NotTerminal(job_id));
    }

    let context_dir = config.workspace_root.join(job.id.to_string());
    if let Err(e) = std::fs::remove_dir_all(&context_dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(
                "Failed to remove build context {}: {}",
                context_dir.display(),
                e
            );
        }
    }

    if job.status == BuildStatus::Deployed {
        if let Err(e) = deployer.teardown(job.chatbot_id).await {
            tracing::warn!(
                "Failed to tear down deployment for chatbot {}: {}",
                job.chatbot_id,
                e
            );
        }
    }

    if let Some(tag) = &job.image_tag {
        if let Err(e) = runtime.remove_image(tag).await {
            tracing::warn!("Failed to remove image {}: {}", tag, e);
        }
    }

    tracing::info!("Cleaned up artifacts for job {}", job_id);

    Ok(())
}
