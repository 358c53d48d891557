//! Build worker
//!
//! Drives one claimed job through render → build → test → deploy, committing
//! every transition to the registry as it happens. Cancellation is observed
//! cooperatively at the checkpoints between stages; the per-job timeout wraps
//! everything from Building onward.

use botforge_core::domain::job::{
    BuildError, BuildErrorKind, BuildJob, BuildStage, BuildStatus,
};
use botforge_core::domain::log::LogLevel;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::deploy::DeploymentManager;
use crate::harness::TestHarness;
use crate::queue::DispatchState;
use crate::repository::{job_repository, log_repository};
use crate::runtime::ContainerRuntime;
use crate::template::{TemplateStore, render};

const MAX_INFRA_RETRIES: u32 = 3;

/// Everything a worker needs to process jobs
pub struct WorkerContext {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub templates: Arc<TemplateStore>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub harness: TestHarness,
    pub deployer: DeploymentManager,
    pub state: Arc<DispatchState>,
}

/// Worker loop: pull the oldest queued job, process it to completion, repeat
pub async fn run_worker(
    worker_id: String,
    ctx: Arc<WorkerContext>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Uuid>>>,
) {
    info!("{} started", worker_id);

    loop {
        let job_id = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };

        let Some(job_id) = job_id else {
            info!("{} shutting down, queue closed", worker_id);
            break;
        };

        if let Err(e) = process_job(&worker_id, &ctx, job_id).await {
            error!("{} failed processing job {}: {:#}", worker_id, job_id, e);
        }
    }
}

enum PipelineOutcome {
    Deployed,
    Cancelled,
}

/// Processes a single dequeued job
pub async fn process_job(
    worker_id: &str,
    ctx: &WorkerContext,
    job_id: Uuid,
) -> anyhow::Result<()> {
    let Some(job) = job_repository::find_by_id(&ctx.pool, job_id).await? else {
        warn!("Dequeued unknown job {}", job_id);
        return Ok(());
    };

    if job.status != BuildStatus::Queued {
        // Cancelled (and finalized) while still in the pending list
        debug!("Skipping job {} in state {}", job_id, job.status);
        return Ok(());
    }

    let cancel = ctx
        .state
        .cancel_flag(job_id)
        .unwrap_or_else(|| ctx.state.register_job(job_id));

    // A cancel that raced the dequeue is honored before anything starts
    if cancel.load(Ordering::SeqCst) {
        job_repository::transition_to_cancelled(&ctx.pool, job_id).await?;
        log_repository::append(&ctx.pool, job_id, LogLevel::Info, "Build cancelled while queued")
            .await?;
        finish(ctx, &job);
        return Ok(());
    }

    if !job_repository::claim_for_building(&ctx.pool, job_id, worker_id).await? {
        debug!("Job {} no longer claimable", job_id);
        finish(ctx, &job);
        return Ok(());
    }

    info!("{} claimed job {} (chatbot {})", worker_id, job_id, job.chatbot_id);
    log_repository::append(
        &ctx.pool,
        job_id,
        LogLevel::Info,
        &format!("Build claimed by {}", worker_id),
    )
    .await?;

    // Pump streamed pipeline output into the job's log as it is produced
    let (line_tx, mut line_rx) = mpsc::channel::<String>(256);
    let pump_pool = ctx.pool.clone();
    let pump = tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            if let Err(e) = log_repository::append(&pump_pool, job_id, LogLevel::Info, &line).await
            {
                warn!("Failed to append log line for job {}: {}", job_id, e);
            }
        }
    });

    let outcome = tokio::time::timeout(
        ctx.config.job_timeout,
        run_pipeline(ctx, &job, &cancel, &line_tx),
    )
    .await;

    drop(line_tx);
    let _ = pump.await;

    match outcome {
        Ok(Ok(PipelineOutcome::Deployed)) => {
            info!("Job {} deployed", job_id);
        }
        Ok(Ok(PipelineOutcome::Cancelled)) => {
            info!("Job {} cancelled", job_id);
        }
        Ok(Err(build_error)) => {
            log_repository::append(
                &ctx.pool,
                job_id,
                LogLevel::Error,
                &build_error.to_string(),
            )
            .await?;
            job_repository::transition_to_failed(&ctx.pool, job_id, &build_error).await?;
            info!("Job {} failed: {}", job_id, build_error);
        }
        Err(_elapsed) => {
            // Stage is whatever the registry last committed
            let stage = current_stage(&ctx.pool, job_id).await;
            let build_error = BuildError::timeout(stage);

            log_repository::append(&ctx.pool, job_id, LogLevel::Error, &build_error.to_string())
                .await?;
            teardown_after_timeout(ctx, &job, stage).await;
            job_repository::transition_to_failed(&ctx.pool, job_id, &build_error).await?;
            warn!("Job {} timed out in {} stage", job_id, stage);
        }
    }

    finish(ctx, &job);
    Ok(())
}

async fn run_pipeline(
    ctx: &WorkerContext,
    job: &BuildJob,
    cancel: &AtomicBool,
    lines: &mpsc::Sender<String>,
) -> Result<PipelineOutcome, BuildError> {
    // --- Render -------------------------------------------------------------
    let template = ctx
        .templates
        .get(&job.template)
        .map_err(|e| BuildError::new(BuildStage::Render, BuildErrorKind::Input, e.to_string()))?;

    let context_dir = ctx.config.workspace_root.join(job.id.to_string());

    let _ = lines
        .send(format!("Rendering template '{}'", job.template))
        .await;

    render::render_build_context(template, &job.config, &context_dir)
        .map_err(|e| BuildError::new(BuildStage::Render, BuildErrorKind::Input, e.to_string()))?;

    if cancel.load(Ordering::SeqCst) {
        return cancel_job(ctx, job, None, lines).await;
    }

    // --- Build --------------------------------------------------------------
    let image_tag = image_tag(&ctx.config, job);

    let _ = lines.send(format!("Building image {}", image_tag)).await;

    build_with_retry(ctx, &context_dir, &image_tag, lines).await?;

    commit(
        job_repository::transition_to_testing(&ctx.pool, job.id, &image_tag).await,
        BuildStage::Build,
    )?;

    if cancel.load(Ordering::SeqCst) {
        return cancel_job(ctx, job, Some(&image_tag), lines).await;
    }

    // --- Test ---------------------------------------------------------------
    ctx.harness
        .validate(job.id, &image_tag, &template.meta.check, lines)
        .await?;

    commit(
        job_repository::transition_to_deploying(&ctx.pool, job.id).await,
        BuildStage::Test,
    )?;

    if cancel.load(Ordering::SeqCst) {
        return cancel_job(ctx, job, Some(&image_tag), lines).await;
    }

    // --- Deploy -------------------------------------------------------------
    let _ = lines.send("Promoting validated image".to_string()).await;

    let deployment = ctx
        .deployer
        .deploy(job.chatbot_id, &image_tag, template.meta.check.port)
        .await?;

    commit(
        job_repository::transition_to_deployed(
            &ctx.pool,
            job.id,
            &deployment.container_id,
            &deployment.endpoint,
        )
        .await,
        BuildStage::Deploy,
    )?;

    let _ = lines
        .send(format!("Deployment ready at {}", deployment.endpoint))
        .await;

    Ok(PipelineOutcome::Deployed)
}

/// Builds the image, retrying bounded times with backoff when the runtime
/// itself is unreachable; genuine build failures are not retried
async fn build_with_retry(
    ctx: &WorkerContext,
    context_dir: &std::path::Path,
    image_tag: &str,
    lines: &mpsc::Sender<String>,
) -> Result<(), BuildError> {
    let mut delay = Duration::from_millis(500);

    for attempt in 0.. {
        match ctx
            .runtime
            .build_image(context_dir, image_tag, lines.clone())
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) if e.is_infrastructure() && attempt < MAX_INFRA_RETRIES => {
                warn!(
                    "Runtime unavailable building {} (attempt {}/{}): {}",
                    image_tag,
                    attempt + 1,
                    MAX_INFRA_RETRIES,
                    e
                );
                let _ = lines
                    .send(format!("Container runtime unavailable, retrying: {}", e))
                    .await;
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(5));
            }
            Err(e) => {
                let kind = if e.is_infrastructure() {
                    BuildErrorKind::Infrastructure
                } else {
                    BuildErrorKind::Build
                };
                return Err(BuildError::new(BuildStage::Build, kind, e.to_string()));
            }
        }
    }

    unreachable!("retry loop always returns")
}

/// Honors a cancellation observed at a checkpoint: commits the terminal
/// state and removes whatever the job created so far
async fn cancel_job(
    ctx: &WorkerContext,
    job: &BuildJob,
    image_tag: Option<&str>,
    lines: &mpsc::Sender<String>,
) -> Result<PipelineOutcome, BuildError> {
    let _ = lines
        .send("Cancellation requested, stopping build".to_string())
        .await;

    commit(
        job_repository::transition_to_cancelled(&ctx.pool, job.id).await,
        BuildStage::Build,
    )?;

    if let Some(tag) = image_tag {
        if let Err(e) = ctx.runtime.remove_image(tag).await {
            warn!("Failed to remove image {} after cancel: {}", tag, e);
        }
    }

    let context_dir = ctx.config.workspace_root.join(job.id.to_string());
    if let Err(e) = std::fs::remove_dir_all(&context_dir) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove build context {}: {}", context_dir.display(), e);
        }
    }

    Ok(PipelineOutcome::Cancelled)
}

/// Maps a registry write into the pipeline's error type
fn commit(result: Result<bool, sqlx::Error>, stage: BuildStage) -> Result<(), BuildError> {
    match result {
        Ok(true) => Ok(()),
        Ok(false) => {
            // Single-writer discipline means this only happens if the job was
            // externally finalized; surface it rather than continuing
            Err(BuildError::new(
                stage,
                BuildErrorKind::Infrastructure,
                "registry refused transition, job no longer owned by this worker",
            ))
        }
        Err(e) => Err(BuildError::new(
            stage,
            BuildErrorKind::Infrastructure,
            format!("registry write failed: {}", e),
        )),
    }
}

async fn current_stage(pool: &SqlitePool, job_id: Uuid) -> BuildStage {
    match job_repository::find_by_id(pool, job_id).await {
        Ok(Some(job)) => match job.status {
            BuildStatus::Testing => BuildStage::Test,
            BuildStatus::Deploying => BuildStage::Deploy,
            _ => BuildStage::Build,
        },
        _ => BuildStage::Build,
    }
}

/// Image tag a job's build commits to
fn image_tag(config: &Config, job: &BuildJob) -> String {
    format!(
        "{}/{}:{}",
        config.image_prefix,
        job.chatbot_id,
        job.id.simple()
    )
}

/// Best-effort teardown so a timed-out job leaves no running container or
/// build artifact
async fn teardown_after_timeout(ctx: &WorkerContext, job: &BuildJob, stage: BuildStage) {
    let test_container = format!("bf-test-{}", job.id);
    if let Err(e) = ctx.runtime.remove_container(&test_container).await {
        debug!("No test container to remove for {}: {}", job.id, e);
    }

    // The interrupted build's child dies with the dropped future, but a
    // build that finished right before the deadline may have tagged an image
    if stage == BuildStage::Build {
        if let Err(e) = ctx.runtime.remove_image(&image_tag(&ctx.config, job)).await {
            debug!("No image to remove for timed-out job {}: {}", job.id, e);
        }
    }

    // Only a job that reached Deploying owns the deployment container;
    // earlier stages must not touch a previous healthy deployment
    if stage == BuildStage::Deploy {
        if let Err(e) = ctx.deployer.teardown(job.chatbot_id).await {
            warn!(
                "Failed to tear down deployment for chatbot {}: {}",
                job.chatbot_id, e
            );
        }
    }
}

/// Releases the job's dispatch tracking once it is terminal
fn finish(ctx: &WorkerContext, job: &BuildJob) {
    ctx.state.forget_job(job.id);
    ctx.state.release_chatbot(job.chatbot_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::harness::tests::MockProbe;
    use crate::queue::BuildQueue;
    use crate::runtime::mock::MockRuntime;
    use crate::template::{LoadedTemplate, TemplateStore};
    use botforge_core::domain::template::{BuildTemplate, HealthCheck, TemplateFiles};
    use std::collections::HashMap;

    fn sample_templates() -> Arc<TemplateStore> {
        let template = LoadedTemplate {
            meta: BuildTemplate {
                name: "faq-bot".to_string(),
                description: None,
                files: TemplateFiles {
                    dockerfile: "Dockerfile.tmpl".to_string(),
                    entrypoint: "app.py.tmpl".to_string(),
                    manifest: "requirements.txt.tmpl".to_string(),
                },
                check: HealthCheck {
                    port: 8080,
                    health_path: "/health".to_string(),
                    request_path: "/chat".to_string(),
                    request_body: r#"{"message":"ping"}"#.to_string(),
                    expect_contains: "reply".to_string(),
                },
            },
            dockerfile: "FROM python:3.11-slim\nENV BOT={{ bot_name }}\n".to_string(),
            entrypoint: "BOT = \"{{ bot_name }}\"\n".to_string(),
            manifest: "flask\n".to_string(),
        };

        let mut templates = HashMap::new();
        templates.insert("faq-bot".to_string(), template);
        Arc::new(TemplateStore::from_templates(templates))
    }

    fn bot_config() -> HashMap<String, serde_json::Value> {
        let mut config = HashMap::new();
        config.insert("bot_name".to_string(), serde_json::json!("support"));
        config
    }

    struct Fixture {
        ctx: Arc<WorkerContext>,
        runtime: Arc<MockRuntime>,
        _workspace: tempfile::TempDir,
    }

    async fn setup(runtime: MockRuntime, probe: MockProbe) -> Fixture {
        setup_with_timeout(runtime, probe, Duration::from_secs(5)).await
    }

    async fn setup_with_timeout(
        runtime: MockRuntime,
        probe: MockProbe,
        job_timeout: Duration,
    ) -> Fixture {
        let pool = db::create_test_pool().await.unwrap();
        let workspace = tempfile::tempdir().unwrap();

        let config = Arc::new(Config {
            workspace_root: workspace.path().to_path_buf(),
            job_timeout,
            probe_attempts: 3,
            probe_initial_delay: Duration::from_millis(1),
            ..Config::default()
        });

        let runtime = Arc::new(runtime);
        let probe = Arc::new(probe);
        let harness = TestHarness::new(
            runtime.clone(),
            probe,
            config.probe_attempts,
            config.probe_initial_delay,
        );
        let deployer = DeploymentManager::new(runtime.clone(), "botforge".to_string());

        let ctx = Arc::new(WorkerContext {
            pool,
            config,
            templates: sample_templates(),
            runtime: runtime.clone(),
            harness,
            deployer,
            state: Arc::new(DispatchState::new()),
        });

        Fixture {
            ctx,
            runtime,
            _workspace: workspace,
        }
    }

    async fn enqueue(ctx: &WorkerContext, chatbot_id: Uuid) -> BuildJob {
        let job = job_repository::create(&ctx.pool, chatbot_id, "faq-bot", &bot_config())
            .await
            .unwrap();
        ctx.state.reserve_chatbot(chatbot_id);
        ctx.state.register_job(job.id);
        job
    }

    #[tokio::test]
    async fn test_successful_pipeline_reaches_deployed() {
        let t = setup(MockRuntime::new(), MockProbe::ok(r#"{"reply":"hi"}"#)).await;
        let chatbot_id = Uuid::new_v4();
        let job = enqueue(&t.ctx, chatbot_id).await;

        process_job("worker-0", &t.ctx, job.id).await.unwrap();

        let done = job_repository::find_by_id(&t.ctx.pool, job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, BuildStatus::Deployed);
        assert!(done.image_tag.is_some());
        assert!(done.container_id.is_some());
        assert_eq!(done.deployment_endpoint.as_deref(), Some("http://127.0.0.1:40123"));
        assert!(done.started_at.is_some());
        assert!(done.completed_at.is_some());
        assert_eq!(done.worker_id.as_deref(), Some("worker-0"));
        assert!(done.error.is_none());

        // Only the deployment container survives
        assert_eq!(
            t.runtime.running_containers(),
            vec![DeploymentManager::container_name(chatbot_id)]
        );

        // The in-flight slot is released, a new build can be queued
        assert!(t.ctx.state.reserve_chatbot(chatbot_id));

        // Build output was streamed into the job log
        let logs = log_repository::find_since(&t.ctx.pool, job.id, 0)
            .await
            .unwrap();
        assert!(logs.iter().any(|l| l.message.contains("STEP 1/2")));
        assert!(logs.iter().any(|l| l.message.contains("Deployment ready")));
    }

    #[tokio::test]
    async fn test_broken_build_fails_without_image_tag() {
        let t = setup(MockRuntime::failing_build(), MockProbe::ok("reply")).await;
        let job = enqueue(&t.ctx, Uuid::new_v4()).await;

        process_job("worker-0", &t.ctx, job.id).await.unwrap();

        let done = job_repository::find_by_id(&t.ctx.pool, job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, BuildStatus::Failed);
        assert!(done.image_tag.is_none());
        assert!(done.container_id.is_none());

        let error = done.error.unwrap();
        assert_eq!(error.stage, BuildStage::Build);
        assert_eq!(error.kind, BuildErrorKind::Build);
        assert!(error.message.contains("broken Dockerfile"));

        // No container was ever created
        assert!(t.runtime.running_containers().is_empty());
    }

    #[tokio::test]
    async fn test_failed_health_check_fails_with_diagnostic() {
        let t = setup(MockRuntime::new(), MockProbe::never_ready()).await;
        let job = enqueue(&t.ctx, Uuid::new_v4()).await;

        process_job("worker-0", &t.ctx, job.id).await.unwrap();

        let done = job_repository::find_by_id(&t.ctx.pool, job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, BuildStatus::Failed);
        // Image was built before validation failed
        assert!(done.image_tag.is_some());

        let error = done.error.unwrap();
        assert_eq!(error.stage, BuildStage::Test);
        assert_eq!(error.kind, BuildErrorKind::Validation);

        // Ephemeral test container was removed
        assert!(t.runtime.running_containers().is_empty());
    }

    #[tokio::test]
    async fn test_container_start_failure_fails_job() {
        let t = setup(MockRuntime::failing_run(), MockProbe::ok("reply")).await;
        let job = enqueue(&t.ctx, Uuid::new_v4()).await;

        process_job("worker-0", &t.ctx, job.id).await.unwrap();

        let done = job_repository::find_by_id(&t.ctx.pool, job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, BuildStatus::Failed);
        assert_eq!(done.error.unwrap().stage, BuildStage::Test);
        assert!(t.runtime.running_containers().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_while_queued_never_builds() {
        let t = setup(MockRuntime::new(), MockProbe::ok("reply")).await;
        let job = enqueue(&t.ctx, Uuid::new_v4()).await;

        t.ctx.state.request_cancel(job.id);
        process_job("worker-0", &t.ctx, job.id).await.unwrap();

        let done = job_repository::find_by_id(&t.ctx.pool, job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, BuildStatus::Cancelled);
        assert!(done.started_at.is_none());
        assert!(done.image_tag.is_none());

        // No resources were ever created
        assert!(t.runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_build_honored_at_checkpoint() {
        let runtime = MockRuntime::slow_build(Duration::from_millis(300));
        let t = setup(runtime, MockProbe::ok("reply")).await;
        let job = enqueue(&t.ctx, Uuid::new_v4()).await;

        let state = t.ctx.state.clone();
        let job_id = job.id;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            state.request_cancel(job_id);
        });

        process_job("worker-0", &t.ctx, job.id).await.unwrap();

        let done = job_repository::find_by_id(&t.ctx.pool, job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, BuildStatus::Cancelled);

        // The completed build's image was removed at the checkpoint
        let calls = t.runtime.calls();
        assert!(calls.iter().any(|c| c.starts_with("rmi ")));
        // The test stage was never entered
        assert!(!calls.iter().any(|c| c.starts_with("run ")));
    }

    #[tokio::test]
    async fn test_timeout_forces_failed_with_timeout_error() {
        let runtime = MockRuntime::slow_build(Duration::from_secs(30));
        let t = setup_with_timeout(runtime, MockProbe::ok("reply"), Duration::from_millis(100))
            .await;
        let job = enqueue(&t.ctx, Uuid::new_v4()).await;

        process_job("worker-0", &t.ctx, job.id).await.unwrap();

        let done = job_repository::find_by_id(&t.ctx.pool, job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, BuildStatus::Failed);
        assert_eq!(done.error.as_ref().unwrap().kind, BuildErrorKind::Timeout);
        assert!(t.runtime.running_containers().is_empty());

        // Anything the interrupted build tagged is removed
        let expected_tag = image_tag(&t.ctx.config, &done);
        assert!(
            t.runtime
                .calls()
                .iter()
                .any(|c| c == &format!("rmi {}", expected_tag))
        );
    }

    #[tokio::test]
    async fn test_transient_runtime_outage_is_retried() {
        let runtime = MockRuntime::new();
        runtime.unavailable_builds.store(2, std::sync::atomic::Ordering::SeqCst);
        let t = setup(runtime, MockProbe::ok(r#"{"reply":"hi"}"#)).await;
        let job = enqueue(&t.ctx, Uuid::new_v4()).await;

        process_job("worker-0", &t.ctx, job.id).await.unwrap();

        let done = job_repository::find_by_id(&t.ctx.pool, job.id)
            .await
            .unwrap()
            .unwrap();
        // Two failed attempts, then the build went through
        assert_eq!(done.status, BuildStatus::Deployed);
        let builds = t
            .runtime
            .calls()
            .iter()
            .filter(|c| c.starts_with("build "))
            .count();
        assert_eq!(builds, 3);
    }

    #[tokio::test]
    async fn test_worker_pool_respects_concurrency_bound() {
        let pool = db::create_test_pool().await.unwrap();
        let workspace = tempfile::tempdir().unwrap();

        let config = Arc::new(Config {
            workspace_root: workspace.path().to_path_buf(),
            max_workers: 2,
            probe_attempts: 3,
            probe_initial_delay: Duration::from_millis(1),
            ..Config::default()
        });

        let runtime = Arc::new(MockRuntime::slow_build(Duration::from_millis(50)));
        let probe = Arc::new(MockProbe::ok(r#"{"reply":"hi"}"#));

        let queue = BuildQueue::start(
            pool.clone(),
            config,
            sample_templates(),
            runtime.clone(),
            probe,
        );

        let mut job_ids = Vec::new();
        for _ in 0..4 {
            let chatbot_id = Uuid::new_v4();
            let job = job_repository::create(&pool, chatbot_id, "faq-bot", &bot_config())
                .await
                .unwrap();
            queue.state().reserve_chatbot(chatbot_id);
            queue.state().register_job(job.id);
            queue.submit(job.id).unwrap();
            job_ids.push(job.id);
        }

        // Wait for all jobs to reach a terminal state
        for _ in 0..200 {
            let mut terminal = 0;
            for id in &job_ids {
                let job = job_repository::find_by_id(&pool, *id).await.unwrap().unwrap();
                if job.status.is_terminal() {
                    terminal += 1;
                }
            }
            if terminal == job_ids.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        for id in &job_ids {
            let job = job_repository::find_by_id(&pool, *id).await.unwrap().unwrap();
            assert_eq!(job.status, BuildStatus::Deployed);
        }

        let max = runtime
            .max_concurrent_builds
            .load(std::sync::atomic::Ordering::SeqCst);
        assert!(max >= 1 && max <= 2, "observed {} concurrent builds", max);
    }
}
