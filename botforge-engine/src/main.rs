use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod deploy;
pub mod harness;
pub mod queue;
pub mod repository;
pub mod runtime;
pub mod service;
pub mod template;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "botforge_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting BotForge engine...");

    let config = Arc::new(config::Config::from_env().expect("Invalid configuration"));

    std::fs::create_dir_all(&config.workspace_root).expect("Failed to create workspace root");

    tracing::info!("Opening build registry at {}", config.database_path.display());

    let pool = db::create_pool(&config.database_path)
        .await
        .expect("Failed to open build registry");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run registry migrations");

    let templates = Arc::new(
        template::TemplateStore::load(&config.template_dir)
            .expect("Failed to load build templates"),
    );
    if templates.names().is_empty() {
        tracing::warn!(
            "No build templates found in {}; every queue request will be rejected",
            config.template_dir.display()
        );
    }

    // Builds fail with infrastructure errors until the runtime comes up, so
    // an unavailable runtime is not fatal at startup
    let runtime: Arc<dyn runtime::ContainerRuntime> = Arc::new(runtime::podman::PodmanRuntime::new());
    if let Err(e) = runtime::podman::check_available().await {
        tracing::warn!("Container runtime unavailable at startup: {}", e);
    }

    let probe: Arc<dyn harness::ServiceProbe> = Arc::new(harness::HttpProbe::new());

    let queue = queue::BuildQueue::start(
        pool.clone(),
        config.clone(),
        templates.clone(),
        runtime.clone(),
        probe,
    );
    queue
        .restore(&pool)
        .await
        .expect("Failed to restore dispatch state");

    let deployer = Arc::new(deploy::DeploymentManager::new(
        runtime.clone(),
        config.deploy_network.clone(),
    ));

    let app = api::create_router(api::AppState {
        pool,
        config: config.clone(),
        queue,
        templates,
        runtime,
        deployer,
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
