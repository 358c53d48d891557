//! API module
//!
//! HTTP API layer for the engine: build queueing, status, incremental logs,
//! cancellation, deployment info, and artifact cleanup.

pub mod build;
pub mod error;
pub mod health;

use axum::{
    Router,
    routing::{get, post},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::deploy::DeploymentManager;
use crate::queue::BuildQueue;
use crate::runtime::ContainerRuntime;
use crate::template::TemplateStore;

/// Shared state for all API handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub queue: Arc<BuildQueue>,
    pub templates: Arc<TemplateStore>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub deployer: Arc<DeploymentManager>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Build endpoints
        .route("/build/queue", post(build::queue_build))
        .route("/build/list", get(build::list_builds))
        .route("/build/chatbot/{chatbot_id}", get(build::list_builds_for_chatbot))
        .route("/build/{id}", get(build::get_build))
        .route("/build/{id}/logs", get(build::get_build_logs))
        .route("/build/{id}/cancel", post(build::cancel_build))
        .route("/build/{id}/deployment", get(build::get_deployment))
        .route("/build/{id}/cleanup", post(build::cleanup_build))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::harness::tests::MockProbe;
    use crate::runtime::mock::MockRuntime;
    use crate::template::LoadedTemplate;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use botforge_core::domain::template::{BuildTemplate, HealthCheck, TemplateFiles};
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use std::time::Duration;
    use tower::ServiceExt;
    use uuid::Uuid;

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

    async fn test_app() -> (Router, SqlitePool, tempfile::TempDir) {
        let pool = db::create_test_pool().await.unwrap();
        let workspace = tempfile::tempdir().unwrap();

        let config = Arc::new(Config {
            workspace_root: workspace.path().to_path_buf(),
            probe_attempts: 3,
            probe_initial_delay: Duration::from_millis(1),
            ..Config::default()
        });

        // Slow builds keep jobs in flight while the test pokes the API
        let runtime: Arc<dyn ContainerRuntime> =
            Arc::new(MockRuntime::slow_build(Duration::from_secs(30)));
        let probe = Arc::new(MockProbe::ok(r#"{"reply":"hi"}"#));
        let templates = sample_templates();

        let queue = BuildQueue::start(
            pool.clone(),
            config.clone(),
            templates.clone(),
            runtime.clone(),
            probe,
        );
        let deployer = Arc::new(DeploymentManager::new(
            runtime.clone(),
            config.deploy_network.clone(),
        ));

        let app = create_router(AppState {
            pool: pool.clone(),
            config,
            queue,
            templates,
            runtime,
            deployer,
        });

        (app, pool, workspace)
    }

    fn queue_request(chatbot_id: Uuid) -> Request<Body> {
        let body = serde_json::json!({
            "chatbot_id": chatbot_id,
            "template": "faq-bot",
            "config": { "bot_name": "support" }
        });

        Request::builder()
            .method("POST")
            .uri("/build/queue")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check_reflects_registry() {
        let (app, pool, _ws) = test_app().await;

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        // Losing the registry must flip the endpoint to unavailable
        pool.close().await;

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_queue_and_get_build() {
        let (app, _pool, _ws) = test_app().await;
        let chatbot_id = Uuid::new_v4();

        let response = app.clone().oneshot(queue_request(chatbot_id)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let created = json_body(response).await;
        let job_id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["status"], "Queued");

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/build/{}", job_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let fetched = json_body(response).await;
        assert_eq!(fetched["chatbot_id"].as_str().unwrap(), chatbot_id.to_string());
    }

    #[tokio::test]
    async fn test_get_unknown_build_is_404() {
        let (app, _pool, _ws) = test_app().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/build/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_duplicate_queue_is_conflict() {
        let (app, _pool, _ws) = test_app().await;
        let chatbot_id = Uuid::new_v4();

        let first = app.clone().oneshot(queue_request(chatbot_id)).await.unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app.oneshot(queue_request(chatbot_id)).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_queue_unknown_template_is_bad_request() {
        let (app, _pool, _ws) = test_app().await;

        let body = serde_json::json!({
            "chatbot_id": Uuid::new_v4(),
            "template": "nope",
            "config": {}
        });
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/build/queue")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cancel_and_terminal_conflicts() {
        let (app, _pool, _ws) = test_app().await;
        let chatbot_id = Uuid::new_v4();

        let created = json_body(
            app.clone().oneshot(queue_request(chatbot_id)).await.unwrap(),
        )
        .await;
        let job_id = created["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/build/{}/cancel", job_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Deployment info is a conflict while not deployed
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/build/{}/deployment", job_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_cleanup_in_flight_is_conflict() {
        let (app, _pool, _ws) = test_app().await;
        let chatbot_id = Uuid::new_v4();

        let created = json_body(
            app.clone().oneshot(queue_request(chatbot_id)).await.unwrap(),
        )
        .await;
        let job_id = created["id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/build/{}/cleanup", job_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_log_polling_via_api() {
        let (app, _pool, _ws) = test_app().await;
        let chatbot_id = Uuid::new_v4();

        let created = json_body(
            app.clone().oneshot(queue_request(chatbot_id)).await.unwrap(),
        )
        .await;
        let job_id = created["id"].as_str().unwrap().to_string();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/build/{}/logs?offset=0", job_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let chunk = json_body(response).await;
        let entries = chunk["entries"].as_array().unwrap();
        assert!(!entries.is_empty());
        assert!(chunk["next_offset"].as_i64().unwrap() >= entries.len() as i64);
    }

    #[tokio::test]
    async fn test_list_and_chatbot_history() {
        let (app, _pool, _ws) = test_app().await;
        let chatbot_id = Uuid::new_v4();

        app.clone().oneshot(queue_request(chatbot_id)).await.unwrap();

        let list = json_body(
            app.clone()
                .oneshot(
                    Request::builder()
                        .uri("/build/list")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let history = json_body(
            app.oneshot(
                Request::builder()
                    .uri(format!("/build/chatbot/{}", chatbot_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap(),
        )
        .await;
        assert_eq!(history.as_array().unwrap().len(), 1);

        let other_chatbot = history.as_array().unwrap()[0]["chatbot_id"].as_str().unwrap();
        assert_eq!(other_chatbot, chatbot_id.to_string());
    }
}
