//! Test harness
//!
//! Validates a freshly built image before promotion: starts it as an
//! ephemeral container on a loopback port, polls the template-declared
//! health path with bounded backoff, then runs the template's functional
//! request/response check. The ephemeral container is stopped and removed on
//! every path; only the verdict survives.

use async_trait::async_trait;
use botforge_core::domain::job::{BuildError, BuildErrorKind, BuildStage};
use botforge_core::domain::template::HealthCheck;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::runtime::{ContainerRuntime, RunContainer, RuntimeError};

/// Probe seam over the HTTP exchange with the candidate service
///
/// The real implementation talks HTTP with reqwest; tests script it. What
/// "ready" and "working" mean is template data, not protocol.
#[async_trait]
pub trait ServiceProbe: Send + Sync {
    /// Succeeds once the health endpoint answers
    async fn ready(&self, endpoint: &str, health_path: &str) -> Result<(), String>;

    /// Performs the functional request and returns the response body
    async fn exchange(&self, endpoint: &str, path: &str, body: &str) -> Result<String, String>;
}

/// HTTP probe used against real deployments
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceProbe for HttpProbe {
    async fn ready(&self, endpoint: &str, health_path: &str) -> Result<(), String> {
        let url = format!("http://{}{}", endpoint, health_path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("health request failed: {}", e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("health endpoint returned {}", response.status()))
        }
    }

    async fn exchange(&self, endpoint: &str, path: &str, body: &str) -> Result<String, String> {
        let url = format!("http://{}{}", endpoint, path);
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| format!("functional request failed: {}", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| format!("failed to read response body: {}", e))?;

        if status.is_success() {
            Ok(text)
        } else {
            Err(format!("functional request returned {}: {}", status, text))
        }
    }
}

/// Harness driving the ephemeral validation run
pub struct TestHarness {
    runtime: Arc<dyn ContainerRuntime>,
    probe: Arc<dyn ServiceProbe>,
    attempts: u32,
    initial_delay: Duration,
}

impl TestHarness {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn ServiceProbe>,
        attempts: u32,
        initial_delay: Duration,
    ) -> Self {
        Self {
            runtime,
            probe,
            attempts,
            initial_delay,
        }
    }

    /// Validates the built image; Ok means fit for promotion
    pub async fn validate(
        &self,
        job_id: Uuid,
        image_tag: &str,
        check: &HealthCheck,
        log_lines: &mpsc::Sender<String>,
    ) -> Result<(), BuildError> {
        let container_name = format!("bf-test-{}", job_id);

        let _ = log_lines
            .send(format!("Starting ephemeral test container {}", container_name))
            .await;

        self.runtime
            .run_container(&RunContainer {
                name: container_name.clone(),
                image: image_tag.to_string(),
                network: None,
                publish_port: Some(check.port),
            })
            .await
            .map_err(|e| runtime_error_at_test(&e))?;

        let verdict = self.run_checks(&container_name, check, log_lines).await;

        // The ephemeral container never outlives validation
        if let Err(e) = self.runtime.stop_container(&container_name).await {
            warn!("Failed to stop test container {}: {}", container_name, e);
        }
        if let Err(e) = self.runtime.remove_container(&container_name).await {
            warn!("Failed to remove test container {}: {}", container_name, e);
        }

        match &verdict {
            Ok(()) => info!("Image {} validated for job {}", image_tag, job_id),
            Err(e) => debug!("Validation failed for job {}: {}", job_id, e),
        }

        verdict
    }

    async fn run_checks(
        &self,
        container_name: &str,
        check: &HealthCheck,
        log_lines: &mpsc::Sender<String>,
    ) -> Result<(), BuildError> {
        let endpoint = self
            .runtime
            .mapped_port(container_name, check.port)
            .await
            .map_err(|e| runtime_error_at_test(&e))?;

        // Bounded readiness polling with exponential backoff
        let mut delay = self.initial_delay;
        let mut last_error = String::new();
        let mut ready = false;

        for attempt in 1..=self.attempts {
            match self.probe.ready(&endpoint, &check.health_path).await {
                Ok(()) => {
                    let _ = log_lines
                        .send(format!("Health probe ready after {} attempt(s)", attempt))
                        .await;
                    ready = true;
                    break;
                }
                Err(e) => {
                    debug!(
                        "Probe attempt {}/{} on {} failed: {}",
                        attempt, self.attempts, container_name, e
                    );
                    last_error = e;
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(10));
                }
            }
        }

        if !ready {
            return Err(BuildError::new(
                BuildStage::Test,
                BuildErrorKind::Validation,
                format!(
                    "health probe never became ready after {} attempts: {}",
                    self.attempts, last_error
                ),
            ));
        }

        // Functional check: scripted request must produce the expected reply
        let _ = log_lines.send("Running functional check".to_string()).await;

        let response = self
            .probe
            .exchange(&endpoint, &check.request_path, &check.request_body)
            .await
            .map_err(|e| {
                BuildError::new(BuildStage::Test, BuildErrorKind::Validation, e)
            })?;

        if !response.contains(&check.expect_contains) {
            return Err(BuildError::new(
                BuildStage::Test,
                BuildErrorKind::Validation,
                format!(
                    "functional check mismatch: expected response to contain '{}', got '{}'",
                    check.expect_contains,
                    truncate(&response, 200)
                ),
            ));
        }

        let _ = log_lines.send("Functional check passed".to_string()).await;
        Ok(())
    }
}

fn runtime_error_at_test(e: &RuntimeError) -> BuildError {
    let kind = if e.is_infrastructure() {
        BuildErrorKind::Infrastructure
    } else {
        BuildErrorKind::Validation
    };
    BuildError::new(BuildStage::Test, kind, e.to_string())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
