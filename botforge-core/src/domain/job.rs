//! Build job domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Build job record
///
/// The unit of work: one request to turn a chatbot configuration into a
/// deployed instance. Created on enqueue, mutated only by the worker that
/// claimed it, immutable once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJob {
    pub id: Uuid,
    pub chatbot_id: Uuid,
    pub template: String,
    /// Chatbot configuration fields substituted into the template
    pub config: std::collections::HashMap<String, serde_json::Value>,
    pub status: BuildStatus,
    pub image_tag: Option<String>,
    pub container_id: Option<String>,
    pub deployment_endpoint: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub worker_id: Option<String>,
    pub error: Option<BuildError>,
}

impl BuildJob {
    /// True while the job still occupies its chatbot's in-flight slot
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Build job status
///
/// `Queued → Building → Testing → Deploying → Deployed` is the success path.
/// `Failed` and `Cancelled` are terminal and reachable from any non-terminal
/// state. No other edges exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStatus {
    Queued,
    Building,
    Testing,
    Deploying,
    Deployed,
    Failed,
    Cancelled,
}

impl BuildStatus {
    /// Returns true for states with no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildStatus::Deployed | BuildStatus::Failed | BuildStatus::Cancelled
        )
    }

    /// Checks whether `next` is a legal successor of the current state
    pub fn can_transition_to(&self, next: BuildStatus) -> bool {
        use BuildStatus::*;

        match (self, next) {
            (Queued, Building) => true,
            (Building, Testing) => true,
            (Testing, Deploying) => true,
            (Deploying, Deployed) => true,
            // Failure and cancellation are reachable from any non-terminal state
            (s, Failed) | (s, Cancelled) => !s.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BuildStatus::Queued => "Queued",
            BuildStatus::Building => "Building",
            BuildStatus::Testing => "Testing",
            BuildStatus::Deploying => "Deploying",
            BuildStatus::Deployed => "Deployed",
            BuildStatus::Failed => "Failed",
            BuildStatus::Cancelled => "Cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Pipeline stage a failure occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStage {
    Render,
    Build,
    Test,
    Deploy,
}

impl std::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BuildStage::Render => "render",
            BuildStage::Build => "build",
            BuildStage::Test => "test",
            BuildStage::Deploy => "deploy",
        };
        write!(f, "{}", s)
    }
}

/// Failure classification recorded on a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildErrorKind {
    /// Bad template or malformed configuration
    Input,
    /// Image build exited non-zero
    Build,
    /// Health probe never ready or functional check mismatch
    Validation,
    /// Container start or network attach failure
    Deployment,
    /// The per-job timeout expired
    Timeout,
    /// Container runtime unreachable after bounded retries
    Infrastructure,
}

/// Structured failure description carried on a `Failed` job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{stage} stage failed ({kind:?}): {message}")]
pub struct BuildError {
    pub stage: BuildStage,
    pub kind: BuildErrorKind,
    pub message: String,
}

impl BuildError {
    pub fn new(stage: BuildStage, kind: BuildErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(stage: BuildStage) -> Self {
        Self::new(
            stage,
            BuildErrorKind::Timeout,
            "job exceeded the configured timeout",
        )
    }
}
