//! Build DTOs for the status/log API

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{BuildJob, BuildStatus};
use crate::domain::log::LogEntry;

/// Request to queue a new build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueBuild {
    pub chatbot_id: Uuid,
    /// Name of the build template to render
    pub template: String,
    /// Chatbot configuration fields substituted into the template
    #[serde(default)]
    pub config: std::collections::HashMap<String, serde_json::Value>,
}

/// Lightweight job summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildJobDto {
    pub id: Uuid,
    pub chatbot_id: Uuid,
    pub template: String,
    pub status: BuildStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub worker_id: Option<String>,
}

impl From<BuildJob> for BuildJobDto {
    fn from(job: BuildJob) -> Self {
        Self {
            id: job.id,
            chatbot_id: job.chatbot_id,
            template: job.template,
            status: job.status,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            worker_id: job.worker_id,
        }
    }
}

/// Log content appended since a polling offset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogChunk {
    pub entries: Vec<LogEntry>,
    /// Offset to pass on the next poll
    pub next_offset: i64,
}

/// Deployment info for a `Deployed` job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentInfo {
    pub job_id: Uuid,
    pub chatbot_id: Uuid,
    pub container_id: String,
    pub endpoint: String,
}
