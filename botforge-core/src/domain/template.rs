//! Build template domain types

use serde::{Deserialize, Serialize};

/// Build template definition
///
/// A named, immutable bundle of skeleton files (Dockerfile, application
/// entrypoint, dependency manifest) with `{{ field }}` substitution points,
/// plus the health-check contract the test harness runs against the built
/// image. Loaded from disk at startup; never mutated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildTemplate {
    pub name: String,
    pub description: Option<String>,
    pub files: TemplateFiles,
    pub check: HealthCheck,
}

/// Skeleton file names inside a template directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateFiles {
    /// Dockerfile skeleton, rendered to `Dockerfile`
    pub dockerfile: String,
    /// Application entrypoint skeleton, rendered under its own name with the
    /// `.tmpl` suffix stripped
    pub entrypoint: String,
    /// Dependency manifest skeleton, same naming rule
    pub manifest: String,
}

/// Per-template validation contract
///
/// What "ready" and "working" mean varies by chatbot type, so the contract
/// is template data rather than a fixed protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Port the service listens on inside the container
    pub port: u16,
    /// Path polled until it returns success
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Path the functional check POSTs to
    pub request_path: String,
    /// JSON body sent by the functional check
    pub request_body: String,
    /// Substring the functional-check response must contain
    pub expect_contains: String,
}

fn default_health_path() -> String {
    "/health".to_string()
}
