//! Container runtime abstraction
//!
//! All direct calls to the container runtime (build, run, stop, inspect)
//! live behind this narrow capability interface, so the runtime (Podman, or
//! a mock in tests) is swappable without touching queue or state-machine
//! logic. Runtime-assigned identifiers (image tags, container ids) are
//! returned as opaque strings and stored on the job record, never held as
//! live references.

pub mod podman;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

/// Container runtime errors
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The runtime daemon/CLI could not be reached at all; retried with
    /// backoff before failing the job
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    /// The runtime executed the operation and reported failure
    #[error("{operation} failed with exit code {exit_code}: {stderr}")]
    CommandFailed {
        operation: &'static str,
        exit_code: i32,
        stderr: String,
    },
}

impl RuntimeError {
    /// Infrastructure errors are transient and worth retrying
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, RuntimeError::Unavailable(_))
    }
}

/// Specification for starting a container
#[derive(Debug, Clone)]
pub struct RunContainer {
    pub name: String,
    pub image: String,
    /// Network the container is attached to (deployments only)
    pub network: Option<String>,
    /// Container port to publish on an ephemeral loopback host port
    pub publish_port: Option<u16>,
}

/// Narrow capability interface over the container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Checks the runtime is reachable
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Builds an image from a build context, streaming output line-by-line
    /// into `log_lines` as it is produced
    async fn build_image(
        &self,
        context_dir: &Path,
        tag: &str,
        log_lines: mpsc::Sender<String>,
    ) -> Result<(), RuntimeError>;

    /// Starts a container and returns its runtime-assigned ID
    async fn run_container(&self, spec: &RunContainer) -> Result<String, RuntimeError>;

    /// Returns the `host:port` address a published container port is
    /// reachable at
    async fn mapped_port(&self, name: &str, container_port: u16)
    -> Result<String, RuntimeError>;

    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError>;

    async fn remove_container(&self, name: &str) -> Result<(), RuntimeError>;

    async fn remove_image(&self, tag: &str) -> Result<(), RuntimeError>;
}
