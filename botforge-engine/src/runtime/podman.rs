//! Podman container runtime
//!
//! Drives the podman CLI for image builds and container lifecycle. Build
//! output is streamed line-by-line so the log API can tail a build while it
//! runs.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{ContainerRuntime, RunContainer, RuntimeError};

/// Checks that podman is installed and responding
pub async fn check_available() -> Result<(), RuntimeError> {
    let runtime = PodmanRuntime::new();
    runtime.ping().await
}

pub struct PodmanRuntime;

impl PodmanRuntime {
    pub fn new() -> Self {
        Self
    }

    /// Runs a podman subcommand to completion, returning trimmed stdout
    async fn podman(
        &self,
        operation: &'static str,
        args: &[&str],
    ) -> Result<String, RuntimeError> {
        debug!("podman {}", args.join(" "));

        let output = Command::new("podman")
            .args(args)
            .output()
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("failed to execute podman: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            debug!(
                "podman {} failed: exit_code={} stderr='{}'",
                operation, exit_code, stderr
            );
            return Err(RuntimeError::CommandFailed {
                operation,
                exit_code,
                stderr,
            });
        }

        Ok(stdout)
    }
}

impl Default for PodmanRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for PodmanRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        let version = self.podman("version", &["--version"]).await?;
        info!("Podman is available: {}", version);
        Ok(())
    }

    async fn build_image(
        &self,
        context_dir: &Path,
        tag: &str,
        log_lines: mpsc::Sender<String>,
    ) -> Result<(), RuntimeError> {
        info!("Building image {} from {}", tag, context_dir.display());

        // The worker's per-job timeout drops this future mid-build; the
        // child must die with it, not keep building a dead job's image
        let mut child = Command::new("podman")
            .arg("build")
            .arg("-t")
            .arg(tag)
            .arg(context_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::Unavailable(format!("failed to execute podman: {}", e)))?;

        // Stream stdout into the log sink as lines arrive
        let stdout = child.stdout.take();
        let stdout_sink = log_lines.clone();
        let stdout_task = tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = stdout_sink.send(line).await;
                }
            }
        });

        // Stderr is streamed too, and kept for the failure diagnostic
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut captured = Vec::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = log_lines.send(line.clone()).await;
                    captured.push(line);
                }
            }
            captured
        });

        let status = child
            .wait()
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("failed to wait on podman: {}", e)))?;

        let _ = stdout_task.await;
        let captured_stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let exit_code = status.code().unwrap_or(-1);
            // Last few stderr lines carry the actual build failure
            let tail: Vec<&str> = captured_stderr
                .iter()
                .rev()
                .take(5)
                .rev()
                .map(|s| s.as_str())
                .collect();
            return Err(RuntimeError::CommandFailed {
                operation: "build",
                exit_code,
                stderr: tail.join("\n"),
            });
        }

        info!("Image {} built successfully", tag);
        Ok(())
    }

    async fn run_container(&self, spec: &RunContainer) -> Result<String, RuntimeError> {
        let mut args: Vec<String> = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            spec.name.clone(),
        ];

        if let Some(network) = &spec.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }

        if let Some(port) = spec.publish_port {
            args.push("-p".to_string());
            args.push(format!("127.0.0.1::{}", port));
        }

        args.push(spec.image.clone());

        let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        let container_id = self.podman("run", &arg_refs).await?;

        info!(
            "Container {} started with ID {}",
            spec.name, container_id
        );
        Ok(container_id)
    }

    async fn mapped_port(
        &self,
        name: &str,
        container_port: u16,
    ) -> Result<String, RuntimeError> {
        let port_arg = container_port.to_string();
        let output = self.podman("port", &["port", name, &port_arg]).await?;

        // Output is one "host:port" mapping per line; the first is enough
        output
            .lines()
            .next()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(RuntimeError::CommandFailed {
                operation: "port",
                exit_code: 0,
                stderr: format!("no published mapping for port {}", container_port),
            })
    }

    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError> {
        debug!("Stopping container {}", name);
        self.podman("stop", &["stop", name]).await?;
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        debug!("Removing container {}", name);
        if let Err(e) = self.podman("rm", &["rm", "-f", name]).await {
            warn!("Failed to remove container {}: {}", name, e);
            return Err(e);
        }
        Ok(())
    }

    async fn remove_image(&self, tag: &str) -> Result<(), RuntimeError> {
        debug!("Removing image {}", tag);
        self.podman("rmi", &["rmi", "-f", tag]).await?;
        Ok(())
    }
}
