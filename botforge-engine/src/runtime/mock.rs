//! Scripted in-memory runtime for tests

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{ContainerRuntime, RunContainer, RuntimeError};

/// Mock runtime that records every call and can be scripted to fail or
/// stall at any operation
#[derive(Default)]
pub struct MockRuntime {
    pub fail_build: bool,
    pub fail_run: bool,
    /// Fail `ping` and `build_image` with an infrastructure error this many
    /// times before succeeding
    pub unavailable_builds: AtomicUsize,
    /// Artificial build duration, for timeout and concurrency tests
    pub build_delay: Option<Duration>,
    pub calls: Mutex<Vec<String>>,
    running: Mutex<HashSet<String>>,
    active_builds: AtomicUsize,
    pub max_concurrent_builds: AtomicUsize,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_build() -> Self {
        Self {
            fail_build: true,
            ..Self::default()
        }
    }

    pub fn failing_run() -> Self {
        Self {
            fail_run: true,
            ..Self::default()
        }
    }

    /// Runtime whose builds take `delay` to complete
    pub fn slow_build(delay: Duration) -> Self {
        Self {
            build_delay: Some(delay),
            ..Self::default()
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Containers started but never removed
    pub fn running_containers(&self) -> Vec<String> {
        self.running.lock().unwrap().iter().cloned().collect()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn build_image(
        &self,
        _context_dir: &Path,
        tag: &str,
        log_lines: mpsc::Sender<String>,
    ) -> Result<(), RuntimeError> {
        self.record(format!("build {}", tag));

        if self.unavailable_builds.load(Ordering::SeqCst) > 0 {
            self.unavailable_builds.fetch_sub(1, Ordering::SeqCst);
            return Err(RuntimeError::Unavailable("daemon not responding".to_string()));
        }

        let active = self.active_builds.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_builds
            .fetch_max(active, Ordering::SeqCst);

        let _ = log_lines.send(format!("STEP 1/2: FROM base for {}", tag)).await;

        if let Some(delay) = self.build_delay {
            tokio::time::sleep(delay).await;
        }

        self.active_builds.fetch_sub(1, Ordering::SeqCst);

        if self.fail_build {
            let _ = log_lines.send("error: broken Dockerfile".to_string()).await;
            return Err(RuntimeError::CommandFailed {
                operation: "build",
                exit_code: 1,
                stderr: "broken Dockerfile".to_string(),
            });
        }

        let _ = log_lines.send("COMMIT".to_string()).await;
        Ok(())
    }

    async fn run_container(&self, spec: &RunContainer) -> Result<String, RuntimeError> {
        self.record(format!("run {}", spec.name));

        if self.fail_run {
            return Err(RuntimeError::CommandFailed {
                operation: "run",
                exit_code: 125,
                stderr: "cannot start container".to_string(),
            });
        }

        self.running.lock().unwrap().insert(spec.name.clone());
        Ok(format!("cid-{}", spec.name))
    }

    async fn mapped_port(
        &self,
        name: &str,
        container_port: u16,
    ) -> Result<String, RuntimeError> {
        self.record(format!("port {} {}", name, container_port));
        Ok("127.0.0.1:40123".to_string())
    }

    async fn stop_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("stop {}", name));
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        self.record(format!("rm {}", name));
        self.running.lock().unwrap().remove(name);
        Ok(())
    }

    async fn remove_image(&self, tag: &str) -> Result<(), RuntimeError> {
        self.record(format!("rmi {}", tag));
        Ok(())
    }
}
