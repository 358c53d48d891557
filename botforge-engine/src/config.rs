//! Engine configuration
//!
//! Defines all configurable parameters for the engine: worker pool size,
//! per-job timeout, workspace and template locations, and the network used
//! for deployments. Read once at process start; changing any of these
//! requires a restart.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the status/log API binds to (e.g. "0.0.0.0:8080")
    pub bind_addr: String,

    /// SQLite database path for the build registry
    pub database_path: PathBuf,

    /// Maximum number of concurrent build workers
    pub max_workers: usize,

    /// Maximum time a job may spend from Building onward
    pub job_timeout: Duration,

    /// Root directory for per-job build contexts
    pub workspace_root: PathBuf,

    /// Directory containing build template bundles
    pub template_dir: PathBuf,

    /// Container network deployments are attached to
    pub deploy_network: String,

    /// Prefix for image tags and container names created by the engine
    pub image_prefix: String,

    /// Maximum readiness-probe attempts in the test harness
    pub probe_attempts: u32,

    /// Initial delay between readiness-probe attempts (doubles per attempt)
    pub probe_initial_delay: Duration,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - BIND_ADDR (optional, default: 0.0.0.0:8080)
    /// - DATABASE_PATH (optional, default: botforge.db)
    /// - MAX_WORKERS (optional, default: 3)
    /// - JOB_TIMEOUT (optional, seconds, default: 1800)
    /// - WORKSPACE_ROOT (optional, default: ./workspaces)
    /// - TEMPLATE_DIR (optional, default: ./templates)
    /// - DEPLOY_NETWORK (optional, default: botforge)
    /// - IMAGE_PREFIX (optional, default: botforge)
    /// - PROBE_ATTEMPTS (optional, default: 10)
    /// - PROBE_INITIAL_DELAY_MS (optional, default: 500)
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let database_path = std::env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("botforge.db"));

        let max_workers = std::env::var("MAX_WORKERS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(3);

        let job_timeout = std::env::var("JOB_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(1800));

        let workspace_root = std::env::var("WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./workspaces"));

        let template_dir = std::env::var("TEMPLATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./templates"));

        let deploy_network =
            std::env::var("DEPLOY_NETWORK").unwrap_or_else(|_| "botforge".to_string());

        let image_prefix =
            std::env::var("IMAGE_PREFIX").unwrap_or_else(|_| "botforge".to_string());

        let probe_attempts = std::env::var("PROBE_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(10);

        let probe_initial_delay = std::env::var("PROBE_INITIAL_DELAY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(500));

        let config = Self {
            bind_addr,
            database_path,
            max_workers,
            job_timeout,
            workspace_root,
            template_dir,
            deploy_network,
            image_prefix,
            probe_attempts,
            probe_initial_delay,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_workers == 0 {
            anyhow::bail!("max_workers must be greater than 0");
        }

        if self.job_timeout.as_secs() == 0 {
            anyhow::bail!("job_timeout must be greater than 0");
        }

        if self.probe_attempts == 0 {
            anyhow::bail!("probe_attempts must be greater than 0");
        }

        if self.image_prefix.is_empty() {
            anyhow::bail!("image_prefix cannot be empty");
        }

        if self.deploy_network.is_empty() {
            anyhow::bail!("deploy_network cannot be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_path: PathBuf::from("botforge.db"),
            max_workers: 3,
            job_timeout: Duration::from_secs(1800),
            workspace_root: PathBuf::from("./workspaces"),
            template_dir: PathBuf::from("./templates"),
            deploy_network: "botforge".to_string(),
            image_prefix: "botforge".to_string(),
            probe_attempts: 10,
            probe_initial_delay: Duration::from_millis(500),
        }
    }
}
