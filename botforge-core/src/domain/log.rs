//! Build log domain types

use serde::{Deserialize, Serialize};

/// A single line captured from the build/test/deploy pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the job's append-only log stream, used as the polling
    /// offset by the log API
    pub seq: i64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}
