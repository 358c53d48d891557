//! Repository Module
//!
//! Data access layer for the build registry.
//! Each repository handles database operations for a specific domain entity.

pub mod job;
pub mod log;

// Re-export for convenience
pub use job as job_repository;
pub use log as log_repository;
