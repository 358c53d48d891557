//! Service module
//!
//! Business logic layer for the engine. Services validate requests,
//! orchestrate between the repositories, the dispatch queue, and the
//! container runtime.

pub mod build;
pub mod log;

pub use build as build_service;
pub use log as log_service;
