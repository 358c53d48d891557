//! Core domain types
//!
//! This module contains the core domain structures used across the engine.
//! These types represent the fundamental business entities and are shared
//! between the registry (persistence) and the worker pool (execution).

pub mod job;
pub mod log;
pub mod template;
