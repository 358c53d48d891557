//! Botforge Core
//!
//! Core types and abstractions for the Botforge build orchestration engine.
//!
//! This crate contains:
//! - Domain types: Core business entities (BuildJob, BuildTemplate, etc.)
//! - DTOs: Data transfer objects for the status/log API

pub mod domain;
pub mod dto;
