//! DTOs for the status/log API
//!
//! Wire-level request and response shapes exchanged with the external
//! dashboard; persistence stays in the engine's repository layer.

pub mod build;
