//! Server-side components of the offload service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI and environment configuration.
//! - [`service`] - Router, handlers and error mapping.
//! - [`telemetry`] - Log subscriber initialization.

pub mod config;
pub mod service;
pub mod telemetry;
