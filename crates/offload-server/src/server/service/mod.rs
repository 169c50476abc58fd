//! HTTP surface of the offload service.
//!
//! ## Structure
//!
//! - [`router`] - Endpoint table, `404` listing and middleware.
//! - [`handler`] - Shared [`handler::AppState`] and one handler per endpoint.
//! - [`error`] - [`error::ApiError`], the single failure-to-response mapping.

pub mod error;
pub mod handler;
pub mod router;
