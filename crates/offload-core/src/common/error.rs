//! Error types for the offload service.
//!
//! This module defines the central `Error` enum, which captures every
//! reportable failure of the core components: request validation, worker
//! lifecycle, range resolution, file access and the user store. The HTTP
//! layer maps each variant to exactly one status code, so variants are split
//! by *how the caller should react* rather than by where they originate.
//!
//! ## Error Cases
//! - `BadRequest`: A path parameter or body field failed validation.
//! - `RangeNotSatisfiable`: A `Range` header does not fit the resource.
//! - `NotFound`: The requested resource does not exist.
//! - `Spawn`: A worker thread could not be started.
//! - `InvalidState`: A worker was driven out of its state machine.
//! - `WorkerCrashed`: A worker died without posting its result.
//! - `WorkerTerminated`: A worker was terminated while a result was awaited.
//! - `Timeout`: Results were not collected before the configured deadline.
//! - `ServiceShutdown`: The worker pool no longer accepts work.
//! - `Store`: The user store rejected an operation.
//! - `Io`: An I/O failure while reading a resource.

use crate::pool::WorkerState;
use crate::store::StoreError;
use core::time::Duration;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the offload service.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The request was malformed (non-numeric parameter, missing field).
    #[error("Invalid request: {reason}")]
    BadRequest { reason: String },

    /// The requested byte range lies outside of the resource.
    #[error("Range not satisfiable for a resource of {total_size} bytes")]
    RangeNotSatisfiable { total_size: u64 },

    /// The resource does not exist.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// The execution substrate could not allocate a new worker.
    #[error("Failed to spawn worker: {context}")]
    Spawn { context: String },

    /// The worker is not in a state that allows the requested operation.
    #[error("Worker {id} is {state}")]
    InvalidState { id: usize, state: WorkerState },

    /// The worker stopped without posting a result.
    #[error("Worker {id} crashed before posting a result")]
    WorkerCrashed { id: usize },

    /// The worker was terminated while its result was still awaited.
    #[error("Worker {id} was terminated")]
    WorkerTerminated { id: usize },

    /// Collecting worker results exceeded the configured deadline.
    #[error("Timed out after {after:?}")]
    Timeout { after: Duration },

    /// The worker pool is shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,

    /// The user store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Reading a resource failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest {
            reason: reason.into(),
        }
    }
}
