//! Isolated worker threads for CPU-bound computations.
//!
//! A [`WorkerPool`] hands out [`WorkerHandle`]s, each backed by a dedicated OS
//! thread. The thread shares no mutable memory with its caller: a task is
//! submitted over an unbounded MPSC channel and its result comes back over a
//! oneshot channel. The calling task only suspends while it awaits the
//! result, so the runtime keeps serving other requests.
//!
//! Every handle walks the same state machine:
//!
//! ```text
//! Starting -> Ready -> Busy -> Ready -> ... -> Terminating -> Dead
//!                        \-> Dead (crash)
//! ```
//!
//! ## Structure
//!
//! - [`manager`] - [`WorkerPool`], worker cap, statistics and shutdown.
//! - [`worker`] - [`WorkerHandle`], [`Terminator`] and the worker thread loop.

mod manager;
mod worker;
#[cfg(test)]
mod tests;

pub use manager::*;
pub use worker::*;

use core::fmt;
use core::sync::atomic::Ordering;
use portable_atomic::AtomicU8;
use std::sync::Arc;

/// The computation a worker applies to every task it receives.
pub type Job = Arc<dyn Fn(i64) -> u64 + Send + Sync>;

/// One unit of work: the integer input of the computation.
///
/// The result slot is the oneshot channel created when the task is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeTask {
    n: i64,
}

impl ComputeTask {
    pub const fn new(n: i64) -> Self {
        Self { n }
    }

    pub const fn input(&self) -> i64 {
        self.n
    }
}

/// Liveness of a worker as observed through its handle.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// The thread has been created but has not entered its loop yet.
    Starting = 0,
    /// Idle, accepts exactly one task.
    Ready = 1,
    /// Computing a task.
    Busy = 2,
    /// Shutdown was requested; the thread exits once idle.
    Terminating = 3,
    /// The thread has exited.
    Dead = 4,
}

impl WorkerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Ready,
            2 => Self::Busy,
            3 => Self::Terminating,
            _ => Self::Dead,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
            Self::Busy => write!(f, "busy"),
            Self::Terminating => write!(f, "terminating"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

/// Atomic cell holding a [`WorkerState`], shared by a handle and its thread.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) const fn new(state: WorkerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves from `from` to `to`, returning the observed state on mismatch.
    pub(crate) fn transition(&self, from: WorkerState, to: WorkerState) -> Result<(), WorkerState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(WorkerState::from_u8)
    }

    /// Marks the worker as terminating unless it is already dead.
    pub(crate) fn begin_termination(&self) {
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
            (state != WorkerState::Dead as u8).then_some(WorkerState::Terminating as u8)
        });
    }
}
