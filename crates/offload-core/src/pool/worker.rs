use super::{ComputeTask, Job, PermitGuard, PoolStats, StateCell, WorkerState};
use crate::{Error, Result};
use core::sync::atomic::Ordering;
use portable_atomic::AtomicBool;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Messages a worker thread understands.
#[derive(Debug)]
pub(crate) enum WorkerMessage {
    /// Compute `task` and post the result on `reply`.
    Compute {
        task: ComputeTask,
        reply: oneshot::Sender<u64>,
    },
    /// Exit the loop once idle.
    Shutdown,
}

/// State shared between a [`WorkerHandle`] and its [`Terminator`]s.
struct Shared {
    id: usize,
    state: Arc<StateCell>,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<WorkerMessage>,
    terminated: AtomicBool,
    stats: Arc<PoolStats>,
}

impl Shared {
    fn terminate(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }

        self.state.begin_termination();
        self.cancel.cancel();
        // The thread may already be gone after a crash.
        let _ = self.tx.send(WorkerMessage::Shutdown);
        self.stats.record_termination();

        tracing::trace!("Worker {} terminated", self.id);
    }
}

/// A live, isolated computation unit owned by the caller that spawned it.
///
/// A handle processes at most one [`ComputeTask`] at a time:
/// [`submit`](Self::submit) a task, then [`wait`](Self::wait) for its result.
/// Dropping the handle terminates the worker.
pub struct WorkerHandle {
    shared: Arc<Shared>,
    pending: Option<oneshot::Receiver<u64>>,
}

impl WorkerHandle {
    /// Starts a worker thread and waits until it is ready to accept a task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the OS refuses to create the thread or if
    /// the thread exits before signalling readiness.
    pub(crate) async fn start(
        id: usize,
        job: Job,
        cancel: CancellationToken,
        stats: Arc<PoolStats>,
        permit: PermitGuard,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let state = Arc::new(StateCell::new(WorkerState::Starting));

        let thread_state = Arc::clone(&state);
        let thread_stats = Arc::clone(&stats);
        std::thread::Builder::new()
            .name(format!("offload-worker-{id}"))
            .spawn(move || worker_loop(id, rx, job, thread_state, ready_tx, permit, thread_stats))
            .map_err(|e| Error::Spawn {
                context: format!("worker {id}: {e}"),
            })?;

        let handle = Self {
            shared: Arc::new(Shared {
                id,
                state,
                cancel,
                tx,
                terminated: AtomicBool::new(false),
                stats,
            }),
            pending: None,
        };

        match ready_rx.await {
            Ok(()) => Ok(handle),
            Err(_) => Err(Error::Spawn {
                context: format!("worker {id} exited during startup"),
            }),
        }
    }

    /// Opaque identity of this worker, unique within its pool.
    pub fn id(&self) -> usize {
        self.shared.id
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state.load()
    }

    /// Sends exactly one task to a ready worker and marks it busy.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the worker is not ready or a previous
    ///   result has not been awaited yet.
    /// - [`Error::WorkerCrashed`] if the worker thread is gone.
    pub fn submit(&mut self, task: ComputeTask) -> Result<()> {
        let id = self.id();

        if self.pending.is_some() {
            return Err(Error::InvalidState {
                id,
                state: WorkerState::Busy,
            });
        }

        self.shared
            .state
            .transition(WorkerState::Ready, WorkerState::Busy)
            .map_err(|state| Error::InvalidState { id, state })?;

        let (reply, pending) = oneshot::channel();
        if self
            .shared
            .tx
            .send(WorkerMessage::Compute { task, reply })
            .is_err()
        {
            self.shared.state.store(WorkerState::Dead);
            return Err(Error::WorkerCrashed { id });
        }

        self.pending = Some(pending);
        Ok(())
    }

    /// Suspends the calling task until the worker posts its result.
    ///
    /// Only the calling task is suspended; the worker computes on its own
    /// thread.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if no task was submitted.
    /// - [`Error::WorkerTerminated`] if the worker is terminated meanwhile.
    /// - [`Error::WorkerCrashed`] if the worker dies without posting.
    pub async fn wait(&mut self) -> Result<u64> {
        let id = self.id();
        let Some(pending) = self.pending.take() else {
            return Err(Error::InvalidState {
                id,
                state: self.state(),
            });
        };

        tokio::select! {
            biased;
            () = self.shared.cancel.cancelled() => {
                // Covers pool-wide cancellation, where no terminate reached
                // this worker yet.
                self.shared.terminate();
                Err(Error::WorkerTerminated { id })
            }
            result = pending => match result {
                Ok(value) => Ok(value),
                Err(_) if self.shared.terminated.load(Ordering::Acquire) => {
                    Err(Error::WorkerTerminated { id })
                }
                Err(_) => Err(Error::WorkerCrashed { id }),
            },
        }
    }

    /// Requests shutdown of the worker.
    ///
    /// Idempotent. Any outstanding [`wait`](Self::wait) resolves with
    /// [`Error::WorkerTerminated`]. A computation already running finishes on
    /// its thread and its result is discarded.
    pub fn terminate(&self) {
        self.shared.terminate();
    }

    /// Returns a cloneable handle that can terminate this worker while a
    /// [`wait`](Self::wait) is outstanding.
    pub fn terminator(&self) -> Terminator {
        Terminator {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shared.terminate();
    }
}

/// Terminates a worker from outside of its owning task.
#[derive(Clone)]
pub struct Terminator {
    shared: Arc<Shared>,
}

impl Terminator {
    pub fn terminate(&self) {
        self.shared.terminate();
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::Acquire)
    }
}

/// Body of a worker thread.
///
/// The loop blocks its own OS thread on the task channel, never the async
/// runtime. A panic inside `job` is contained here: the worker goes
/// [`WorkerState::Dead`] and drops the reply channel without posting, which
/// the awaiting caller observes as a crash.
///
/// # Request Types
///
/// - [`WorkerMessage::Compute`] - Runs `job` and posts the result.
/// - [`WorkerMessage::Shutdown`] - Stops the loop.
fn worker_loop(
    worker_id: usize,
    mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
    job: Job,
    state: Arc<StateCell>,
    ready: oneshot::Sender<()>,
    _permit: PermitGuard,
    stats: Arc<PoolStats>,
) {
    stats.record_start();
    state.store(WorkerState::Ready);
    tracing::trace!("Worker {worker_id} started");

    if ready.send(()).is_err() {
        tracing::trace!("Worker {worker_id} spawner went away before readiness");
    }

    while let Some(message) = rx.blocking_recv() {
        match message {
            WorkerMessage::Compute { task, reply } => {
                match panic::catch_unwind(AssertUnwindSafe(|| job(task.input()))) {
                    Ok(value) => {
                        // Ready before posting so the caller can resubmit
                        // as soon as it observes the result.
                        let _ = state.transition(WorkerState::Busy, WorkerState::Ready);
                        if reply.send(value).is_err() {
                            tracing::trace!("Worker {worker_id} result was discarded");
                        }
                    }
                    Err(_) => {
                        tracing::debug!(
                            "Worker {worker_id} crashed while computing input {}",
                            task.input()
                        );
                        state.store(WorkerState::Dead);
                        drop(reply);
                        break;
                    }
                }
            }
            WorkerMessage::Shutdown => {
                tracing::debug!("Worker {worker_id} received shutdown signal");
                break;
            }
        }
    }

    state.store(WorkerState::Dead);
    stats.record_exit();
    tracing::trace!("Worker {worker_id} stopped");
}
