//! Worker pool for offloaded CPU-bound computations.
//!
//! This module defines the [`WorkerPool`] struct, which spawns isolated worker
//! threads on demand, caps how many of them may be alive across all requests
//! and supports coordinated shutdown via a shared [`CancellationToken`].
//!
//! Every [`WorkerHandle`] receives a child of the pool's token, so cancelling
//! the pool resolves every outstanding await at once.

use super::{Job, WorkerHandle};
use crate::{Error, Result, fibonacci::fibonacci};
use core::num::NonZeroUsize;
use core::sync::atomic::Ordering;
use core::time::Duration;
use portable_atomic::AtomicUsize;
use std::sync::Arc;
use tokio::{
    sync::Semaphore,
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

/// Settings for a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of live worker threads across all requests. `None`
    /// leaves the pool unbounded.
    pub max_workers: Option<NonZeroUsize>,
    /// How long [`WorkerPool::shutdown`] waits for live workers to exit.
    pub shutdown_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

/// Lifetime counters of a pool.
#[derive(Debug, Default)]
pub struct PoolStats {
    spawned: AtomicUsize,
    terminated: AtomicUsize,
    live: AtomicUsize,
}

impl PoolStats {
    pub(crate) fn record_spawn(&self) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_termination(&self) {
        self.terminated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_start(&self) {
        self.live.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_exit(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            spawned: self.spawned.load(Ordering::Relaxed),
            terminated: self.terminated.load(Ordering::Relaxed),
            live: self.live.load(Ordering::Acquire),
        }
    }
}

/// A point-in-time copy of [`PoolStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Workers that reached the ready state.
    pub spawned: usize,
    /// Workers that received a terminate request.
    pub terminated: usize,
    /// Worker threads currently running.
    pub live: usize,
}

/// Returns one permit to the pool's semaphore when dropped.
///
/// Owned by the worker thread, so the permit is held for as long as the
/// thread actually runs, not just as long as its handle lives.
pub(crate) struct PermitGuard(Option<Arc<Semaphore>>);

impl Drop for PermitGuard {
    fn drop(&mut self) {
        if let Some(semaphore) = self.0.take() {
            semaphore.add_permits(1);
        }
    }
}

/// Spawns and tracks isolated workers.
///
/// Workers are created per request and torn down once their result is
/// consumed; the pool itself only enforces the global cap, counts lifecycle
/// events and coordinates shutdown.
pub struct WorkerPool {
    job: Job,
    permits: Option<Arc<Semaphore>>,
    max_workers: Option<usize>,
    next_id: AtomicUsize,
    stats: Arc<PoolStats>,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    /// Creates a pool whose workers compute [`fibonacci`].
    pub fn new(config: PoolConfig) -> Self {
        let max_workers = config.max_workers.map(NonZeroUsize::get);

        Self {
            job: Arc::new(fibonacci),
            permits: max_workers.map(|max| Arc::new(Semaphore::new(max))),
            max_workers,
            next_id: AtomicUsize::new(0),
            stats: Arc::new(PoolStats::default()),
            shutdown_token: CancellationToken::new(),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Replaces the computation applied by every worker spawned afterwards.
    #[must_use]
    pub fn with_job(self, job: impl Fn(i64) -> u64 + Send + Sync + 'static) -> Self {
        Self {
            job: Arc::new(job),
            ..self
        }
    }

    pub fn stats(&self) -> PoolSnapshot {
        self.stats.snapshot()
    }

    /// Creates and starts one worker.
    ///
    /// # Errors
    ///
    /// See [`spawn_many`](Self::spawn_many).
    pub async fn spawn(&self) -> Result<WorkerHandle> {
        self.spawn_many(1).await?.pop().ok_or_else(|| Error::Spawn {
            context: "no worker was started".to_string(),
        })
    }

    /// Creates and starts `count` workers, all-or-nothing.
    ///
    /// Permits for the whole batch are acquired at once, so concurrent
    /// fan-outs never hold a partial batch while waiting for the rest. If any
    /// worker fails to start, the ones already started are terminated.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceShutdown`] once [`shutdown`](Self::shutdown) began.
    /// - [`Error::Spawn`] if `count` exceeds the pool cap or a thread cannot
    ///   be created.
    pub async fn spawn_many(&self, count: usize) -> Result<Vec<WorkerHandle>> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }

        let guards = self.reserve(count).await?;
        let mut workers = Vec::with_capacity(count);

        for permit in guards {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let worker = WorkerHandle::start(
                id,
                Arc::clone(&self.job),
                self.shutdown_token.child_token(),
                Arc::clone(&self.stats),
                permit,
            )
            .await?;

            self.stats.record_spawn();
            workers.push(worker);
        }

        Ok(workers)
    }

    async fn reserve(&self, count: usize) -> Result<Vec<PermitGuard>> {
        let Some(semaphore) = &self.permits else {
            return Ok((0..count).map(|_| PermitGuard(None)).collect());
        };

        match self.max_workers {
            Some(max) if count > max => {
                return Err(Error::Spawn {
                    context: format!("{count} workers exceed the pool cap of {max}"),
                });
            }
            _ => {}
        }

        let batch = u32::try_from(count).map_err(|_| Error::Spawn {
            context: format!("{count} workers cannot be reserved at once"),
        })?;

        // A closed semaphore means the pool is shutting down.
        let permit = Arc::clone(semaphore)
            .acquire_many_owned(batch)
            .await
            .map_err(|_| Error::ServiceShutdown)?;

        // Ownership moves to one guard per worker thread.
        permit.forget();

        Ok((0..count)
            .map(|_| PermitGuard(Some(Arc::clone(semaphore))))
            .collect())
    }

    /// Gracefully shuts down the pool.
    ///
    /// - Cancels the shared [`CancellationToken`], resolving every outstanding
    ///   await with [`Error::WorkerTerminated`].
    /// - Closes the worker cap so further spawns fail with
    ///   [`Error::ServiceShutdown`].
    /// - Waits up to the configured timeout for live workers to exit.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Refusing new workers");
        self.shutdown_token.cancel();
        if let Some(semaphore) = &self.permits {
            semaphore.close();
        }

        tracing::info!("Draining live workers ({} active)", self.stats().live);
        let drain = timeout(self.shutdown_timeout, async {
            while self.stats().live > 0 {
                sleep(Duration::from_millis(100)).await;
            }
        })
        .await;

        match drain {
            Ok(()) => tracing::debug!("All workers drained successfully"),
            Err(_) => tracing::warn!(
                "Worker drain timed out ({} workers still live)",
                self.stats().live
            ),
        }

        tracing::info!("Worker pool shutdown complete: {:?}", self.stats());
        Ok(())
    }
}
