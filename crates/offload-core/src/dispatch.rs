//! Translates a path parameter into one or more offloaded computations.
//!
//! [`TaskDispatcher`] offers the three flavors the `/fibonacci-*` endpoints
//! expose: on the caller's own context, on one worker, and fanned out over
//! [`FANOUT_WIDTH`] workers. Parameters are validated before any worker is
//! spawned.

use crate::{
    Error, Result,
    fibonacci::fibonacci,
    pool::{ComputeTask, WorkerHandle, WorkerPool},
};
use core::time::Duration;
use futures::future::try_join_all;
use std::sync::Arc;

/// Number of workers a parallel request fans out to.
pub const FANOUT_WIDTH: usize = 4;

/// Parses a path parameter as a number and truncates it to an integer.
///
/// Surrounding whitespace is ignored. Integers, decimals and exponent
/// notation are accepted (`"1.5"` is `1`, `"1e2"` is `100`); values beyond
/// the `i64` range saturate. Anything else, including the empty string,
/// `NaN` and infinities, is rejected.
///
/// # Errors
///
/// Returns [`Error::BadRequest`] when `raw` is not a finite number.
pub fn parse_param(raw: &str) -> Result<i64> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(n);
    }

    match trimmed.parse::<f64>() {
        // `as` truncates toward zero and saturates at the `i64` bounds.
        Ok(n) if n.is_finite() => Ok(n as i64),
        _ => Err(Error::bad_request(format!("`{raw}` is not a number"))),
    }
}

/// Dispatches Fibonacci computations to a [`WorkerPool`].
#[derive(Clone)]
pub struct TaskDispatcher {
    pool: Arc<WorkerPool>,
    timeout: Option<Duration>,
}

impl TaskDispatcher {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            timeout: None,
        }
    }

    /// Sets a deadline for collecting worker results. On expiry, every worker
    /// of the request is terminated and the request fails with
    /// [`Error::Timeout`].
    #[must_use]
    pub fn with_timeout(self, timeout: Option<Duration>) -> Self {
        Self { timeout, ..self }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Computes `fib(n)` on the caller's own execution context.
    ///
    /// This blocks the calling thread for the whole computation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRequest`] for a non-numeric parameter.
    pub fn run_blocking(&self, param: &str) -> Result<u64> {
        parse_param(param).map(fibonacci)
    }

    /// Computes `fib(n)` inside a single worker.
    ///
    /// # Errors
    ///
    /// - [`Error::BadRequest`] for a non-numeric parameter; no worker is
    ///   spawned.
    /// - Any worker failure, see [`TaskDispatcher::run_parallel`].
    pub async fn run_offloaded(&self, param: &str) -> Result<u64> {
        let n = parse_param(param)?;
        let results = self.fan_out(&[n]).await?;

        results.into_iter().next().ok_or_else(|| Error::Spawn {
            context: "offloaded computation produced no result".to_string(),
        })
    }

    /// Computes `fib(n)`, `fib(n-1)`, `fib(n-2)` and `fib(n-3)` on four
    /// concurrent workers.
    ///
    /// Results are returned in submission order, whatever order the workers
    /// complete in.
    ///
    /// # Errors
    ///
    /// - [`Error::BadRequest`] for a non-numeric parameter; no worker is
    ///   spawned.
    /// - [`Error::Spawn`] / [`Error::ServiceShutdown`] if workers cannot be
    ///   started.
    /// - [`Error::WorkerCrashed`] / [`Error::WorkerTerminated`] if any worker
    ///   fails. All workers of the request are terminated.
    /// - [`Error::Timeout`] if the configured deadline expires.
    pub async fn run_parallel(&self, param: &str) -> Result<[u64; FANOUT_WIDTH]> {
        let n = parse_param(param)?;
        let inputs: [i64; FANOUT_WIDTH] = core::array::from_fn(|i| n.saturating_sub(i as i64));

        let results = self.fan_out(&inputs).await?;
        results.try_into().map_err(|results: Vec<u64>| Error::Spawn {
            context: format!(
                "expected {FANOUT_WIDTH} results, collected {}",
                results.len()
            ),
        })
    }

    /// Spawns one worker per input, submits, awaits all results concurrently
    /// and terminates every worker before returning, on success or failure.
    async fn fan_out(&self, inputs: &[i64]) -> Result<Vec<u64>> {
        let mut workers = self.pool.spawn_many(inputs.len()).await?;

        let outcome = self.collect(&mut workers, inputs).await;

        for worker in &workers {
            worker.terminate();
        }

        if let Err(_e) = &outcome {
            tracing::debug!("Fan-out over {} workers failed: {_e}", workers.len());
        }

        outcome
    }

    async fn collect(&self, workers: &mut [WorkerHandle], inputs: &[i64]) -> Result<Vec<u64>> {
        for (worker, &n) in workers.iter_mut().zip(inputs) {
            worker.submit(ComputeTask::new(n))?;
        }

        // `try_join_all` keeps input order and stops at the first failure.
        let results = try_join_all(workers.iter_mut().map(|worker| worker.wait()));

        match self.timeout {
            Some(after) => tokio::time::timeout(after, results)
                .await
                .unwrap_or(Err(Error::Timeout { after })),
            None => results.await,
        }
    }
}
