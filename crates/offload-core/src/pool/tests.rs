use super::*;
use crate::Error;
use core::num::NonZeroUsize;
use core::time::Duration;
use tokio::time::{sleep, timeout};

fn slow_pool(delay: Duration) -> WorkerPool {
    WorkerPool::new(PoolConfig::default()).with_job(move |n| {
        std::thread::sleep(delay);
        n as u64
    })
}

async fn wait_for_idle(pool: &WorkerPool) {
    timeout(Duration::from_secs(5), async {
        while pool.stats().live > 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("workers did not exit");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawned_worker_is_ready() {
    let pool = WorkerPool::new(PoolConfig::default());
    let worker = pool.spawn().await.unwrap();

    assert_eq!(worker.state(), WorkerState::Ready);
    assert_eq!(pool.stats().spawned, 1);
    assert_eq!(pool.stats().live, 1);

    drop(worker);
    wait_for_idle(&pool).await;
    assert_eq!(pool.stats().terminated, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submit_then_wait_returns_result() {
    let pool = WorkerPool::new(PoolConfig::default());
    let mut worker = pool.spawn().await.unwrap();

    worker.submit(ComputeTask::new(10)).unwrap();
    assert_eq!(worker.wait().await.unwrap(), 89);
    assert_eq!(worker.state(), WorkerState::Ready);

    // A ready worker accepts the next task.
    worker.submit(ComputeTask::new(3)).unwrap();
    assert_eq!(worker.wait().await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submit_to_busy_worker_fails() {
    let pool = slow_pool(Duration::from_millis(200));
    let mut worker = pool.spawn().await.unwrap();

    worker.submit(ComputeTask::new(1)).unwrap();
    let err = worker.submit(ComputeTask::new(2)).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidState {
            state: WorkerState::Busy,
            ..
        }
    ));

    assert_eq!(worker.wait().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_without_submit_fails() {
    let pool = WorkerPool::new(PoolConfig::default());
    let mut worker = pool.spawn().await.unwrap();

    let err = worker.wait().await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidState {
            state: WorkerState::Ready,
            ..
        }
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn terminate_is_idempotent_and_isolated() {
    let pool = WorkerPool::new(PoolConfig::default());
    let first = pool.spawn().await.unwrap();
    let mut second = pool.spawn().await.unwrap();

    first.terminate();
    first.terminate();
    assert_eq!(pool.stats().terminated, 1);
    assert!(matches!(
        first.state(),
        WorkerState::Terminating | WorkerState::Dead
    ));

    assert_eq!(second.state(), WorkerState::Ready);
    second.submit(ComputeTask::new(5)).unwrap();
    assert_eq!(second.wait().await.unwrap(), 8);

    drop(first);
    assert_eq!(pool.stats().terminated, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn terminate_resolves_outstanding_wait() {
    let pool = slow_pool(Duration::from_millis(500));
    let mut worker = pool.spawn().await.unwrap();
    let terminator = worker.terminator();

    worker.submit(ComputeTask::new(1)).unwrap();
    let (result, ()) = tokio::join!(worker.wait(), async {
        sleep(Duration::from_millis(20)).await;
        terminator.terminate();
    });

    assert!(matches!(result, Err(Error::WorkerTerminated { .. })));
    assert!(terminator.is_terminated());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn submit_after_terminate_fails() {
    let pool = WorkerPool::new(PoolConfig::default());
    let mut worker = pool.spawn().await.unwrap();

    worker.terminate();
    let err = worker.submit(ComputeTask::new(1)).unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_job_is_reported_as_crash() {
    let pool = WorkerPool::new(PoolConfig::default()).with_job(|_| panic!("boom"));
    let mut worker = pool.spawn().await.unwrap();

    worker.submit(ComputeTask::new(1)).unwrap();
    let err = worker.wait().await.unwrap_err();

    assert!(matches!(err, Error::WorkerCrashed { .. }));
    assert_eq!(worker.state(), WorkerState::Dead);

    drop(worker);
    wait_for_idle(&pool).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cap_limits_live_workers() {
    let pool = WorkerPool::new(PoolConfig {
        max_workers: NonZeroUsize::new(2),
        ..PoolConfig::default()
    });

    assert!(matches!(
        pool.spawn_many(3).await,
        Err(Error::Spawn { .. })
    ));

    let mut workers = pool.spawn_many(2).await.unwrap();
    assert!(timeout(Duration::from_millis(50), pool.spawn()).await.is_err());

    workers.pop();
    let third = timeout(Duration::from_secs(5), pool.spawn())
        .await
        .expect("permit was not released")
        .unwrap();
    assert_eq!(third.state(), WorkerState::Ready);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_terminates_waits_and_refuses_spawns() {
    let pool = WorkerPool::new(PoolConfig {
        max_workers: NonZeroUsize::new(4),
        shutdown_timeout: Duration::from_secs(2),
    })
    .with_job(|n| {
        std::thread::sleep(Duration::from_millis(300));
        n as u64
    });
    let mut worker = pool.spawn().await.unwrap();
    worker.submit(ComputeTask::new(1)).unwrap();

    let (result, shutdown) = tokio::join!(worker.wait(), async {
        sleep(Duration::from_millis(20)).await;
        pool.shutdown().await
    });

    assert!(matches!(result, Err(Error::WorkerTerminated { .. })));
    assert!(shutdown.is_ok());
    assert!(matches!(pool.spawn().await, Err(Error::ServiceShutdown)));
}
