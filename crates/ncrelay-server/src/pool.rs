//! Execution pool.
//!
//! A multi-threaded Tokio runtime sized for the relay: async workers carry
//! the accept loop and socket I/O, and a bounded blocking pool carries engine
//! calls. Once [`ExecutionPool::run`] returns, tasks still pending are dropped,
//! which releases the engines they own. Engine calls already running get
//! [`PoolConfig::stop_grace`] to finish.

use std::{future::Future, io, thread, time::Duration};

use tokio::runtime::{Builder, Runtime};

use crate::config::PoolConfig;

/// Minimum async worker threads.
const MIN_WORKERS: usize = 2;

/// Runtime executing sessions and engine calls.
pub struct ExecutionPool {
    runtime: Runtime,
    workers: usize,
    stop_grace: Duration,
}

impl ExecutionPool {
    /// Build the pool.
    pub fn new(config: &PoolConfig) -> io::Result<Self> {
        let workers = config.workers.unwrap_or_else(|| {
            thread::available_parallelism().map_or(MIN_WORKERS, |n| n.get().max(MIN_WORKERS))
        });

        let runtime = Builder::new_multi_thread()
            .worker_threads(workers.max(1))
            .max_blocking_threads(config.engine_threads.max(1))
            .thread_name("ncrelay-worker")
            .enable_all()
            .build()?;

        Ok(Self { runtime, workers: workers.max(1), stop_grace: config.stop_grace })
    }

    /// Async worker threads in the pool.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Drive `fut` to completion, then stop the pool.
    ///
    /// Leftover tasks are dropped. Blocking calls still running are waited on
    /// for at most the stop grace.
    pub fn run<F: Future>(self, fut: F) -> F::Output {
        let output = self.runtime.block_on(fut);
        self.runtime.shutdown_timeout(self.stop_grace);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_worker_count() {
        let pool = ExecutionPool::new(&PoolConfig {
            workers: Some(3),
            engine_threads: 4,
            ..PoolConfig::default()
        })
        .expect("pool builds");
        assert_eq!(pool.workers(), 3);
        assert_eq!(pool.run(async { 7 }), 7);
    }

    #[test]
    fn default_has_at_least_two_workers() {
        let pool = ExecutionPool::new(&PoolConfig::default()).expect("pool builds");
        assert!(pool.workers() >= 2);
    }

    #[test]
    fn run_waits_no_longer_than_stop_grace() {
        let pool = ExecutionPool::new(&PoolConfig {
            workers: Some(2),
            engine_threads: 2,
            stop_grace: Duration::from_millis(100),
        })
        .expect("pool builds");

        let start = std::time::Instant::now();
        pool.run(async {
            tokio::task::spawn_blocking(|| thread::sleep(Duration::from_secs(5)));
            tokio::spawn(std::future::pending::<()>());
            tokio::time::sleep(Duration::from_millis(10)).await;
        });

        assert!(start.elapsed() < Duration::from_secs(4));
    }
}
