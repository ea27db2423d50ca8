//! Parallel processing strategies

use firebasin_core::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Processing mode for batch computations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessingMode {
    /// Single-threaded processing in the calling thread
    #[default]
    Sequential,
    /// Parallel processing with [`default_workers`] workers
    Parallel,
    /// Parallel with the specified number of workers
    ParallelWith(usize),
}

impl ProcessingMode {
    /// Number of workers this mode will actually use.
    ///
    /// Parallel modes collapse to a single worker when only one CPU is
    /// available, or when called from inside a rayon worker thread.
    pub fn workers(&self) -> Result<usize> {
        let requested = match self {
            ProcessingMode::Sequential => return Ok(1),
            ProcessingMode::Parallel => default_workers(),
            ProcessingMode::ParallelWith(0) => {
                return Err(Error::InvalidParameter {
                    name: "workers",
                    value: "0".to_string(),
                    reason: "at least one worker is required".to_string(),
                })
            }
            ProcessingMode::ParallelWith(n) => *n,
        };

        if rayon::current_thread_index().is_some() {
            debug!("already inside a worker pool, running sequentially");
            return Ok(1);
        }
        Ok(requested)
    }
}

/// Strategy for executing independent tasks
pub trait ParallelStrategy {
    /// Apply `f` to every task and collect the results in task order
    fn par_map<I, T, F>(&self, tasks: Vec<I>, f: F) -> Result<Vec<T>>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> T + Sync + Send;
}

impl ParallelStrategy for ProcessingMode {
    fn par_map<I, T, F>(&self, tasks: Vec<I>, f: F) -> Result<Vec<T>>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> T + Sync + Send,
    {
        let workers = self.workers()?;
        if workers <= 1 || tasks.len() <= 1 {
            return Ok(tasks.into_iter().map(f).collect());
        }

        debug!(workers, tasks = tasks.len(), "dispatching tasks to worker pool");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| Error::WorkerPool(e.to_string()))?;
        Ok(pool.install(|| tasks.into_par_iter().map(f).collect()))
    }
}

/// Default worker count: one less than the available CPUs, at least one
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_preserves_order() {
        let out = ProcessingMode::Sequential
            .par_map((0..10).collect(), |i: usize| i * 2)
            .unwrap();
        assert_eq!(out, (0..10).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_parallel_preserves_order() {
        let out = ProcessingMode::ParallelWith(3)
            .par_map((0..100).collect(), |i: usize| i * i)
            .unwrap();
        assert_eq!(out, (0..100).map(|i| i * i).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = ProcessingMode::ParallelWith(0).par_map(vec![1, 2], |i: i32| i);
        assert!(matches!(result, Err(Error::InvalidParameter { name: "workers", .. })));
    }

    #[test]
    fn test_default_workers_positive() {
        assert!(default_workers() >= 1);
        assert!(ProcessingMode::Parallel.workers().unwrap() >= 1);
    }

    #[test]
    fn test_nested_call_runs_sequentially() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let workers = pool.install(|| ProcessingMode::ParallelWith(4).workers().unwrap());
        assert_eq!(workers, 1);
    }
}
