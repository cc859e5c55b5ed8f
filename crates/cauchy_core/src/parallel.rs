//! Coarse-grained data parallelism for independent units of work: stability
//! grid cells, Richardson refinement levels, and batches of trajectories.
//!
//! Work is spread with rayon. Cancellation is cooperative and only observed
//! between units; a scheme step or Newton iteration always runs to completion.

use crate::error::{CauchyError, Result};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CauchyError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Bounded pool of worker threads. Any analysis run inside [`WorkerPool::install`]
/// uses at most `threads` workers.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(CauchyError::invalid("Worker pool needs at least one thread."));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|idx| format!("cauchy-worker-{idx}"))
            .build()
            .map_err(|err| CauchyError::invalid(format!("Failed to start worker pool: {err}")))?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

/// Maps `op` over `items` in parallel, keeping input order. Items not yet
/// started when `cancel` fires yield `Cancelled`.
pub(crate) fn map_cancellable<T, R, F>(items: &[T], cancel: &CancelToken, op: F) -> Vec<Result<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync,
{
    items
        .par_iter()
        .map(|item| {
            cancel.check()?;
            op(item)
        })
        .collect()
}
