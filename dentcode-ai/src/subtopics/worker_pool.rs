//! Per-call worker pool for blocking activations
//!
//! A pool is built for one fan-out and dropped when that fan-out completes.
//! Dropping never waits: threads finish whatever job they hold (including
//! jobs whose caller already gave up on a timeout) and then exit on their own.

use crate::types::{ActivationError, ActivationOutcome, BlockingActivation};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::oneshot;

pub(crate) type JobResult = Result<ActivationOutcome, ActivationError>;

/// Bounded thread pool owned by a single `activate_all` call
pub(crate) struct WorkerPool {
    pool: rayon::ThreadPool,
    size: usize,
}

impl WorkerPool {
    pub(crate) fn new(size: usize) -> Result<Self, ActivationError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|idx| format!("subtopic-worker-{idx}"))
            .build()
            .map_err(|e| ActivationError::WorkerPool(e.to_string()))?;
        Ok(Self { pool, size })
    }

    pub(crate) fn size(&self) -> usize {
        self.size
    }

    /// Queue one activation; the receiver yields its result
    ///
    /// Errors and panics inside the activation are captured per job.
    pub(crate) fn submit(
        &self,
        activation: Arc<dyn BlockingActivation>,
        scenario: String,
    ) -> oneshot::Receiver<JobResult> {
        let (tx, rx) = oneshot::channel();
        self.pool.spawn(move || {
            let result = match panic::catch_unwind(AssertUnwindSafe(|| activation.activate(&scenario))) {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(e)) => Err(ActivationError::Failed(format!("{e:#}"))),
                Err(payload) => Err(ActivationError::Panicked(panic_message(payload.as_ref()))),
            };
            // Receiver is gone when the caller timed out
            let _ = tx.send(result);
        });
        rx
    }
}

/// Pool size: `min(selected, available parallelism, ceiling)`, at least 1
pub fn pool_size(selected: usize, ceiling: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    selected.min(cpus).min(ceiling).max(1)
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
