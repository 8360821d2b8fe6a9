//! Worker pool contract and the local implementation.
//!
//! The coordinator submits all sub-jobs of a job as one batch and polls the returned
//! [`BatchHandle`] with a bounded wait until every member has resolved.

pub mod compress;
pub mod pool;

pub use compress::{CommandCompressor, compressor_args};
pub use pool::{LocalBatchHandle, LocalWorkerPool};

use anyhow::Result;
use std::time::Duration;

use crate::SubJobDescriptor;

/// Result of one sub-job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubJobOutcome {
    Succeeded,
    /// The compressor ran and reported failure.
    Failed,
    /// The sub-job could not run to completion (spawn error, panic, I/O).
    Errored(String),
}

impl SubJobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SubJobOutcome::Succeeded)
    }
}

/// Runs one sub-job to completion on the calling thread.
/// `Ok(false)` is a failure reported by the compressor; `Err` means it could not run.
pub trait SubJobExecutor: Send + Sync {
    fn execute(&self, sub_job: &SubJobDescriptor) -> Result<bool>;
}

/// Handle on one submitted batch.
pub trait BatchHandle {
    /// Number of sub-jobs in the batch.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait at most `timeout` for the batch. `Ok(None)` means some sub-jobs are still running;
    /// call again. Once complete, returns one outcome per sub-job in submission order.
    /// `Err` means results can no longer be retrieved.
    fn try_collect(&mut self, timeout: Duration) -> Result<Option<Vec<SubJobOutcome>>>;
}

pub trait WorkerPool {
    /// Start every sub-job of `sub_jobs` as one batch.
    fn submit_batch(&self, sub_jobs: Vec<SubJobDescriptor>) -> Result<Box<dyn BatchHandle>>;
}
