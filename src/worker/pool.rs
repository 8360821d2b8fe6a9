//! Local worker pool: sub-jobs run on a dedicated rayon pool, results come back over a channel.

use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use log::error;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::SubJobDescriptor;

use super::{BatchHandle, SubJobExecutor, SubJobOutcome, WorkerPool};

/// Runs sub-jobs concurrently with a fixed number of threads.
pub struct LocalWorkerPool {
    pool: rayon::ThreadPool,
    executor: Arc<dyn SubJobExecutor>,
}

impl LocalWorkerPool {
    pub fn new(executor: Arc<dyn SubJobExecutor>, num_threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .thread_name(|i| format!("{}-worker-{}", env!("CARGO_PKG_NAME"), i))
            .build()
            .context("build worker thread pool")?;
        Ok(Self { pool, executor })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Run one sub-job; a panicking executor becomes [`SubJobOutcome::Errored`].
fn run_sub_job(executor: &dyn SubJobExecutor, sub_job: &SubJobDescriptor) -> SubJobOutcome {
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| executor.execute(sub_job))) {
        Ok(Ok(true)) => SubJobOutcome::Succeeded,
        Ok(Ok(false)) => SubJobOutcome::Failed,
        Ok(Err(e)) => SubJobOutcome::Errored(format!("{e:#}")),
        Err(payload) => SubJobOutcome::Errored(format!("panicked: {}", panic_message(&*payload))),
    };
    match &outcome {
        SubJobOutcome::Succeeded => {}
        SubJobOutcome::Failed => error!("Sub-job {} failed", sub_job.id()),
        SubJobOutcome::Errored(msg) => error!("Sub-job {} errored: {}", sub_job.id(), msg),
    }
    outcome
}

impl WorkerPool for LocalWorkerPool {
    fn submit_batch(&self, sub_jobs: Vec<SubJobDescriptor>) -> Result<Box<dyn BatchHandle>> {
        let (tx, rx) = unbounded();
        let len = sub_jobs.len();
        for (slot, sub_job) in sub_jobs.into_iter().enumerate() {
            let tx = tx.clone();
            let executor = Arc::clone(&self.executor);
            self.pool.spawn(move || {
                let outcome = run_sub_job(executor.as_ref(), &sub_job);
                let _ = tx.send((slot, outcome));
            });
        }
        Ok(Box::new(LocalBatchHandle::new(rx, len)))
    }
}

/// Collects `(slot, outcome)` pairs; partial results are kept across [`BatchHandle::try_collect`] calls.
pub struct LocalBatchHandle {
    rx: Receiver<(usize, SubJobOutcome)>,
    results: Vec<Option<SubJobOutcome>>,
    remaining: usize,
}

impl LocalBatchHandle {
    fn new(rx: Receiver<(usize, SubJobOutcome)>, len: usize) -> Self {
        Self {
            rx,
            results: vec![None; len],
            remaining: len,
        }
    }
}

impl BatchHandle for LocalBatchHandle {
    fn len(&self) -> usize {
        self.results.len()
    }

    fn try_collect(&mut self, timeout: Duration) -> Result<Option<Vec<SubJobOutcome>>> {
        let deadline = Instant::now() + timeout;
        while self.remaining > 0 {
            match self.rx.recv_deadline(deadline) {
                Ok((slot, outcome)) => {
                    let Some(entry) = self.results.get_mut(slot) else {
                        bail!("worker reported unknown sub-job slot {slot}");
                    };
                    if entry.replace(outcome).is_none() {
                        self.remaining -= 1;
                    }
                }
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    bail!("worker pool dropped {} unfinished sub-jobs", self.remaining)
                }
            }
        }
        Ok(Some(self.results.iter().flatten().cloned().collect()))
    }
}
