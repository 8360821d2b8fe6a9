//! Job lifecycle poller: discover new jobs, claim them with compare-and-swap, run them one at a
//! time, and persist the terminal status.
//!
//! Cancellation only takes effect before a job starts: a RUNNING job always runs to the end.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::{JobOutcome, JobStatus, StatusUpdate};

use super::context::OrchestratorContext;
use super::coordinator::handle_job;

pub struct JobPoller<'a> {
    ctx: OrchestratorContext<'a>,
    /// Latest submission timestamp observed; the next scan starts strictly after it.
    watermark: Option<DateTime<Utc>>,
}

impl<'a> JobPoller<'a> {
    pub fn new(ctx: OrchestratorContext<'a>) -> Self {
        Self {
            ctx,
            watermark: None,
        }
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    pub fn context(&self) -> &OrchestratorContext<'a> {
        &self.ctx
    }

    /// Scan until `shutdown` is set. Sleeps after a scan that handled no job.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::Relaxed) {
            let handled = match self.poll_once() {
                Ok(n) => n,
                Err(e) => {
                    error!("Failed to scan for jobs: {:#}", e);
                    0
                }
            };
            if handled == 0 && !shutdown.load(Ordering::Relaxed) {
                debug!("No new jobs; sleeping {:?}", self.ctx.intervals.scan_interval);
                thread::sleep(self.ctx.intervals.scan_interval);
            }
        }
    }

    /// One scan: handle every job submitted after the watermark, in submission order.
    ///
    /// The watermark moves past each job as soon as it is observed. A job the store could not
    /// claim or cancel is handed back: the watermark returns to just before it and the scan
    /// stops, so the next scan starts with that job. Returns the number of jobs handled.
    pub fn poll_once(&mut self) -> Result<usize> {
        let jobs = self.ctx.store.get_jobs_after_timestamp(self.watermark)?;
        let mut handled = 0;
        for (job_id, raw_status) in &jobs {
            let submitted = self.ctx.store.get_job_submission_timestamp(job_id)?;
            let previous = self.watermark;
            self.watermark = Some(previous.map_or(submitted, |w| w.max(submitted)));
            match raw_status.parse::<JobStatus>() {
                Ok(status) => {
                    if let Err(e) = self.process_job(job_id, status) {
                        warn!("Job {}: {:#}; retrying on the next scan", job_id, e);
                        self.watermark = previous;
                        break;
                    }
                }
                Err(e) => error!("Job {}: {}; skipping", job_id, e),
            }
            handled += 1;
        }
        Ok(handled)
    }

    /// `Err` means the store failed before the job changed hands; the job is still eligible.
    fn process_job(&self, job_id: &str, status: JobStatus) -> Result<()> {
        match status {
            JobStatus::Cancelling => self.confirm_cancellation(job_id),
            JobStatus::Pending => self.start_job(job_id),
            // Already claimed by a handler or finished.
            _ => {
                debug!("Job {}: skipping, status {}", job_id, status);
                Ok(())
            }
        }
    }

    fn confirm_cancellation(&self, job_id: &str) -> Result<()> {
        let update = StatusUpdate {
            end_timestamp: Some(Utc::now()),
            ..StatusUpdate::default()
        };
        let confirmed = self
            .ctx
            .store
            .set_job_status(job_id, JobStatus::Cancelled, JobStatus::Cancelling, update)
            .context("failed to cancel")?;
        if confirmed {
            info!("Confirmed cancellation for job {}", job_id);
        } else {
            warn!("Failed to cancel job {}: no longer CANCELLING", job_id);
        }
        Ok(())
    }

    fn start_job(&self, job_id: &str) -> Result<()> {
        let claimed = self
            .ctx
            .store
            .set_job_status(
                job_id,
                JobStatus::Running,
                JobStatus::Pending,
                StatusUpdate::begun(Utc::now()),
            )
            .context("failed to mark as RUNNING")?;
        if !claimed {
            warn!(
                "Failed to mark job {} as RUNNING; cancellation was probably requested",
                job_id
            );
            return self.confirm_cancellation(job_id);
        }

        let outcome = handle_job(&self.ctx, job_id);
        self.finish_job(job_id, outcome);
        Ok(())
    }

    /// Persist the terminal status. A job that is no longer RUNNING here means another writer
    /// broke the lifecycle; it is logged and left as found.
    fn finish_job(&self, job_id: &str, outcome: JobOutcome) {
        let (status, errors) = outcome.terminal_status();
        match self.ctx.store.set_job_status(
            job_id,
            status,
            JobStatus::Running,
            StatusUpdate::ended(Utc::now(), errors),
        ) {
            Ok(true) => {}
            Ok(false) => error!(
                "Internal inconsistency: job {} finished with {} but is no longer RUNNING",
                job_id, outcome
            ),
            Err(e) => error!("Failed to persist status {} for job {}: {:#}", status, job_id, e),
        }
    }
}
