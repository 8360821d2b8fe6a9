//! Per-job record of input paths that could not be used.

use log::{error, warn};
use std::path::PathBuf;

use crate::error::PathError;

/// Path validation errors of one job. Each is logged when recorded; none aborts the job.
#[derive(Debug)]
pub struct ValidationErrors {
    job_id: String,
    entries: Vec<(Option<PathBuf>, String)>,
}

impl ValidationErrors {
    pub fn new(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, err: PathError) {
        error!("Job {}: {}", self.job_id, err);
        let path = match &err {
            PathError::NotFound(p) | PathError::Unsupported(p) => Some(p.clone()),
            PathError::OutsideRoot { path, .. }
            | PathError::Io { path, .. }
            | PathError::Walk { path, .. } => Some(path.clone()),
        };
        self.entries.push((path, err.to_string()));
    }

    /// Record a walk error, which may not name a path.
    pub fn record_walk(&mut self, msg: String, path: Option<PathBuf>) {
        match path {
            Some(path) => self.record(PathError::Walk { path, msg }),
            None => {
                error!("Job {}: {}", self.job_id, msg);
                self.entries.push((None, msg));
            }
        }
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(Option<PathBuf>, String)] {
        &self.entries
    }

    /// Log a one-line total when any path failed.
    pub fn summarize(&self) {
        if !self.is_empty() {
            warn!(
                "Job {}: skipped {} input paths that failed validation",
                self.job_id,
                self.count()
            );
        }
    }
}
