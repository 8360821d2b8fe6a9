#![allow(dead_code)]

//! Shared fakes for integration tests: scripted worker pools, store wrappers, and fixtures.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use compression_job_handler::engine::{JobStore, SqliteJobStore};
use compression_job_handler::pipeline::{HandlerSettings, PollIntervals};
use compression_job_handler::worker::{BatchHandle, SubJobExecutor, SubJobOutcome, WorkerPool};
use compression_job_handler::{
    FS_INPUT_TYPE, FileDescriptor, JobMetadata, JobStatus, OutputConfig, StatusUpdate,
    SubJobDescriptor,
};
use serde_json::{Map, Value, json};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// --- fixtures ---

pub fn write_file(dir: &Path, rel: &str, size: usize) -> PathBuf {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, vec![b'x'; size]).unwrap();
    path
}

pub fn output_config(target_archive_size: u64, archives_dir: &Path) -> OutputConfig {
    OutputConfig {
        target_archive_size,
        target_dictionaries_size: 10,
        target_encoded_file_size: 10,
        target_segment_size: 10,
        archives_dir: archives_dir.to_path_buf(),
        target_num_archives: None,
    }
}

pub fn file(path: &str, size: u64) -> FileDescriptor {
    FileDescriptor::new(path, size)
}

pub fn output_defaults(archives_dir: &Path) -> Map<String, Value> {
    json!({
        "target_archive_size": 1_000_000,
        "target_archive_dictionaries_data_size": 1000,
        "target_encoded_file_size": 1000,
        "target_segment_size": 1000,
        "archives_dir": archives_dir.to_string_lossy(),
    })
    .as_object()
    .unwrap()
    .clone()
}

pub fn settings(input_root: &Path, archives_dir: &Path) -> HandlerSettings {
    let mut worker_base_arguments = Map::new();
    worker_base_arguments.insert("db_config".into(), json!({"type": "sqlite", "path": ":memory:"}));
    HandlerSettings {
        input_root: input_root.to_path_buf(),
        output_defaults: output_defaults(archives_dir),
        worker_base_arguments,
        progress_reporting_disabled: false,
    }
}

pub fn fast_intervals() -> PollIntervals {
    PollIntervals {
        scan_interval: Duration::from_millis(1),
        batch_poll_interval: Duration::from_millis(1),
        collect_timeout: Duration::from_millis(1),
    }
}

/// Submit an `fs` job over `paths` with the given output config overrides.
pub fn submit_fs_job(store: &SqliteJobStore, paths: &[&str], output: Value) -> String {
    let output = output.as_object().cloned().unwrap_or_default();
    store
        .submit_job(FS_INPUT_TYPE, &json!({ "paths": paths }), &output)
        .unwrap()
}

// --- worker pool fakes ---

#[derive(Clone, Debug)]
pub enum PoolBehavior {
    AllSucceed,
    FailIndices(Vec<usize>),
    ErrorIndices(Vec<usize>),
    CollectError,
    SubmitError,
}

/// Worker pool that records every batch and answers from a script instead of running anything.
pub struct ScriptedPool {
    behavior: PoolBehavior,
    not_ready_polls: usize,
    submitted: RefCell<Vec<Vec<SubJobDescriptor>>>,
}

impl ScriptedPool {
    pub fn new(behavior: PoolBehavior) -> Self {
        Self {
            behavior,
            not_ready_polls: 0,
            submitted: RefCell::new(Vec::new()),
        }
    }

    /// Report "not ready" this many times before returning results.
    pub fn with_not_ready_polls(mut self, n: usize) -> Self {
        self.not_ready_polls = n;
        self
    }

    pub fn batches(&self) -> Vec<Vec<SubJobDescriptor>> {
        self.submitted.borrow().clone()
    }

    pub fn total_submitted(&self) -> usize {
        self.submitted.borrow().iter().map(Vec::len).sum()
    }
}

impl WorkerPool for ScriptedPool {
    fn submit_batch(&self, sub_jobs: Vec<SubJobDescriptor>) -> Result<Box<dyn BatchHandle>> {
        if matches!(self.behavior, PoolBehavior::SubmitError) {
            bail!("broker unavailable");
        }
        let outcomes = (0..sub_jobs.len())
            .map(|i| match &self.behavior {
                PoolBehavior::FailIndices(idx) if idx.contains(&i) => SubJobOutcome::Failed,
                PoolBehavior::ErrorIndices(idx) if idx.contains(&i) => {
                    SubJobOutcome::Errored("worker lost".into())
                }
                _ => SubJobOutcome::Succeeded,
            })
            .collect();
        self.submitted.borrow_mut().push(sub_jobs);
        Ok(Box::new(ScriptedHandle {
            outcomes,
            not_ready: self.not_ready_polls,
            collect_error: matches!(self.behavior, PoolBehavior::CollectError),
        }))
    }
}

pub struct ScriptedHandle {
    outcomes: Vec<SubJobOutcome>,
    not_ready: usize,
    collect_error: bool,
}

impl BatchHandle for ScriptedHandle {
    fn len(&self) -> usize {
        self.outcomes.len()
    }

    fn try_collect(&mut self, _timeout: Duration) -> Result<Option<Vec<SubJobOutcome>>> {
        if self.not_ready > 0 {
            self.not_ready -= 1;
            return Ok(None);
        }
        if self.collect_error {
            bail!("result backend unreachable");
        }
        Ok(Some(self.outcomes.clone()))
    }
}

/// Executor backed by a closure.
pub struct FnExecutor<F>(pub F);

impl<F> SubJobExecutor for FnExecutor<F>
where
    F: Fn(&SubJobDescriptor) -> Result<bool> + Send + Sync,
{
    fn execute(&self, sub_job: &SubJobDescriptor) -> Result<bool> {
        (self.0)(sub_job)
    }
}

// --- store wrappers ---

/// Delegates to a real store, with hooks to simulate other actors.
pub struct InterposedStore<'a> {
    pub inner: &'a SqliteJobStore,
    /// Request cancellation right before the handler tries to claim the job.
    pub cancel_before_claim: bool,
    /// Statuses reported by scans instead of the stored ones (stale reads).
    pub scan_overrides: HashMap<String, JobStatus>,
    /// Refuse every terminal transition without writing.
    pub deny_terminal: bool,
    /// Number of upcoming claims (`PENDING -> RUNNING`) that fail as if the database were locked.
    pub failing_claims: Cell<usize>,
    /// Job whose next submission timestamp lookup fails.
    pub failing_timestamp_lookup: RefCell<Option<String>>,
    pub scans: Cell<usize>,
}

impl<'a> InterposedStore<'a> {
    pub fn new(inner: &'a SqliteJobStore) -> Self {
        Self {
            inner,
            cancel_before_claim: false,
            scan_overrides: HashMap::new(),
            deny_terminal: false,
            failing_claims: Cell::new(0),
            failing_timestamp_lookup: RefCell::new(None),
            scans: Cell::new(0),
        }
    }
}

impl JobStore for InterposedStore<'_> {
    fn get_job_metadata(&self, job_id: &str) -> Result<JobMetadata> {
        self.inner.get_job_metadata(job_id)
    }

    fn get_jobs_after_timestamp(
        &self,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<Vec<(String, String)>> {
        self.scans.set(self.scans.get() + 1);
        let jobs = self.inner.get_jobs_after_timestamp(watermark)?;
        Ok(jobs
            .into_iter()
            .map(|(id, status)| match self.scan_overrides.get(&id) {
                Some(over) => (id, over.as_str().to_string()),
                None => (id, status),
            })
            .collect())
    }

    fn get_job_submission_timestamp(&self, job_id: &str) -> Result<DateTime<Utc>> {
        let mut failing = self.failing_timestamp_lookup.borrow_mut();
        if failing.as_deref() == Some(job_id) {
            *failing = None;
            bail!("database is locked");
        }
        self.inner.get_job_submission_timestamp(job_id)
    }

    fn set_job_status(
        &self,
        job_id: &str,
        new_status: JobStatus,
        prev_status: JobStatus,
        update: StatusUpdate,
    ) -> Result<bool> {
        if new_status == JobStatus::Running && self.failing_claims.get() > 0 {
            self.failing_claims.set(self.failing_claims.get() - 1);
            bail!("database is locked");
        }
        if self.cancel_before_claim && new_status == JobStatus::Running {
            self.inner.request_cancellation(job_id)?;
        }
        if self.deny_terminal && prev_status == JobStatus::Running {
            return Ok(false);
        }
        self.inner
            .set_job_status(job_id, new_status, prev_status, update)
    }

    fn update_job_progression(&self, job_id: &str) -> Result<()> {
        self.inner.update_job_progression(job_id)
    }

    fn get_db_config(&self) -> Map<String, Value> {
        self.inner.get_db_config()
    }
}
