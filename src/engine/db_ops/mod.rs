//! Job store: the contract the handler needs, plus its SQLite implementation.

mod connection;
mod jobs;

pub use connection::{open_db, open_db_in_memory};
pub use jobs::SqliteJobStore;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::{JobMetadata, JobStatus, StatusUpdate};

/// Persistent job metadata. The handler only reads jobs and moves their status.
///
/// Several handler processes may share one store; `set_job_status` is the only
/// mutual exclusion between them.
pub trait JobStore {
    /// Fails if the job is missing or its stored configuration is not valid JSON.
    fn get_job_metadata(&self, job_id: &str) -> Result<JobMetadata>;

    /// Jobs submitted strictly after `watermark` (all jobs for `None`), oldest first.
    /// Statuses come back as stored; the caller parses them so one bad row only affects itself.
    fn get_jobs_after_timestamp(
        &self,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<Vec<(String, String)>>;

    fn get_job_submission_timestamp(&self, job_id: &str) -> Result<DateTime<Utc>>;

    /// Compare-and-swap: move `job_id` from `prev_status` to `new_status`.
    /// `Ok(false)` means the persisted status was no longer `prev_status`.
    fn set_job_status(
        &self,
        job_id: &str,
        new_status: JobStatus,
        prev_status: JobStatus,
        update: StatusUpdate,
    ) -> Result<bool>;

    fn update_job_progression(&self, job_id: &str) -> Result<()>;

    /// Connection parameters handed to workers untouched.
    fn get_db_config(&self) -> Map<String, Value>;
}

/// WAL tuning pragmas. Use after PRAGMA journal_mode = WAL.
pub(crate) const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 1000;
        "#;

pub(crate) const INSERT_JOB_SQL: &str = "INSERT INTO jobs \
     (id, status, input_type, input_config, output_config, submission_timestamp) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

/// Conditional status update; the `status = ?6` guard is the compare-and-swap.
pub(crate) const SET_STATUS_SQL: &str = "UPDATE jobs SET status = ?1, \
     begin_timestamp = COALESCE(?2, begin_timestamp), \
     end_timestamp = COALESCE(?3, end_timestamp), \
     errors = COALESCE(?4, errors) \
     WHERE id = ?5 AND status = ?6";

/// Schema for the jobs table. Timestamps are microseconds since the Unix epoch.
pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    input_type TEXT NOT NULL,
    input_config TEXT NOT NULL,
    output_config TEXT NOT NULL,
    submission_timestamp INTEGER NOT NULL UNIQUE,
    begin_timestamp INTEGER,
    end_timestamp INTEGER,
    errors INTEGER NOT NULL DEFAULT 0,
    progression INTEGER NOT NULL DEFAULT 0,
    last_progress_timestamp INTEGER
);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
"#;
