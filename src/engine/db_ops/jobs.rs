//! SQLite-backed job store.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::{JobMetadata, JobRecord, JobStatus, StatusUpdate};

use super::connection::{open_db, open_db_in_memory};
use super::{INSERT_JOB_SQL, JobStore, SET_STATUS_SQL};

fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn from_micros(us: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us).with_context(|| format!("timestamp out of range: {us}"))
}

fn opt_from_micros(us: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    us.map(from_micros).transpose()
}

/// Job store over one SQLite connection. Open one per handler process.
pub struct SqliteJobStore {
    conn: Connection,
    /// `None` for in-memory stores.
    path: Option<PathBuf>,
}

impl SqliteJobStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: open_db(path)?,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: open_db_in_memory()?,
            path: None,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Insert a new PENDING job and return its id.
    ///
    /// Submission timestamps are unique and strictly increasing, so a poller scanning
    /// strictly after its watermark never skips a job submitted in the same microsecond.
    pub fn submit_job(
        &self,
        input_type: &str,
        input_config: &Value,
        output_config: &Map<String, Value>,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let input_json = serde_json::to_string(input_config).context("serialize input config")?;
        let output_json =
            serde_json::to_string(output_config).context("serialize output config")?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("begin submit transaction")?;
        let last: Option<i64> = tx
            .query_row("SELECT MAX(submission_timestamp) FROM jobs", [], |row| {
                row.get(0)
            })
            .context("read latest submission timestamp")?;
        let now = to_micros(Utc::now());
        let ts = match last {
            Some(last) if last >= now => last + 1,
            _ => now,
        };
        tx.execute(
            INSERT_JOB_SQL,
            params![
                id,
                JobStatus::Pending.as_str(),
                input_type,
                input_json,
                output_json,
                ts
            ],
        )
        .context("insert job")?;
        tx.commit().context("commit submit transaction")?;
        Ok(id)
    }

    /// Ask for a PENDING job to be cancelled. `Ok(false)` if it was no longer PENDING.
    pub fn request_cancellation(&self, job_id: &str) -> Result<bool> {
        self.set_job_status(
            job_id,
            JobStatus::Cancelling,
            JobStatus::Pending,
            StatusUpdate::default(),
        )
    }

    pub fn get_job(&self, job_id: &str) -> Result<JobRecord> {
        type Row = (
            String,
            String,
            i64,
            Option<i64>,
            Option<i64>,
            bool,
            i64,
            Option<i64>,
        );
        let row: Option<Row> = self
            .conn
            .query_row(
                "SELECT status, input_type, submission_timestamp, begin_timestamp, end_timestamp, \
                 errors, progression, last_progress_timestamp FROM jobs WHERE id = ?1",
                [job_id],
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get(3)?,
                        r.get(4)?,
                        r.get(5)?,
                        r.get(6)?,
                        r.get(7)?,
                    ))
                },
            )
            .optional()
            .context("query job")?;
        let Some((status, input_type, submitted, begun, ended, errors, progression, progressed)) =
            row
        else {
            bail!("job {job_id} not found");
        };
        Ok(JobRecord {
            id: job_id.to_string(),
            status: status.parse()?,
            input_type,
            submission_timestamp: from_micros(submitted)?,
            begin_timestamp: opt_from_micros(begun)?,
            end_timestamp: opt_from_micros(ended)?,
            errors,
            progression: progression.max(0) as u64,
            last_progress_timestamp: opt_from_micros(progressed)?,
        })
    }
}

impl JobStore for SqliteJobStore {
    fn get_job_metadata(&self, job_id: &str) -> Result<JobMetadata> {
        let row: Option<(String, String, String)> = self
            .conn
            .query_row(
                "SELECT input_type, input_config, output_config FROM jobs WHERE id = ?1",
                [job_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()
            .context("query job metadata")?;
        let Some((input_type, input_json, output_json)) = row else {
            bail!("job {job_id} not found");
        };
        let input_config: Value = serde_json::from_str(&input_json)
            .with_context(|| format!("job {job_id}: input config is not valid JSON"))?;
        let output_config = match serde_json::from_str(&output_json)
            .with_context(|| format!("job {job_id}: output config is not valid JSON"))?
        {
            Value::Object(map) => map,
            other => bail!("job {job_id}: output config must be an object, got {other}"),
        };
        Ok(JobMetadata {
            input_type,
            input_config,
            output_config,
        })
    }

    fn get_jobs_after_timestamp(
        &self,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT id, status FROM jobs \
                 WHERE ?1 IS NULL OR submission_timestamp > ?1 \
                 ORDER BY submission_timestamp",
            )
            .context("prepare job scan")?;
        let rows = stmt
            .query_map([watermark.map(to_micros)], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .context("scan jobs")?;
        rows.map(|row| row.context("read job row")).collect()
    }

    fn get_job_submission_timestamp(&self, job_id: &str) -> Result<DateTime<Utc>> {
        let us: Option<i64> = self
            .conn
            .query_row(
                "SELECT submission_timestamp FROM jobs WHERE id = ?1",
                [job_id],
                |r| r.get(0),
            )
            .optional()
            .context("query submission timestamp")?;
        match us {
            Some(us) => from_micros(us),
            None => bail!("job {job_id} not found"),
        }
    }

    fn set_job_status(
        &self,
        job_id: &str,
        new_status: JobStatus,
        prev_status: JobStatus,
        update: StatusUpdate,
    ) -> Result<bool> {
        prev_status.check_transition(new_status)?;
        let changed = self
            .conn
            .execute(
                SET_STATUS_SQL,
                params![
                    new_status.as_str(),
                    update.begin_timestamp.map(to_micros),
                    update.end_timestamp.map(to_micros),
                    update.errors,
                    job_id,
                    prev_status.as_str(),
                ],
            )
            .with_context(|| format!("set status of job {job_id} to {new_status}"))?;
        Ok(changed == 1)
    }

    fn update_job_progression(&self, job_id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE jobs SET progression = progression + 1, last_progress_timestamp = ?1 \
                 WHERE id = ?2",
                params![to_micros(Utc::now()), job_id],
            )
            .context("update job progression")?;
        if changed == 0 {
            bail!("job {job_id} not found");
        }
        Ok(())
    }

    fn get_db_config(&self) -> Map<String, Value> {
        let path = self
            .path
            .as_deref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| ":memory:".to_string());
        let mut config = Map::new();
        config.insert("type".into(), "sqlite".into());
        config.insert("path".into(), path.into());
        config
    }
}
