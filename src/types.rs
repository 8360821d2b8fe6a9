//! Public and internal types for the job store, the coordinator, and the worker pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::engine::tools::estimate_uncompressed_size;
use crate::error::TransitionError;
use crate::utils::config::{OutputDefaults, WorkerThreadLimits};

/// The only input type the coordinator knows how to partition.
pub const FS_INPUT_TYPE: &str = "fs";

/// Persisted lifecycle status of a job.
///
/// Every change away from a status is a compare-and-swap on the expected previous status,
/// see [`JobStore::set_job_status`](crate::engine::db_ops::JobStore::set_job_status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Submitted, waiting for a handler to pick it up.
    Pending,
    /// Claimed by a handler; sub-jobs may be in flight.
    Running,
    /// Cancellation requested by an external actor.
    Cancelling,
    /// Cancellation confirmed by a handler.
    Cancelled,
    /// All sub-jobs succeeded (possibly with path validation errors, see `errors`).
    Done,
    /// Configuration error or at least one failed sub-job.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Cancelling => "CANCELLING",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Cancelled | JobStatus::Done | JobStatus::Failed
        )
    }

    /// True if `self -> target` is an edge of the lifecycle.
    /// `PENDING -> CANCELLING` is the submitter-side cancellation request; the rest belong to the handler.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        matches!(
            (self, target),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelling)
                | (JobStatus::Cancelling, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Done)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn check_transition(&self, target: JobStatus) -> Result<(), TransitionError> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition {
                from: *self,
                to: target,
            })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "CANCELLING" => Ok(JobStatus::Cancelling),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            "DONE" => Ok(JobStatus::Done),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(TransitionError::UnknownStatus(other.to_string())),
        }
    }
}

/// Result of running one job through the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    /// Every sub-job succeeded but at least one input path failed validation.
    SuccessWithErrors,
    Failed,
}

impl JobOutcome {
    pub fn from_results(all_sub_jobs_successful: bool, validation_failed: bool) -> Self {
        match (all_sub_jobs_successful, validation_failed) {
            (false, _) => JobOutcome::Failed,
            (true, true) => JobOutcome::SuccessWithErrors,
            (true, false) => JobOutcome::Success,
        }
    }

    /// Status and `errors` flag persisted for this outcome.
    pub fn terminal_status(&self) -> (JobStatus, bool) {
        match self {
            JobOutcome::Success => (JobStatus::Done, false),
            JobOutcome::SuccessWithErrors => (JobStatus::Done, true),
            JobOutcome::Failed => (JobStatus::Failed, false),
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobOutcome::Success => "SUCCESS",
            JobOutcome::SuccessWithErrors => "SUCCESS_WITH_ERRORS",
            JobOutcome::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Optional columns written together with a status change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub begin_timestamp: Option<DateTime<Utc>>,
    pub end_timestamp: Option<DateTime<Utc>>,
    pub errors: Option<bool>,
}

impl StatusUpdate {
    pub fn begun(at: DateTime<Utc>) -> Self {
        Self {
            begin_timestamp: Some(at),
            ..Self::default()
        }
    }

    pub fn ended(at: DateTime<Utc>, errors: bool) -> Self {
        Self {
            end_timestamp: Some(at),
            errors: Some(errors),
            ..Self::default()
        }
    }
}

/// Raw job metadata as stored. Parsed by the coordinator, so a malformed job only fails itself.
#[derive(Debug, Clone)]
pub struct JobMetadata {
    pub input_type: String,
    pub input_config: Value,
    pub output_config: Map<String, Value>,
}

/// Full job row, for inspection by submitters and tests.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub input_type: String,
    pub submission_timestamp: DateTime<Utc>,
    pub begin_timestamp: Option<DateTime<Utc>>,
    pub end_timestamp: Option<DateTime<Utc>>,
    pub errors: bool,
    /// Number of progress reports recorded by the handler.
    pub progression: u64,
    pub last_progress_timestamp: Option<DateTime<Utc>>,
}

/// `input_config` of an `fs` job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Paths to compress, in submission order. Blank entries are skipped.
    pub paths: Vec<String>,
    /// Prefix the compressor strips from stored paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix_to_remove: Option<String>,
}

/// Resolved `output_config`: the job's own keys merged over the handler's defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub target_archive_size: u64,
    #[serde(rename = "target_archive_dictionaries_data_size")]
    pub target_dictionaries_size: u64,
    pub target_encoded_file_size: u64,
    pub target_segment_size: u64,
    pub archives_dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_num_archives: Option<u64>,
}

/// Fill keys missing from the job's output config with the handler's defaults. Keys the job sets are never overwritten.
pub fn merge_output_defaults(
    mut job: Map<String, Value>,
    defaults: &Map<String, Value>,
) -> Map<String, Value> {
    for (key, value) in defaults {
        job.entry(key.clone()).or_insert_with(|| value.clone());
    }
    job
}

impl OutputConfig {
    /// Merge and parse. Every target size must be greater than 0.
    pub fn resolve(job: Map<String, Value>, defaults: &Map<String, Value>) -> crate::Result<Self> {
        let config: Self =
            serde_json::from_value(Value::Object(merge_output_defaults(job, defaults)))?;
        let sizes = [
            ("target_archive_size", config.target_archive_size),
            (
                "target_archive_dictionaries_data_size",
                config.target_dictionaries_size,
            ),
            ("target_encoded_file_size", config.target_encoded_file_size),
            ("target_segment_size", config.target_segment_size),
        ];
        for (key, value) in sizes {
            if value == 0 {
                anyhow::bail!("{key} must be greater than 0");
            }
        }
        Ok(config)
    }

    /// Requested archive count, when the job asked for one. Zero means "not requested".
    pub fn fixed_archive_count(&self) -> Option<u64> {
        self.target_num_archives.filter(|n| *n > 0)
    }
}

/// A validated regular file, consumed once by the partition buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub path: PathBuf,
    /// On-disk size in bytes.
    pub size: u64,
    /// Size used for partitioning; larger than `size` for compressed inputs.
    pub estimated_uncompressed_size: u64,
}

impl FileDescriptor {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        let estimated_uncompressed_size = estimate_uncompressed_size(&path, size);
        Self {
            path,
            size,
            estimated_uncompressed_size,
        }
    }
}

/// An empty directory that must still appear in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyDirectoryMarker(pub PathBuf);

impl EmptyDirectoryMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// One unit of work for the worker pool. Never mutated after the partition buffer emits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubJobDescriptor {
    pub job_id: String,
    /// Position in the job's batch (0-based, emission order).
    pub index: usize,
    pub files: Vec<FileDescriptor>,
    pub empty_directories: Vec<EmptyDirectoryMarker>,
    pub path_prefix_to_remove: Option<String>,
    pub output_config: OutputConfig,
    /// Passed through to the worker untouched (e.g. database connection parameters).
    pub worker_base_arguments: Map<String, Value>,
}

impl SubJobDescriptor {
    pub fn id(&self) -> String {
        format!("{}-{}", self.job_id, self.index)
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.estimated_uncompressed_size).sum()
    }
}

/// Optional archive database handed to workers alongside the job store's own config.
#[derive(Clone, Debug, Default)]
pub struct ArchiveDbOpts {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
}

/// Process options (CLI + settings file), parsed once at startup.
#[derive(Clone, Debug)]
pub struct Opts {
    /// Job store database file.
    pub db_path: PathBuf,
    pub target_archive_size: i64,
    pub target_dictionaries_size: i64,
    pub target_encoded_file_size: i64,
    pub target_segment_size: i64,
    pub progress_reporting_disabled: bool,
    /// Every input path is anchored under, and must stay within, this directory.
    pub input_root: PathBuf,
    /// Compressor binary run by each sub-job.
    pub compressor_bin: PathBuf,
    pub num_workers: usize,
    pub archive_db: ArchiveDbOpts,
    pub verbose: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(OutputDefaults::DB_FILENAME),
            target_archive_size: OutputDefaults::TARGET_ARCHIVE_SIZE,
            target_dictionaries_size: OutputDefaults::TARGET_DICTIONARIES_SIZE,
            target_encoded_file_size: OutputDefaults::TARGET_ENCODED_FILE_SIZE,
            target_segment_size: OutputDefaults::TARGET_SEGMENT_SIZE,
            progress_reporting_disabled: false,
            input_root: PathBuf::from(OutputDefaults::INPUT_ROOT),
            compressor_bin: PathBuf::from(OutputDefaults::COMPRESSOR_BIN),
            num_workers: WorkerThreadLimits::current().all_threads,
            archive_db: ArchiveDbOpts {
                port: OutputDefaults::ARCHIVE_DB_PORT,
                ..ArchiveDbOpts::default()
            },
            verbose: false,
        }
    }
}

impl Opts {
    /// Reject non-positive target sizes.
    pub fn validate(&self) -> crate::Result<()> {
        let sizes = [
            ("--target-archive-size", self.target_archive_size),
            (
                "--target-archive-dictionaries-data-size",
                self.target_dictionaries_size,
            ),
            ("--target-encoded-file-size", self.target_encoded_file_size),
            ("--target-segment-size", self.target_segment_size),
        ];
        for (flag, value) in sizes {
            if value <= 0 {
                anyhow::bail!("{flag} must be greater than 0 (got {value}).");
            }
        }
        Ok(())
    }

    /// Handler-wide output config merged under every job's own `output_config`.
    pub fn output_defaults(&self, archives_dir: &Path) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            "target_archive_size".into(),
            self.target_archive_size.into(),
        );
        map.insert(
            "target_archive_dictionaries_data_size".into(),
            self.target_dictionaries_size.into(),
        );
        map.insert(
            "target_encoded_file_size".into(),
            self.target_encoded_file_size.into(),
        );
        map.insert(
            "target_segment_size".into(),
            self.target_segment_size.into(),
        );
        map.insert(
            "archives_dir".into(),
            archives_dir.to_string_lossy().into_owned().into(),
        );
        map
    }
}
