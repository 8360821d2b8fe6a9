//! Partition buffer: group validated files and empty directories into size-balanced sub-jobs.
//!
//! Two modes:
//! - **streaming** ([`PartitionBuffer::add_file`]): flush whenever the open bucket reaches the
//!   trigger size (twice the target archive size by default), so at most one bucket is held;
//! - **fixed count** ([`PartitionBuffer::add_files`]): all files are known up front and split
//!   in one greedy pass into exactly the requested number of buckets, the last absorbing the
//!   remainder.
//!
//! Insertion order is kept within a bucket. Call [`PartitionBuffer::flush`] once at the end to
//! drain the open bucket.

use serde_json::{Map, Value};

use crate::utils::config::STREAMING_TRIGGER_FACTOR;
use crate::{EmptyDirectoryMarker, FileDescriptor, OutputConfig, SubJobDescriptor};

/// Fields shared by every sub-job of one job.
#[derive(Clone, Debug)]
pub struct SubJobTemplate {
    pub job_id: String,
    pub path_prefix_to_remove: Option<String>,
    pub output_config: OutputConfig,
    pub worker_base_arguments: Map<String, Value>,
}

/// Per-job partitioning state. Owned by one coordinator call and dropped after the final flush.
#[derive(Debug)]
pub struct PartitionBuffer {
    template: SubJobTemplate,
    trigger_size: u64,
    files: Vec<FileDescriptor>,
    empty_directories: Vec<EmptyDirectoryMarker>,
    pending_size: u64,
    sub_jobs: Vec<SubJobDescriptor>,
}

impl PartitionBuffer {
    /// Streaming trigger: `STREAMING_TRIGGER_FACTOR` times the template's target archive size.
    pub fn new(template: SubJobTemplate) -> Self {
        let trigger_size = template
            .output_config
            .target_archive_size
            .saturating_mul(STREAMING_TRIGGER_FACTOR);
        Self {
            template,
            trigger_size,
            files: Vec::new(),
            empty_directories: Vec::new(),
            pending_size: 0,
            sub_jobs: Vec::new(),
        }
    }

    pub fn with_trigger_size(mut self, trigger_size: u64) -> Self {
        self.trigger_size = trigger_size;
        self
    }

    pub fn trigger_size(&self) -> u64 {
        self.trigger_size
    }

    /// Estimated size of the open bucket.
    pub fn pending_size(&self) -> u64 {
        self.pending_size
    }

    /// True when the open bucket holds nothing.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.empty_directories.is_empty()
    }

    /// Streaming mode: add one file and flush if the open bucket reached the trigger size.
    pub fn add_file(&mut self, file: FileDescriptor) {
        self.push(file);
        if self.pending_size >= self.trigger_size {
            self.flush();
        }
    }

    /// Attach an empty directory to the open bucket. Never triggers a flush.
    pub fn add_empty_directory(&mut self, marker: EmptyDirectoryMarker) {
        self.empty_directories.push(marker);
    }

    /// Fixed-count mode: split `files` into `num_archives` buckets of about `per_archive_target`.
    ///
    /// Bucket `k` closes once the running total reaches `(k + 1) * per_archive_target`, so
    /// overshoot never accumulates and every bucket stays within one file of the target. A bucket
    /// also closes early when the files left are only just enough to give every remaining bucket
    /// one. The last bucket takes whatever is left and stays open for [`flush`](Self::flush):
    /// exactly `num_archives` sub-jobs come out when there are at least that many files.
    pub fn add_files(
        &mut self,
        files: Vec<FileDescriptor>,
        num_archives: u64,
        per_archive_target: u64,
    ) {
        let num_archives = num_archives.max(1);
        let total_files = files.len() as u64;
        let mut closed = 0u64;
        let mut running_total = 0u64;
        for (i, file) in (0u64..).zip(files) {
            running_total = running_total.saturating_add(file.estimated_uncompressed_size);
            self.push(file);
            if closed + 1 >= num_archives {
                continue;
            }
            let boundary = per_archive_target.saturating_mul(closed + 1);
            let files_left = total_files - i - 1;
            let buckets_left = num_archives - closed - 1;
            if running_total >= boundary || files_left <= buckets_left {
                self.flush();
                closed += 1;
            }
        }
    }

    /// Emit the open bucket as a sub-job. Does nothing when the bucket is empty.
    pub fn flush(&mut self) {
        if self.is_empty() {
            return;
        }
        let sub_job = SubJobDescriptor {
            job_id: self.template.job_id.clone(),
            index: self.sub_jobs.len(),
            files: std::mem::take(&mut self.files),
            empty_directories: std::mem::take(&mut self.empty_directories),
            path_prefix_to_remove: self.template.path_prefix_to_remove.clone(),
            output_config: self.template.output_config.clone(),
            worker_base_arguments: self.template.worker_base_arguments.clone(),
        };
        log::debug!(
            "Job {}: sub-job {} with {} files ({} bytes), {} empty directories",
            sub_job.job_id,
            sub_job.index,
            sub_job.files.len(),
            self.pending_size,
            sub_job.empty_directories.len()
        );
        self.pending_size = 0;
        self.sub_jobs.push(sub_job);
    }

    /// Sub-jobs emitted so far, in emission order.
    pub fn sub_jobs(&self) -> &[SubJobDescriptor] {
        &self.sub_jobs
    }

    /// Emitted sub-jobs. Anything still in the open bucket is dropped; flush first.
    pub fn into_sub_jobs(self) -> Vec<SubJobDescriptor> {
        self.sub_jobs
    }

    fn push(&mut self, file: FileDescriptor) {
        self.pending_size = self
            .pending_size
            .saturating_add(file.estimated_uncompressed_size);
        self.files.push(file);
    }
}
