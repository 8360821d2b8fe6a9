//! Job execution: turn one RUNNING job into sub-jobs, run them as one batch, and decide the outcome.

use anyhow::{Context, Result, bail};
use log::{debug, error, info, warn};
use std::thread;

use crate::engine::db_ops::JobStore;
use crate::engine::tools::resolve_input_path;
use crate::{FS_INPUT_TYPE, InputConfig, JobOutcome, OutputConfig, SubJobDescriptor};

use super::context::{HandlerSettings, OrchestratorContext};
use super::error_handler::ValidationErrors;
use super::metadata::PathValidator;
use super::partition::{PartitionBuffer, SubJobTemplate};
use super::walk::{WalkOutcome, expand_input_path};
use crate::worker::SubJobOutcome;

/// Sub-jobs of one job plus the input paths that were skipped.
#[derive(Debug)]
pub struct PreparedJob {
    pub sub_jobs: Vec<SubJobDescriptor>,
    pub validation_errors: ValidationErrors,
}

/// Run one job to an outcome. Never returns an error: anything that goes wrong fails the job.
pub fn handle_job(ctx: &OrchestratorContext<'_>, job_id: &str) -> JobOutcome {
    info!("Starting job {}", job_id);
    let prepared = match prepare_job(ctx, job_id) {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("Job {}: failed to parse job configuration: {:#}", job_id, e);
            return JobOutcome::Failed;
        }
    };
    prepared.validation_errors.summarize();
    let validation_failed = !prepared.validation_errors.is_empty();

    let all_successful = if prepared.sub_jobs.is_empty() {
        warn!("Job {}: no input to compress", job_id);
        true
    } else {
        dispatch_and_monitor(ctx, job_id, prepared.sub_jobs)
    };

    let outcome = JobOutcome::from_results(all_successful, validation_failed);
    info!("Finished job {} ({})", job_id, outcome);
    outcome
}

/// Read and resolve the job's configuration, then partition its input.
/// Errors here are configuration errors: the job fails before anything is submitted.
pub fn prepare_job(ctx: &OrchestratorContext<'_>, job_id: &str) -> Result<PreparedJob> {
    let metadata = ctx.store.get_job_metadata(job_id)?;
    let output_config =
        OutputConfig::resolve(metadata.output_config, &ctx.settings.output_defaults)
            .context("invalid output config")?;
    if metadata.input_type != FS_INPUT_TYPE {
        bail!("unsupported input type `{}`", metadata.input_type);
    }
    let input_config: InputConfig =
        serde_json::from_value(metadata.input_config).context("invalid input config")?;
    prepare_fs_sub_jobs(&ctx.settings, job_id, input_config, output_config)
}

/// Resolve, expand and validate every input path and feed the partition buffer.
///
/// With a requested archive count, files are collected first and split by total size;
/// otherwise they stream through the buffer as they are validated.
pub fn prepare_fs_sub_jobs(
    settings: &HandlerSettings,
    job_id: &str,
    input_config: InputConfig,
    output_config: OutputConfig,
) -> Result<PreparedJob> {
    let validator = PathValidator::new(&settings.input_root)
        .with_context(|| format!("input root {}", settings.input_root.display()))?;
    let fixed_count = output_config.fixed_archive_count();
    let mut buffer = PartitionBuffer::new(SubJobTemplate {
        job_id: job_id.to_string(),
        path_prefix_to_remove: input_config.path_prefix_to_remove,
        output_config,
        worker_base_arguments: settings.worker_base_arguments.clone(),
    });
    let mut validation_errors = ValidationErrors::new(job_id);
    let mut collected = Vec::new();

    for raw in &input_config.paths {
        let Some(path) = resolve_input_path(raw, &settings.input_root) else {
            continue;
        };
        for entry in expand_input_path(&path) {
            let path = match entry {
                WalkOutcome::Ok(path) => path,
                WalkOutcome::Err { msg, path } => {
                    validation_errors.record_walk(msg, path);
                    continue;
                }
            };
            match validator.validate(&path) {
                Ok((Some(file), _)) if fixed_count.is_some() => collected.push(file),
                Ok((Some(file), _)) => buffer.add_file(file),
                Ok((None, Some(marker))) => buffer.add_empty_directory(marker),
                Ok((None, None)) => {}
                Err(e) => validation_errors.record(e),
            }
        }
    }

    if let Some(num_archives) = fixed_count {
        let total: u64 = collected.iter().map(|f| f.estimated_uncompressed_size).sum();
        let per_archive_target = total / num_archives;
        debug!(
            "Job {}: {} files, {} bytes into {} archives of ~{} bytes",
            job_id,
            collected.len(),
            total,
            num_archives,
            per_archive_target
        );
        buffer.add_files(collected, num_archives, per_archive_target);
    }
    buffer.flush();

    Ok(PreparedJob {
        sub_jobs: buffer.into_sub_jobs(),
        validation_errors,
    })
}

/// Submit `sub_jobs` as one batch and poll until every member resolves.
/// Returns whether every sub-job succeeded; submit and collection errors count as failure.
pub fn dispatch_and_monitor(
    ctx: &OrchestratorContext<'_>,
    job_id: &str,
    sub_jobs: Vec<SubJobDescriptor>,
) -> bool {
    let count = sub_jobs.len();
    let mut handle = match ctx.pool.submit_batch(sub_jobs) {
        Ok(handle) => handle,
        Err(e) => {
            error!("Job {}: failed to submit {} sub-jobs: {:#}", job_id, count, e);
            return false;
        }
    };
    info!("Waiting for job {}'s {} sub-job(s) to finish", job_id, count);

    loop {
        match handle.try_collect(ctx.intervals.collect_timeout) {
            Ok(Some(outcomes)) => return evaluate_outcomes(ctx.store, job_id, &outcomes),
            Ok(None) => {}
            Err(e) => {
                error!("Job {}: failed to collect sub-job results: {:#}", job_id, e);
                return false;
            }
        }
        if !ctx.settings.progress_reporting_disabled {
            report_progress(ctx.store, job_id);
        }
        debug!("Waiting for sub-jobs of job {} to finish", job_id);
        thread::sleep(ctx.intervals.batch_poll_interval);
    }
}

/// Look at every outcome; one failure fails the job but the rest are still counted.
pub fn evaluate_outcomes(store: &dyn JobStore, job_id: &str, outcomes: &[SubJobOutcome]) -> bool {
    let mut all_successful = true;
    for (index, outcome) in outcomes.iter().enumerate() {
        match outcome {
            SubJobOutcome::Succeeded => report_progress(store, job_id),
            SubJobOutcome::Failed => {
                all_successful = false;
                error!("Job {}: sub-job {} failed", job_id, index);
            }
            SubJobOutcome::Errored(msg) => {
                all_successful = false;
                error!("Job {}: sub-job {} errored: {}", job_id, index, msg);
            }
        }
    }
    all_successful
}

fn report_progress(store: &dyn JobStore, job_id: &str) {
    if let Err(e) = store.update_job_progression(job_id) {
        warn!("Job {}: failed to record progress: {:#}", job_id, e);
    }
}
