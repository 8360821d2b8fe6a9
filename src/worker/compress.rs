//! Sub-job executor that runs the compressor binary once per sub-job.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::SubJobDescriptor;
use crate::utils::ScratchFiles;

use super::SubJobExecutor;

/// Runs `<bin> c ...` with the sub-job's file lists. Exit status 0 is success.
#[derive(Clone, Debug)]
pub struct CommandCompressor {
    bin: PathBuf,
}

impl CommandCompressor {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }
}

/// Compressor arguments for `sub_job`, reading its lists from `scratch`.
pub fn compressor_args(sub_job: &SubJobDescriptor, scratch: &ScratchFiles) -> Vec<OsString> {
    let out = &sub_job.output_config;
    let mut args: Vec<OsString> = vec![
        "c".into(),
        "--files-from".into(),
        scratch.files_list.clone().into(),
    ];
    if let Some(ref dirs) = scratch.empty_dirs_list {
        args.push("--empty-directories-from".into());
        args.push(dirs.clone().into());
    }
    let sizes = [
        ("--target-archive-size", out.target_archive_size),
        ("--target-dictionaries-size", out.target_dictionaries_size),
        ("--target-encoded-file-size", out.target_encoded_file_size),
        ("--target-segment-size", out.target_segment_size),
    ];
    for (flag, value) in sizes {
        args.push(flag.into());
        args.push(value.to_string().into());
    }
    if let Some(ref prefix) = sub_job.path_prefix_to_remove {
        args.push("--remove-path-prefix".into());
        args.push(prefix.into());
    }
    args.push("--db-config-file".into());
    args.push(scratch.worker_config.clone().into());
    args.push(out.archives_dir.clone().into());
    args
}

impl SubJobExecutor for CommandCompressor {
    fn execute(&self, sub_job: &SubJobDescriptor) -> Result<bool> {
        let scratch = ScratchFiles::write(sub_job)
            .with_context(|| format!("prepare sub-job {}", sub_job.id()))?;
        debug!(
            "Sub-job {}: running {} on {} files",
            sub_job.id(),
            self.bin.display(),
            sub_job.files.len()
        );
        let status = Command::new(&self.bin)
            .args(compressor_args(sub_job, &scratch))
            .stdin(Stdio::null())
            .status();
        drop(scratch);
        let status = status.with_context(|| format!("run {}", self.bin.display()))?;
        if !status.success() {
            warn!("Sub-job {}: compressor exited with {}", sub_job.id(), status);
        }
        Ok(status.success())
    }
}
