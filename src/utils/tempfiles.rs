//! Per-sub-job scratch files handed to the compressor (file lists, worker config).

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::SubJobDescriptor;
use crate::utils::config::PackagePaths;

/// Scratch directory for a given archives directory.
pub fn scratch_dir_for(archives_dir: &Path) -> PathBuf {
    archives_dir.join(PackagePaths::get().scratch_dir_name())
}

/// Files written for one compressor run. Removed on drop.
#[derive(Debug)]
pub struct ScratchFiles {
    pub files_list: PathBuf,
    /// Only written when the sub-job carries empty directories.
    pub empty_dirs_list: Option<PathBuf>,
    pub worker_config: PathBuf,
}

fn write_lines<'a, I>(path: &Path, lines: I) -> Result<()>
where
    I: IntoIterator<Item = &'a Path>,
{
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for line in lines {
        writeln!(out, "{}", line.display())?;
    }
    out.flush()
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// The worker config may carry database credentials: owner-only on unix.
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("create {}", path.display()))?;
    file.write_all(contents)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

impl ScratchFiles {
    /// Write the sub-job's path lists and worker base arguments under the scratch dir.
    /// Anything already written is removed again if a later write fails.
    pub fn write(sub_job: &SubJobDescriptor) -> Result<Self> {
        let dir = scratch_dir_for(&sub_job.output_config.archives_dir);
        fs::create_dir_all(&dir)
            .with_context(|| format!("create scratch dir {}", dir.display()))?;
        let id = sub_job.id();
        let scratch = Self {
            files_list: dir.join(format!("{id}.files")),
            empty_dirs_list: (!sub_job.empty_directories.is_empty())
                .then(|| dir.join(format!("{id}.dirs"))),
            worker_config: dir.join(format!("{id}.worker.json")),
        };

        write_lines(
            &scratch.files_list,
            sub_job.files.iter().map(|f| f.path.as_path()),
        )?;
        if let Some(ref path) = scratch.empty_dirs_list {
            write_lines(path, sub_job.empty_directories.iter().map(|d| d.path()))?;
        }
        let json = serde_json::to_string_pretty(&sub_job.worker_base_arguments)
            .context("serialize worker base arguments")?;
        write_private(&scratch.worker_config, json.as_bytes())?;
        Ok(scratch)
    }

    /// Best-effort removal; leftovers are harmless. Also runs on drop.
    pub fn remove(&self) {
        let _ = fs::remove_file(&self.files_list);
        if let Some(ref p) = self.empty_dirs_list {
            let _ = fs::remove_file(p);
        }
        let _ = fs::remove_file(&self.worker_config);
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        self.remove();
    }
}
