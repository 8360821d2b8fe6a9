use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Poll the job store and compress every pending job through a local worker pool.
#[derive(Clone, Parser)]
#[command(name = "compression-job-handler")]
#[command(about = "Pick up pending compression jobs, split them into sub-jobs, and run the compressor.")]
pub struct Cli {
    /// Job store database file. Default: `compression-jobs.db` in the working directory.
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Target size of one archive, in bytes.
    #[arg(long, allow_negative_numbers = true, value_parser = clap::value_parser!(i64))]
    pub target_archive_size: Option<i64>,

    /// Target size of an archive's dictionaries, in bytes.
    #[arg(long = "target-archive-dictionaries-data-size", allow_negative_numbers = true, value_parser = clap::value_parser!(i64))]
    pub target_dictionaries_size: Option<i64>,

    /// Target size of one encoded file, in bytes.
    #[arg(long, allow_negative_numbers = true, value_parser = clap::value_parser!(i64))]
    pub target_encoded_file_size: Option<i64>,

    /// Target size of one segment, in bytes.
    #[arg(long, allow_negative_numbers = true, value_parser = clap::value_parser!(i64))]
    pub target_segment_size: Option<i64>,

    /// Do not record progress while a batch is running.
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub no_progress_reporting: Option<bool>,

    /// Directory every input path is resolved under. Default: `/`.
    #[arg(long)]
    pub input_root: Option<PathBuf>,

    /// Compressor binary run for each sub-job. Default: `clp` on PATH.
    #[arg(long)]
    pub compressor_bin: Option<PathBuf>,

    /// Number of concurrent sub-jobs. Default: number of available threads.
    #[arg(long, short = 'j')]
    pub num_workers: Option<usize>,

    /// Archive database host. When set, workers also receive the archive database config.
    #[arg(long)]
    pub archive_db_host: Option<String>,

    /// Archive database port.
    #[arg(long)]
    pub archive_db_port: Option<u16>,

    /// Archive database user. Password from ARCHIVE_DB_PASSWORD, .env, or a prompt.
    #[arg(long)]
    pub archive_db_user: Option<String>,

    /// Settings file. Default: `.compression-job-handler.toml` in the working directory, if present.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    #[command(subcommand)]
    pub output: Commands,
}

/// Where archives are written.
#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Write archives to a local directory.
    Fs {
        /// Output directory for archives (created if missing).
        #[arg(long)]
        archives_dir: PathBuf,
    },
}

impl Commands {
    pub fn archives_dir(&self) -> &PathBuf {
        match self {
            Commands::Fs { archives_dir } => archives_dir,
        }
    }
}
