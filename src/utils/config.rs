//! Application configuration constants.
//! Defaults and intervals in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    scratch_dir_name: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
                scratch_dir_name: format!(".{pkg}-scratch"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Settings file looked up in the working directory when `--config` is not given.
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Directory (under the archives dir) holding per-sub-job file lists while a compressor runs.
    pub fn scratch_dir_name(&self) -> &str {
        &self.scratch_dir_name
    }
}

// ---- Output defaults ----

/// Process-wide defaults; jobs may override the size targets in their own output config.
pub struct OutputDefaults;

impl OutputDefaults {
    /// 16 GiB.
    pub const TARGET_ARCHIVE_SIZE: i64 = 16 * 1024 * 1024 * 1024;
    /// 10 MiB.
    pub const TARGET_DICTIONARIES_SIZE: i64 = 10 * 1024 * 1024;
    /// 512 MiB.
    pub const TARGET_ENCODED_FILE_SIZE: i64 = 512 * 1024 * 1024;
    /// 1 GiB.
    pub const TARGET_SEGMENT_SIZE: i64 = 1024 * 1024 * 1024;
    pub const DB_FILENAME: &'static str = "compression-jobs.db";
    pub const INPUT_ROOT: &'static str = "/";
    pub const COMPRESSOR_BIN: &'static str = "clp";
    pub const ARCHIVE_DB_PORT: u16 = 3306;
    pub const ARCHIVE_DB_NAME: &'static str = "archive-db";
    pub const ARCHIVE_DB_TABLE_PREFIX: &'static str = "archive_";
    pub const ARCHIVE_DB_TYPE: &'static str = "mysql";
}

// ---- Partitioning ----

/// Streaming mode flushes once a batch reaches this multiple of the target archive size.
pub const STREAMING_TRIGGER_FACTOR: u64 = 2;

/// Estimated uncompressed / on-disk ratio for gzip inputs.
pub const GZIP_SIZE_MULTIPLIER: u64 = 13;

/// File name suffixes treated as gzip-compressed.
pub const GZIP_EXTENSIONS: &[&str] = &[".gz", ".gzip", ".tgz"];

// ---- Polling ----

/// Poll loop timing; defaults for [`PollIntervals`](crate::pipeline::PollIntervals).
pub struct PollConsts;

impl PollConsts {
    /// Sleep between scans that found no new jobs.
    pub const SCAN_INTERVAL: Duration = Duration::from_secs(1);
    /// Sleep between attempts to collect a batch.
    pub const BATCH_POLL_INTERVAL: Duration = Duration::from_secs(1);
    /// Bounded wait of a single collection attempt.
    pub const COLLECT_TIMEOUT: Duration = Duration::from_millis(10);
    /// How long a store write waits on a lock held by another handler.
    pub const DB_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
}

// ---- Worker threads ----

/// Thread limits for the local worker pool.
/// Use [`WorkerThreadLimits::current()`] to fill `all_threads` from rayon.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Minimum number of compressor threads.
    pub floor: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            floor: Self::FLOOR_THREADS,
        }
    }
}

impl WorkerThreadLimits {
    pub const FLOOR_THREADS: usize = 1;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }

    /// Clamp a requested worker count to at least the floor.
    pub fn clamp(&self, requested: usize) -> usize {
        requested.max(self.floor)
    }
}
