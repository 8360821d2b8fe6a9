//! Orchestrator context: the store, the worker pool, handler settings, and poll timing,
//! passed explicitly into the poller and the coordinator.

use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::db_ops::JobStore;
use crate::utils::config::PollConsts;
use crate::worker::WorkerPool;

/// Handler-wide settings, fixed at startup.
#[derive(Clone, Debug, Default)]
pub struct HandlerSettings {
    /// Every input path is anchored under, and must stay within, this directory.
    pub input_root: PathBuf,
    /// Merged under each job's `output_config`; job keys win.
    pub output_defaults: Map<String, Value>,
    /// Copied into every sub-job untouched.
    pub worker_base_arguments: Map<String, Value>,
    /// Skip the per-tick progress update while a batch is outstanding.
    pub progress_reporting_disabled: bool,
}

/// Poll loop timing. Defaults come from [`PollConsts`]; tests shrink them.
#[derive(Clone, Copy, Debug)]
pub struct PollIntervals {
    /// Sleep between scans that found no new jobs.
    pub scan_interval: Duration,
    /// Sleep between batch collection attempts.
    pub batch_poll_interval: Duration,
    /// Bounded wait of one collection attempt.
    pub collect_timeout: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            scan_interval: PollConsts::SCAN_INTERVAL,
            batch_poll_interval: PollConsts::BATCH_POLL_INTERVAL,
            collect_timeout: PollConsts::COLLECT_TIMEOUT,
        }
    }
}

/// Everything one handler instance needs. Borrowed by the poller for its whole lifetime.
pub struct OrchestratorContext<'a> {
    pub store: &'a dyn JobStore,
    pub pool: &'a dyn WorkerPool,
    pub settings: HandlerSettings,
    pub intervals: PollIntervals,
}

impl<'a> OrchestratorContext<'a> {
    pub fn new(store: &'a dyn JobStore, pool: &'a dyn WorkerPool, settings: HandlerSettings) -> Self {
        Self {
            store,
            pool,
            settings,
            intervals: PollIntervals::default(),
        }
    }

    pub fn with_intervals(mut self, intervals: PollIntervals) -> Self {
        self.intervals = intervals;
        self
    }
}
