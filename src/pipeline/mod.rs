//! Orchestration core: poller, coordinator, partition buffer, and path validation.

pub mod context;
pub mod coordinator;
pub mod error_handler;
pub mod metadata;
pub mod orchestrator;
pub mod partition;
pub mod walk;

pub use context::{HandlerSettings, OrchestratorContext, PollIntervals};
pub use coordinator::{
    PreparedJob, dispatch_and_monitor, evaluate_outcomes, handle_job, prepare_fs_sub_jobs,
    prepare_job,
};
pub use error_handler::ValidationErrors;
pub use metadata::{PathValidator, ValidatedPath, validate_path_and_get_info};
pub use orchestrator::JobPoller;
pub use partition::{PartitionBuffer, SubJobTemplate};
pub use walk::{WalkOutcome, expand_input_path, to_outcome_walkdir};
