//! Compression job handler: poll a job store, split each job's input paths into size-balanced
//! sub-jobs, run them on a worker pool, and persist the outcome.

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod types;
pub mod utils;
pub mod worker;

/// Re-export types for API
pub use types::*;

/// Result alias used by the public API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
