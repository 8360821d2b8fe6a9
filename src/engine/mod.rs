//! Engine: CLI surface, job store, and path helpers

pub mod arg_parser;
pub mod cli;
pub mod db_ops;
pub mod tools;

// Re-export commonly used functions
pub use arg_parser::{Cli, Commands};
pub use cli::{build_opts, handle_run, worker_base_arguments};
pub use db_ops::{JobStore, SqliteJobStore, open_db, open_db_in_memory};
pub use tools::{anchor_to_root, estimate_uncompressed_size, resolve_input_path};
