pub mod config;
pub mod db_password;
pub mod handler_toml;
pub mod logger;
pub mod tempfiles;

pub use config::*;
pub use db_password::get_db_password;
pub use handler_toml::{HandlerToml, apply_file_to_opts, load_handler_toml};
pub use logger::setup_logging;
pub use tempfiles::{ScratchFiles, scratch_dir_for};
