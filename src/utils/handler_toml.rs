//! Load the handler settings file (`--config`, or `.compression-job-handler.toml` in the working directory).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::Opts;

#[derive(Debug, Default, Deserialize)]
pub struct HandlerToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsSection {
    db_path: Option<String>,
    target_archive_size: Option<i64>,
    target_archive_dictionaries_data_size: Option<i64>,
    target_encoded_file_size: Option<i64>,
    target_segment_size: Option<i64>,
    no_progress_reporting: Option<bool>,
    input_root: Option<String>,
    compressor_bin: Option<String>,
    num_workers: Option<usize>,
    archive_db_host: Option<String>,
    archive_db_port: Option<u16>,
    archive_db_user: Option<String>,
    verbose: Option<bool>,
}

/// Read and parse a settings file.
pub fn load_handler_toml(path: &Path) -> Result<HandlerToml> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read settings file {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parse settings file {}", path.display()))
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($idx:expr, $opts:expr, $idx_field:ident => $($opts_field:ident).+) => {
        if let Some(v) = $idx.$idx_field {
            $opts.$($opts_field).+ = v;
        }
    };
}

/// Apply file settings to opts (only fields present in the file). Call before applying CLI flags.
pub fn apply_file_to_opts(file: &HandlerToml, opts: &mut Opts) {
    let idx = &file.settings;
    if let Some(ref p) = idx.db_path {
        opts.db_path = PathBuf::from(p);
    }
    apply_file_opt!(idx, opts, target_archive_size => target_archive_size);
    apply_file_opt!(idx, opts, target_archive_dictionaries_data_size => target_dictionaries_size);
    apply_file_opt!(idx, opts, target_encoded_file_size => target_encoded_file_size);
    apply_file_opt!(idx, opts, target_segment_size => target_segment_size);
    apply_file_opt!(idx, opts, no_progress_reporting => progress_reporting_disabled);
    if let Some(ref p) = idx.input_root {
        opts.input_root = PathBuf::from(p);
    }
    if let Some(ref p) = idx.compressor_bin {
        opts.compressor_bin = PathBuf::from(p);
    }
    apply_file_opt!(idx, opts, num_workers => num_workers);
    if idx.archive_db_host.is_some() {
        opts.archive_db.host = idx.archive_db_host.clone();
    }
    apply_file_opt!(idx, opts, archive_db_port => archive_db.port);
    if idx.archive_db_user.is_some() {
        opts.archive_db.user = idx.archive_db_user.clone();
    }
    apply_file_opt!(idx, opts, verbose => verbose);
}
