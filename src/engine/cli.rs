//! CLI command handler: build options, open the store and the worker pool, then poll until Ctrl+C.

use anyhow::{Context, Result};
use log::{debug, info};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::Opts;
use crate::engine::arg_parser::Cli;
use crate::engine::db_ops::{JobStore, SqliteJobStore};
use crate::pipeline::{HandlerSettings, JobPoller, OrchestratorContext};
use crate::utils::config::{OutputDefaults, PackagePaths, WorkerThreadLimits};
use crate::utils::{apply_file_to_opts, get_db_password, load_handler_toml, setup_logging};
use crate::worker::{CommandCompressor, LocalWorkerPool};

/// Overwrite opts field from CLI when given.
macro_rules! apply_cli_opt {
    ($cli:expr, $opts:expr, $cli_field:ident => $($opts_field:ident).+) => {
        if let Some(ref v) = $cli.$cli_field {
            $opts.$($opts_field).+ = v.clone();
        }
    };
}

/// Settings file to read: `--config` if given (must exist), else the default file if present.
fn settings_file(cli: &Cli) -> Option<PathBuf> {
    if let Some(ref p) = cli.config {
        return Some(p.clone());
    }
    let default = PathBuf::from(PackagePaths::get().config_filename());
    default.is_file().then_some(default)
}

/// Defaults, then the settings file, then CLI flags. Rejects non-positive target sizes.
pub fn build_opts(cli: &Cli) -> Result<Opts> {
    let mut opts = Opts::default();
    if let Some(path) = settings_file(cli) {
        let file = load_handler_toml(&path)?;
        apply_file_to_opts(&file, &mut opts);
    }
    apply_cli_opt!(cli, opts, db_path => db_path);
    apply_cli_opt!(cli, opts, target_archive_size => target_archive_size);
    apply_cli_opt!(cli, opts, target_dictionaries_size => target_dictionaries_size);
    apply_cli_opt!(cli, opts, target_encoded_file_size => target_encoded_file_size);
    apply_cli_opt!(cli, opts, target_segment_size => target_segment_size);
    apply_cli_opt!(cli, opts, no_progress_reporting => progress_reporting_disabled);
    apply_cli_opt!(cli, opts, input_root => input_root);
    apply_cli_opt!(cli, opts, compressor_bin => compressor_bin);
    apply_cli_opt!(cli, opts, num_workers => num_workers);
    if cli.archive_db_host.is_some() {
        opts.archive_db.host = cli.archive_db_host.clone();
    }
    apply_cli_opt!(cli, opts, archive_db_port => archive_db.port);
    if cli.archive_db_user.is_some() {
        opts.archive_db.user = cli.archive_db_user.clone();
    }
    apply_cli_opt!(cli, opts, verbose => verbose);
    opts.num_workers = WorkerThreadLimits::current().clamp(opts.num_workers);
    opts.validate()?;
    Ok(opts)
}

/// Arguments every worker receives unchanged: the job store config and, when an archive
/// database host is configured, the archive database config.
pub fn worker_base_arguments(
    opts: &Opts,
    db_config: Map<String, Value>,
    archive_db_password: Option<String>,
) -> Map<String, Value> {
    let mut args = Map::new();
    args.insert("db_config".into(), Value::Object(db_config));
    if let Some(ref host) = opts.archive_db.host {
        let mut archive = Map::new();
        archive.insert("host".into(), host.clone().into());
        archive.insert("port".into(), opts.archive_db.port.into());
        archive.insert(
            "username".into(),
            opts.archive_db.user.clone().map_or(Value::Null, Value::from),
        );
        archive.insert(
            "password".into(),
            archive_db_password.map_or(Value::Null, Value::from),
        );
        archive.insert("autocommit".into(), false.into());
        archive.insert("compress".into(), true.into());
        archive.insert("name".into(), OutputDefaults::ARCHIVE_DB_NAME.into());
        archive.insert(
            "table_prefix".into(),
            OutputDefaults::ARCHIVE_DB_TABLE_PREFIX.into(),
        );
        archive.insert("type".into(), OutputDefaults::ARCHIVE_DB_TYPE.into());
        args.insert("archive_db_config".into(), Value::Object(archive));
    }
    args
}

fn absolute_archives_dir(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create archives dir {}", dir.display()))?;
    dir.canonicalize()
        .with_context(|| format!("resolve archives dir {}", dir.display()))
}

/// Run the handler until interrupted.
pub fn handle_run(cli: &Cli) -> Result<()> {
    let opts = build_opts(cli)?;
    setup_logging(opts.verbose);
    debug!(
        "{} CONFIG:{:#?}",
        PackagePaths::get().pkg_name().to_uppercase(),
        opts
    );

    let archives_dir = absolute_archives_dir(cli.output.archives_dir())?;
    let store = SqliteJobStore::open(&opts.db_path)?;

    let password = match opts.archive_db.host {
        Some(_) => Some(get_db_password(Path::new("."))?),
        None => None,
    };
    let executor = Arc::new(CommandCompressor::new(opts.compressor_bin.clone()));
    let pool = LocalWorkerPool::new(executor, opts.num_workers)?;

    let settings = HandlerSettings {
        input_root: opts.input_root.clone(),
        output_defaults: opts.output_defaults(&archives_dir),
        worker_base_arguments: worker_base_arguments(&opts, store.get_db_config(), password),
        progress_reporting_disabled: opts.progress_reporting_disabled,
    };
    let ctx = OrchestratorContext::new(&store, &pool, settings);

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        shutdown_handler.store(true, Ordering::Relaxed);
    })
    .context("set Ctrl+C handler")?;

    info!(
        "Polling {} with {} workers; archives go to {}",
        opts.db_path.display(),
        pool.num_threads(),
        archives_dir.display()
    );
    JobPoller::new(ctx).run(&shutdown);
    info!("Shutting down");
    Ok(())
}
