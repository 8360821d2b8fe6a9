//! compression-job-handler CLI: poll the job store until Ctrl+C.

use anyhow::Result;
use clap::Parser;
use compression_job_handler::engine::arg_parser::Cli;
use compression_job_handler::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
