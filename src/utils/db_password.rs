//! Archive database password: env var → .env in dir → secure prompt.

use anyhow::{Context, Result};
use colored::Colorize;
use log::info;
use std::path::Path;

pub const ENV_KEY: &str = "ARCHIVE_DB_PASSWORD";

fn read_env_key() -> Option<String> {
    let s = std::env::var(ENV_KEY).ok()?;
    let s = s.trim().to_string();
    (!s.is_empty()).then_some(s)
}

/// Look up the password in the environment, then in `dir/.env`. Never prompts.
pub fn try_env_then_dotenv(dir: &Path) -> Option<String> {
    if let Some(s) = read_env_key() {
        return Some(s);
    }
    let env_path = dir.join(".env");
    if env_path.is_file() {
        let _ = dotenvy::from_path(&env_path);
        return read_env_key();
    }
    None
}

/// Read the archive database password: env (`ARCHIVE_DB_PASSWORD`) → `.env` in `dir` → secure prompt.
pub fn get_db_password(dir: &Path) -> Result<String> {
    if let Some(s) = try_env_then_dotenv(dir) {
        info!("Archive database password found in environment");
        return Ok(s);
    }
    let label = format!("[{}]", env!("CARGO_PKG_NAME")).cyan().bold();
    let pass = rpassword::prompt_password(format!("{} Archive database password: ", label))
        .context("read archive database password")?;
    Ok(pass.trim().to_string())
}
