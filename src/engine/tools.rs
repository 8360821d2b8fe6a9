//! Path utilities

use std::path::{Component, Path, PathBuf};

use crate::utils::config::{GZIP_EXTENSIONS, GZIP_SIZE_MULTIPLIER};

/// Re-root `path` under `root`: `/var/log/a.log` under `/mnt/logs` becomes `/mnt/logs/var/log/a.log`.
/// Relative paths are joined as-is. `..` components are kept; the validator rejects escapes.
pub fn anchor_to_root(path: &Path, root: &Path) -> PathBuf {
    let relative: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    root.join(relative)
}

/// Turn one raw `input_config.paths` entry into a path under `root`. Blank entries yield `None`.
pub fn resolve_input_path(raw: &str, root: &Path) -> Option<PathBuf> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(anchor_to_root(Path::new(trimmed), root))
}

/// Size used for partitioning: compressed inputs count for what they will expand to.
pub fn estimate_uncompressed_size(path: &Path, size: u64) -> u64 {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if GZIP_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
        size.saturating_mul(GZIP_SIZE_MULTIPLIER)
    } else {
        size
    }
}
