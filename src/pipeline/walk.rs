//! Directory expansion: a directory input becomes every entry beneath it.

use std::path::{Path, PathBuf};

/// One result from expanding an input path: a path to validate, or a walk error.
#[derive(Debug)]
pub enum WalkOutcome {
    Ok(PathBuf),
    Err { msg: String, path: Option<PathBuf> },
}

/// Convert a walkdir result into [`WalkOutcome`].
pub fn to_outcome_walkdir(r: Result<walkdir::DirEntry, walkdir::Error>) -> WalkOutcome {
    match r {
        Ok(entry) => WalkOutcome::Ok(entry.into_path()),
        Err(err) => WalkOutcome::Err {
            msg: format!("{}", err),
            path: err.path().map(PathBuf::from),
        },
    }
}

/// Expand `path` for validation. A directory yields itself and every entry beneath it, sorted by
/// name, without following symlinks below it; anything else yields itself.
///
/// Non-empty directories come back too; the validator reports them as contributing nothing,
/// so only empty directories end up in a sub-job.
pub fn expand_input_path(path: &Path) -> Box<dyn Iterator<Item = WalkOutcome>> {
    let is_dir = std::fs::metadata(path)
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Box::new(std::iter::once(WalkOutcome::Ok(path.to_path_buf())));
    }
    Box::new(
        walkdir::WalkDir::new(path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .map(to_outcome_walkdir),
    )
}
