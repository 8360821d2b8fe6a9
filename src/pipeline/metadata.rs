//! Path validation: classify one input path as a regular file or an empty directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PathError;
use crate::{EmptyDirectoryMarker, FileDescriptor};

/// What one path contributes to a job. Both `None` for a non-empty directory.
pub type ValidatedPath = (Option<FileDescriptor>, Option<EmptyDirectoryMarker>);

/// Validates paths against one canonicalized root.
#[derive(Clone, Debug)]
pub struct PathValidator {
    root: PathBuf,
}

impl PathValidator {
    pub fn new(root: &Path) -> Result<Self, PathError> {
        let root = root.canonicalize().map_err(|e| PathError::io(root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Descriptors keep `path` as given; symlinks and `..` are resolved only for the checks.
    pub fn validate(&self, path: &Path) -> Result<ValidatedPath, PathError> {
        let canonical = path.canonicalize().map_err(|e| PathError::io(path, e))?;
        if !canonical.starts_with(&self.root) {
            return Err(PathError::OutsideRoot {
                path: path.to_path_buf(),
                root: self.root.clone(),
            });
        }
        let meta = fs::metadata(&canonical).map_err(|e| PathError::io(path, e))?;
        if meta.is_file() {
            return Ok((Some(FileDescriptor::new(path, meta.len())), None));
        }
        if meta.is_dir() {
            let mut entries = fs::read_dir(&canonical).map_err(|e| PathError::io(path, e))?;
            return Ok(match entries.next() {
                None => (None, Some(EmptyDirectoryMarker::new(path))),
                Some(_) => (None, None),
            });
        }
        Err(PathError::Unsupported(path.to_path_buf()))
    }
}

/// One-shot form of [`PathValidator::validate`].
pub fn validate_path_and_get_info(root: &Path, path: &Path) -> Result<ValidatedPath, PathError> {
    PathValidator::new(root)?.validate(path)
}
