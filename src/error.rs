//! Typed errors: per-path validation failures and illegal status transitions.
//!
//! Everything else in the crate propagates as [`anyhow::Error`].

use std::io;
use std::path::PathBuf;

use crate::JobStatus;

/// One input path could not be used. Recovered per path; the job keeps going.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("{} is not within {}", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("{} is neither a regular file nor a directory", .0.display())]
    Unsupported(PathBuf),

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot walk {}: {msg}", path.display())]
    Walk { path: PathBuf, msg: String },
}

impl PathError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            PathError::NotFound(path.into())
        } else {
            PathError::Io {
                path: path.into(),
                source,
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("unknown job status `{0}`")]
    UnknownStatus(String),
}
