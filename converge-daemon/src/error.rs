use std::path::PathBuf;

use thiserror::Error;

use converge_core::ProjectName;

/// Error surface for the daemon runtime and its control surface.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Sync(#[from] converge_sync::SyncError),

    /// A project could not establish its working copy or baseline.
    #[error("project '{project}' failed to start: {source}")]
    Startup {
        project: ProjectName,
        #[source]
        source: converge_sync::SyncError,
    },

    #[error("server error: {0}")]
    Server(String),

    #[error("task failure: {0}")]
    Task(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
