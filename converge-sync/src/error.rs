//! Error types for converge-sync.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the repository-access capability (clone/open/pull/resolve).
#[derive(Debug, Error)]
pub enum RepositoryAccessError {
    /// A repository is already present at the clone target.
    #[error("repository already exists at {path}")]
    AlreadyExists { path: PathBuf },

    #[error("failed to clone {url} into {path}: {source}")]
    Clone {
        url: String,
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    /// Any other libgit2 failure, annotated with the working copy.
    #[error("git error at {path}: {source}")]
    Git {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("HEAD is detached at {path}; cannot pull")]
    DetachedHead { path: PathBuf },

    #[error("branch '{branch}' has diverged from its remote; refusing non-fast-forward pull")]
    Diverged { branch: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Used by non-git backends.
    #[error("repository access failed: {0}")]
    Other(String),
}

/// Failures of the convergence action.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("apply rejected: {0}")]
    Rejected(String),
}

/// Error surface of one reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryAccessError),

    #[error("apply error: {0}")]
    Apply(#[from] ApplyError),
}

/// Convenience constructor for [`RepositoryAccessError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RepositoryAccessError {
    RepositoryAccessError::Io {
        path: path.into(),
        source,
    }
}

/// Adapter for `map_err` that attaches the working copy path to a libgit2 error.
pub(crate) fn git_err(path: &std::path::Path) -> impl Fn(git2::Error) -> RepositoryAccessError + '_ {
    move |source| RepositoryAccessError::Git {
        path: path.to_path_buf(),
        source,
    }
}
