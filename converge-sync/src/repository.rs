//! Repository handle over an injected access capability.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use converge_core::{Project, ProjectName, Revision};

use crate::error::RepositoryAccessError;

/// Capability consumed from a repository-access library.
///
/// Every method is blocking and keyed by the working copy path, so a backend
/// never has to keep a non-`Sync` repository object alive between calls.
pub trait RepositoryAccess: Send + Sync {
    /// Clone `url` into `path`.
    ///
    /// Must return [`RepositoryAccessError::AlreadyExists`] when `path` already
    /// holds a repository.
    fn clone_repository(&self, url: &str, path: &Path) -> Result<(), RepositoryAccessError>;

    /// Verify that `path` holds a usable repository.
    fn open(&self, path: &Path) -> Result<(), RepositoryAccessError>;

    /// Bring the working copy up to date with its remote. Already up to date is `Ok`.
    fn pull(&self, path: &Path) -> Result<(), RepositoryAccessError>;

    /// Resolve the revision `HEAD` currently points at.
    fn head_revision(&self, path: &Path) -> Result<Revision, RepositoryAccessError>;
}

/// A project's local working copy.
#[derive(Clone)]
pub struct RepositoryHandle {
    project: ProjectName,
    path: PathBuf,
    access: Arc<dyn RepositoryAccess>,
}

impl std::fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("project", &self.project)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RepositoryHandle {
    /// Ensure a working copy exists for `project`: clone if absent, reuse if present.
    pub fn open(
        project: &Project,
        access: Arc<dyn RepositoryAccess>,
    ) -> Result<Self, RepositoryAccessError> {
        match access.clone_repository(&project.repository, &project.path) {
            Ok(()) => tracing::info!(
                project = %project.name,
                path = %project.path.display(),
                "cloned repository",
            ),
            Err(RepositoryAccessError::AlreadyExists { .. }) => tracing::debug!(
                project = %project.name,
                path = %project.path.display(),
                "reusing existing working copy",
            ),
            Err(err) => return Err(err),
        }
        access.open(&project.path)?;

        Ok(Self {
            project: project.name.clone(),
            path: project.path.clone(),
            access,
        })
    }

    /// Pull from the remote, then resolve the head revision.
    pub fn refresh_and_head(&self) -> Result<Revision, RepositoryAccessError> {
        self.access.pull(&self.path)?;
        self.access.head_revision(&self.path)
    }

    /// Resolve the head revision without touching the remote.
    pub fn head(&self) -> Result<Revision, RepositoryAccessError> {
        self.access.head_revision(&self.path)
    }

    pub fn project(&self) -> &ProjectName {
        &self.project
    }
}
