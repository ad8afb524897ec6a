//! `git2` implementation of [`RepositoryAccess`].
//!
//! Pull is fetch + fast-forward of the checked-out branch. A local branch that
//! has diverged from its remote is reported, never merged or reset.

use std::path::Path;

use git2::{build::CheckoutBuilder, ErrorCode, Repository};

use converge_core::Revision;

use crate::error::{git_err, io_err, RepositoryAccessError};
use crate::repository::RepositoryAccess;

pub const DEFAULT_REMOTE: &str = "origin";

/// Repository access backed by libgit2.
#[derive(Debug, Clone)]
pub struct GitAccess {
    remote: String,
}

impl Default for GitAccess {
    fn default() -> Self {
        Self::new()
    }
}

impl GitAccess {
    pub fn new() -> Self {
        Self {
            remote: DEFAULT_REMOTE.to_string(),
        }
    }
}

impl RepositoryAccess for GitAccess {
    fn clone_repository(&self, url: &str, path: &Path) -> Result<(), RepositoryAccessError> {
        if Repository::open(path).is_ok() {
            return Err(RepositoryAccessError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }

        match Repository::clone(url, path) {
            Ok(_) => Ok(()),
            Err(err) if err.code() == ErrorCode::Exists => {
                Err(RepositoryAccessError::AlreadyExists {
                    path: path.to_path_buf(),
                })
            }
            Err(source) => Err(RepositoryAccessError::Clone {
                url: url.to_string(),
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn open(&self, path: &Path) -> Result<(), RepositoryAccessError> {
        Repository::open(path).map(|_| ()).map_err(git_err(path))
    }

    fn pull(&self, path: &Path) -> Result<(), RepositoryAccessError> {
        let repo = Repository::open(path).map_err(git_err(path))?;

        let branch = {
            let head = repo.head().map_err(git_err(path))?;
            if !head.is_branch() {
                return Err(RepositoryAccessError::DetachedHead {
                    path: path.to_path_buf(),
                });
            }
            head.shorthand()
                .ok_or_else(|| {
                    RepositoryAccessError::Other("branch name is not valid UTF-8".to_string())
                })?
                .to_string()
        };

        let mut remote = repo.find_remote(&self.remote).map_err(git_err(path))?;
        remote
            .fetch(&[branch.as_str()], None, None)
            .map_err(git_err(path))?;

        let fetch_head = repo.find_reference("FETCH_HEAD").map_err(git_err(path))?;
        let fetched = repo
            .reference_to_annotated_commit(&fetch_head)
            .map_err(git_err(path))?;
        let (analysis, _) = repo.merge_analysis(&[&fetched]).map_err(git_err(path))?;

        if analysis.is_up_to_date() {
            return Ok(());
        }
        if !analysis.is_fast_forward() {
            return Err(RepositoryAccessError::Diverged { branch });
        }

        let refname = format!("refs/heads/{branch}");
        let mut reference = repo.find_reference(&refname).map_err(git_err(path))?;
        reference
            .set_target(fetched.id(), "converge: fast-forward")
            .map_err(git_err(path))?;
        repo.set_head(&refname).map_err(git_err(path))?;
        repo.checkout_head(Some(CheckoutBuilder::default().force()))
            .map_err(git_err(path))?;

        tracing::debug!(path = %path.display(), branch = %branch, "fast-forwarded working copy");
        Ok(())
    }

    fn head_revision(&self, path: &Path) -> Result<Revision, RepositoryAccessError> {
        let repo = Repository::open(path).map_err(git_err(path))?;
        let commit = repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(git_err(path))?;
        Ok(Revision(commit.id().to_string()))
    }
}
