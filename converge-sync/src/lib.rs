//! # converge-sync
//!
//! Building blocks of one reconciliation pass:
//!
//! - [`repository`]: [`RepositoryHandle`] over the [`RepositoryAccess`] capability
//! - [`git`]: the `git2` backend, [`GitAccess`]
//! - [`tracker`]: [`RevisionTracker`], last-synced revision per project
//! - [`apply`]: the injected [`Applier`] convergence action
//!
//! Everything here is blocking; the daemon runs it on tokio's blocking pool.

pub mod apply;
pub mod error;
pub mod git;
pub mod repository;
pub mod tracker;

pub use apply::{applier_for, Applier, CommandApplier, LogApplier};
pub use error::{ApplyError, RepositoryAccessError, SyncError};
pub use git::GitAccess;
pub use repository::{RepositoryAccess, RepositoryHandle};
pub use tracker::{RevisionState, RevisionTracker};
