//! Last-synced revision of a single project.
//!
//! Detecting a change ([`RevisionTracker::diff`]) and accepting it
//! ([`RevisionTracker::commit`]) are separate steps: a failed apply leaves the
//! old revision in place, so the next check sees the same change again.

use chrono::{DateTime, Utc};
use serde::Serialize;

use converge_core::Revision;

use crate::error::RepositoryAccessError;
use crate::repository::RepositoryHandle;

/// Per-project revision state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionState {
    pub last_synced: Revision,
    pub last_checked_at: Option<DateTime<Utc>>,
}

/// Owned by exactly one reconciliation loop; never shared.
#[derive(Debug)]
pub struct RevisionTracker {
    state: RevisionState,
}

impl RevisionTracker {
    /// Record the working copy's current head as the baseline. No apply happens.
    pub fn initialize(handle: &RepositoryHandle) -> Result<Self, RepositoryAccessError> {
        let baseline = handle.head()?;
        tracing::info!(
            project = %handle.project(),
            revision = %baseline.short(),
            "baseline revision recorded",
        );
        Ok(Self::with_baseline(baseline))
    }

    pub fn with_baseline(baseline: Revision) -> Self {
        Self {
            state: RevisionState {
                last_synced: baseline,
                last_checked_at: None,
            },
        }
    }

    /// `true` iff `observed` differs from the last synced revision.
    pub fn diff(&self, observed: &Revision) -> bool {
        *observed != self.state.last_synced
    }

    /// Accept `revision` as synced. Call only after a successful apply.
    pub fn commit(&mut self, revision: Revision) {
        self.state.last_synced = revision;
    }

    pub fn mark_checked(&mut self, at: DateTime<Utc>) {
        self.state.last_checked_at = Some(at);
    }

    pub fn last_synced(&self) -> &Revision {
        &self.state.last_synced
    }

    pub fn state(&self) -> &RevisionState {
        &self.state
    }
}
