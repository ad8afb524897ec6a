//! Per-project reconciliation loop.
//!
//! ```text
//! Idle ──tick/trigger──▶ Checking ──unchanged──▶ Idle
//!                           │
//!                        changed
//!                           ▼
//!                        Applying ──ok: commit / err: keep old──▶ Idle
//! ```
//!
//! One loop is one sequential task, so passes for a project never overlap.
//! Any tick or trigger that is outstanding when a pass starts is satisfied by
//! that pass; at most one more pass is remembered while a pass runs.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};

use converge_core::config::{DEFAULT_APPLY_DEADLINE, DEFAULT_CHECK_DEADLINE, DEFAULT_INTERVAL};
use converge_core::{Config, Project, ProjectName, Revision};
use converge_sync::{Applier, RepositoryAccess, RepositoryHandle, RevisionTracker, SyncError};

use crate::error::DaemonError;
use crate::status::{Phase, StatusBoard};
use crate::trigger::TriggerReceiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub interval: Duration,
    /// Warn when `refresh_and_head` runs longer than this.
    pub check_deadline: Option<Duration>,
    /// Warn when an apply runs longer than this.
    pub apply_deadline: Option<Duration>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            check_deadline: Some(DEFAULT_CHECK_DEADLINE),
            apply_deadline: Some(DEFAULT_APPLY_DEADLINE),
        }
    }
}

impl From<&Config> for LoopSettings {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.interval,
            check_deadline: config.check_deadline,
            apply_deadline: config.apply_deadline,
        }
    }
}

/// What started a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Wake {
    Tick,
    Trigger,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PassOutcome {
    NoChange { revision: Revision },
    Applied { revision: Revision },
    CheckFailed { error: String },
    /// The revision stays uncommitted; the next pass retries it.
    ApplyFailed { revision: Revision, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub project: ProjectName,
    pub wake: Wake,
    pub outcome: PassOutcome,
}

pub struct ReconciliationLoop {
    project: Arc<Project>,
    handle: RepositoryHandle,
    tracker: RevisionTracker,
    applier: Arc<dyn Applier>,
    settings: LoopSettings,
    status: StatusBoard,
    reports: Option<mpsc::UnboundedSender<PassReport>>,
}

impl ReconciliationLoop {
    /// Open the working copy and record the baseline revision.
    ///
    /// Failure here is a startup failure for this project only.
    pub async fn initialize(
        project: Project,
        access: Arc<dyn RepositoryAccess>,
        applier: Arc<dyn Applier>,
        settings: LoopSettings,
        status: StatusBoard,
    ) -> Result<Self, DaemonError> {
        let name = project.name.clone();
        let project = Arc::new(project);
        let opening = project.clone();

        let (handle, tracker) = tokio::task::spawn_blocking(move || {
            let handle = RepositoryHandle::open(&opening, access)?;
            let tracker = RevisionTracker::initialize(&handle)?;
            Ok::<_, SyncError>((handle, tracker))
        })
        .await
        .map_err(|err| DaemonError::Task(format!("initialize {name}: {err}")))?
        .map_err(|source| DaemonError::Startup {
            project: name.clone(),
            source,
        })?;

        let baseline = tracker.last_synced().clone();
        status
            .update(&name, |s| s.last_synced_revision = Some(baseline))
            .await;

        Ok(Self {
            project,
            handle,
            tracker,
            applier,
            settings,
            status,
            reports: None,
        })
    }

    /// Also send every pass result to `reports`.
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<PassReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Run until `shutdown` fires. The first tick comes one interval after start.
    pub async fn run(
        mut self,
        mut triggers: TriggerReceiver,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let period = self.settings.interval;
        let mut next_tick = Instant::now() + period;
        let mut triggers_open = true;

        self.set_phase(Phase::Idle).await;
        tracing::info!(
            project = %self.project.name,
            interval_ms = period.as_millis() as u64,
            "reconciliation loop started",
        );

        loop {
            let wake = tokio::select! {
                _ = shutdown.recv() => break,
                _ = sleep_until(next_tick) => Wake::Tick,
                signal = triggers.recv(), if triggers_open => match signal {
                    Some(()) => Wake::Trigger,
                    None => {
                        triggers_open = false;
                        continue;
                    }
                },
            };

            next_tick = next_tick_after(next_tick, period, Instant::now());
            triggers.take_pending();

            self.pass(wake).await;
        }

        self.set_phase(Phase::Stopped).await;
        tracing::info!(project = %self.project.name, "reconciliation loop stopped");
    }

    /// One reconciliation pass: refresh, compare, apply when changed.
    pub async fn pass(&mut self, wake: Wake) -> PassOutcome {
        self.set_phase(Phase::Checking).await;
        let outcome = self.check_and_apply().await;

        let name = &self.project.name;
        match &outcome {
            PassOutcome::NoChange { revision } => {
                tracing::debug!(project = %name, revision = %revision.short(), ?wake, "no change");
            }
            PassOutcome::Applied { revision } => {
                tracing::info!(project = %name, revision = %revision.short(), ?wake, "revision applied");
            }
            PassOutcome::CheckFailed { error } => {
                tracing::error!(project = %name, error = %error, ?wake, "check failed; will retry");
            }
            PassOutcome::ApplyFailed { revision, error } => {
                tracing::error!(
                    project = %name,
                    revision = %revision.short(),
                    error = %error,
                    ?wake,
                    "apply failed; revision left uncommitted for retry",
                );
            }
        }

        self.publish(&outcome).await;
        if let Some(reports) = &self.reports {
            let _ = reports.send(PassReport {
                project: name.clone(),
                wake,
                outcome: outcome.clone(),
            });
        }
        outcome
    }

    async fn check_and_apply(&mut self) -> PassOutcome {
        let handle = self.handle.clone();
        let checked = self
            .blocking("refresh", self.settings.check_deadline, move || {
                handle.refresh_and_head().map_err(SyncError::from)
            })
            .await;
        let observed = match checked {
            Ok(revision) => revision,
            Err(err) => {
                return PassOutcome::CheckFailed {
                    error: err.to_string(),
                }
            }
        };

        self.tracker.mark_checked(Utc::now());
        if !self.tracker.diff(&observed) {
            return PassOutcome::NoChange { revision: observed };
        }

        self.set_phase(Phase::Applying).await;
        tracing::info!(
            project = %self.project.name,
            from = %self.tracker.last_synced().short(),
            to = %observed.short(),
            "revision changed; applying",
        );

        let applier = self.applier.clone();
        let project = self.project.clone();
        let revision = observed.clone();
        let applied = self
            .blocking("apply", self.settings.apply_deadline, move || {
                applier.apply(&project, &revision).map_err(SyncError::from)
            })
            .await;

        match applied {
            Ok(()) => {
                self.tracker.commit(observed.clone());
                PassOutcome::Applied { revision: observed }
            }
            Err(err) => PassOutcome::ApplyFailed {
                revision: observed,
                error: err.to_string(),
            },
        }
    }

    /// Run blocking work on the blocking pool.
    ///
    /// Past the deadline the pass keeps waiting: the working copy stays owned by
    /// this pass, and a later pass never overlaps it.
    async fn blocking<T, F>(
        &self,
        operation: &'static str,
        deadline: Option<Duration>,
        work: F,
    ) -> Result<T, DaemonError>
    where
        F: FnOnce() -> Result<T, SyncError> + Send + 'static,
        T: Send + 'static,
    {
        let mut task = tokio::task::spawn_blocking(work);
        let joined = match deadline {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!(
                        project = %self.project.name,
                        operation,
                        deadline_secs = limit.as_secs(),
                        "operation exceeded its deadline; still waiting for it",
                    );
                    task.await
                }
            },
            None => task.await,
        };
        joined
            .map_err(|err| DaemonError::Task(format!("{operation}: {err}")))?
            .map_err(DaemonError::from)
    }

    async fn publish(&self, outcome: &PassOutcome) {
        let last_checked_at = self.tracker.state().last_checked_at;
        let last_synced = self.tracker.last_synced().clone();
        let now = Utc::now();
        let (applied, error) = match outcome {
            PassOutcome::NoChange { .. } => (false, None),
            PassOutcome::Applied { .. } => (true, None),
            PassOutcome::CheckFailed { error } | PassOutcome::ApplyFailed { error, .. } => {
                (false, Some(error.clone()))
            }
        };

        self.status
            .update(&self.project.name, move |s| {
                s.phase = Phase::Idle;
                s.passes += 1;
                s.last_checked_at = last_checked_at;
                s.last_synced_revision = Some(last_synced);
                s.last_error = error;
                if applied {
                    s.applies += 1;
                    s.last_applied_at = Some(now);
                }
            })
            .await;
    }

    async fn set_phase(&self, phase: Phase) {
        self.status
            .update(&self.project.name, |s| s.phase = phase)
            .await;
    }
}

/// Next tick strictly after `now`. Ticks missed during a long pass collapse into one.
fn next_tick_after(mut next: Instant, period: Duration, now: Instant) -> Instant {
    while next <= now {
        next += period;
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_tick_is_unchanged_when_still_in_future() {
        let start = Instant::now();
        let next = start + Duration::from_secs(5);
        assert_eq!(next_tick_after(next, Duration::from_secs(5), start), next);
    }

    #[test]
    fn missed_ticks_are_skipped_not_queued() {
        let start = Instant::now();
        let period = Duration::from_secs(5);
        let next = start + period;
        // A pass that ran 17s swallowed the ticks at 5s, 10s and 15s.
        let after = next_tick_after(next, period, start + Duration::from_secs(17));
        assert_eq!(after, start + Duration::from_secs(20));
    }

    #[test]
    fn due_tick_advances_by_one_period() {
        let start = Instant::now();
        let period = Duration::from_secs(5);
        let next = start + period;
        assert_eq!(next_tick_after(next, period, next), next + period);
    }

    #[test]
    fn settings_follow_config() {
        let config = converge_core::config::parse(
            "interval_secs: 9\ncheck_deadline_secs: 0\n",
            std::path::Path::new("/"),
        )
        .expect("parse");
        let settings = LoopSettings::from(&config);
        assert_eq!(settings.interval, Duration::from_secs(9));
        assert_eq!(settings.check_deadline, None);
        assert_eq!(settings.apply_deadline, Some(DEFAULT_APPLY_DEADLINE));
    }
}
