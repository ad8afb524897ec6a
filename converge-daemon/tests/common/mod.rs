//! In-memory remotes and appliers for driving reconciliation loops.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use converge_core::{Project, ProjectName, Revision};
use converge_daemon::{
    LoopSettings, Phase, PassReport, ReconciliationLoop, StatusBoard, TriggerBroadcaster,
};
use converge_sync::{ApplyError, Applier, RepositoryAccess, RepositoryAccessError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// A latch blocking threads while closed.
#[derive(Clone, Default)]
pub struct Gate {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn close(&self) {
        *self.state.0.lock().unwrap() = true;
    }

    pub fn open(&self) {
        *self.state.0.lock().unwrap() = false;
        self.state.1.notify_all();
    }

    fn wait(&self) {
        let (closed, cvar) = &*self.state;
        let mut guard = closed.lock().unwrap();
        while *guard {
            guard = cvar.wait(guard).unwrap();
        }
    }
}

/// Tracks how many callers are inside a section at once.
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// A remote whose head is `r<n>`. The working copy only moves on pull.
#[derive(Default)]
pub struct FakeRemote {
    remote: AtomicUsize,
    local: AtomicUsize,
    advance_on_pull: AtomicBool,
    failing: AtomicBool,
    pub pull_gate: Gate,
    pub pulls: InFlight,
    pull_count: AtomicUsize,
}

impl FakeRemote {
    pub fn at(n: usize) -> Arc<Self> {
        let remote = Self::default();
        remote.remote.store(n, Ordering::SeqCst);
        remote.local.store(n, Ordering::SeqCst);
        Arc::new(remote)
    }

    /// Advance the remote head by one commit.
    pub fn push(&self) -> Revision {
        revision(self.remote.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Every pull sees a fresh commit.
    pub fn advance_on_every_pull(&self) {
        self.advance_on_pull.store(true, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn pull_count(&self) -> usize {
        self.pull_count.load(Ordering::SeqCst)
    }
}

pub fn revision(n: usize) -> Revision {
    Revision(format!("r{n}"))
}

impl RepositoryAccess for FakeRemote {
    fn clone_repository(&self, _url: &str, _path: &Path) -> Result<(), RepositoryAccessError> {
        Ok(())
    }

    fn open(&self, _path: &Path) -> Result<(), RepositoryAccessError> {
        Ok(())
    }

    fn pull(&self, _path: &Path) -> Result<(), RepositoryAccessError> {
        self.pulls.enter();
        self.pull_count.fetch_add(1, Ordering::SeqCst);
        self.pull_gate.wait();
        let result = if self.failing.load(Ordering::SeqCst) {
            Err(RepositoryAccessError::Other("remote unreachable".to_string()))
        } else {
            if self.advance_on_pull.load(Ordering::SeqCst) {
                self.remote.fetch_add(1, Ordering::SeqCst);
            }
            self.local
                .store(self.remote.load(Ordering::SeqCst), Ordering::SeqCst);
            Ok(())
        };
        self.pulls.exit();
        result
    }

    fn head_revision(&self, _path: &Path) -> Result<Revision, RepositoryAccessError> {
        Ok(revision(self.local.load(Ordering::SeqCst)))
    }
}

/// Records every apply attempt; can fail, stall or hold on a gate.
#[derive(Default)]
pub struct RecordingApplier {
    attempts: Mutex<Vec<Revision>>,
    failures_left: AtomicUsize,
    delay: Mutex<Duration>,
    pub gate: Gate,
    pub in_flight: InFlight,
}

impl RecordingApplier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_times(times: usize) -> Arc<Self> {
        let applier = Self::default();
        applier.failures_left.store(times, Ordering::SeqCst);
        Arc::new(applier)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        let applier = Self::default();
        *applier.delay.lock().unwrap() = delay;
        Arc::new(applier)
    }

    pub fn attempts(&self) -> Vec<Revision> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Applier for RecordingApplier {
    fn apply(&self, _project: &Project, revision: &Revision) -> Result<(), ApplyError> {
        self.in_flight.enter();
        self.attempts.lock().unwrap().push(revision.clone());
        self.gate.wait();
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        self.in_flight.exit();
        if failed {
            return Err(ApplyError::Rejected(format!("{revision} rejected")));
        }
        Ok(())
    }
}

pub fn project(name: &str) -> Project {
    Project {
        name: ProjectName::from(name),
        repository: format!("https://example.com/{name}.git"),
        path: PathBuf::from("/nonexistent/converge").join(name),
        apply_command: None,
    }
}

/// Running loops sharing one broadcaster, status board and report stream.
pub struct Harness {
    pub broadcaster: Arc<TriggerBroadcaster>,
    pub status: StatusBoard,
    shutdown: broadcast::Sender<()>,
    reports_tx: mpsc::UnboundedSender<PassReport>,
    reports: mpsc::UnboundedReceiver<PassReport>,
    handles: Vec<JoinHandle<()>>,
}

impl Harness {
    pub fn new() -> Self {
        let (shutdown, _) = broadcast::channel(4);
        let (reports_tx, reports) = mpsc::unbounded_channel();
        Self {
            broadcaster: Arc::new(TriggerBroadcaster::new()),
            status: StatusBoard::new(),
            shutdown,
            reports_tx,
            reports,
            handles: Vec::new(),
        }
    }

    pub async fn start(
        &mut self,
        name: &str,
        remote: Arc<FakeRemote>,
        applier: Arc<dyn Applier>,
        interval: Duration,
    ) {
        let project = project(name);
        self.status.insert(&project).await;
        let settings = LoopSettings {
            interval,
            check_deadline: None,
            apply_deadline: None,
        };
        let reconciler =
            ReconciliationLoop::initialize(project, remote, applier, settings, self.status.clone())
                .await
                .expect("initialize")
                .with_reports(self.reports_tx.clone());
        let triggers = self.broadcaster.register(ProjectName::from(name));
        self.handles
            .push(tokio::spawn(reconciler.run(triggers, self.shutdown.subscribe())));
    }

    /// Next pass report. Waits without a timer so paused-clock tests stay deterministic.
    pub async fn next_report(&mut self) -> PassReport {
        self.reports.recv().await.expect("report stream open")
    }

    pub async fn assert_quiet(&mut self, wait: Duration) {
        if let Ok(Some(report)) = tokio::time::timeout(wait, self.reports.recv()).await {
            panic!("unexpected extra pass: {report:?}");
        }
    }

    pub async fn wait_for_phase(&self, name: &str, phase: Phase) {
        let name = ProjectName::from(name);
        for _ in 0..500 {
            if self.status.get(&name).await.map(|s| s.phase) == Some(phase) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{name} never reached {phase:?}");
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        for handle in self.handles {
            handle.await.expect("loop task");
        }
    }
}
