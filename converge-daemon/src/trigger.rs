//! Manual trigger delivery.
//!
//! Every project loop owns one slot: a channel of capacity one. Senders use
//! `try_send`, so a full slot means a re-check is already pending and the new
//! signal coalesces into it. The broadcaster never waits on a loop.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

use converge_core::ProjectName;

/// Result of offering one signal to one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// The slot was empty; the loop will run one more pass.
    Delivered,
    /// A signal was already pending; this one merged into it.
    Coalesced,
    /// The loop has exited.
    Closed,
}

/// Receiving half, owned by a single reconciliation loop.
#[derive(Debug)]
pub struct TriggerReceiver {
    rx: mpsc::Receiver<()>,
}

impl TriggerReceiver {
    /// Wait for the next signal. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }

    /// Consume a pending signal without waiting. Returns whether one was pending.
    pub fn take_pending(&mut self) -> bool {
        match self.rx.try_recv() {
            Ok(()) => true,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => false,
        }
    }
}

#[derive(Debug, Clone)]
struct TriggerSender {
    tx: mpsc::Sender<()>,
}

impl TriggerSender {
    fn signal(&self) -> Delivery {
        match self.tx.try_send(()) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(())) => Delivery::Coalesced,
            Err(TrySendError::Closed(())) => Delivery::Closed,
        }
    }
}

/// Per-project delivery counts for one `notify_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: Vec<ProjectName>,
    pub coalesced: Vec<ProjectName>,
    pub closed: Vec<ProjectName>,
}

impl BroadcastReport {
    /// Projects that will run a pass because of this broadcast (new or already pending).
    pub fn notified(&self) -> usize {
        self.delivered.len() + self.coalesced.len()
    }
}

/// Fans a single trigger out to every registered project loop.
#[derive(Debug, Default)]
pub struct TriggerBroadcaster {
    slots: Mutex<BTreeMap<ProjectName, TriggerSender>>,
}

impl TriggerBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the slot for `project`. Re-registering replaces the old slot.
    pub fn register(&self, project: ProjectName) -> TriggerReceiver {
        let (tx, rx) = mpsc::channel(1);
        self.lock().insert(project, TriggerSender { tx });
        TriggerReceiver { rx }
    }

    /// Offer one signal to every registered slot. Never blocks.
    ///
    /// Slots whose loop has exited are pruned.
    pub fn notify_all(&self) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut slots = self.lock();
        for (name, sender) in slots.iter() {
            match sender.signal() {
                Delivery::Delivered => report.delivered.push(name.clone()),
                Delivery::Coalesced => report.coalesced.push(name.clone()),
                Delivery::Closed => report.closed.push(name.clone()),
            }
        }
        for name in &report.closed {
            slots.remove(name);
            tracing::debug!(project = %name, "pruned trigger slot of stopped loop");
        }
        report
    }

    /// Offer one signal to a single project. `None` if it is not registered.
    pub fn notify(&self, project: &ProjectName) -> Option<Delivery> {
        let mut slots = self.lock();
        let delivery = slots.get(project)?.signal();
        if delivery == Delivery::Closed {
            slots.remove(project);
        }
        Some(delivery)
    }

    pub fn projects(&self) -> Vec<ProjectName> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ProjectName, TriggerSender>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
