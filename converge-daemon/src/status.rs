//! Read-only view of every project loop, served by `GET /status`.
//!
//! Each loop writes only its own entry. Nothing here feeds back into
//! reconciliation decisions; the revision state itself lives in the loop.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use converge_core::{Project, ProjectName, Revision};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    Idle,
    Checking,
    Applying,
    /// Startup failed; the loop is not running.
    Failed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub name: ProjectName,
    pub repository: String,
    pub phase: Phase,
    pub last_synced_revision: Option<Revision>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_applied_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Completed reconciliation passes.
    pub passes: u64,
    /// Successful applies.
    pub applies: u64,
}

impl ProjectStatus {
    fn new(project: &Project) -> Self {
        Self {
            name: project.name.clone(),
            repository: project.repository.clone(),
            phase: Phase::Initializing,
            last_synced_revision: None,
            last_checked_at: None,
            last_applied_at: None,
            last_error: None,
            passes: 0,
            applies: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    entries: Arc<RwLock<BTreeMap<ProjectName, ProjectStatus>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an `initializing` entry for `project`.
    pub async fn insert(&self, project: &Project) {
        self.entries
            .write()
            .await
            .insert(project.name.clone(), ProjectStatus::new(project));
    }

    /// Mutate the entry for `name`, if present.
    pub async fn update(&self, name: &ProjectName, f: impl FnOnce(&mut ProjectStatus)) {
        if let Some(entry) = self.entries.write().await.get_mut(name) {
            f(entry);
        }
    }

    pub async fn get(&self, name: &ProjectName) -> Option<ProjectStatus> {
        self.entries.read().await.get(name).cloned()
    }

    /// All entries, sorted by project name.
    pub async fn snapshot(&self) -> Vec<ProjectStatus> {
        self.entries.read().await.values().cloned().collect()
    }
}
