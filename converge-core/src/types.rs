//! Domain types shared by every converge crate.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed, stable identifier for a managed project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectName(pub String);

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// An opaque, comparable identifier for one state of a tracked repository.
///
/// For git this is the hex object id of the commit `HEAD` resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub String);

impl Revision {
    /// First seven characters, for log lines and tables.
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Revision {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Revision {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A repository managed by converge. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: ProjectName,
    /// Remote URL (or local path) the working copy is cloned from.
    pub repository: String,
    /// Absolute path of the local working copy.
    pub path: PathBuf,
    /// Shell command run on every detected revision change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_command: Option<String>,
}
