//! Error types for converge-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// Two project entries share a name.
    #[error("duplicate project name '{0}'")]
    DuplicateProject(String),

    /// Two project entries resolve to the same working copy.
    #[error("projects '{first}' and '{second}' share the working copy {path}")]
    DuplicatePath {
        path: PathBuf,
        first: String,
        second: String,
    },

    /// A single project entry is unusable.
    #[error("invalid project '{name}': {reason}")]
    InvalidProject { name: String, reason: String },

    /// A top-level setting is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.converge/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}
