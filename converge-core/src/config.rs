//! Static process configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.converge/
//!   config.yaml     (default location; override with --config / $CONVERGE_CONFIG)
//! ```
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)` / `load_at(path)`: explicit location; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Relative `workdir` and project `path` values resolve against the directory
//! holding the config file.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::types::{Project, ProjectName};

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_CHECK_DEADLINE: Duration = Duration::from_secs(120);
pub const DEFAULT_APPLY_DEADLINE: Duration = Duration::from_secs(600);
pub const DEFAULT_WORKDIR: &str = "tmp/git";

/// Resolved, validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Period of each project's timer.
    pub interval: Duration,
    /// Parent directory for working copies without an explicit `path`.
    pub workdir: PathBuf,
    /// `None` disables the slow-check warning.
    pub check_deadline: Option<Duration>,
    /// `None` disables the slow-apply warning.
    pub apply_deadline: Option<Duration>,
    /// Abort the whole process when any project fails to initialize.
    pub strict_startup: bool,
    pub projects: Vec<Project>,
}

/// On-disk shape of `config.yaml`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    listen_addr: Option<SocketAddr>,
    interval_secs: Option<u64>,
    workdir: Option<PathBuf>,
    check_deadline_secs: Option<u64>,
    apply_deadline_secs: Option<u64>,
    #[serde(default)]
    strict_startup: bool,
    #[serde(default)]
    projects: Vec<ProjectEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectEntry {
    name: String,
    repository: String,
    path: Option<PathBuf>,
    apply_command: Option<String>,
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.converge/config.yaml`: pure, no I/O.
pub fn default_path_at(home: &Path) -> PathBuf {
    home.join(".converge").join("config.yaml")
}

/// `default_path_at` convenience wrapper.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    Ok(default_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load and validate the config file at `path`.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    let base = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let base = std::fs::canonicalize(&base).unwrap_or(base);
    let file: ConfigFile =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    resolve(file, &base)
}

/// Load `explicit` when given, otherwise the default file under `home`.
pub fn load_or_default_at(explicit: Option<&Path>, home: &Path) -> Result<Config, ConfigError> {
    match explicit {
        Some(path) => load_at(path),
        None => load_at(&default_path_at(home)),
    }
}

/// `load_or_default_at` convenience wrapper.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    match explicit {
        Some(path) => load_at(path),
        None => load_at(&default_path()?),
    }
}

/// Parse YAML text directly, resolving relative paths against `base`.
pub fn parse(contents: &str, base: &Path) -> Result<Config, ConfigError> {
    let file: ConfigFile =
        serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: base.to_path_buf(),
            source,
        })?;
    resolve(file, base)
}

// ---------------------------------------------------------------------------
// 3. Validation
// ---------------------------------------------------------------------------

fn resolve(file: ConfigFile, base: &Path) -> Result<Config, ConfigError> {
    let interval = match file.interval_secs {
        Some(0) => {
            return Err(ConfigError::Invalid(
                "interval_secs must be greater than zero".to_string(),
            ))
        }
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_INTERVAL,
    };

    let listen_addr = match file.listen_addr {
        Some(addr) => addr,
        None => DEFAULT_LISTEN_ADDR
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("default listen address: {e}")))?,
    };

    let workdir = absolutize(base, file.workdir.unwrap_or_else(|| DEFAULT_WORKDIR.into()));

    let mut seen = HashSet::new();
    let mut owners: HashMap<PathBuf, String> = HashMap::new();
    let mut projects = Vec::with_capacity(file.projects.len());
    for entry in file.projects {
        validate_entry(&entry)?;
        if !seen.insert(entry.name.clone()) {
            return Err(ConfigError::DuplicateProject(entry.name));
        }
        let path = match entry.path {
            Some(path) => absolutize(base, path),
            None => workdir.join(&entry.name),
        };
        // A working copy belongs to exactly one loop.
        if let Some(first) = owners.get(&path) {
            return Err(ConfigError::DuplicatePath {
                path,
                first: first.clone(),
                second: entry.name,
            });
        }
        owners.insert(path.clone(), entry.name.clone());
        projects.push(Project {
            name: ProjectName::from(entry.name),
            repository: entry.repository,
            path,
            apply_command: entry.apply_command.filter(|cmd| !cmd.trim().is_empty()),
        });
    }

    Ok(Config {
        listen_addr,
        interval,
        workdir,
        check_deadline: deadline(file.check_deadline_secs, DEFAULT_CHECK_DEADLINE),
        apply_deadline: deadline(file.apply_deadline_secs, DEFAULT_APPLY_DEADLINE),
        strict_startup: file.strict_startup,
        projects,
    })
}

fn validate_entry(entry: &ProjectEntry) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidProject {
        name: entry.name.clone(),
        reason: reason.to_string(),
    };
    if entry.name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    let has_separator = entry.name.contains('/') || entry.name.contains('\\');
    if has_separator || entry.name == "." || entry.name == ".." {
        return Err(invalid("name must not contain path separators"));
    }
    // Names appear verbatim in `/sync/<name>` and in directory names.
    if !entry.name.chars().all(is_name_char) {
        return Err(invalid(
            "name may only contain ASCII letters, digits, '-', '_' and '.'",
        ));
    }
    if entry.repository.trim().is_empty() {
        return Err(invalid("repository must not be empty"));
    }
    Ok(())
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// `0` disables a deadline; absent means the default.
fn deadline(secs: Option<u64>, default: Duration) -> Option<Duration> {
    match secs {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => Some(default),
    }
}

fn absolutize(base: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}
