//! The convergence action run when a project's revision changes.

use std::process::Command;
use std::sync::Arc;

use converge_core::{Project, Revision};

use crate::error::ApplyError;

/// Injected convergence action.
///
/// Implementations are blocking; the daemon calls them from the blocking pool,
/// one at a time per project.
pub trait Applier: Send + Sync {
    fn apply(&self, project: &Project, revision: &Revision) -> Result<(), ApplyError>;
}

impl<F> Applier for F
where
    F: Fn(&Project, &Revision) -> Result<(), ApplyError> + Send + Sync,
{
    fn apply(&self, project: &Project, revision: &Revision) -> Result<(), ApplyError> {
        self(project, revision)
    }
}

/// Only reports the change. Used when a project has no `apply_command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogApplier;

impl Applier for LogApplier {
    fn apply(&self, project: &Project, revision: &Revision) -> Result<(), ApplyError> {
        tracing::info!(
            project = %project.name,
            revision = %revision,
            "revision change detected (no apply command configured)",
        );
        Ok(())
    }
}

/// Runs a shell command inside the working copy.
///
/// The command sees `CONVERGE_PROJECT`, `CONVERGE_REVISION` and
/// `CONVERGE_REPOSITORY` in its environment. A non-zero exit is an error.
#[derive(Debug, Clone)]
pub struct CommandApplier {
    command: String,
}

/// Trailing stderr lines kept in [`ApplyError::Failed`].
const STDERR_TAIL_LINES: usize = 20;

impl CommandApplier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Applier for CommandApplier {
    fn apply(&self, project: &Project, revision: &Revision) -> Result<(), ApplyError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&project.path)
            .env("CONVERGE_PROJECT", &project.name.0)
            .env("CONVERGE_REVISION", &revision.0)
            .env("CONVERGE_REPOSITORY", &project.repository)
            .output()
            .map_err(|source| ApplyError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::debug!(project = %project.name, stdout = %stdout.trim_end(), "apply command output");
        }

        if !output.status.success() {
            return Err(ApplyError::Failed {
                command: self.command.clone(),
                status: output.status.to_string(),
                stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_LINES),
            });
        }
        Ok(())
    }
}

/// Default applier for `project`: its command when configured, otherwise log-only.
pub fn applier_for(project: &Project) -> Arc<dyn Applier> {
    match project.apply_command.as_deref() {
        Some(command) => Arc::new(CommandApplier::new(command)),
        None => Arc::new(LogApplier),
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_core::ProjectName;
    use tempfile::TempDir;

    fn project_in(dir: &TempDir, command: Option<&str>) -> Project {
        Project {
            name: ProjectName::from("argo"),
            repository: "https://example.com/argo.git".to_string(),
            path: dir.path().to_path_buf(),
            apply_command: command.map(str::to_string),
        }
    }

    #[test]
    fn command_applier_exports_revision_environment() {
        let dir = TempDir::new().expect("tempdir");
        let project = project_in(&dir, None);
        let applier =
            CommandApplier::new("printf '%s %s' \"$CONVERGE_PROJECT\" \"$CONVERGE_REVISION\" > applied.txt");

        applier
            .apply(&project, &Revision::from("r2"))
            .expect("apply");

        let written = std::fs::read_to_string(dir.path().join("applied.txt")).expect("read");
        assert_eq!(written, "argo r2");
    }

    #[test]
    fn command_applier_reports_non_zero_exit_with_stderr() {
        let dir = TempDir::new().expect("tempdir");
        let project = project_in(&dir, None);
        let applier = CommandApplier::new("echo 'manifest invalid' >&2; exit 3");

        let err = applier.apply(&project, &Revision::from("r2")).unwrap_err();
        match err {
            ApplyError::Failed { stderr, .. } => assert_eq!(stderr, "manifest invalid"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn applier_for_picks_command_when_configured() {
        let dir = TempDir::new().expect("tempdir");
        let with_command = project_in(&dir, Some("touch marker"));
        applier_for(&with_command)
            .apply(&with_command, &Revision::from("r1"))
            .expect("apply");
        assert!(dir.path().join("marker").exists());

        let without = project_in(&dir, None);
        applier_for(&without)
            .apply(&without, &Revision::from("r1"))
            .expect("log applier never fails");
    }

    #[test]
    fn closures_are_appliers() {
        let dir = TempDir::new().expect("tempdir");
        let reject = |_: &Project, rev: &Revision| -> Result<(), ApplyError> {
            Err(ApplyError::Rejected(format!("{rev} is blocked")))
        };
        let err = reject
            .apply(&project_in(&dir, None), &Revision::from("r9"))
            .unwrap_err();
        assert_eq!(err.to_string(), "apply rejected: r9 is blocked");
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail("", 2), "");
    }
}
