//! `converge status`: per-project state from a running daemon.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use converge_daemon::http::StatusResponse;
use converge_daemon::{Phase, ProjectStatus};

use super::{call, format_age, DaemonAddr};

/// Arguments for `converge status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub daemon: DaemonAddr,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "project")]
    project: String,
    #[tabled(rename = "phase")]
    phase: String,
    #[tabled(rename = "revision")]
    revision: String,
    #[tabled(rename = "last check")]
    last_check: String,
    #[tabled(rename = "last apply")]
    last_apply: String,
    #[tabled(rename = "passes")]
    passes: u64,
    #[tabled(rename = "error")]
    error: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let status: StatusResponse = call(ureq::get(&self.daemon.url("/status")))?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(&status);
        Ok(())
    }
}

fn print_table(status: &StatusResponse) {
    let failing = status
        .projects
        .iter()
        .filter(|p| p.phase == Phase::Failed || p.last_error.is_some())
        .count();
    println!(
        "Converge v{} | up since {} | {} projects | {} with errors",
        status.version,
        status.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        status.projects.len(),
        failing,
    );

    if status.projects.is_empty() {
        println!("No projects configured.");
        return;
    }

    println!(
        "Indicators: {} IDLE  {} BUSY  {} ERROR  {} STOPPED",
        "■".green().bold(),
        "■".yellow().bold(),
        "■".red().bold(),
        "■".bright_black().bold(),
    );
    let rows: Vec<StatusTableRow> = status.projects.iter().map(row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn row(project: &ProjectStatus) -> StatusTableRow {
    StatusTableRow {
        project: project.name.to_string(),
        phase: format!("{} {}", indicator(project), phase_label(project.phase)),
        revision: project
            .last_synced_revision
            .as_ref()
            .map(|r| r.short().to_string())
            .unwrap_or_else(|| "-".to_string()),
        last_check: format_age(project.last_checked_at),
        last_apply: format_age(project.last_applied_at),
        passes: project.passes,
        error: project
            .last_error
            .as_deref()
            .map(|e| truncate(e, 60))
            .unwrap_or_default(),
    }
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Initializing => "INITIALIZING",
        Phase::Idle => "IDLE",
        Phase::Checking => "CHECKING",
        Phase::Applying => "APPLYING",
        Phase::Failed => "FAILED",
        Phase::Stopped => "STOPPED",
    }
}

fn indicator(project: &ProjectStatus) -> String {
    if project.phase == Phase::Failed || project.last_error.is_some() {
        return "■".red().bold().to_string();
    }
    match project.phase {
        Phase::Idle => "■".green().bold().to_string(),
        Phase::Initializing | Phase::Checking | Phase::Applying => "■".yellow().bold().to_string(),
        Phase::Failed | Phase::Stopped => "■".bright_black().bold().to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() <= max {
        return first_line.to_string();
    }
    let kept: String = first_line.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}
