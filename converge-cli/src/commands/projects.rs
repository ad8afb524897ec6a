//! `converge projects`: what the config file declares.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use converge_core::config;

/// Arguments for `converge projects`.
#[derive(Args, Debug)]
pub struct ProjectsArgs {
    /// Config file (default: ~/.converge/config.yaml).
    #[arg(long, env = "CONVERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize, Tabled)]
struct ProjectRow {
    #[tabled(rename = "project")]
    name: String,
    #[tabled(rename = "repository")]
    repository: String,
    #[tabled(rename = "working copy")]
    path: String,
    #[tabled(rename = "apply")]
    apply: String,
}

impl ProjectsArgs {
    pub fn run(self) -> Result<()> {
        let config = config::load(self.config.as_deref()).context("failed to load config")?;
        let rows: Vec<ProjectRow> = config
            .projects
            .iter()
            .map(|project| ProjectRow {
                name: project.name.to_string(),
                repository: project.repository.clone(),
                path: project.path.display().to_string(),
                apply: project
                    .apply_command
                    .clone()
                    .unwrap_or_else(|| "(log only)".to_string()),
            })
            .collect();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize projects JSON")?
            );
            return Ok(());
        }

        println!(
            "{} projects | interval {}s | listen {}",
            rows.len(),
            config.interval.as_secs(),
            config.listen_addr,
        );
        if rows.is_empty() {
            println!("No projects configured.");
            return Ok(());
        }
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
