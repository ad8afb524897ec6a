//! `converge sync`: manual trigger against a running daemon.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use converge_daemon::http::{ProjectSyncAccepted, SyncAccepted};

use super::{call, DaemonAddr};

/// Arguments for `converge sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Project to re-check (omit to trigger every project).
    pub project: Option<String>,

    #[command(flatten)]
    pub daemon: DaemonAddr,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        match self.project {
            None => {
                let accepted: SyncAccepted = call(ureq::post(&self.daemon.url("/sync")))?;
                println!(
                    "{} {} project(s) notified, {} already pending",
                    "sync accepted:".green().bold(),
                    accepted.notified,
                    accepted.coalesced,
                );
            }
            Some(name) => {
                let accepted: ProjectSyncAccepted =
                    call(ureq::post(&self.daemon.url(&format!("/sync/{name}"))))?;
                let note = if accepted.coalesced {
                    " (a re-check was already pending)"
                } else {
                    ""
                };
                println!(
                    "{} {}{note}",
                    "sync accepted:".green().bold(),
                    accepted.project,
                );
            }
        }
        println!("Outcomes appear in the daemon log and in `converge status`.");
        Ok(())
    }
}
