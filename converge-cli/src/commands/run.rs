//! `converge run`: the reconciliation daemon in the foreground.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use converge_core::config;
use converge_daemon::start_blocking;

/// Arguments for `converge run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Config file (default: ~/.converge/config.yaml).
    #[arg(long, env = "CONVERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address for the control surface; overrides the config file.
    #[arg(long, env = "CONVERGE_LISTEN_ADDR")]
    pub listen: Option<SocketAddr>,

    /// Polling interval in seconds; overrides the config file.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, env = "CONVERGE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "CONVERGE_LOG_JSON")]
    pub log_json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let mut config = config::load(self.config.as_deref()).context("failed to load config")?;
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(secs) = self.interval {
            config.interval = Duration::from_secs(secs);
        }

        start_blocking(config, &self.log_level, self.log_json).context("daemon exited with error")
    }
}
