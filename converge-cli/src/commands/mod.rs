pub mod projects;
pub mod run;
pub mod status;
pub mod sync;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::de::DeserializeOwned;

use converge_core::config::DEFAULT_LISTEN_ADDR;
use converge_daemon::http::ErrorBody;

/// Where the client subcommands find a running daemon.
#[derive(Args, Debug, Clone)]
pub struct DaemonAddr {
    /// Control surface address of the running daemon.
    #[arg(long = "addr", env = "CONVERGE_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    pub addr: String,
}

impl DaemonAddr {
    pub fn url(&self, path: &str) -> String {
        let base = self.addr.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{base}{path}")
        } else {
            format!("http://{base}{path}")
        }
    }
}

/// Send `request` and decode the JSON body. Error bodies become the error message.
pub fn call<T: DeserializeOwned>(request: ureq::Request) -> Result<T> {
    let url = request.url().to_string();
    match request.call() {
        Ok(response) => response
            .into_json()
            .with_context(|| format!("invalid response from {url}")),
        Err(ureq::Error::Status(code, response)) => {
            let message = response
                .into_json::<ErrorBody>()
                .map(|body| body.error)
                .unwrap_or_else(|_| format!("daemon answered HTTP {code}"));
            bail!("{message}")
        }
        Err(err) => Err(anyhow::Error::new(err))
            .with_context(|| format!("could not reach daemon at {url} (is `converge run` running?)")),
    }
}

/// "12s ago", "3m ago", "never".
pub fn format_age(at: Option<DateTime<Utc>>) -> String {
    let Some(at) = at else {
        return "never".to_string();
    };
    let secs = (Utc::now() - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86400),
    }
}
