//! converge daemon runtime: per-project reconciliation loops, trigger fan-out,
//! and the HTTP control surface.

mod error;
pub mod http;
pub mod reconcile;
mod runtime;
pub mod status;
pub mod trigger;

pub use error::DaemonError;
pub use reconcile::{LoopSettings, PassOutcome, PassReport, ReconciliationLoop, Wake};
pub use runtime::{init_tracing, run, serve, start_blocking, ApplierFactory};
pub use status::{Phase, ProjectStatus, StatusBoard};
pub use trigger::{BroadcastReport, Delivery, TriggerBroadcaster, TriggerReceiver};
