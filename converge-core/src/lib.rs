//! converge core library: domain types, configuration loading, errors.
//!
//! - [`types`]: newtypes and the immutable [`Project`] record
//! - [`config`]: YAML configuration with validation
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::ConfigError;
pub use types::{Project, ProjectName, Revision};
