//! rebake core library: project configuration record, persistence, errors.
//!
//! - [`types`]: [`ProjectConfig`] and the variable map aliases
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load / save of `.cruft.json`

pub mod config;
pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::{ProjectConfig, ProjectContext, Variables};
