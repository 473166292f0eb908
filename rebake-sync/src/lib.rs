//! # rebake-sync
//!
//! Keeps a generated project in step with its template.
//!
//! - [`git`]: the [`Vcs`] gateway and its `git` CLI implementation
//! - [`check`]: drift detection
//! - [`variables`]: new-variable detection and value collection
//! - [`update`]: the [`Updater`] pipeline
//!
//! ```rust,no_run
//! use std::path::Path;
//! use rebake_renderer::TeraRenderer;
//! use rebake_sync::{DefaultsPrompter, GitCli, Updater};
//!
//! let mut updater = Updater::new(GitCli::new(), TeraRenderer::new(), DefaultsPrompter);
//! let report = updater.run(Path::new("."), &mut |event| println!("{event:?}"));
//! ```

pub mod check;
pub mod error;
pub mod git;
pub mod update;
pub mod variables;

pub use check::{check, CheckResult};
pub use error::{ErrorKind, SyncError};
pub use git::{ApplyOutcome, GitCli, GitError, PartialApply, Patch, Vcs};
pub use update::{Preview, UpdateEvent, UpdateOutcome, UpdateReport, Updater};
pub use variables::{DefaultsPrompter, Prompter, TerminalPrompter};
