//! Error types for rebake-sync.

use std::path::PathBuf;

use thiserror::Error;

use rebake_core::error::ConfigError;
use rebake_renderer::RenderError;

use crate::git::GitError;

/// All errors that can arise from drift checks and update runs.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The configuration record is missing or unreadable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error from the render gateway.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// An error from the version-control gateway.
    #[error(transparent)]
    Git(#[from] GitError),

    /// The project has uncommitted changes.
    #[error(
        "project at {path} has uncommitted changes; commit or stash them before updating"
    )]
    DirtyWorkingTree { path: PathBuf },

    /// Interactive variable collection was cancelled or failed.
    #[error("variable prompt aborted: {0}")]
    Prompt(String),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Coarse classification the CLI maps to exit statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No record at the project root, or the record does not parse.
    ConfigurationMissing,
    /// Revision resolution, clone, render, diff, or apply could not run.
    Infrastructure,
    /// The working tree is dirty.
    Precondition,
    /// The user abandoned the variable prompt.
    Interrupted,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Config(ConfigError::NotFound { .. } | ConfigError::Parse { .. }) => {
                ErrorKind::ConfigurationMissing
            }
            SyncError::DirtyWorkingTree { .. } => ErrorKind::Precondition,
            SyncError::Prompt(_) => ErrorKind::Interrupted,
            SyncError::Config(_) | SyncError::Render(_) | SyncError::Git(_) | SyncError::Io { .. } => {
                ErrorKind::Infrastructure
            }
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
