//! Error types for rebake-renderer.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from template rendering operations.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A file name or file body failed to render.
    #[error("failed to render {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: tera::Error,
    },

    /// A `_copy_without_render` entry is not a valid glob.
    #[error("invalid _copy_without_render pattern '{pattern}': {source}")]
    CopyPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// The template has no variable manifest at its root.
    #[error("template manifest not found at {path}")]
    ManifestNotFound { path: PathBuf },

    /// The variable manifest is not a JSON object.
    #[error("failed to parse template manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No `{{cookiecutter.*}}` project directory at the template root.
    #[error("no project directory (e.g. '{{{{cookiecutter.project_slug}}}}') found in {path}")]
    NoProjectTemplate { path: PathBuf },

    /// Filesystem error while reading the template or writing output.
    #[error("template io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io {
        path: path.into(),
        source,
    }
}
