//! Drift detection: is the project behind its template?

use std::path::Path;

use rebake_core::config;
use rebake_core::types::Revision;
use rebake_core::ProjectConfig;

use crate::error::SyncError;
use crate::git::{GitError, Vcs, DEFAULT_REF};

/// Whether a project reflects its template's current revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    UpToDate,
    Outdated,
}

/// Resolve the revision the project tracks: its pinned `checkout`, or the
/// template's default head.
pub fn latest_revision(config: &ProjectConfig, vcs: &impl Vcs) -> Result<Revision, SyncError> {
    let reference = config.checkout.as_deref().unwrap_or(DEFAULT_REF);
    Ok(vcs.resolve_head(&config.template, reference)?)
}

/// Compare the recorded revision against the template's current one.
///
/// Read-only. A tracked ref the template no longer has is
/// [`CheckResult::Outdated`]; an unreachable template propagates as an error.
pub fn check(project_dir: &Path, vcs: &impl Vcs) -> Result<CheckResult, SyncError> {
    let config = config::load_at(project_dir)?;
    let latest = match latest_revision(&config, vcs) {
        Ok(latest) => latest,
        Err(SyncError::Git(GitError::RefNotFound { location, reference })) => {
            tracing::warn!(%location, %reference, "tracked ref not found in template");
            return Ok(CheckResult::Outdated);
        }
        Err(err) => return Err(err),
    };

    tracing::debug!(
        recorded = %config.commit,
        latest = %latest,
        "compared template revisions"
    );
    if latest == config.commit {
        Ok(CheckResult::UpToDate)
    } else {
        Ok(CheckResult::Outdated)
    }
}
