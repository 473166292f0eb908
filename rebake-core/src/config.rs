//! Per-project configuration record.
//!
//! # Storage layout
//!
//! ```text
//! <project_dir>/
//!   .cruft.json        (template, commit, context, [checkout], [skip])
//! ```
//!
//! The record is created when the project is generated; afterwards it is only
//! read by the drift check and rewritten by the update engine.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, ConfigError};
use crate::types::ProjectConfig;

/// File name of the record at the project root.
pub const CONFIG_FILE: &str = ".cruft.json";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<project_dir>/.cruft.json`. Pure, no I/O.
pub fn path_at(project_dir: &Path) -> PathBuf {
    project_dir.join(CONFIG_FILE)
}

/// Whether a record exists at `project_dir`.
pub fn exists_at(project_dir: &Path) -> bool {
    path_at(project_dir).is_file()
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load the record from `<project_dir>/.cruft.json`.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed.
pub fn load_at(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let path = path_at(project_dir);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::NotFound {
                project_dir: project_dir.to_path_buf(),
            })
        }
        Err(err) => return Err(io_err(&path, err)),
    };
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the record to `<project_dir>/.cruft.json`.
///
/// Write flow: serialize (2-space indent, trailing newline) → `.cruft.json.tmp`
/// sibling → `rename`. The `.tmp` file lives in the same directory as the
/// target so the rename never crosses filesystems.
pub fn save_at(project_dir: &Path, config: &ProjectConfig) -> Result<(), ConfigError> {
    let path = path_at(project_dir);
    let tmp_path = path.with_file_name(format!("{CONFIG_FILE}.tmp"));

    let mut json = serde_json::to_string_pretty(config)?;
    json.push('\n');
    std::fs::write(&tmp_path, json).map_err(|e| io_err(&tmp_path, e))?;
    if let Err(e) = std::fs::rename(&tmp_path, &path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(&path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
