//! Version-control gateway over the `git` executable.
//!
//! The [`Vcs`] trait is the seam the drift check and the update engine talk
//! to; [`GitCli`] implements it by spawning `git`. No state is kept between
//! calls and nothing is retried here.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Output};

use rebake_core::types::Revision;
use thiserror::Error;

/// Ref resolved when the project does not pin a checkout.
pub const DEFAULT_REF: &str = "HEAD";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of the version-control gateway.
#[derive(Debug, Error)]
pub enum GitError {
    /// The git executable could not be started.
    #[error("failed to run {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A git invocation exited unsuccessfully.
    #[error("`git {command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    /// The remote was reachable but has no such ref.
    #[error("'{reference}' does not exist in {location}")]
    RefNotFound { location: String, reference: String },

    /// Neither ls-remote nor a clone yielded a revision for the ref.
    #[error("could not resolve '{reference}' in {location}: {detail}")]
    Resolution {
        location: String,
        reference: String,
        detail: String,
    },

    /// Cloning or checking out a template revision failed.
    #[error("could not clone {location} at {revision}: {detail}")]
    Clone {
        location: String,
        revision: String,
        detail: String,
    },

    /// Clone destinations must not exist beforehand.
    #[error("clone destination already exists: {}", .path.display())]
    DestinationExists { path: PathBuf },

    /// `git diff --no-index` reported an error rather than a difference.
    #[error("diff between rendered trees failed: {detail}")]
    Diff { detail: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> GitError {
    GitError::Io {
        path: path.into(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Patch / ApplyOutcome
// ---------------------------------------------------------------------------

/// Unified diff between two rendered trees, paths relative to the tree roots.
///
/// Kept as bytes: `--binary` hunks and non-UTF-8 text must reach `git apply`
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Patch(Vec<u8>);

impl Patch {
    pub fn new(bytes: Vec<u8>) -> Self {
        Patch(bytes)
    }

    /// The canonical "no differences" signal.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(u8::is_ascii_whitespace)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl From<&str> for Patch {
    fn from(s: &str) -> Self {
        Patch(s.as_bytes().to_vec())
    }
}

/// What happened when a patch was applied to the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Every hunk applied.
    Clean,
    /// Some (possibly all) hunks were rejected.
    Partial(PartialApply),
}

/// Per-file report of a lenient (`--reject`) application.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartialApply {
    /// Files whose hunks all applied.
    pub applied: Vec<PathBuf>,
    /// Files with at least one rejected hunk.
    pub rejected: Vec<PathBuf>,
    /// `*.rej` sidecars present in the project, relative to its root.
    pub reject_files: Vec<PathBuf>,
    /// git's own explanation (errors, rejected hunk numbers).
    pub diagnostics: String,
}

impl PartialApply {
    /// True when not a single file took its changes.
    pub fn nothing_applied(&self) -> bool {
        self.applied.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Vcs
// ---------------------------------------------------------------------------

/// Version-control capabilities the engine relies on.
#[cfg_attr(test, mockall::automock)]
pub trait Vcs {
    /// Current revision of `reference` (a branch, tag, raw revision id, or
    /// [`DEFAULT_REF`]) in the repository at `location`.
    fn resolve_head(&self, location: &str, reference: &str) -> Result<Revision, GitError>;

    /// Materialize `location` at exactly `revision` into `dest`, which must not exist.
    fn clone_at(&self, location: &str, revision: &Revision, dest: &Path) -> Result<(), GitError>;

    /// No tracked or untracked modifications under `project_dir`.
    fn is_clean(&self, project_dir: &Path) -> Result<bool, GitError>;

    /// Portable patch turning `old_dir` into `new_dir`.
    fn diff_trees(&self, old_dir: &Path, new_dir: &Path) -> Result<Patch, GitError>;

    /// Apply `patch` to `project_dir`, skipping paths matching `exclude` globs.
    fn apply(
        &self,
        patch: &Patch,
        project_dir: &Path,
        exclude: &[String],
    ) -> Result<ApplyOutcome, GitError>;
}

// ---------------------------------------------------------------------------
// GitCli
// ---------------------------------------------------------------------------

/// [`Vcs`] backed by the `git` command-line tool.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    /// Use `git` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("git")
    }

    /// Use a specific git executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        GitCli {
            program: program.into(),
        }
    }

    fn command(&self, cwd: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.program);
        // Never block on credential prompts; keep messages parseable.
        cmd.env("GIT_TERMINAL_PROMPT", "0").env("LC_ALL", "C");
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn output(&self, cmd: &mut Command) -> Result<Output, GitError> {
        tracing::debug!(args = %describe(cmd), "running git");
        cmd.output().map_err(|source| GitError::Spawn {
            program: self.program.clone(),
            source,
        })
    }

    /// Run `cmd`, returning trimmed stdout or a [`GitError::Command`].
    fn checked(&self, cmd: &mut Command) -> Result<String, GitError> {
        let output = self.output(cmd)?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }
        Err(GitError::Command {
            command: describe(cmd),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    fn ls_remote(&self, location: &str, reference: &str) -> Result<Option<Revision>, GitError> {
        let listing = self.checked(self.command(None).args(["ls-remote", location, reference]))?;
        Ok(pick_ref(&listing, reference))
    }

    /// Clone into a throwaway directory and read the revision `reference` points at.
    ///
    /// `shallow` clones only the ref's tip (`--branch` works for branches and
    /// tags); the full clone is needed for raw revision ids.
    fn head_via_clone(
        &self,
        location: &str,
        reference: &str,
        shallow: bool,
    ) -> Result<Revision, GitError> {
        let tmp = tempfile::Builder::new()
            .prefix("rebake-head-")
            .tempdir()
            .map_err(|e| io_err(std::env::temp_dir(), e))?;
        let dest = tmp.path().join("repo");

        let mut clone = self.command(None);
        clone.args(["clone", "--quiet"]);
        if shallow {
            clone.arg("--depth=1");
            if reference != DEFAULT_REF {
                clone.args(["--branch", reference]);
            }
        } else {
            clone.arg("--no-checkout");
        }
        clone.arg(location).arg(&dest);
        self.checked(&mut clone)?;

        let target = if shallow {
            DEFAULT_REF.to_string()
        } else {
            format!("{reference}^{{commit}}")
        };
        let sha = self.checked(
            self.command(Some(&dest))
                .args(["rev-parse", "--verify", "--quiet"])
                .arg(target),
        )?;
        Ok(Revision::from(sha))
    }

    fn toplevel(&self, project_dir: &Path) -> Result<PathBuf, GitError> {
        let top = self.checked(
            self.command(Some(project_dir))
                .args(["rev-parse", "--show-toplevel"]),
        )?;
        Ok(PathBuf::from(top))
    }
}

impl Vcs for GitCli {
    fn resolve_head(&self, location: &str, reference: &str) -> Result<Revision, GitError> {
        let mut attempts = Vec::new();
        let mut remote_reachable = false;

        match self.ls_remote(location, reference) {
            Ok(Some(rev)) => return Ok(rev),
            Ok(None) => {
                remote_reachable = true;
                attempts.push(format!("ls-remote listed no ref '{reference}'"));
            }
            Err(err) => attempts.push(err.to_string()),
        }
        tracing::debug!(location, reference, "ls-remote did not resolve; cloning");

        match self.head_via_clone(location, reference, true) {
            Ok(rev) => return Ok(rev),
            Err(err) => attempts.push(err.to_string()),
        }
        if reference != DEFAULT_REF {
            match self.head_via_clone(location, reference, false) {
                Ok(rev) => return Ok(rev),
                Err(err) => attempts.push(err.to_string()),
            }
        }

        if remote_reachable {
            tracing::debug!(location, reference, detail = %attempts.join("; "), "ref not found");
            return Err(GitError::RefNotFound {
                location: location.to_string(),
                reference: reference.to_string(),
            });
        }
        Err(GitError::Resolution {
            location: location.to_string(),
            reference: reference.to_string(),
            detail: attempts.join("; "),
        })
    }

    fn clone_at(&self, location: &str, revision: &Revision, dest: &Path) -> Result<(), GitError> {
        if dest.exists() {
            return Err(GitError::DestinationExists {
                path: dest.to_path_buf(),
            });
        }
        let clone_failed = |err: GitError| GitError::Clone {
            location: location.to_string(),
            revision: revision.to_string(),
            detail: err.to_string(),
        };

        self.checked(
            self.command(None)
                .args(["clone", "--quiet", location])
                .arg(dest),
        )
        .map_err(clone_failed)?;
        self.checked(
            self.command(Some(dest))
                .args(["-c", "advice.detachedHead=false", "checkout", "--quiet"])
                .arg(&revision.0),
        )
        .map_err(clone_failed)?;

        tracing::debug!(location, revision = %revision, dest = %dest.display(), "cloned template");
        Ok(())
    }

    fn is_clean(&self, project_dir: &Path) -> Result<bool, GitError> {
        let status = self.checked(
            self.command(Some(project_dir))
                .args(["status", "--porcelain", "--untracked-files=all", "--", "."]),
        )?;
        Ok(status.is_empty())
    }

    fn diff_trees(&self, old_dir: &Path, new_dir: &Path) -> Result<Patch, GitError> {
        let old_real = old_dir.canonicalize().map_err(|e| io_err(old_dir, e))?;
        let new_real = new_dir.canonicalize().map_err(|e| io_err(new_dir, e))?;

        // Relative paths from the common ancestor keep temp roots out of the headers.
        let (cwd, old_arg, new_arg) = match common_ancestor(&old_real, &new_real) {
            Some(common) => (
                Some(common.clone()),
                relative_str(&old_real, &common),
                relative_str(&new_real, &common),
            ),
            None => (
                None,
                old_real.to_string_lossy().into_owned(),
                new_real.to_string_lossy().into_owned(),
            ),
        };

        let mut cmd = self.command(cwd.as_deref());
        cmd.args([
            "-c",
            "core.quotepath=off",
            "diff",
            "--no-index",
            "--binary",
            "--no-color",
            "--no-ext-diff",
            "--find-renames",
        ])
        .args([&old_arg, &new_arg]);
        let output = self.output(&mut cmd)?;

        // Exit status 1 means "differences found".
        match output.status.code() {
            Some(0) | Some(1) => {}
            _ => {
                return Err(GitError::Diff {
                    detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                })
            }
        }

        let prefixes = [format!("{old_arg}/"), format!("{new_arg}/")];
        Ok(Patch::new(strip_tree_prefixes(&output.stdout, &prefixes)))
    }

    fn apply(
        &self,
        patch: &Patch,
        project_dir: &Path,
        exclude: &[String],
    ) -> Result<ApplyOutcome, GitError> {
        let project_real = project_dir
            .canonicalize()
            .map_err(|e| io_err(project_dir, e))?;
        let top = self.toplevel(&project_real)?;
        let top = top.canonicalize().map_err(|e| io_err(&top, e))?;
        let directory = project_real
            .strip_prefix(&top)
            .map(|rel| {
                rel.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_default();

        let mut patch_file = tempfile::Builder::new()
            .prefix("rebake-")
            .suffix(".patch")
            .tempfile()
            .map_err(|e| io_err(std::env::temp_dir(), e))?;
        std::io::Write::write_all(&mut patch_file, patch.as_bytes())
            .map_err(|e| io_err(patch_file.path(), e))?;

        let mut base: Vec<String> = vec!["apply".into(), "--ignore-whitespace".into()];
        if !directory.is_empty() {
            base.push(format!("--directory={directory}"));
        }
        for pattern in exclude {
            base.push(format!("--exclude={pattern}"));
            if !directory.is_empty() {
                base.push(format!("--exclude={directory}/{pattern}"));
            }
        }

        let clean = self.output(
            self.command(Some(&top))
                .args(&base)
                .arg(patch_file.path()),
        )?;
        if clean.status.success() {
            return Ok(ApplyOutcome::Clean);
        }
        tracing::info!(
            stderr = %String::from_utf8_lossy(&clean.stderr).trim(),
            "clean apply failed; retrying with --reject"
        );

        let stale_rejects = snapshot_reject_files(&project_real)?;
        let lenient = self.output(
            self.command(Some(&top))
                .args(&base)
                .args(["--reject", "--verbose"])
                .arg(patch_file.path()),
        )?;
        let stderr = String::from_utf8_lossy(&lenient.stderr).into_owned();
        let (applied, rejected) = parse_apply_report(&stderr);
        let mut reject_files = Vec::new();
        for rel in find_reject_files(&project_real)? {
            let path = project_real.join(&rel);
            let rewritten = match stale_rejects.get(&rel) {
                None => true,
                Some(old) => std::fs::read(&path).map_err(|e| io_err(&path, e))? != *old,
            };
            let for_rejected = rejected
                .iter()
                .any(|r| top.join(r) == path.with_extension(""));
            if rewritten || for_rejected {
                reject_files.push(rel);
            }
        }

        if lenient.status.success() && rejected.is_empty() && reject_files.is_empty() {
            return Ok(ApplyOutcome::Clean);
        }

        let diagnostics = stderr
            .lines()
            .filter(|line| !line.starts_with("Checking patch ") && !line.starts_with("Applied patch "))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ApplyOutcome::Partial(PartialApply {
            applied,
            rejected,
            reject_files,
            diagnostics,
        }))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn describe(cmd: &Command) -> String {
    cmd.get_args()
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pick the revision for `reference` out of `git ls-remote` output.
///
/// Exact names win over pattern matches; annotated tags resolve to the
/// peeled commit.
fn pick_ref(listing: &str, reference: &str) -> Option<Revision> {
    let refs: Vec<(&str, &str)> = listing
        .lines()
        .filter_map(|line| line.split_once('\t'))
        .map(|(sha, name)| (sha.trim(), name.trim()))
        .collect();

    let wanted = [
        reference.to_string(),
        format!("refs/heads/{reference}"),
        format!("refs/tags/{reference}^{{}}"),
        format!("refs/tags/{reference}"),
    ];
    wanted
        .iter()
        .find_map(|name| refs.iter().find(|(_, n)| n == name))
        .or_else(|| refs.first())
        .map(|(sha, _)| Revision::from(*sha))
}

/// Deepest common directory of two absolute paths, or `None` if they only
/// share the filesystem root.
fn common_ancestor(a: &Path, b: &Path) -> Option<PathBuf> {
    let mut common = PathBuf::new();
    let mut depth = 0;
    for (x, y) in a.components().zip(b.components()) {
        if x != y {
            break;
        }
        common.push(x.as_os_str());
        if !matches!(x, Component::RootDir | Component::Prefix(_)) {
            depth += 1;
        }
    }
    (depth > 0).then_some(common)
}

fn relative_str(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Remove tree-root prefixes from per-file header lines of a git patch.
///
/// Hunk bodies are copied byte for byte, so file content that happens to
/// contain a prefix is never altered.
fn strip_tree_prefixes(raw: &[u8], prefixes: &[String]) -> Vec<u8> {
    const HEADER_END: [&[u8]; 2] = [b"@@", b"GIT binary patch"];

    let mut out = Vec::with_capacity(raw.len());
    let mut in_header = false;
    for line in raw.split_inclusive(|b| *b == b'\n') {
        if HEADER_END.iter().any(|marker| line.starts_with(marker)) {
            in_header = false;
        } else if line.starts_with(b"diff --git ") {
            in_header = true;
        }

        if in_header {
            let mut header = line.to_vec();
            for prefix in prefixes {
                header = remove_bytes(&header, prefix.as_bytes());
            }
            out.extend_from_slice(&header);
        } else {
            out.extend_from_slice(line);
        }
    }
    out
}

/// Every occurrence of `needle` removed from `haystack`.
fn remove_bytes(haystack: &[u8], needle: &[u8]) -> Vec<u8> {
    if needle.is_empty() {
        return haystack.to_vec();
    }
    let mut out = Vec::with_capacity(haystack.len());
    let mut i = 0;
    while i < haystack.len() {
        if haystack[i..].starts_with(needle) {
            i += needle.len();
        } else {
            out.push(haystack[i]);
            i += 1;
        }
    }
    out
}

/// Split `git apply --reject --verbose` output into applied and rejected files.
///
/// Rejected files are those with rejected hunks and those git refused as a
/// whole (`error: <path>: ...`), such as a created file that already exists.
fn parse_apply_report(stderr: &str) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut applied = Vec::new();
    let mut rejected: Vec<PathBuf> = Vec::new();
    for line in stderr.lines() {
        let failed = if let Some(path) = line
            .strip_prefix("Applied patch ")
            .and_then(|rest| rest.strip_suffix(" cleanly."))
        {
            applied.push(PathBuf::from(path));
            None
        } else if let Some((path, _)) = line
            .strip_prefix("Applying patch ")
            .and_then(|rest| rest.split_once(" with "))
        {
            Some(path)
        } else if let Some(rest) = line.strip_prefix("error: ") {
            match rest.strip_prefix("patch failed: ") {
                Some(located) => located.rsplit_once(':').map(|(path, _)| path),
                None => rest.split_once(": ").map(|(path, _)| path),
            }
        } else {
            None
        };
        if let Some(path) = failed.map(PathBuf::from) {
            if !rejected.contains(&path) {
                rejected.push(path);
            }
        }
    }
    rejected.retain(|path| !applied.contains(path));
    (applied, rejected)
}

/// Contents of the `*.rej` files already present under `root`.
fn snapshot_reject_files(root: &Path) -> Result<HashMap<PathBuf, Vec<u8>>, GitError> {
    find_reject_files(root)?
        .into_iter()
        .map(|rel| {
            let path = root.join(&rel);
            let bytes = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
            Ok((rel, bytes))
        })
        .collect()
}

/// All `*.rej` files under `root` (excluding `.git`), relative to `root`, sorted.
fn find_reject_files(root: &Path) -> Result<Vec<PathBuf>, GitError> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) -> Result<(), GitError> {
        let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err(dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| io_err(&path, e))?;
            if file_type.is_dir() {
                if entry.file_name() != ".git" {
                    walk(&path, root, out)?;
                }
            } else if path.extension().and_then(OsStr::to_str) == Some("rej") {
                out.push(path.strip_prefix(root).unwrap_or(&path).to_path_buf());
            }
        }
        Ok(())
    }

    let mut out = Vec::new();
    walk(root, root, &mut out)?;
    out.sort();
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
