//! Tera rendering engine: [`TemplateRenderer`] seam and [`TeraRenderer`].
//!
//! # Template layout
//!
//! ```text
//! <template_dir>/
//!   cookiecutter.json                 (variable manifest)
//!   {{cookiecutter.project_slug}}/    (project root; every name below is rendered)
//!     README.md
//!     src/{{cookiecutter.module}}.py
//! ```

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tera::Tera;

use rebake_core::Variables;

use crate::context::{TemplateContext, NAMESPACE};
use crate::error::{io_err, RenderError};
use crate::manifest::Manifest;

// ---------------------------------------------------------------------------
// TemplateRenderer
// ---------------------------------------------------------------------------

/// Render gateway used by the update engine.
#[cfg_attr(any(test, feature = "test-export-mocks"), mockall::automock)]
pub trait TemplateRenderer {
    /// Variable manifest of the template checked out at `template_dir`.
    fn manifest(&self, template_dir: &Path) -> Result<Manifest, RenderError>;

    /// Render the template at `template_dir` with `context` into `output_dir`.
    ///
    /// Returns the rendered project root (a child of `output_dir`).
    fn render(
        &self,
        template_dir: &Path,
        context: &Variables,
        output_dir: &Path,
    ) -> Result<PathBuf, RenderError>;
}

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn is_project_template_name(name: &str) -> bool {
    name.contains("{{") && name.contains("}}") && name.contains(NAMESPACE)
}

/// The single `{{cookiecutter.*}}` directory at the template root.
fn find_project_template(template_dir: &Path) -> Result<PathBuf, RenderError> {
    let entries = std::fs::read_dir(template_dir).map_err(|e| io_err(template_dir, e))?;
    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(template_dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_project_template_name(&name) && entry.path().is_dir() {
            candidates.push(entry.path());
        }
    }
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| RenderError::NoProjectTemplate {
            path: template_dir.to_path_buf(),
        })
}

fn sorted_entries(dir: &Path) -> Result<Vec<std::fs::DirEntry>, RenderError> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        entries.push(entry.map_err(|e| io_err(dir, e))?);
    }
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

/// File contents Tera may render: valid UTF-8 without NUL bytes.
fn as_text(bytes: &[u8]) -> Option<&str> {
    std::str::from_utf8(bytes).ok().filter(|s| !s.contains('\0'))
}

/// `_copy_without_render` globs, matched against paths relative to the
/// project template, both as written and as rendered.
fn copy_only_set(manifest: &Manifest) -> Result<GlobSet, RenderError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in manifest.copy_without_render() {
        let glob = Glob::new(&pattern).map_err(|source| RenderError::CopyPattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| RenderError::CopyPattern {
        pattern: manifest.copy_without_render().join(", "),
        source,
    })
}

/// Copy `src` to `dest` recursively without rendering anything.
fn copy_tree(src: &Path, dest: &Path) -> Result<(), RenderError> {
    std::fs::create_dir_all(dest).map_err(|e| io_err(dest, e))?;
    for entry in sorted_entries(src)? {
        let path = entry.path();
        let target = dest.join(entry.file_name());
        let meta = std::fs::metadata(&path).map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            copy_tree(&path, &target)?;
        } else if meta.is_file() {
            std::fs::copy(&path, &target).map_err(|e| io_err(&target, e))?;
        }
    }
    Ok(())
}

/// Join a relative path and a name with `/`, the separator globs are written with.
fn join_rel(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

// ---------------------------------------------------------------------------
// TeraRenderer
// ---------------------------------------------------------------------------

/// Renders cookiecutter-layout templates with the Tera engine.
#[derive(Debug, Clone, Default)]
pub struct TeraRenderer;

/// State shared by one recursive render.
struct Walk<'a> {
    ctx: &'a tera::Context,
    copy_only: &'a GlobSet,
}

impl Walk<'_> {
    fn is_copy_only(&self, raw_rel: &str, rendered_rel: &str) -> bool {
        self.copy_only.is_match(raw_rel) || self.copy_only.is_match(rendered_rel)
    }
}

impl TeraRenderer {
    pub fn new() -> Self {
        TeraRenderer
    }

    fn render_str(
        &self,
        source: &Path,
        input: &str,
        ctx: &tera::Context,
    ) -> Result<String, RenderError> {
        if !input.contains("{{") && !input.contains("{%") && !input.contains("{#") {
            return Ok(input.to_string());
        }
        Tera::one_off(input, ctx, false).map_err(|e| RenderError::Template {
            path: source.to_path_buf(),
            source: e,
        })
    }

    fn render_tree(
        &self,
        walk: &Walk<'_>,
        src: &Path,
        dest: &Path,
        raw_rel: &str,
        rendered_rel: &str,
    ) -> Result<(), RenderError> {
        for entry in sorted_entries(src)? {
            let path = entry.path();
            let raw_name = entry.file_name().to_string_lossy().into_owned();
            if raw_name == ".git" {
                continue;
            }
            let name = self.render_str(&path, &raw_name, walk.ctx)?;
            if name.trim().is_empty() {
                tracing::debug!(path = %path.display(), "name rendered empty; skipping");
                continue;
            }
            let entry_raw = join_rel(raw_rel, &raw_name);
            let entry_rendered = join_rel(rendered_rel, &name);
            let copy_only = walk.is_copy_only(&entry_raw, &entry_rendered);
            let target = dest.join(&name);
            let meta = std::fs::metadata(&path).map_err(|e| io_err(&path, e))?;

            if meta.is_dir() {
                if copy_only {
                    copy_tree(&path, &target)?;
                } else {
                    std::fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
                    self.render_tree(walk, &path, &target, &entry_raw, &entry_rendered)?;
                }
            } else if meta.is_file() {
                let bytes = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
                match as_text(&bytes).filter(|_| !copy_only) {
                    Some(text) => {
                        let rendered = self.render_str(&path, text, walk.ctx)?;
                        std::fs::write(&target, rendered).map_err(|e| io_err(&target, e))?;
                    }
                    None => {
                        std::fs::write(&target, &bytes).map_err(|e| io_err(&target, e))?;
                    }
                }
                std::fs::set_permissions(&target, meta.permissions())
                    .map_err(|e| io_err(&target, e))?;
            }
        }
        Ok(())
    }
}

impl TemplateRenderer for TeraRenderer {
    fn manifest(&self, template_dir: &Path) -> Result<Manifest, RenderError> {
        Manifest::load(template_dir)
    }

    fn render(
        &self,
        template_dir: &Path,
        context: &Variables,
        output_dir: &Path,
    ) -> Result<PathBuf, RenderError> {
        let manifest = Manifest::load(template_dir)?;
        let resolved = TemplateContext::resolve(&manifest, context)?;
        let tera_ctx = resolved.to_tera_context();
        let copy_only = copy_only_set(&manifest)?;

        let project_template = find_project_template(template_dir)?;
        let raw_name = project_template
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let root_name = self.render_str(&project_template, &raw_name, &tera_ctx)?;
        let root = output_dir.join(root_name.trim());
        std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;

        let walk = Walk {
            ctx: &tera_ctx,
            copy_only: &copy_only,
        };
        self.render_tree(&walk, &project_template, &root, "", "")?;
        tracing::debug!(
            template = %template_dir.display(),
            output = %root.display(),
            "rendered template"
        );
        Ok(root)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
