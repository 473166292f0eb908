//! The update engine.
//!
//! One run walks a fixed pipeline:
//!
//! ```text
//! clean tree? → resolve revisions → clone old + new → reconcile variables
//!   → render old + new (same context) → diff → apply → persist
//! ```
//!
//! Clones and renders live under one [`TempDir`] that is dropped on every
//! exit path. The project directory is written only by [`Vcs::apply`] and
//! by the final record save. Progress is reported through [`UpdateEvent`]s
//! so callers decide how (and whether) to present it.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use rebake_core::config;
use rebake_core::types::Revision;
use rebake_core::{ProjectConfig, Variables};
use rebake_renderer::TemplateRenderer;

use crate::check::latest_revision;
use crate::error::{io_err, SyncError};
use crate::git::{ApplyOutcome, PartialApply, Patch, Vcs};
use crate::variables::{collect_values, detect_new, Prompter};

// ---------------------------------------------------------------------------
// Events and results
// ---------------------------------------------------------------------------

/// Progress notifications emitted while an update runs, in pipeline order.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    /// The project is behind; moving from `from` to `to`.
    Updating { from: Revision, to: Revision },
    /// The recorded revision is already the latest one.
    AlreadyUpToDate,
    /// The new revision declares variables the project has never seen.
    NewVariables { names: Vec<String> },
    /// Both revisions render to identical trees.
    NoChanges,
    /// The whole patch applied.
    Applied,
    /// Some hunks were rejected and left for manual resolution.
    PartiallyApplied(PartialApply),
    /// The record now points at `commit`.
    Persisted { commit: Revision },
}

/// Terminal state of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    UpToDate,
    NoChanges,
    Applied,
    Partial(PartialApply),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateReport {
    pub old_commit: Revision,
    pub new_commit: Revision,
    /// Values collected for variables introduced by the new revision.
    pub new_variables: Variables,
    pub outcome: UpdateOutcome,
}

/// What the next update would apply, computed without touching the project.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub old_commit: Revision,
    pub new_commit: Revision,
    pub new_variables: Variables,
    pub patch: Patch,
}

/// Result of the clone → render → diff stages.
struct Delta {
    collected: Variables,
    merged: Variables,
    patch: Patch,
}

// ---------------------------------------------------------------------------
// Updater
// ---------------------------------------------------------------------------

/// Drives update runs over a version-control gateway, a renderer and a
/// source of new variable values.
pub struct Updater<V, R, P> {
    vcs: V,
    renderer: R,
    prompter: P,
}

impl<V: Vcs, R: TemplateRenderer, P: Prompter> Updater<V, R, P> {
    pub fn new(vcs: V, renderer: R, prompter: P) -> Self {
        Updater {
            vcs,
            renderer,
            prompter,
        }
    }

    /// Bring the project at `project_dir` up to its template's latest revision.
    ///
    /// Dirty trees, gateway failures and an abandoned prompt return `Err`
    /// with the record untouched. Rejected hunks do not: the run still
    /// advances the record and reports [`UpdateOutcome::Partial`].
    pub fn run(
        &mut self,
        project_dir: &Path,
        on_event: &mut impl FnMut(UpdateEvent),
    ) -> Result<UpdateReport, SyncError> {
        let project_dir = absolute(project_dir)?;

        if !self.vcs.is_clean(&project_dir)? {
            return Err(SyncError::DirtyWorkingTree { path: project_dir });
        }

        let mut config = config::load_at(&project_dir)?;
        let old_commit = config.commit.clone();
        let new_commit = latest_revision(&config, &self.vcs)?;

        if new_commit == old_commit {
            tracing::info!(commit = %old_commit, "project is up to date");
            on_event(UpdateEvent::AlreadyUpToDate);
            return Ok(UpdateReport {
                old_commit,
                new_commit,
                new_variables: Variables::new(),
                outcome: UpdateOutcome::UpToDate,
            });
        }

        tracing::info!(from = %old_commit, to = %new_commit, "updating project");
        on_event(UpdateEvent::Updating {
            from: old_commit.clone(),
            to: new_commit.clone(),
        });

        let workspace = scratch_dir()?;
        let delta = self.compute_delta(&config, &new_commit, workspace.path(), on_event)?;

        let outcome = if delta.patch.is_empty() {
            on_event(UpdateEvent::NoChanges);
            UpdateOutcome::NoChanges
        } else {
            match self.vcs.apply(&delta.patch, &project_dir, &config.skip)? {
                ApplyOutcome::Clean => {
                    on_event(UpdateEvent::Applied);
                    UpdateOutcome::Applied
                }
                ApplyOutcome::Partial(partial) => {
                    tracing::warn!(
                        rejected = partial.rejected.len(),
                        reject_files = partial.reject_files.len(),
                        "patch applied partially"
                    );
                    on_event(UpdateEvent::PartiallyApplied(partial.clone()));
                    UpdateOutcome::Partial(partial)
                }
            }
        };
        drop(workspace);

        // Advance even when hunks were rejected: re-running against the old
        // baseline would re-apply the same delta.
        config.commit = new_commit.clone();
        config.context.cookiecutter = delta.merged;
        config::save_at(&project_dir, &config)?;
        tracing::info!(commit = %new_commit, "record updated");
        on_event(UpdateEvent::Persisted {
            commit: new_commit.clone(),
        });

        Ok(UpdateReport {
            old_commit,
            new_commit,
            new_variables: delta.collected,
            outcome,
        })
    }

    /// Compute the patch the next [`run`](Self::run) would apply.
    ///
    /// New variables are still collected through the prompter. Nothing in
    /// the project is written, and the working tree may be dirty.
    pub fn preview(&mut self, project_dir: &Path) -> Result<Preview, SyncError> {
        let project_dir = absolute(project_dir)?;
        let config = config::load_at(&project_dir)?;
        let old_commit = config.commit.clone();
        let new_commit = latest_revision(&config, &self.vcs)?;

        if new_commit == old_commit {
            return Ok(Preview {
                old_commit,
                new_commit,
                new_variables: Variables::new(),
                patch: Patch::default(),
            });
        }

        let workspace = scratch_dir()?;
        let delta = self.compute_delta(&config, &new_commit, workspace.path(), &mut |_| {})?;
        Ok(Preview {
            old_commit,
            new_commit,
            new_variables: delta.collected,
            patch: delta.patch,
        })
    }

    fn compute_delta(
        &mut self,
        config: &ProjectConfig,
        new_commit: &Revision,
        workspace: &Path,
        on_event: &mut impl FnMut(UpdateEvent),
    ) -> Result<Delta, SyncError> {
        let old_template = workspace.join("old_template");
        let new_template = workspace.join("new_template");
        self.vcs
            .clone_at(&config.template, &config.commit, &old_template)?;
        self.vcs.clone_at(&config.template, new_commit, &new_template)?;

        let saved = &config.context.cookiecutter;
        let new_vars = detect_new(&self.renderer, &new_template, saved)?;
        if !new_vars.is_empty() {
            let names: Vec<String> = new_vars.keys().cloned().collect();
            tracing::info!(?names, "template declares new variables");
            on_event(UpdateEvent::NewVariables { names });
        }
        let collected = collect_values(&new_vars, &mut self.prompter)?;
        let merged = config.context.overlay(&collected);

        // Same context for both renders so only template changes show up.
        let old_root = self.render_into(&old_template, &merged, &workspace.join("old_output"))?;
        let new_root = self.render_into(&new_template, &merged, &workspace.join("new_output"))?;

        let patch = self.vcs.diff_trees(&old_root, &new_root)?;
        tracing::debug!(bytes = patch.as_bytes().len(), "computed template delta");

        Ok(Delta {
            collected,
            merged,
            patch,
        })
    }

    fn render_into(
        &self,
        template_dir: &Path,
        context: &Variables,
        output_dir: &Path,
    ) -> Result<PathBuf, SyncError> {
        std::fs::create_dir_all(output_dir).map_err(|e| io_err(output_dir, e))?;
        Ok(self.renderer.render(template_dir, context, output_dir)?)
    }
}

fn absolute(project_dir: &Path) -> Result<PathBuf, SyncError> {
    project_dir
        .canonicalize()
        .map_err(|e| io_err(project_dir, e))
}

fn scratch_dir() -> Result<TempDir, SyncError> {
    tempfile::Builder::new()
        .prefix("rebake-update-")
        .tempdir()
        .map_err(|e| io_err(std::env::temp_dir(), e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::git::{GitError, MockVcs};
    use crate::variables::MockPrompter;
    use rebake_core::types::ProjectContext;
    use rebake_renderer::{Manifest, MockTemplateRenderer, RenderError};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    const TEMPLATE: &str = "https://example.com/tpl.git";

    fn vars(value: serde_json::Value) -> Variables {
        value.as_object().unwrap().clone()
    }

    fn project(commit: &str, context: serde_json::Value) -> TempDir {
        let tmp = TempDir::new().unwrap();
        let cfg = ProjectConfig {
            template: TEMPLATE.into(),
            commit: Revision::from(commit),
            context: ProjectContext {
                cookiecutter: vars(context),
                extra: Variables::new(),
            },
            checkout: None,
            skip: vec!["docs/*".into()],
        };
        config::save_at(tmp.path(), &cfg).unwrap();
        tmp
    }

    fn record(dir: &Path) -> ProjectConfig {
        config::load_at(dir).unwrap()
    }

    fn clean_vcs(latest: &'static str) -> MockVcs {
        let mut vcs = MockVcs::new();
        vcs.expect_is_clean().returning(|_| Ok(true));
        vcs.expect_resolve_head()
            .returning(move |_, _| Ok(Revision::from(latest)));
        vcs
    }

    fn renderer(manifest: serde_json::Value) -> MockTemplateRenderer {
        let manifest = vars(manifest);
        let mut renderer = MockTemplateRenderer::new();
        renderer
            .expect_manifest()
            .returning(move |_| Ok(Manifest::from_variables(manifest.clone())));
        renderer
            .expect_render()
            .times(2)
            .returning(|_, _, out| Ok(out.join("demo")));
        renderer
    }

    fn collect(events: &mut Vec<UpdateEvent>) -> impl FnMut(UpdateEvent) + '_ {
        move |event| events.push(event)
    }

    #[test]
    fn dirty_tree_aborts_before_any_work() {
        let tmp = project("r1", json!({"name": "x"}));
        let before = std::fs::read(config::path_at(tmp.path())).unwrap();

        let mut vcs = MockVcs::new();
        vcs.expect_is_clean().returning(|_| Ok(false));
        vcs.expect_resolve_head().never();
        vcs.expect_clone_at().never();
        vcs.expect_apply().never();
        let mut updater = Updater::new(vcs, MockTemplateRenderer::new(), MockPrompter::new());

        let mut events = Vec::new();
        let err = updater.run(tmp.path(), &mut collect(&mut events)).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(events.is_empty());
        assert_eq!(std::fs::read(config::path_at(tmp.path())).unwrap(), before);
    }

    #[test]
    fn up_to_date_skips_clone_and_leaves_record_alone() {
        let tmp = project("r1", json!({"name": "x"}));
        let before = std::fs::read(config::path_at(tmp.path())).unwrap();

        let mut vcs = clean_vcs("r1");
        vcs.expect_clone_at().never();
        let mut updater = Updater::new(vcs, MockTemplateRenderer::new(), MockPrompter::new());

        let mut events = Vec::new();
        let report = updater.run(tmp.path(), &mut collect(&mut events)).unwrap();

        assert_eq!(report.outcome, UpdateOutcome::UpToDate);
        assert_eq!(events, [UpdateEvent::AlreadyUpToDate]);
        assert_eq!(std::fs::read(config::path_at(tmp.path())).unwrap(), before);
    }

    #[test]
    fn empty_patch_without_new_variables_never_prompts() {
        let tmp = project("r1", json!({"name": "x"}));

        let mut vcs = clean_vcs("r2");
        vcs.expect_clone_at().times(2).returning(|_, _, _| Ok(()));
        vcs.expect_diff_trees().returning(|_, _| Ok(Patch::default()));
        vcs.expect_apply().never();
        let mut prompter = MockPrompter::new();
        prompter.expect_prompt().never();
        let mut updater = Updater::new(vcs, renderer(json!({"name": "demo"})), prompter);

        let mut events = Vec::new();
        let report = updater.run(tmp.path(), &mut collect(&mut events)).unwrap();

        assert_eq!(report.outcome, UpdateOutcome::NoChanges);
        assert_eq!(
            events,
            [
                UpdateEvent::Updating {
                    from: Revision::from("r1"),
                    to: Revision::from("r2"),
                },
                UpdateEvent::NoChanges,
                UpdateEvent::Persisted {
                    commit: Revision::from("r2"),
                },
            ]
        );
        assert_eq!(record(tmp.path()).commit, Revision::from("r2"));
    }

    #[test]
    fn clones_share_one_scratch_root_that_is_removed() {
        let tmp = project("r1", json!({"name": "x"}));
        let dests = Arc::new(Mutex::new(Vec::<PathBuf>::new()));

        let mut vcs = clean_vcs("r2");
        let seen = Arc::clone(&dests);
        vcs.expect_clone_at().times(2).returning(move |_, _, dest| {
            assert!(!dest.exists());
            seen.lock().unwrap().push(dest.to_path_buf());
            Ok(())
        });
        vcs.expect_diff_trees().returning(|_, _| Ok(Patch::default()));
        let mut updater = Updater::new(vcs, renderer(json!({"name": "demo"})), MockPrompter::new());

        updater.run(tmp.path(), &mut |_| {}).unwrap();

        let dests = dests.lock().unwrap();
        assert_eq!(dests.len(), 2);
        assert_ne!(dests[0], dests[1]);
        let root = dests[0].parent().unwrap();
        assert_eq!(dests[1].parent().unwrap(), root);
        assert!(!root.exists(), "scratch root should be removed");
        assert!(!root.starts_with(tmp.path()));
    }

    #[test]
    fn clean_apply_passes_skip_patterns_and_persists() {
        let tmp = project("r1", json!({"name": "x"}));

        let mut vcs = clean_vcs("r2");
        vcs.expect_clone_at().returning(|_, _, _| Ok(()));
        vcs.expect_diff_trees()
            .returning(|_, _| Ok(Patch::from("diff --git a/NEW b/NEW\n")));
        vcs.expect_apply()
            .withf(|patch, _, exclude| !patch.is_empty() && exclude == ["docs/*".to_string()])
            .times(1)
            .returning(|_, _, _| Ok(ApplyOutcome::Clean));
        let mut updater = Updater::new(vcs, renderer(json!({"name": "demo"})), MockPrompter::new());

        let report = updater.run(tmp.path(), &mut |_| {}).unwrap();

        assert_eq!(report.outcome, UpdateOutcome::Applied);
        let saved = record(tmp.path());
        assert_eq!(saved.commit, Revision::from("r2"));
        assert_eq!(saved.skip, ["docs/*"]);
        assert_eq!(saved.template, TEMPLATE);
    }

    #[test]
    fn partial_apply_still_advances_the_record() {
        let tmp = project("r1", json!({"name": "x"}));
        let partial = PartialApply {
            applied: vec![],
            rejected: vec![PathBuf::from("README.md")],
            reject_files: vec![PathBuf::from("README.md.rej")],
            diagnostics: "Rejected hunk #1.".into(),
        };

        let mut vcs = clean_vcs("r2");
        vcs.expect_clone_at().returning(|_, _, _| Ok(()));
        vcs.expect_diff_trees()
            .returning(|_, _| Ok(Patch::from("diff --git a/README.md b/README.md\n")));
        let returned = partial.clone();
        vcs.expect_apply()
            .returning(move |_, _, _| Ok(ApplyOutcome::Partial(returned.clone())));
        let mut updater = Updater::new(vcs, renderer(json!({"name": "demo"})), MockPrompter::new());

        let mut events = Vec::new();
        let report = updater.run(tmp.path(), &mut collect(&mut events)).unwrap();

        assert_eq!(report.outcome, UpdateOutcome::Partial(partial.clone()));
        assert!(events.contains(&UpdateEvent::PartiallyApplied(partial)));
        assert_eq!(record(tmp.path()).commit, Revision::from("r2"));
    }

    #[test]
    fn collected_variable_is_rendered_and_saved() {
        let tmp = project("r1", json!({"project_name": "demo"}));

        let mut vcs = clean_vcs("r2");
        vcs.expect_clone_at().returning(|_, _, _| Ok(()));
        vcs.expect_diff_trees()
            .returning(|_, _| Ok(Patch::from("diff --git a/LICENSE b/LICENSE\n")));
        vcs.expect_apply().returning(|_, _, _| Ok(ApplyOutcome::Clean));

        let mut renderer = MockTemplateRenderer::new();
        renderer.expect_manifest().returning(|_| {
            Ok(Manifest::from_variables(vars(
                json!({"project_name": "x", "license": "MIT", "_copy_without_render": []}),
            )))
        });
        renderer
            .expect_render()
            .withf(|_, context, _| {
                context.get("license") == Some(&json!("Apache-2.0"))
                    && context.get("project_name") == Some(&json!("demo"))
            })
            .times(2)
            .returning(|_, _, out| Ok(out.join("demo")));

        let mut prompter = MockPrompter::new();
        prompter
            .expect_prompt()
            .withf(|new_vars| new_vars == &vars(json!({"license": "MIT"})))
            .times(1)
            .returning(|_| Ok(vars(json!({"license": "Apache-2.0"}))));
        let mut updater = Updater::new(vcs, renderer, prompter);

        let mut events = Vec::new();
        let report = updater.run(tmp.path(), &mut collect(&mut events)).unwrap();

        assert!(events.contains(&UpdateEvent::NewVariables {
            names: vec!["license".into()],
        }));
        assert_eq!(report.new_variables, vars(json!({"license": "Apache-2.0"})));
        let saved = record(tmp.path());
        assert_eq!(
            saved.context.cookiecutter,
            vars(json!({"project_name": "demo", "license": "Apache-2.0"}))
        );
    }

    #[test]
    fn abandoned_prompt_leaves_record_untouched() {
        let tmp = project("r1", json!({}));
        let before = std::fs::read(config::path_at(tmp.path())).unwrap();

        let mut vcs = clean_vcs("r2");
        vcs.expect_clone_at().returning(|_, _, _| Ok(()));
        vcs.expect_diff_trees().never();
        let mut renderer = MockTemplateRenderer::new();
        renderer
            .expect_manifest()
            .returning(|_| Ok(Manifest::from_variables(vars(json!({"license": "MIT"})))));
        renderer.expect_render().never();
        let mut prompter = MockPrompter::new();
        prompter
            .expect_prompt()
            .returning(|_| Err(SyncError::Prompt("interrupted".into())));
        let mut updater = Updater::new(vcs, renderer, prompter);

        let err = updater.run(tmp.path(), &mut |_| {}).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Interrupted);
        assert_eq!(std::fs::read(config::path_at(tmp.path())).unwrap(), before);
    }

    #[test]
    fn clone_failure_persists_nothing() {
        let tmp = project("r1", json!({}));
        let before = std::fs::read(config::path_at(tmp.path())).unwrap();

        let mut vcs = clean_vcs("r2");
        vcs.expect_clone_at().returning(|location, revision, _| {
            Err(GitError::Clone {
                location: location.to_string(),
                revision: revision.to_string(),
                detail: "auth failed".into(),
            })
        });
        let mut updater = Updater::new(vcs, MockTemplateRenderer::new(), MockPrompter::new());

        let err = updater.run(tmp.path(), &mut |_| {}).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert_eq!(std::fs::read(config::path_at(tmp.path())).unwrap(), before);
    }

    #[test]
    fn render_failure_persists_nothing() {
        let tmp = project("r1", json!({}));
        let before = std::fs::read(config::path_at(tmp.path())).unwrap();

        let mut vcs = clean_vcs("r2");
        vcs.expect_clone_at().returning(|_, _, _| Ok(()));
        vcs.expect_apply().never();
        let mut renderer = MockTemplateRenderer::new();
        renderer
            .expect_manifest()
            .returning(|_| Ok(Manifest::from_variables(Variables::new())));
        renderer.expect_render().returning(|dir, _, _| {
            Err(RenderError::NoProjectTemplate {
                path: dir.to_path_buf(),
            })
        });
        let mut updater = Updater::new(vcs, renderer, MockPrompter::new());

        let err = updater.run(tmp.path(), &mut |_| {}).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert_eq!(std::fs::read(config::path_at(tmp.path())).unwrap(), before);
    }

    #[test]
    fn preview_returns_patch_without_applying() {
        let tmp = project("r1", json!({"name": "x"}));
        let before = std::fs::read(config::path_at(tmp.path())).unwrap();

        let mut vcs = MockVcs::new();
        vcs.expect_is_clean().never();
        vcs.expect_resolve_head()
            .returning(|_, _| Ok(Revision::from("r2")));
        vcs.expect_clone_at().returning(|_, _, _| Ok(()));
        vcs.expect_diff_trees()
            .returning(|_, _| Ok(Patch::from("diff --git a/NEW b/NEW\n")));
        vcs.expect_apply().never();
        let mut updater = Updater::new(vcs, renderer(json!({"name": "demo"})), MockPrompter::new());

        let preview = updater.preview(tmp.path()).unwrap();

        assert_eq!(preview.new_commit, Revision::from("r2"));
        assert_eq!(preview.patch, Patch::from("diff --git a/NEW b/NEW\n"));
        assert_eq!(std::fs::read(config::path_at(tmp.path())).unwrap(), before);
    }
}
