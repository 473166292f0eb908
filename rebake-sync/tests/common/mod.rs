//! Throwaway template repositories and generated projects backed by real git.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use rebake_core::config;
use rebake_core::types::{ProjectConfig, ProjectContext, Revision};
use rebake_renderer::{TemplateRenderer, TeraRenderer};
use serde_json::json;
use tempfile::TempDir;

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .current_dir(dir)
        .args([
            "-c",
            "user.name=rebake tests",
            "-c",
            "user.email=tests@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, contents).expect("write fixture");
}

pub fn commit_all(dir: &Path, message: &str) -> Revision {
    git(dir, &["add", "--all"]);
    git(dir, &["commit", "--quiet", "--allow-empty", "-m", message]);
    Revision::from(git(dir, &["rev-parse", "HEAD"]))
}

/// A template repository plus a project generated from its first revision.
pub struct Fixture {
    pub root: TempDir,
    pub template: PathBuf,
    pub project: PathBuf,
    pub first: Revision,
}

impl Fixture {
    /// Template at `<root>/template`, project at `<root>/projects/fake-project`
    /// in its own repository.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Same, but the project lives at `services/fake-project` inside a
    /// larger repository.
    pub fn in_subdirectory() -> Self {
        Self::build(Some("services"))
    }

    fn build(subdir: Option<&str>) -> Self {
        let root = TempDir::new().expect("tempdir");
        let template = root.path().join("template");
        write(
            &template.join("cookiecutter.json"),
            &json!({"project_name": "fake-project", "_private": "hidden"}).to_string(),
        );
        let project_tpl = template.join("{{cookiecutter.project_name}}");
        write(
            &project_tpl.join("README.md"),
            "# {{ cookiecutter.project_name }}\n\nA generated project.\n",
        );
        write(&project_tpl.join("CONTRIBUTING.md"), "Send patches.\n");
        git(&template, &["init", "--quiet"]);
        let first = commit_all(&template, "initial template");

        let repo = root.path().join("projects");
        fs::create_dir_all(&repo).expect("mkdir projects");
        let parent = match subdir {
            Some(dir) => repo.join(dir),
            None => repo.clone(),
        };
        fs::create_dir_all(&parent).expect("mkdir parent");

        let context = json!({"project_name": "fake-project"})
            .as_object()
            .cloned()
            .expect("object");
        let project = TeraRenderer::new()
            .render(&template, &context, &parent)
            .expect("render project");

        let record = ProjectConfig {
            template: template.to_string_lossy().into_owned(),
            commit: first.clone(),
            context: ProjectContext {
                cookiecutter: context,
                extra: Default::default(),
            },
            checkout: None,
            skip: vec![],
        };
        config::save_at(&project, &record).expect("save record");

        let git_root = if subdir.is_some() { &repo } else { &project };
        git(git_root, &["init", "--quiet"]);
        commit_all(git_root, "generated project");

        Fixture {
            root,
            template,
            project,
            first,
        }
    }

    /// Commit a change to the template and return the new revision.
    pub fn evolve(&self, change: impl FnOnce(&Path)) -> Revision {
        change(&self.template.join("{{cookiecutter.project_name}}"));
        commit_all(&self.template, "evolve template")
    }

    pub fn commit_project(&self, message: &str) {
        git(&self.project, &["add", "--all", "."]);
        git(&self.project, &["commit", "--quiet", "-m", message]);
    }

    pub fn record(&self) -> ProjectConfig {
        config::load_at(&self.project).expect("load record")
    }
}
