//! `rebake diff`: show what the next update would apply.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use rebake_renderer::TeraRenderer;
use rebake_sync::{DefaultsPrompter, GitCli, Updater};

/// Arguments for `rebake diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Generated project to compare against its template.
    #[arg(default_value = ".")]
    pub project_dir: PathBuf,
}

impl DiffArgs {
    pub fn run(self, git: GitCli) -> Result<ExitCode> {
        let mut updater = Updater::new(git, TeraRenderer::new(), DefaultsPrompter);
        let preview = updater
            .preview(&self.project_dir)
            .with_context(|| format!("diff failed for {}", self.project_dir.display()))?;

        if preview.patch.is_empty() {
            println!("No template changes since {}.", preview.old_commit.short());
            return Ok(ExitCode::SUCCESS);
        }

        let mut stdout = io::stdout().lock();
        stdout
            .write_all(preview.patch.as_bytes())
            .and_then(|_| stdout.flush())
            .context("failed to write patch")?;
        Ok(ExitCode::SUCCESS)
    }
}
