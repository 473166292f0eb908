//! `rebake update`: apply template changes to the project.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use rebake_renderer::TeraRenderer;
use rebake_sync::{
    DefaultsPrompter, GitCli, Prompter, TerminalPrompter, UpdateEvent, UpdateOutcome, Updater,
};

/// Arguments for `rebake update`.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Generated project to update.
    #[arg(default_value = ".")]
    pub project_dir: PathBuf,

    /// Accept defaults for new template variables instead of prompting.
    #[arg(long)]
    pub no_input: bool,
}

impl UpdateArgs {
    pub fn run(self, git: GitCli) -> Result<ExitCode> {
        if self.no_input {
            self.update_with(git, DefaultsPrompter)
        } else {
            let prompter = TerminalPrompter::new(io::stdin().lock(), io::stdout());
            self.update_with(git, prompter)
        }
    }

    fn update_with(&self, git: GitCli, prompter: impl Prompter) -> Result<ExitCode> {
        let mut updater = Updater::new(git, TeraRenderer::new(), prompter);
        let report = updater
            .run(&self.project_dir, &mut present)
            .with_context(|| format!("update failed for {}", self.project_dir.display()))?;

        if let UpdateOutcome::Partial(partial) = &report.outcome {
            if partial.nothing_applied() {
                println!(
                    "{} none of the template changes applied; the record still moved to {}",
                    "!".yellow(),
                    report.new_commit.short()
                );
            }
        }
        Ok(ExitCode::SUCCESS)
    }
}

fn present(event: UpdateEvent) {
    match event {
        UpdateEvent::Updating { from, to } => {
            println!("Updating from {} to {}", from.short(), to.short());
        }
        UpdateEvent::AlreadyUpToDate => {
            println!("{} nothing to do, project is already up to date", "✓".green());
        }
        UpdateEvent::NewVariables { names } => {
            println!("New template variables: {}", names.join(", "));
        }
        UpdateEvent::NoChanges => {
            println!("{} no template changes to apply", "✓".green());
        }
        UpdateEvent::Applied => {
            println!("{} template changes applied", "✓".green());
        }
        UpdateEvent::PartiallyApplied(partial) => {
            println!(
                "{} some hunks could not be applied; resolve them by hand:",
                "!".yellow()
            );
            for path in &partial.reject_files {
                println!("  ✗  {}", path.display());
            }
            if partial.reject_files.is_empty() {
                for path in &partial.rejected {
                    println!("  ✗  {}", path.display());
                }
            }
            if !partial.diagnostics.trim().is_empty() {
                println!("{}", partial.diagnostics.trim_end().dimmed());
            }
        }
        UpdateEvent::Persisted { commit } => {
            println!("{} recorded template revision {}", "✓".green(), commit.short());
        }
    }
}
