//! `rebake check`: is the project behind its template?

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use rebake_sync::{check, CheckResult, ErrorKind, GitCli};

/// Exit status for a missing or unreadable `.cruft.json`.
const CONFIG_MISSING: u8 = 2;

/// Arguments for `rebake check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Generated project to inspect.
    #[arg(default_value = ".")]
    pub project_dir: PathBuf,
}

impl CheckArgs {
    pub fn run(self, git: &GitCli) -> Result<ExitCode> {
        match check(&self.project_dir, git) {
            Ok(CheckResult::UpToDate) => {
                println!("{} project is up to date", "✓".green());
                Ok(ExitCode::SUCCESS)
            }
            Ok(CheckResult::Outdated) => {
                println!(
                    "{} project is out of date; run `rebake update` to apply template changes",
                    "!".yellow()
                );
                Ok(ExitCode::FAILURE)
            }
            Err(err) if err.kind() == ErrorKind::ConfigurationMissing => {
                eprintln!("{} {err}", "Error:".red().bold());
                Ok(ExitCode::from(CONFIG_MISSING))
            }
            Err(err) => Err(err).with_context(|| {
                format!("check failed for {}", self.project_dir.display())
            }),
        }
    }
}
