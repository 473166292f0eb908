//! rebake: keep generated projects in sync with their templates.
//!
//! # Usage
//!
//! ```text
//! rebake check  [PROJECT_DIR]
//! rebake update [PROJECT_DIR] [--no-input]
//! rebake diff   [PROJECT_DIR]
//! rebake --git /usr/local/bin/git <command> ...
//! ```

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::{check::CheckArgs, diff::DiffArgs, update::UpdateArgs};
use rebake_sync::GitCli;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "rebake",
    version,
    about = "Apply upstream template changes to generated projects",
    long_about = None,
)]
struct Cli {
    /// git executable to use.
    #[arg(long, global = true, value_name = "PATH", default_value = "git")]
    git: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Exit 0 if the project is up to date, 1 if its template has moved on.
    Check(CheckArgs),

    /// Apply the template changes since the recorded revision.
    Update(UpdateArgs),

    /// Print the patch the next update would apply.
    Diff(DiffArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    tracing::debug!(git = %cli.git.display(), command = ?cli.command, "starting");
    let git = GitCli::with_program(cli.git);
    match cli.command {
        Commands::Check(args) => args.run(&git),
        Commands::Update(args) => args.run(git),
        Commands::Diff(args) => args.run(git),
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "Error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
