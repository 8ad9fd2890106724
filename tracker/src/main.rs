//! Worktree inspection CLI.
//!
//! A small debugging surface over the same git adapter the tracker uses:
//! read a worktree's HEAD or print a captured diff as JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};

use tracker::exit_codes;
use tracker::io::config::{TrackerConfig, load_config};
use tracker::io::git::{Git, GitAccess};

#[derive(Parser)]
#[command(
    name = "tracker",
    version,
    about = "Inspect worktree state tracked for agent executions"
)]
struct Cli {
    /// Path to a tracker config file (defaults apply when missing).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the current HEAD hash of a worktree.
    Hash {
        /// Worktree path.
        path: PathBuf,
    },
    /// Print a captured diff as pretty JSON.
    ///
    /// Without a range this is the uncommitted working-tree diff; with
    /// `--from`/`--to` it is the diff between two commits.
    Diff {
        /// Worktree path.
        path: PathBuf,
        /// Range start commit.
        #[arg(long, requires = "to")]
        from: Option<String>,
        /// Range end commit.
        #[arg(long, requires = "from")]
        to: Option<String>,
    },
}

fn main() -> ExitCode {
    tracker::logging::init();
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(exit_codes::INVALID as u8)
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TrackerConfig::default(),
    };
    let git = Git::from_config(&config);

    match cli.command {
        Command::Hash { path } => {
            let hash = git.current_commit_hash(&path)?;
            println!("{hash}");
            Ok(exit_codes::OK)
        }
        Command::Diff { path, from, to } => {
            let diff = match (from, to) {
                (Some(from), Some(to)) => git.commit_range_diff(&path, &from, &to)?,
                (None, None) => git.working_tree_diff(&path)?,
                _ => return Err(anyhow!("--from and --to must be given together")),
            };
            println!("{}", serde_json::to_string_pretty(&diff)?);
            if diff.is_empty() {
                return Ok(exit_codes::NO_CHANGES);
            }
            Ok(exit_codes::OK)
        }
    }
}
