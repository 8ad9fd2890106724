//! Git adapter for worktree inspection and checkpoint commits.
//!
//! The tracker reads and commits through a small, explicit wrapper around
//! `git` subprocess calls. The [`GitAccess`] trait is the seam the rest of
//! the crate depends on, so tests can substitute scripted repositories
//! without spawning processes.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::diff::{DiffStats, GitDiffResult};
use crate::io::config::TrackerConfig;
use crate::io::process::{CommandOutput, run_command_with_timeout};

/// Narrow repository-access interface used by execution tracking.
///
/// Paths are per-call because one tracker serves many session worktrees.
pub trait GitAccess {
    /// Current HEAD identifier of the worktree. Fails outside a repository.
    fn current_commit_hash(&self, worktree: &Path) -> Result<String>;

    /// Uncommitted working-tree changes relative to HEAD. Untracked files
    /// are listed in `changed_files` (they carry no patch text or counts).
    fn working_tree_diff(&self, worktree: &Path) -> Result<GitDiffResult>;

    /// Changes between two commits.
    fn commit_range_diff(
        &self,
        worktree: &Path,
        before_hash: &str,
        after_hash: &str,
    ) -> Result<GitDiffResult>;

    /// Stage everything and commit with `message`. Returns the new commit
    /// hash, or `None` when there was nothing to commit.
    fn commit_all(&self, worktree: &Path, message: &str) -> Result<Option<String>>;
}

/// Subprocess-backed [`GitAccess`] with bounded execution per call.
#[derive(Debug, Clone)]
pub struct Git {
    timeout: Duration,
    output_limit_bytes: usize,
}

impl Git {
    pub fn new(timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.git_timeout(), config.git_output_limit_bytes)
    }

    fn run(&self, worktree: &Path, args: &[&str]) -> Result<CommandOutput> {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(worktree);
        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run git {}", args.join(" ")))?;
        if output.timed_out {
            return Err(anyhow!(
                "git {} timed out after {:?}",
                args.join(" "),
                self.timeout
            ));
        }
        Ok(output)
    }

    fn run_checked(&self, worktree: &Path, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(worktree, args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run_capture(&self, worktree: &Path, args: &[&str]) -> Result<String> {
        let output = self.run_checked(worktree, args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn untracked_files(&self, worktree: &Path) -> Result<Vec<String>> {
        let out = self.run_capture(worktree, &["status", "--porcelain=v1", "-uall"])?;
        Ok(parse_untracked(&out))
    }

    fn has_staged_changes(&self, worktree: &Path) -> Result<bool> {
        let out = self.run_capture(worktree, &["diff", "--cached", "--name-only"])?;
        Ok(!out.trim().is_empty())
    }
}

impl Default for Git {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), 1_000_000)
    }
}

impl GitAccess for Git {
    fn current_commit_hash(&self, worktree: &Path) -> Result<String> {
        let out = self.run_capture(worktree, &["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    #[instrument(skip_all, fields(worktree = %worktree.display()))]
    fn working_tree_diff(&self, worktree: &Path) -> Result<GitDiffResult> {
        let head = self.current_commit_hash(worktree)?;
        let text = self.run_capture(worktree, &["diff", "HEAD"])?;
        let numstat = self.run_capture(worktree, &["diff", "HEAD", "--numstat"])?;
        let entries = parse_numstat(&numstat)?;

        let mut changed_files: Vec<String> =
            entries.iter().map(|entry| entry.path.clone()).collect();
        for path in self.untracked_files(worktree)? {
            if !changed_files.contains(&path) {
                changed_files.push(path);
            }
        }

        let stats = stats_for(&entries, changed_files.len());
        debug!(files = stats.files_changed, "captured working tree diff");
        Ok(GitDiffResult {
            diff: text,
            stats,
            changed_files,
            before_hash: head.clone(),
            after_hash: head,
        })
    }

    #[instrument(skip_all, fields(worktree = %worktree.display(), before_hash, after_hash))]
    fn commit_range_diff(
        &self,
        worktree: &Path,
        before_hash: &str,
        after_hash: &str,
    ) -> Result<GitDiffResult> {
        let text = self.run_capture(worktree, &["diff", before_hash, after_hash])?;
        let numstat =
            self.run_capture(worktree, &["diff", before_hash, after_hash, "--numstat"])?;
        let entries = parse_numstat(&numstat)?;

        let changed_files: Vec<String> =
            entries.iter().map(|entry| entry.path.clone()).collect();
        let stats = stats_for(&entries, changed_files.len());
        debug!(files = stats.files_changed, "captured commit range diff");
        Ok(GitDiffResult {
            diff: text,
            stats,
            changed_files,
            before_hash: before_hash.to_string(),
            after_hash: after_hash.to_string(),
        })
    }

    #[instrument(skip_all, fields(worktree = %worktree.display()))]
    fn commit_all(&self, worktree: &Path, message: &str) -> Result<Option<String>> {
        self.run_checked(worktree, &["add", "-A"])?;
        if !self.has_staged_changes(worktree)? {
            debug!("nothing staged, skipping commit");
            return Ok(None);
        }
        self.run_checked(worktree, &["commit", "-m", message])?;
        let hash = self.current_commit_hash(worktree)?;
        debug!(commit_hash = %hash, "created commit");
        Ok(Some(hash))
    }
}

/// Parsed `git diff --numstat` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct NumstatEntry {
    additions: u64,
    deletions: u64,
    path: String,
}

fn parse_numstat(out: &str) -> Result<Vec<NumstatEntry>> {
    let mut entries = Vec::new();
    for line in out.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.splitn(3, '\t');
        let (Some(added), Some(deleted), Some(path)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(anyhow!("unexpected numstat line: '{line}'"));
        };
        entries.push(NumstatEntry {
            additions: parse_count(added)?,
            deletions: parse_count(deleted)?,
            path: normalize_path(path),
        });
    }
    Ok(entries)
}

/// Binary files report "-" for both counts.
fn parse_count(field: &str) -> Result<u64> {
    if field == "-" {
        return Ok(0);
    }
    field
        .parse()
        .with_context(|| format!("parse numstat count '{field}'"))
}

/// Renames report "old => new"; keep the new path.
fn normalize_path(path: &str) -> String {
    let path = path.trim();
    match path.split_once(" => ") {
        Some((_, new)) if !path.contains('{') => new.trim().to_string(),
        _ => path.to_string(),
    }
}

fn parse_untracked(out: &str) -> Vec<String> {
    out.lines()
        .filter_map(|line| line.strip_prefix("?? "))
        .map(|path| path.trim().to_string())
        .collect()
}

fn stats_for(entries: &[NumstatEntry], files_changed: usize) -> DiffStats {
    DiffStats {
        additions: entries.iter().map(|e| e.additions).sum(),
        deletions: entries.iter().map(|e| e.deletions).sum(),
        files_changed,
    }
}
