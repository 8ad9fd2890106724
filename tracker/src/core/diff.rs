//! Diff results and pure combination logic.
//!
//! A [`GitDiffResult`] is immutable once produced by the git adapter.
//! Combination is deterministic and associative so partial merges of a diff
//! list agree with merging the whole list at once.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Aggregate line/file counts for a captured diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub additions: u64,
    pub deletions: u64,
    pub files_changed: usize,
}

/// One captured repository delta between two points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitDiffResult {
    /// Textual patch.
    pub diff: String,
    pub stats: DiffStats,
    /// Changed paths in the order git reported them.
    pub changed_files: Vec<String>,
    pub before_hash: String,
    pub after_hash: String,
}

impl GitDiffResult {
    /// True when the diff carries no patch text and no changed files.
    pub fn is_empty(&self) -> bool {
        self.diff.trim().is_empty() && self.changed_files.is_empty()
    }
}

/// Merge an ordered list of diffs into one aggregate view.
///
/// Entries with no patch text are dropped first. Stats are summed field-wise,
/// changed files are unioned preserving first-seen order, and patch text is
/// concatenated in input order. `before_hash` comes from the first kept entry
/// and `after_hash` from the last, so chained merges keep the outer range.
pub fn combine_diffs(diffs: &[GitDiffResult]) -> GitDiffResult {
    let kept: Vec<&GitDiffResult> = diffs
        .iter()
        .filter(|d| !d.diff.trim().is_empty())
        .collect();

    let Some(first) = kept.first() else {
        return GitDiffResult::default();
    };
    let last = kept.last().unwrap_or(first);

    let mut text = String::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut changed_files = Vec::new();
    let mut stats = DiffStats::default();

    for entry in &kept {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&entry.diff);
        stats.additions += entry.stats.additions;
        stats.deletions += entry.stats.deletions;
        for path in &entry.changed_files {
            if seen.insert(path.as_str()) {
                changed_files.push(path.clone());
            }
        }
    }
    stats.files_changed = changed_files.len();

    GitDiffResult {
        diff: text,
        stats,
        changed_files,
        before_hash: first.before_hash.clone(),
        after_hash: last.after_hash.clone(),
    }
}
