//! Per-session execution lifecycle tracking.
//!
//! [`ExecutionTracker`] brackets each agent run: it snapshots the worktree
//! HEAD when the run starts and, when it ends, drives the commit policy,
//! captures the resulting delta, and persists exactly one diff record,
//! success or failure. Callers must serialize start/end/cancel per session;
//! different sessions progress independently.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, instrument, warn};

use crate::commit::{CommitRequest, run_post_execution_commit, wait_for_structured_commit};
use crate::core::commit_mode::{CommitMode, CommitModeSettings, resolve_commit_mode};
use crate::core::diff::{GitDiffResult, combine_diffs};
use crate::core::types::ExecutionContext;
use crate::events::{EventSink, ExecutionEvent};
use crate::io::config::TrackerConfig;
use crate::io::git::GitAccess;
use crate::io::store::{ExecutionDiffRecord, NewExecutionDiff, SessionStore};

/// Tracks active executions and orchestrates their completion.
pub struct ExecutionTracker<S: SessionStore, G: GitAccess> {
    store: S,
    git: G,
    config: TrackerConfig,
    listeners: Vec<Box<dyn EventSink>>,
    active: Mutex<HashMap<String, ExecutionContext>>,
}

impl<S: SessionStore, G: GitAccess> ExecutionTracker<S, G> {
    pub fn new(store: S, git: G, config: TrackerConfig) -> Self {
        Self {
            store,
            git,
            config,
            listeners: Vec::new(),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Register a lifecycle event listener. Call before sharing the tracker.
    pub fn subscribe(&mut self, sink: Box<dyn EventSink>) {
        self.listeners.push(sink);
    }

    /// The session store this tracker writes through.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Begin tracking an execution in `worktree`.
    ///
    /// Allocates the next sequence and snapshots HEAD; nothing is registered
    /// if either fails. A context left over from an unserialized earlier
    /// start for the same session is replaced wholesale.
    #[instrument(skip_all, fields(session_id, worktree = %worktree.display()))]
    pub fn start_execution(
        &self,
        session_id: &str,
        worktree: &Path,
        prompt_marker_id: Option<i64>,
        prompt: Option<&str>,
    ) -> Result<ExecutionContext> {
        let execution_sequence = self
            .store
            .next_execution_sequence(session_id)
            .context("allocate execution sequence")?;
        let before_commit_hash = self
            .git
            .current_commit_hash(worktree)
            .with_context(|| format!("read HEAD of {}", worktree.display()))?;

        let context = ExecutionContext {
            session_id: session_id.to_string(),
            worktree_path: worktree.to_path_buf(),
            prompt_marker_id,
            before_commit_hash,
            execution_sequence,
            prompt: prompt.map(str::to_string),
        };

        let replaced = self
            .active_contexts()
            .insert(session_id.to_string(), context.clone());
        if replaced.is_some() {
            warn!("replacing an execution context that was never ended");
        }

        info!(execution_sequence, "execution tracking started");
        self.notify(&ExecutionEvent::ExecutionStarted {
            session_id: session_id.to_string(),
            execution_sequence,
        });
        Ok(context)
    }

    /// Stop tracking without capturing anything.
    ///
    /// Commits already made stay in place; only future tracking steps are
    /// dropped. Silent no-op when the session is not tracked.
    pub fn cancel_execution(&self, session_id: &str) {
        let removed = self.active_contexts().remove(session_id);
        match removed {
            Some(context) => {
                info!(
                    session_id,
                    execution_sequence = context.execution_sequence,
                    "execution cancelled"
                );
                self.notify(&ExecutionEvent::ExecutionCancelled {
                    session_id: session_id.to_string(),
                    execution_sequence: context.execution_sequence,
                });
            }
            None => debug!(session_id, "cancel without active execution, ignoring"),
        }
    }

    pub fn is_tracking(&self, session_id: &str) -> bool {
        self.active_contexts().contains_key(session_id)
    }

    pub fn execution_context(&self, session_id: &str) -> Option<ExecutionContext> {
        self.active_contexts().get(session_id).cloned()
    }

    /// Finish tracking: run the commit policy, capture the delta, persist
    /// exactly one diff record, and emit completion.
    ///
    /// The context is removed up front, so the registry is clean on every
    /// exit path; failures are re-thrown to the caller after logging. Commit
    /// trouble (failure, timeout, nothing to commit) never surfaces here:
    /// it becomes session output, and a record is still produced.
    #[instrument(skip_all, fields(session_id))]
    pub fn end_execution(&self, session_id: &str) -> Result<Option<ExecutionDiffRecord>> {
        let removed = self.active_contexts().remove(session_id);
        let Some(context) = removed else {
            warn!(session_id, "end_execution without active context, ignoring");
            return Ok(None);
        };

        match self.finish(&context) {
            Ok(record) => {
                info!(
                    execution_sequence = context.execution_sequence,
                    diff_id = record.id,
                    files_changed = record.stats.files_changed,
                    "execution tracking completed"
                );
                self.notify(&ExecutionEvent::ExecutionCompleted {
                    session_id: session_id.to_string(),
                    execution_sequence: context.execution_sequence,
                    diff_id: record.id,
                    stats: record.stats,
                });
                Ok(Some(record))
            }
            Err(err) => {
                error!(err = %err, "execution tracking failed");
                Err(err)
            }
        }
    }

    fn finish(&self, context: &ExecutionContext) -> Result<ExecutionDiffRecord> {
        let session = self
            .store
            .session(&context.session_id)
            .context("load session for commit mode resolution")?;
        let settings = resolve_commit_mode(&session);
        debug!(mode = settings.mode.as_str(), "commit mode resolved");

        let outcome = run_post_execution_commit(
            &self.store,
            &self.git,
            &CommitRequest {
                session_id: &context.session_id,
                worktree: &context.worktree_path,
                settings: &settings,
                prompt: context.prompt.as_deref(),
                execution_sequence: context.execution_sequence,
            },
        );
        debug!(?outcome, "commit phase finished");

        if settings.mode == CommitMode::Structured {
            wait_for_structured_commit(
                &self.store,
                &self.git,
                &context.session_id,
                &context.worktree_path,
                &context.before_commit_hash,
                self.structured_wait_timeout(&settings),
                self.config.structured_poll_interval(),
            );
        }

        let after_hash = self
            .git
            .current_commit_hash(&context.worktree_path)
            .context("read post-execution HEAD")?;

        // No commit happened: the delta (possibly none) is still sitting in
        // the working tree. Otherwise diff the commit range.
        let diff = if after_hash == context.before_commit_hash {
            self.git
                .working_tree_diff(&context.worktree_path)
                .context("capture working tree diff")?
        } else {
            self.git
                .commit_range_diff(
                    &context.worktree_path,
                    &context.before_commit_hash,
                    &after_hash,
                )
                .context("capture commit range diff")?
        };

        self.store
            .create_execution_diff(NewExecutionDiff {
                session_id: context.session_id.clone(),
                prompt_marker_id: context.prompt_marker_id,
                execution_sequence: context.execution_sequence,
                diff: diff.diff,
                changed_files: diff.changed_files,
                stats: diff.stats,
                before_hash: diff.before_hash,
                after_hash: diff.after_hash,
            })
            .context("persist execution diff")
    }

    /// Aggregate view of everything the session's executions changed so far.
    ///
    /// Merges all persisted diff records in creation order; see
    /// [`combine_diffs`] for the merge semantics.
    pub fn combined_session_diff(&self, session_id: &str) -> Result<GitDiffResult> {
        let records = self
            .store
            .execution_diffs(session_id)
            .context("load execution diffs")?;
        let diffs: Vec<GitDiffResult> = records
            .into_iter()
            .map(|record| GitDiffResult {
                diff: record.diff,
                stats: record.stats,
                changed_files: record.changed_files,
                before_hash: record.before_hash,
                after_hash: record.after_hash,
            })
            .collect();
        Ok(combine_diffs(&diffs))
    }

    /// Per-session settings override the config-level wait bound.
    fn structured_wait_timeout(&self, settings: &CommitModeSettings) -> Duration {
        settings
            .structured_wait_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.structured_wait_timeout())
    }

    fn notify(&self, event: &ExecutionEvent) {
        for listener in &self.listeners {
            listener.emit(event);
        }
    }

    fn active_contexts(&self) -> MutexGuard<'_, HashMap<String, ExecutionContext>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
