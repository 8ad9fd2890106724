//! Commit policy execution after a tracked run.
//!
//! Every outcome here is informational: commit failures, timeouts, and mode
//! notices surface as session output events, never as errors. Only the
//! tracking layer above decides what is fatal.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::core::commit_mode::{CommitMode, CommitModeSettings};
use crate::core::message::checkpoint_message;
use crate::core::types::{OutputEvent, OutputSubtype};
use crate::io::git::GitAccess;
use crate::io::store::SessionStore;

/// Result of the post-execution commit phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A checkpoint commit was created.
    Committed { commit_hash: String },
    /// No commit was attempted or needed (disabled/structured mode, clean tree).
    Skipped,
    /// The commit attempt failed; tracking continues regardless.
    Failed { error: String },
}

/// Result of observing the worktree for an agent-created commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredWait {
    /// A new commit appeared within the bound.
    Detected { commit_hash: String },
    /// The bound elapsed without a new commit.
    TimedOut,
}

/// Inputs for the post-execution commit phase.
#[derive(Debug, Clone)]
pub struct CommitRequest<'a> {
    pub session_id: &'a str,
    pub worktree: &'a Path,
    pub settings: &'a CommitModeSettings,
    pub prompt: Option<&'a str>,
    pub execution_sequence: u32,
}

/// Apply the session's commit policy after an execution.
///
/// - `disabled`: nothing happens.
/// - `checkpoint`: stage-all + commit with a generated message; a clean tree
///   is a silent no-op, a git failure is reported as an output event.
/// - `structured`: no commit here; a mode notice is emitted and the caller
///   runs [`wait_for_structured_commit`] separately.
#[instrument(skip_all, fields(session_id = request.session_id, mode = request.settings.mode.as_str()))]
pub fn run_post_execution_commit<S: SessionStore, G: GitAccess>(
    store: &S,
    git: &G,
    request: &CommitRequest<'_>,
) -> CommitOutcome {
    match request.settings.mode {
        CommitMode::Disabled => {
            debug!("auto-commit disabled, skipping");
            CommitOutcome::Skipped
        }
        CommitMode::Structured => {
            emit_output(
                store,
                request.session_id,
                OutputEvent::system(
                    OutputSubtype::AutocommitMode,
                    CommitMode::Structured,
                    "structured commit mode: the agent manages its own commits",
                ),
            );
            CommitOutcome::Skipped
        }
        CommitMode::Checkpoint => checkpoint_commit(store, git, request),
    }
}

fn checkpoint_commit<S: SessionStore, G: GitAccess>(
    store: &S,
    git: &G,
    request: &CommitRequest<'_>,
) -> CommitOutcome {
    let message = checkpoint_message(
        request.settings,
        request.prompt,
        request.execution_sequence,
    );

    match git.commit_all(request.worktree, &message) {
        Ok(Some(commit_hash)) => {
            info!(commit_hash = %commit_hash, "checkpoint commit created");
            emit_output(
                store,
                request.session_id,
                OutputEvent {
                    commit_hash: Some(commit_hash.clone()),
                    ..OutputEvent::system(
                        OutputSubtype::AutocommitSuccess,
                        CommitMode::Checkpoint,
                        format!("checkpoint commit created: {message}"),
                    )
                },
            );
            CommitOutcome::Committed { commit_hash }
        }
        Ok(None) => {
            debug!("nothing to commit");
            CommitOutcome::Skipped
        }
        Err(err) => {
            let error = format!("{err:#}");
            warn!(err = %error, "checkpoint commit failed");
            emit_output(
                store,
                request.session_id,
                OutputEvent {
                    error: Some(error.clone()),
                    ..OutputEvent::system(
                        OutputSubtype::AutocommitError,
                        CommitMode::Checkpoint,
                        format!("auto-commit failed: {error}"),
                    )
                },
            );
            CommitOutcome::Failed { error }
        }
    }
}

/// Observe the worktree for a commit created by the agent.
///
/// Polls HEAD against `baseline_hash` until a new commit appears or the
/// deadline passes. Best-effort detection: the agent may legitimately choose
/// not to commit, which lands in [`StructuredWait::TimedOut`].
#[instrument(skip_all, fields(session_id, timeout_ms = timeout.as_millis() as u64))]
pub fn wait_for_structured_commit<S: SessionStore, G: GitAccess>(
    store: &S,
    git: &G,
    session_id: &str,
    worktree: &Path,
    baseline_hash: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> StructuredWait {
    let deadline = Instant::now() + timeout;

    loop {
        match git.current_commit_hash(worktree) {
            Ok(hash) if hash != baseline_hash => {
                info!(commit_hash = %hash, "agent commit detected");
                emit_output(
                    store,
                    session_id,
                    OutputEvent {
                        commit_hash: Some(hash.clone()),
                        ..OutputEvent::system(
                            OutputSubtype::AutocommitClaudeSuccess,
                            CommitMode::Structured,
                            format!("agent commit detected: {hash}"),
                        )
                    },
                );
                return StructuredWait::Detected { commit_hash: hash };
            }
            Ok(_) => {}
            // Transient read failures do not abort the wait; the deadline does.
            Err(err) => warn!(err = %err, "failed to read HEAD while waiting"),
        }

        let now = Instant::now();
        if now >= deadline {
            warn!("no agent commit within bound");
            emit_output(
                store,
                session_id,
                OutputEvent::system(
                    OutputSubtype::AutocommitTimeout,
                    CommitMode::Structured,
                    format!(
                        "no agent commit detected within {} ms",
                        timeout.as_millis()
                    ),
                ),
            );
            return StructuredWait::TimedOut;
        }
        thread::sleep(poll_interval.min(deadline - now));
    }
}

/// Output events are informational; failing to record one is logged, never
/// propagated.
fn emit_output<S: SessionStore>(store: &S, session_id: &str, event: OutputEvent) {
    if let Err(err) = store.append_output(session_id, &event) {
        warn!(err = %err, subtype = ?event.subtype, "failed to append session output");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use anyhow::{Result, anyhow};

    use crate::core::diff::GitDiffResult;
    use crate::test_support::InMemoryStore;

    /// Scripted [`GitAccess`] whose HEAD advances per read and whose commit
    /// behavior is predetermined.
    struct FakeGit {
        heads: Mutex<Vec<String>>,
        commit_result: Option<Result<Option<String>, String>>,
    }

    impl FakeGit {
        fn with_heads(heads: &[&str]) -> Self {
            Self {
                heads: Mutex::new(heads.iter().rev().map(|h| h.to_string()).collect()),
                commit_result: None,
            }
        }

        fn committing(result: Result<Option<String>, String>) -> Self {
            Self {
                heads: Mutex::new(Vec::new()),
                commit_result: Some(result),
            }
        }
    }

    impl GitAccess for FakeGit {
        fn current_commit_hash(&self, _worktree: &Path) -> Result<String> {
            let mut heads = self.heads.lock().expect("lock");
            match heads.len() {
                0 => Err(anyhow!("no scripted head")),
                1 => Ok(heads[0].clone()),
                _ => Ok(heads.pop().expect("head")),
            }
        }

        fn working_tree_diff(&self, _worktree: &Path) -> Result<GitDiffResult> {
            Ok(GitDiffResult::default())
        }

        fn commit_range_diff(
            &self,
            _worktree: &Path,
            _before: &str,
            _after: &str,
        ) -> Result<GitDiffResult> {
            Ok(GitDiffResult::default())
        }

        fn commit_all(&self, _worktree: &Path, _message: &str) -> Result<Option<String>> {
            match self.commit_result.as_ref().expect("scripted commit") {
                Ok(hash) => Ok(hash.clone()),
                Err(err) => Err(anyhow!(err.clone())),
            }
        }
    }

    fn request<'a>(settings: &'a CommitModeSettings, worktree: &'a Path) -> CommitRequest<'a> {
        CommitRequest {
            session_id: "s1",
            worktree,
            settings,
            prompt: Some("do the thing"),
            execution_sequence: 1,
        }
    }

    fn settings(mode: CommitMode) -> CommitModeSettings {
        CommitModeSettings {
            mode,
            ..CommitModeSettings::default()
        }
    }

    fn subtypes(store: &InMemoryStore, session_id: &str) -> Vec<OutputSubtype> {
        store
            .outputs(session_id)
            .iter()
            .map(|event| event.subtype)
            .collect()
    }

    #[test]
    fn disabled_mode_commits_nothing_and_stays_silent() {
        let store = InMemoryStore::new();
        let git = FakeGit::with_heads(&["a1"]);
        let worktree = PathBuf::from("/w");
        let settings = settings(CommitMode::Disabled);

        let outcome = run_post_execution_commit(&store, &git, &request(&settings, &worktree));
        assert_eq!(outcome, CommitOutcome::Skipped);
        assert!(subtypes(&store, "s1").is_empty());
    }

    #[test]
    fn structured_mode_emits_mode_notice_without_committing() {
        let store = InMemoryStore::new();
        let git = FakeGit::with_heads(&["a1"]);
        let worktree = PathBuf::from("/w");
        let settings = settings(CommitMode::Structured);

        let outcome = run_post_execution_commit(&store, &git, &request(&settings, &worktree));
        assert_eq!(outcome, CommitOutcome::Skipped);
        assert_eq!(subtypes(&store, "s1"), vec![OutputSubtype::AutocommitMode]);
    }

    #[test]
    fn checkpoint_success_reports_new_hash() {
        let store = InMemoryStore::new();
        let git = FakeGit::committing(Ok(Some("b2".to_string())));
        let worktree = PathBuf::from("/w");
        let settings = settings(CommitMode::Checkpoint);

        let outcome = run_post_execution_commit(&store, &git, &request(&settings, &worktree));
        assert_eq!(
            outcome,
            CommitOutcome::Committed {
                commit_hash: "b2".to_string()
            }
        );

        let outputs = store.outputs("s1");
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].subtype, OutputSubtype::AutocommitSuccess);
        assert_eq!(outputs[0].commit_hash.as_deref(), Some("b2"));
    }

    #[test]
    fn checkpoint_clean_tree_is_silent_noop() {
        let store = InMemoryStore::new();
        let git = FakeGit::committing(Ok(None));
        let worktree = PathBuf::from("/w");
        let settings = settings(CommitMode::Checkpoint);

        let outcome = run_post_execution_commit(&store, &git, &request(&settings, &worktree));
        assert_eq!(outcome, CommitOutcome::Skipped);
        assert!(subtypes(&store, "s1").is_empty());
    }

    #[test]
    fn checkpoint_failure_reports_error_event() {
        let store = InMemoryStore::new();
        let git = FakeGit::committing(Err("index locked".to_string()));
        let worktree = PathBuf::from("/w");
        let settings = settings(CommitMode::Checkpoint);

        let outcome = run_post_execution_commit(&store, &git, &request(&settings, &worktree));
        let CommitOutcome::Failed { error } = outcome else {
            panic!("expected failure");
        };
        assert!(error.contains("index locked"));

        let outputs = store.outputs("s1");
        assert_eq!(outputs[0].subtype, OutputSubtype::AutocommitError);
        assert!(outputs[0].error.as_deref().expect("error").contains("index locked"));
    }

    #[test]
    fn structured_wait_detects_new_commit() {
        let store = InMemoryStore::new();
        // First poll still sees the baseline, second sees the agent's commit.
        let git = FakeGit::with_heads(&["a1", "b2"]);
        let worktree = PathBuf::from("/w");

        let outcome = wait_for_structured_commit(
            &store,
            &git,
            "s1",
            &worktree,
            "a1",
            Duration::from_millis(500),
            Duration::from_millis(1),
        );
        assert_eq!(
            outcome,
            StructuredWait::Detected {
                commit_hash: "b2".to_string()
            }
        );
        assert_eq!(
            subtypes(&store, "s1"),
            vec![OutputSubtype::AutocommitClaudeSuccess]
        );
    }

    #[test]
    fn structured_wait_times_out_at_bound() {
        let store = InMemoryStore::new();
        let git = FakeGit::with_heads(&["a1"]);
        let worktree = PathBuf::from("/w");

        let timeout = Duration::from_millis(50);
        let start = Instant::now();
        let outcome = wait_for_structured_commit(
            &store,
            &git,
            "s1",
            &worktree,
            "a1",
            timeout,
            Duration::from_millis(5),
        );
        assert_eq!(outcome, StructuredWait::TimedOut);
        assert!(start.elapsed() >= timeout);
        assert_eq!(subtypes(&store, "s1"), vec![OutputSubtype::AutocommitTimeout]);
    }

    #[test]
    fn structured_wait_detects_commit_made_before_wait() {
        let store = InMemoryStore::new();
        // The agent committed during the execution itself: HEAD already moved.
        let git = FakeGit::with_heads(&["c3"]);
        let worktree = PathBuf::from("/w");

        let outcome = wait_for_structured_commit(
            &store,
            &git,
            "s1",
            &worktree,
            "a1",
            Duration::from_millis(500),
            Duration::from_millis(5),
        );
        assert_eq!(
            outcome,
            StructuredWait::Detected {
                commit_hash: "c3".to_string()
            }
        );
    }
}
