//! Test-only fixtures: throwaway git repositories, an in-memory session
//! store, and a recording event sink.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tempfile::TempDir;

use crate::core::types::{OutputEvent, SessionRecord};
use crate::events::{EventSink, ExecutionEvent};
use crate::io::store::{ExecutionDiffRecord, NewExecutionDiff, SessionStore};

/// Temporary git repository with one initial commit.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let repo = Self { dir };
        repo.git(&["init"])?;
        repo.git(&["config", "user.email", "test@example.com"])?;
        repo.git(&["config", "user.name", "test"])?;
        repo.write_file("README.md", "seed\n")?;
        repo.git(&["add", "README.md"])?;
        repo.git(&["commit", "-m", "chore: init"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    /// Stage everything, commit, and return the new HEAD hash.
    pub fn commit_all(&self, message: &str) -> Result<String> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-m", message])?;
        self.head_hash()
    }

    pub fn head_hash(&self) -> Result<String> {
        Ok(self.git(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    /// Subject line of the HEAD commit.
    pub fn head_subject(&self) -> Result<String> {
        Ok(self.git(&["log", "-1", "--format=%s"])?.trim().to_string())
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[derive(Default)]
struct StoreInner {
    sequences: HashMap<String, u32>,
    sessions: HashMap<String, SessionRecord>,
    outputs: HashMap<String, Vec<OutputEvent>>,
    diffs: Vec<ExecutionDiffRecord>,
    next_diff_id: i64,
}

/// Mutex-protected [`SessionStore`] for tests.
///
/// Unknown sessions read back as unconfigured records (commit mode resolves
/// to its default) rather than failing.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_session(&self, session_id: &str, record: SessionRecord) {
        self.inner
            .lock()
            .expect("store lock")
            .sessions
            .insert(session_id.to_string(), record);
    }

    /// Output events appended for a session, in order.
    pub fn outputs(&self, session_id: &str) -> Vec<OutputEvent> {
        self.inner
            .lock()
            .expect("store lock")
            .outputs
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl SessionStore for InMemoryStore {
    fn next_execution_sequence(&self, session_id: &str) -> Result<u32> {
        let mut inner = self.inner.lock().expect("store lock");
        let next = inner
            .sequences
            .entry(session_id.to_string())
            .and_modify(|seq| *seq += 1)
            .or_insert(1);
        Ok(*next)
    }

    fn session(&self, session_id: &str) -> Result<SessionRecord> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.sessions.get(session_id).cloned().unwrap_or_default())
    }

    fn append_output(&self, session_id: &str, event: &OutputEvent) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock");
        inner
            .outputs
            .entry(session_id.to_string())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    fn create_execution_diff(&self, data: NewExecutionDiff) -> Result<ExecutionDiffRecord> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.next_diff_id += 1;
        let record = ExecutionDiffRecord {
            id: inner.next_diff_id,
            session_id: data.session_id,
            prompt_marker_id: data.prompt_marker_id,
            execution_sequence: data.execution_sequence,
            diff: data.diff,
            changed_files: data.changed_files,
            stats: data.stats,
            before_hash: data.before_hash,
            after_hash: data.after_hash,
            created_at: Utc::now(),
        };
        inner.diffs.push(record.clone());
        Ok(record)
    }

    fn execution_diffs(&self, session_id: &str) -> Result<Vec<ExecutionDiffRecord>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .diffs
            .iter()
            .filter(|record| record.session_id == session_id)
            .cloned()
            .collect())
    }
}

/// Event sink that records everything it sees.
#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().expect("sink lock").clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &ExecutionEvent) {
        self.events.lock().expect("sink lock").push(event.clone());
    }
}
