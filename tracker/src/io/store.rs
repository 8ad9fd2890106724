//! Session store seam: sequences, configuration, output, diff records.
//!
//! The host application owns the real persistence layer. The tracker only
//! needs this narrow surface; [`crate::test_support::InMemoryStore`] covers
//! it for tests.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::diff::DiffStats;
use crate::core::types::{OutputEvent, SessionRecord};

/// Data for one diff record, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExecutionDiff {
    pub session_id: String,
    pub prompt_marker_id: Option<i64>,
    pub execution_sequence: u32,
    pub diff: String,
    pub changed_files: Vec<String>,
    pub stats: DiffStats,
    pub before_hash: String,
    pub after_hash: String,
}

/// Persisted execution diff. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDiffRecord {
    pub id: i64,
    pub session_id: String,
    pub prompt_marker_id: Option<i64>,
    pub execution_sequence: u32,
    pub diff: String,
    pub changed_files: Vec<String>,
    pub stats: DiffStats,
    pub before_hash: String,
    pub after_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Operations the tracker consumes from the session-management layer.
pub trait SessionStore {
    /// Allocate the next execution ordinal for the session (monotonic).
    fn next_execution_sequence(&self, session_id: &str) -> Result<u32>;

    /// Read the session's commit configuration surface.
    fn session(&self, session_id: &str) -> Result<SessionRecord>;

    /// Append a structured event to the session's output stream.
    fn append_output(&self, session_id: &str, event: &OutputEvent) -> Result<()>;

    /// Persist one execution diff; the store assigns the id.
    fn create_execution_diff(&self, data: NewExecutionDiff) -> Result<ExecutionDiffRecord>;

    /// All persisted diffs for a session, in creation order.
    fn execution_diffs(&self, session_id: &str) -> Result<Vec<ExecutionDiffRecord>>;
}
