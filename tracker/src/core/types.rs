//! Shared contract types for execution tracking.
//!
//! These types define stable contracts between the tracker and its
//! collaborators (session store, git access, event listeners). They carry no
//! behavior beyond construction helpers and must stay serialization-stable.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::commit_mode::CommitMode;

/// In-memory tracking state for one active execution.
///
/// At most one context exists per session; a repeated start for the same
/// session replaces the previous context wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Session the execution belongs to.
    pub session_id: String,
    /// Worktree the agent operates in.
    pub worktree_path: PathBuf,
    /// Optional marker tying the execution to a prompt in the session log.
    pub prompt_marker_id: Option<i64>,
    /// Worktree HEAD captured when tracking started.
    pub before_commit_hash: String,
    /// Per-session monotonically increasing ordinal.
    pub execution_sequence: u32,
    /// Prompt text that drove the execution, when known.
    pub prompt: Option<String>,
}

/// Session record fields consulted when resolving the commit policy.
///
/// The full session entity lives in the host's store; only the commit
/// configuration surface is visible here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionRecord {
    /// Explicit commit mode (`structured`/`checkpoint`/`disabled`), if set.
    pub commit_mode: Option<String>,
    /// Serialized commit-mode settings JSON, if set.
    pub commit_mode_settings: Option<String>,
    /// Legacy auto-commit flag from before modes existed.
    pub auto_commit: Option<bool>,
}

/// Subtype of a system message written to the session output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSubtype {
    AutocommitError,
    AutocommitSuccess,
    AutocommitMode,
    AutocommitTimeout,
    AutocommitClaudeSuccess,
}

/// Structured system message appended to a session's output stream.
///
/// This is the user-visible trace of what the commit orchestration did;
/// every commit outcome surfaces as one of these rather than as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub subtype: OutputSubtype,
    pub timestamp: DateTime<Utc>,
    pub mode: CommitMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
}

impl OutputEvent {
    /// Build a `type: "system"` event with the given subtype and message.
    pub fn system(subtype: OutputSubtype, mode: CommitMode, message: impl Into<String>) -> Self {
        Self {
            event_type: "system".to_string(),
            subtype,
            timestamp: Utc::now(),
            mode,
            commit_hash: None,
            error: None,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_event_serializes_wire_subtypes() {
        let event = OutputEvent {
            commit_hash: Some("b2".to_string()),
            ..OutputEvent::system(
                OutputSubtype::AutocommitClaudeSuccess,
                CommitMode::Structured,
                "agent commit detected",
            )
        };

        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], "system");
        assert_eq!(value["subtype"], "autocommit_claude_success");
        assert_eq!(value["mode"], "structured");
        assert_eq!(value["commit_hash"], "b2");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn session_record_parses_camel_case_fields() {
        let raw = r#"{"commitMode":"checkpoint","autoCommit":true}"#;
        let record: SessionRecord = serde_json::from_str(raw).expect("parse");
        assert_eq!(record.commit_mode.as_deref(), Some("checkpoint"));
        assert_eq!(record.auto_commit, Some(true));
        assert_eq!(record.commit_mode_settings, None);
    }
}
