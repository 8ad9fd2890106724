//! Commit policy resolution from persisted session configuration.
//!
//! Sessions store their commit policy as an explicit mode plus an optional
//! serialized settings blob, with a legacy boolean from before modes existed.
//! Resolution happens fresh on every execution end and must never fail:
//! missing or corrupt configuration degrades to the checkpoint default.

use anyhow::{Result, anyhow};
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::types::SessionRecord;

const SETTINGS_SCHEMA: &str = include_str!("../../schemas/commit_mode_settings.schema.json");

/// Default prefix for generated checkpoint commit messages.
pub const DEFAULT_CHECKPOINT_PREFIX: &str = "checkpoint: ";

/// Commit policy applied after each tracked execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    /// The agent is expected to create its own commit; the tracker observes.
    Structured,
    /// The tracker commits all pending changes itself.
    Checkpoint,
    /// No automatic commit.
    Disabled,
}

impl CommitMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "structured" => Some(Self::Structured),
            "checkpoint" => Some(Self::Checkpoint),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Checkpoint => "checkpoint",
            Self::Disabled => "disabled",
        }
    }
}

/// Effective commit policy and its mode-specific settings.
///
/// Stored as camelCase JSON in the session record; unknown keys are ignored
/// so older and newer payload shapes both parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CommitModeSettings {
    pub mode: CommitMode,
    /// Prefix for generated checkpoint commit messages.
    pub checkpoint_prefix: String,
    /// Optional minijinja template overriding the default commit message.
    pub message_template: Option<String>,
    /// Structured mode: how long to wait for the agent's own commit.
    pub structured_wait_timeout_ms: Option<u64>,
}

impl Default for CommitModeSettings {
    fn default() -> Self {
        Self {
            mode: CommitMode::Checkpoint,
            checkpoint_prefix: DEFAULT_CHECKPOINT_PREFIX.to_string(),
            message_template: None,
            structured_wait_timeout_ms: None,
        }
    }
}

/// Derive the effective commit policy for a session.
///
/// Precedence: explicit `commit_mode` (with settings merged over defaults,
/// the mode forced to the explicit value) > legacy `auto_commit` flag >
/// checkpoint default. Infallible: corrupt configuration is logged and
/// replaced with defaults.
pub fn resolve_commit_mode(session: &SessionRecord) -> CommitModeSettings {
    if let Some(raw_mode) = session.commit_mode.as_deref() {
        let Some(mode) = CommitMode::parse(raw_mode) else {
            warn!(raw_mode, "unknown commit mode on session, using checkpoint defaults");
            return CommitModeSettings::default();
        };
        let mut settings = match session.commit_mode_settings.as_deref() {
            Some(raw) => parse_settings(raw),
            None => CommitModeSettings::default(),
        };
        // The explicit mode field wins over whatever the settings blob says.
        settings.mode = mode;
        return settings;
    }

    if let Some(auto_commit) = session.auto_commit {
        debug!(auto_commit, "using legacy auto-commit flag");
        let mode = if auto_commit {
            CommitMode::Checkpoint
        } else {
            CommitMode::Disabled
        };
        return CommitModeSettings {
            mode,
            ..CommitModeSettings::default()
        };
    }

    CommitModeSettings::default()
}

fn parse_settings(raw: &str) -> CommitModeSettings {
    match try_parse_settings(raw) {
        Ok(settings) => settings,
        Err(err) => {
            warn!(err = %err, "malformed commit mode settings, using defaults");
            CommitModeSettings::default()
        }
    }
}

fn try_parse_settings(raw: &str) -> Result<CommitModeSettings> {
    let value: Value = serde_json::from_str(raw)?;
    validate_schema(&value)?;
    Ok(serde_json::from_value(value)?)
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(SETTINGS_SCHEMA)?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {err}"))?;
    let messages: Vec<String> = compiled.iter_errors(value).map(|e| e.to_string()).collect();
    if !messages.is_empty() {
        return Err(anyhow!(
            "settings schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
