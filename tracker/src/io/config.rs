//! Tracker configuration (TOML).
//!
//! Host processes may ship a config file; a missing file means defaults.
//! Per-session commit-mode settings can override the structured wait bound.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Tunables for commit orchestration and git subprocess calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Upper bound on waiting for a structured-mode agent commit.
    pub structured_wait_timeout_ms: u64,

    /// Poll interval while waiting for a structured-mode agent commit.
    pub structured_poll_interval_ms: u64,

    /// Hard wall-clock bound for a single git invocation.
    pub git_timeout_secs: u64,

    /// Truncate captured git output beyond this many bytes.
    pub git_output_limit_bytes: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            structured_wait_timeout_ms: 5_000,
            structured_poll_interval_ms: 200,
            git_timeout_secs: 60,
            git_output_limit_bytes: 1_000_000,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.structured_wait_timeout_ms == 0 {
            return Err(anyhow!("structured_wait_timeout_ms must be > 0"));
        }
        if self.structured_poll_interval_ms == 0 {
            return Err(anyhow!("structured_poll_interval_ms must be > 0"));
        }
        if self.git_timeout_secs == 0 {
            return Err(anyhow!("git_timeout_secs must be > 0"));
        }
        if self.git_output_limit_bytes == 0 {
            return Err(anyhow!("git_output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn structured_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.structured_wait_timeout_ms)
    }

    pub fn structured_poll_interval(&self) -> Duration {
        Duration::from_millis(self.structured_poll_interval_ms)
    }

    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `TrackerConfig::default()`.
pub fn load_config(path: &Path) -> Result<TrackerConfig> {
    if !path.exists() {
        let cfg = TrackerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: TrackerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &TrackerConfig) -> Result<()> {
    cfg.validate()?;
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
