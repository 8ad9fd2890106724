//! Checkpoint commit message generation.
//!
//! Messages render through a minijinja template with `prefix`, `summary`,
//! and `sequence` in scope. Sessions may override the template; a broken
//! override must never block the commit, so rendering degrades to the plain
//! prefix + summary form.

use std::sync::LazyLock;

use minijinja::{Environment, context};
use regex::Regex;
use tracing::warn;

use crate::core::commit_mode::CommitModeSettings;

const DEFAULT_TEMPLATE: &str = include_str!("../templates/checkpoint_message.j2");

/// Generated summaries are capped to a conventional subject-line length.
const SUMMARY_MAX_CHARS: usize = 72;

/// Build the commit message for a checkpoint commit.
pub fn checkpoint_message(
    settings: &CommitModeSettings,
    prompt: Option<&str>,
    execution_sequence: u32,
) -> String {
    let summary = prompt
        .and_then(prompt_summary)
        .unwrap_or_else(|| format!("execution {execution_sequence}"));
    let template = settings.message_template.as_deref().unwrap_or(DEFAULT_TEMPLATE);

    match render_message(template, &settings.checkpoint_prefix, &summary, execution_sequence) {
        Ok(message) => message,
        Err(err) => {
            warn!(err = %err, "commit message template failed, using plain form");
            format!("{}{}", settings.checkpoint_prefix, summary)
        }
    }
}

fn render_message(
    template: &str,
    prefix: &str,
    summary: &str,
    sequence: u32,
) -> Result<String, minijinja::Error> {
    let env = Environment::new();
    let rendered = env.render_str(
        template,
        context! {
            prefix => prefix,
            summary => summary,
            sequence => sequence,
        },
    )?;
    Ok(rendered.trim_end().to_string())
}

/// Condense prompt text into a single-line summary.
///
/// Takes the first non-empty line, collapses runs of whitespace, and
/// truncates on a char boundary. Returns `None` for blank prompts.
fn prompt_summary(prompt: &str) -> Option<String> {
    static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

    let line = prompt.lines().find(|line| !line.trim().is_empty())?;
    let collapsed = WHITESPACE.replace_all(line.trim(), " ").to_string();
    Some(truncate_chars(&collapsed, SUMMARY_MAX_CHARS))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
