//! Lifecycle event notification for external listeners.
//!
//! Listeners register an [`EventSink`] explicitly rather than attaching to a
//! global emitter. Sinks must not block: event delivery happens inline on the
//! tracking path, so a slow consumer should buffer (see the bounded-channel
//! adapter below).

use std::sync::mpsc::SyncSender;

use serde::Serialize;
use tracing::warn;

use crate::core::diff::DiffStats;

/// Execution lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ExecutionEvent {
    ExecutionStarted {
        session_id: String,
        execution_sequence: u32,
    },
    ExecutionCompleted {
        session_id: String,
        execution_sequence: u32,
        diff_id: i64,
        stats: DiffStats,
    },
    ExecutionCancelled {
        session_id: String,
        execution_sequence: u32,
    },
}

/// Observer interface for lifecycle events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ExecutionEvent);
}

/// Bounded-channel adapter: events are delivered with a non-blocking send and
/// dropped (with a warning) when the consumer falls behind, so tracking never
/// stalls on a listener.
impl EventSink for SyncSender<ExecutionEvent> {
    fn emit(&self, event: &ExecutionEvent) {
        if let Err(err) = self.try_send(event.clone()) {
            warn!(err = %err, "dropping lifecycle event, listener channel unavailable");
        }
    }
}
