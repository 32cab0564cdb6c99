//! Structured operational events.
//!
//! The core emits language-agnostic event records through the [`EventSink`]
//! collaborator. Formatting, translation, and file output are owned by sink
//! implementations, not by this crate. Recording is best-effort: a sink must
//! never influence the outcome of the operation that produced the event.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Kind of operational event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A query or write completed successfully.
    QuerySuccess,
    /// A query or write failed.
    QueryFailure,
    /// A session switched to another database.
    DatabaseSwitch,
    /// A script file run started.
    ScriptFileStart,
    /// A script file run finished (successfully or not).
    ScriptFileEnd,
}

/// A single structured event record.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub kind: EventKind,
    /// Free-form structured context (sql text, file name, timing).
    pub context: JsonValue,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Create an event timestamped now.
    pub fn now(kind: EventKind, context: JsonValue) -> Self {
        Self {
            kind,
            context,
            timestamp: Utc::now(),
        }
    }
}

/// Receiver for operational events.
///
/// Called synchronously from the executing task; implementations should
/// return quickly and must not panic. The core tolerates a no-op sink.
pub trait EventSink: Send + Sync {
    fn record(&self, event: &Event);
}

/// Sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn record(&self, _event: &Event) {}
}

/// Sink that forwards events to the `tracing` subscriber with structured
/// fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: &Event) {
        match event.kind {
            EventKind::QueryFailure => {
                tracing::warn!(kind = ?event.kind, context = %event.context, "database event");
            }
            _ => {
                tracing::info!(kind = ?event.kind, context = %event.context, "database event");
            }
        }
    }
}

/// Shared event sink handle.
pub type SharedSink = Arc<dyn EventSink>;
