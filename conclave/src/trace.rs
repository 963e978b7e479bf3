//! Trace spans and sinks for run observability.
//!
//! Every root context mints a trace id; every child derives a span
//! parented to its caller's span. Sinks receive `run_start`/`run_end`
//! records around each executor call.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier pair locating one run inside a trace tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanInfo {
    /// Shared by every span under one root context.
    pub trace_id: String,
    pub span_id: String,
    /// Absent at the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
}

impl SpanInfo {
    /// Fresh trace identity for a root context.
    pub fn root() -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            span_id: uuid::Uuid::new_v4().to_string(),
            parent_span_id: None,
        }
    }

    /// Derive a span parented to this one, same trace id.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: uuid::Uuid::new_v4().to_string(),
            parent_span_id: Some(self.span_id.clone()),
        }
    }
}

/// How a traced run finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanOutcome {
    Success,
    Failure,
}

impl std::fmt::Display for SpanOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpanOutcome::Success => write!(f, "success"),
            SpanOutcome::Failure => write!(f, "failure"),
        }
    }
}

/// A single trace record emitted around a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    /// Emitted before the model is invoked.
    RunStart {
        trace_id: String,
        span_id: String,
        name: String,
        timestamp: DateTime<Utc>,
    },
    /// Emitted after the run settles, success or failure.
    RunEnd {
        trace_id: String,
        span_id: String,
        name: String,
        outcome: SpanOutcome,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl TraceEvent {
    pub fn span_id(&self) -> &str {
        match self {
            TraceEvent::RunStart { span_id, .. } | TraceEvent::RunEnd { span_id, .. } => span_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TraceEvent::RunStart { name, .. } | TraceEvent::RunEnd { name, .. } => name,
        }
    }

    /// Snake_case event type tag, matching the serialized form.
    pub fn event_type(&self) -> &'static str {
        match self {
            TraceEvent::RunStart { .. } => "run_start",
            TraceEvent::RunEnd { .. } => "run_end",
        }
    }
}

/// Destination for trace events.
pub trait TraceSink: Send + Sync {
    fn log(&self, event: &TraceEvent);
}

/// Sink that drops every event. Default for contexts built without tracing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTraceSink;

impl TraceSink for NoopTraceSink {
    fn log(&self, _event: &TraceEvent) {}
}

/// Sink that buffers events in memory, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemoryTraceSink {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything logged so far, in log order.
    pub fn snapshot(&self) -> Vec<TraceEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl TraceSink for MemoryTraceSink {
    fn log(&self, event: &TraceEvent) {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.clone());
    }
}
