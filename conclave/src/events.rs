//! Event unions flowing through run handles.
//!
//! `RunEvent` is the per-model-call stream; `PatternEvent` is the
//! orchestration-level stream with phase and agent brackets. Both end
//! with exactly one `Done`, and an `Error` may precede `Done` but never
//! follows it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, ToolCall, Usage};
use crate::trace::TraceEvent;

/// Stream unions that can synthesize their own terminal events.
///
/// `RunHandle::spawn` appends `done()` after the driver returns, and
/// `error()` before it when the driver failed.
pub trait TerminalEvent: Sized {
    fn error(message: String) -> Self;
    fn done() -> Self;
}

/// Events produced by a single model invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// Incremental output text, in generation order.
    Token { text: String },
    /// The full accumulated assistant message.
    Message { message: ChatMessage },
    /// The model requested a tool invocation.
    ToolCall { call: ToolCall },
    /// Output of an executed tool, keyed by call id.
    ToolResult { id: String, output: String },
    /// Token accounting for the call.
    Usage { usage: Usage },
    /// A trace record forwarded through the stream.
    Trace { event: TraceEvent },
    /// The run failed. `Done` still follows.
    Error { message: String },
    /// Terminal event; exactly one per stream.
    Done,
}

impl RunEvent {
    /// Snake_case event type tag, matching the serialized form.
    pub fn event_type(&self) -> &'static str {
        match self {
            RunEvent::Token { .. } => "token",
            RunEvent::Message { .. } => "message",
            RunEvent::ToolCall { .. } => "tool_call",
            RunEvent::ToolResult { .. } => "tool_result",
            RunEvent::Usage { .. } => "usage",
            RunEvent::Trace { .. } => "trace",
            RunEvent::Error { .. } => "error",
            RunEvent::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Done)
    }
}

impl TerminalEvent for RunEvent {
    fn error(message: String) -> Self {
        RunEvent::Error { message }
    }

    fn done() -> Self {
        RunEvent::Done
    }
}

/// Events produced by an orchestration pattern run.
///
/// `PhaseStart`/`PhaseEnd` bracket protocol phases and `AgentStart`/
/// `AgentEnd` bracket individual agent calls within them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternEvent {
    PhaseStart {
        phase: String,
        timestamp: DateTime<Utc>,
    },
    PhaseEnd {
        phase: String,
        timestamp: DateTime<Utc>,
    },
    AgentStart {
        phase: String,
        agent_id: String,
        timestamp: DateTime<Utc>,
    },
    AgentEnd {
        phase: String,
        agent_id: String,
        success: bool,
        timestamp: DateTime<Utc>,
    },
    /// A token relayed from one agent's model stream.
    Token { agent_id: String, text: String },
    /// A failure; `agent_id` is absent when the whole run failed.
    Error {
        agent_id: Option<String>,
        message: String,
    },
    /// Terminal event; exactly one per stream.
    Done,
}

impl PatternEvent {
    /// Snake_case event type tag, matching the serialized form.
    pub fn event_type(&self) -> &'static str {
        match self {
            PatternEvent::PhaseStart { .. } => "phase_start",
            PatternEvent::PhaseEnd { .. } => "phase_end",
            PatternEvent::AgentStart { .. } => "agent_start",
            PatternEvent::AgentEnd { .. } => "agent_end",
            PatternEvent::Token { .. } => "token",
            PatternEvent::Error { .. } => "error",
            PatternEvent::Done => "done",
        }
    }

    /// The agent this event belongs to, if it is agent-scoped.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            PatternEvent::AgentStart { agent_id, .. }
            | PatternEvent::AgentEnd { agent_id, .. }
            | PatternEvent::Token { agent_id, .. } => Some(agent_id),
            PatternEvent::Error { agent_id, .. } => agent_id.as_deref(),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PatternEvent::Done)
    }
}

impl TerminalEvent for PatternEvent {
    fn error(message: String) -> Self {
        PatternEvent::Error {
            agent_id: None,
            message,
        }
    }

    fn done() -> Self {
        PatternEvent::Done
    }
}
