//! Multi-agent orchestration patterns built on the agent executor.
//!
//! Every pattern takes agent configurations plus a shared input and
//! returns a `RunHandle<_, PatternEvent>`: phase brackets, agent
//! brackets, and relayed tokens on the stream, an aggregate result on
//! the handle. Agents run under child contexts of one shared run
//! context, so cancellation and budget ceilings apply to the whole
//! pattern at once.

pub mod crosscheck;
pub mod ensemble;
pub mod parallel;
pub mod sequential;

pub use crosscheck::{agreement_score, CrossCheckPattern, CrossCheckResult};
pub use ensemble::{AggregationStrategy, EnsemblePattern, EnsembleResult};
pub use parallel::{ParallelPattern, ParallelResult};
pub use sequential::{SequentialPattern, SequentialResult};

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::chat::{ChatMessage, ChatRequest, ChatResponse};
use crate::context::RunContext;
use crate::error::RunError;
use crate::events::{PatternEvent, RunEvent};
use crate::executor::{AgentExecutor, AgentRunOutput};
use crate::handle::EventEmitter;

/// Input shared by every pattern run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternInput {
    /// The prompt every agent answers.
    pub prompt: String,
    /// Optional background, prepended as an earlier user turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl PatternInput {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// One agent's result inside a pattern, at its input-order position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub agent_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ChatResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl AgentOutcome {
    /// The response text, when the call succeeded.
    pub fn text(&self) -> Option<&str> {
        self.response.as_ref().map(|response| response.text())
    }
}

// ── Shared plumbing ──────────────────────────────────────────────────

/// Build the transcript a pattern hands to each agent.
pub(crate) fn request_from_input(input: &PatternInput) -> ChatRequest {
    let mut messages = Vec::new();
    if let Some(context) = &input.context {
        messages.push(ChatMessage::user(context.clone()));
    }
    messages.push(ChatMessage::user(input.prompt.clone()));
    ChatRequest::new(messages)
}

/// One bracketed executor call: `AgentStart`, optional token relay,
/// `AgentEnd`. Returns the typed result plus the measured duration.
pub(crate) async fn call_agent(
    executor: &AgentExecutor,
    ctx: &RunContext,
    request: ChatRequest,
    phase: &str,
    emitter: &EventEmitter<PatternEvent>,
    relay_tokens: bool,
) -> (Result<AgentRunOutput, RunError>, u64) {
    let agent_id = executor.agent_id().to_string();
    emitter.emit(PatternEvent::AgentStart {
        phase: phase.to_string(),
        agent_id: agent_id.clone(),
        timestamp: Utc::now(),
    });

    let child = ctx.child(executor.agent_id());
    let started = Instant::now();
    let handle = executor.run(&child, request);
    let (mut stream, pending) = handle.split();

    let relay = async {
        while let Some(event) = stream.next().await {
            if relay_tokens {
                if let RunEvent::Token { text } = event {
                    emitter.emit(PatternEvent::Token {
                        agent_id: agent_id.clone(),
                        text,
                    });
                }
            }
        }
    };
    let (result, _) = tokio::join!(pending.wait(), relay);
    let duration_ms = started.elapsed().as_millis() as u64;

    if let Err(error) = &result {
        emitter.emit(PatternEvent::Error {
            agent_id: Some(agent_id.clone()),
            message: error.to_string(),
        });
    }
    emitter.emit(PatternEvent::AgentEnd {
        phase: phase.to_string(),
        agent_id,
        success: result.is_ok(),
        timestamp: Utc::now(),
    });

    (result, duration_ms)
}

/// `call_agent` flattened into an outcome record.
pub(crate) async fn run_agent(
    executor: &AgentExecutor,
    ctx: &RunContext,
    request: ChatRequest,
    phase: &str,
    emitter: &EventEmitter<PatternEvent>,
) -> AgentOutcome {
    let agent_id = executor.agent_id().to_string();
    let (result, duration_ms) = call_agent(executor, ctx, request, phase, emitter, true).await;
    match result {
        Ok(run) => AgentOutcome {
            agent_id,
            success: true,
            response: Some(run.output),
            error: None,
            duration_ms,
        },
        Err(error) => AgentOutcome {
            agent_id,
            success: false,
            response: None,
            error: Some(error.to_string()),
            duration_ms,
        },
    }
}

/// Run every executor once, concurrently. Outcomes keep input order
/// regardless of completion order.
pub(crate) async fn fan_out(
    executors: &[AgentExecutor],
    ctx: &RunContext,
    request: &ChatRequest,
    phase: &str,
    emitter: &EventEmitter<PatternEvent>,
) -> Vec<AgentOutcome> {
    let calls = executors
        .iter()
        .map(|executor| run_agent(executor, ctx, request.clone(), phase, emitter));
    join_all(calls).await
}
