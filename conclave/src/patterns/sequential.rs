//! Sequential pipeline — agents in order over a growing conversation.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chat::{ChatMessage, ChatRequest};
use crate::context::RunContext;
use crate::error::RunError;
use crate::events::PatternEvent;
use crate::executor::{AgentConfig, AgentExecutor};
use crate::handle::{EventEmitter, RunHandle};

use super::{request_from_input, run_agent, AgentOutcome, PatternInput};

const PHASE: &str = "sequential";

/// Result of a sequential run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequentialResult {
    /// Per-step outcomes in pipeline order, failures included.
    pub steps: Vec<AgentOutcome>,
    /// Text of the last successful step, if any step succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<String>,
}

/// Runs agents one after another; each sees the prior successful
/// outputs as assistant turns labeled with the producing agent's id.
///
/// A failed step is recorded and skipped: the conversation passed to
/// the next agent is unchanged, and the pipeline never aborts early.
pub struct SequentialPattern {
    executors: Vec<AgentExecutor>,
}

impl SequentialPattern {
    pub fn new(agents: Vec<AgentConfig>) -> Self {
        Self {
            executors: agents.into_iter().map(AgentExecutor::new).collect(),
        }
    }

    pub fn from_executors(executors: Vec<AgentExecutor>) -> Self {
        Self { executors }
    }

    pub fn run(
        &self,
        ctx: &RunContext,
        input: PatternInput,
    ) -> RunHandle<SequentialResult, PatternEvent> {
        let executors = self.executors.clone();
        let ctx = ctx.child(PHASE);
        RunHandle::spawn(move |emitter| async move {
            drive(executors, ctx, input, emitter).await
        })
    }
}

async fn drive(
    executors: Vec<AgentExecutor>,
    ctx: RunContext,
    input: PatternInput,
    emitter: EventEmitter<PatternEvent>,
) -> Result<SequentialResult, RunError> {
    emitter.emit(PatternEvent::PhaseStart {
        phase: PHASE.to_string(),
        timestamp: chrono::Utc::now(),
    });
    info!(agents = executors.len(), "sequential pipeline starting");

    let mut conversation = request_from_input(&input).messages;
    let mut steps = Vec::with_capacity(executors.len());
    let mut final_output: Option<String> = None;

    for executor in &executors {
        let request = ChatRequest::new(conversation.clone());
        let outcome = run_agent(executor, &ctx, request, PHASE, &emitter).await;
        if outcome.success {
            if let Some(text) = outcome.text() {
                conversation
                    .push(ChatMessage::assistant(text).with_name(executor.agent_id()));
                final_output = Some(text.to_string());
            }
        } else {
            warn!(
                agent_id = %outcome.agent_id,
                "pipeline step failed, conversation unchanged"
            );
        }
        steps.push(outcome);
    }

    emitter.emit(PatternEvent::PhaseEnd {
        phase: PHASE.to_string(),
        timestamp: chrono::Utc::now(),
    });
    Ok(SequentialResult {
        steps,
        final_output,
    })
}
