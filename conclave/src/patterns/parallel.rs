//! Parallel fan-out — the same prompt to every agent at once.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::RunContext;
use crate::error::RunError;
use crate::events::PatternEvent;
use crate::executor::{AgentConfig, AgentExecutor};
use crate::handle::{EventEmitter, RunHandle};

use super::{fan_out, request_from_input, AgentOutcome, PatternInput};

const PHASE: &str = "parallel";

/// Result of a parallel run: one outcome per agent, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelResult {
    pub responses: Vec<AgentOutcome>,
}

impl ParallelResult {
    pub fn successes(&self) -> impl Iterator<Item = &AgentOutcome> {
        self.responses.iter().filter(|outcome| outcome.success)
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }
}

/// Fans one prompt out to every configured agent concurrently.
///
/// Tolerant of partial failure: one agent's error never cancels the
/// others and never rejects the run.
pub struct ParallelPattern {
    executors: Vec<AgentExecutor>,
}

impl ParallelPattern {
    pub fn new(agents: Vec<AgentConfig>) -> Self {
        Self {
            executors: agents.into_iter().map(AgentExecutor::new).collect(),
        }
    }

    /// Build from pre-configured executors, e.g. with retry enabled.
    pub fn from_executors(executors: Vec<AgentExecutor>) -> Self {
        Self { executors }
    }

    pub fn agent_count(&self) -> usize {
        self.executors.len()
    }

    pub fn run(
        &self,
        ctx: &RunContext,
        input: PatternInput,
    ) -> RunHandle<ParallelResult, PatternEvent> {
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
) -> Result<ParallelResult, RunError> {
    emitter.emit(PatternEvent::PhaseStart {
        phase: PHASE.to_string(),
        timestamp: chrono::Utc::now(),
    });
    info!(agents = executors.len(), "parallel fan-out starting");

    let request = request_from_input(&input);
    let responses = fan_out(&executors, &ctx, &request, PHASE, &emitter).await;

    let successes = responses.iter().filter(|outcome| outcome.success).count();
    info!(
        agents = executors.len(),
        successes, "parallel fan-out complete"
    );
    emitter.emit(PatternEvent::PhaseEnd {
        phase: PHASE.to_string(),
        timestamp: chrono::Utc::now(),
    });
    Ok(ParallelResult { responses })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_count_filters_failures() {
        let result = ParallelResult {
            responses: vec![
                AgentOutcome {
                    agent_id: "a".into(),
                    success: true,
                    response: Some(crate::chat::ChatResponse::assistant("x")),
                    error: None,
                    duration_ms: 1,
                },
                AgentOutcome {
                    agent_id: "b".into(),
                    success: false,
                    response: None,
                    error: Some("down".into()),
                    duration_ms: 1,
                },
            ],
        };
        assert_eq!(result.success_count(), 1);
        assert_eq!(result.successes().next().unwrap().agent_id, "a");
    }
}
