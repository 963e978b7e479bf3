//! Ensemble — parallel fan-out plus deterministic aggregation.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::RunContext;
use crate::error::RunError;
use crate::events::PatternEvent;
use crate::executor::{AgentConfig, AgentExecutor};
use crate::handle::{EventEmitter, RunHandle};

use super::{fan_out, request_from_input, AgentOutcome, PatternInput};

const PHASE: &str = "ensemble";

/// Deterministic strategy applied to the successful responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationStrategy {
    /// Pick the longest response text.
    LongestResponse,
    /// Plurality over normalized answers; ties break toward the
    /// earliest agent in input order.
    MajorityVote,
    /// Join every successful response with the separator.
    Concatenate { separator: String },
}

impl AggregationStrategy {
    /// Strategy name reported in the result.
    pub fn name(&self) -> &'static str {
        match self {
            AggregationStrategy::LongestResponse => "longest_response",
            AggregationStrategy::MajorityVote => "majority_vote",
            AggregationStrategy::Concatenate { .. } => "concatenate",
        }
    }
}

impl std::fmt::Display for AggregationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Result of an ensemble run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleResult {
    /// The aggregated answer; empty when every agent failed.
    pub final_answer: String,
    pub strategy: String,
    /// Per-agent outcomes in input order, failures included.
    pub responses: Vec<AgentOutcome>,
}

/// Fans out like `ParallelPattern`, then folds the successes into a
/// single answer.
pub struct EnsemblePattern {
    executors: Vec<AgentExecutor>,
    strategy: AggregationStrategy,
}

impl EnsemblePattern {
    pub fn new(agents: Vec<AgentConfig>, strategy: AggregationStrategy) -> Self {
        Self {
            executors: agents.into_iter().map(AgentExecutor::new).collect(),
            strategy,
        }
    }

    pub fn from_executors(executors: Vec<AgentExecutor>, strategy: AggregationStrategy) -> Self {
        Self {
            executors,
            strategy,
        }
    }

    pub fn run(
        &self,
        ctx: &RunContext,
        input: PatternInput,
    ) -> RunHandle<EnsembleResult, PatternEvent> {
        let executors = self.executors.clone();
        let strategy = self.strategy.clone();
        let ctx = ctx.child(PHASE);
        RunHandle::spawn(move |emitter| async move {
            drive(executors, strategy, ctx, input, emitter).await
        })
    }
}

async fn drive(
    executors: Vec<AgentExecutor>,
    strategy: AggregationStrategy,
    ctx: RunContext,
    input: PatternInput,
    emitter: EventEmitter<PatternEvent>,
) -> Result<EnsembleResult, RunError> {
    emitter.emit(PatternEvent::PhaseStart {
        phase: PHASE.to_string(),
        timestamp: chrono::Utc::now(),
    });

    let request = request_from_input(&input);
    let responses = fan_out(&executors, &ctx, &request, PHASE, &emitter).await;
    let final_answer = aggregate(&strategy, &responses);

    info!(
        strategy = %strategy,
        successes = responses.iter().filter(|outcome| outcome.success).count(),
        "ensemble aggregated"
    );
    emitter.emit(PatternEvent::PhaseEnd {
        phase: PHASE.to_string(),
        timestamp: chrono::Utc::now(),
    });
    Ok(EnsembleResult {
        final_answer,
        strategy: strategy.name().to_string(),
        responses,
    })
}

/// Apply the strategy to the successful responses, in input order.
fn aggregate(strategy: &AggregationStrategy, responses: &[AgentOutcome]) -> String {
    let texts: Vec<&str> = responses
        .iter()
        .filter(|outcome| outcome.success)
        .filter_map(|outcome| outcome.text())
        .collect();
    if texts.is_empty() {
        return String::new();
    }
    match strategy {
        AggregationStrategy::LongestResponse => longest(&texts),
        AggregationStrategy::MajorityVote => majority_vote(&texts),
        AggregationStrategy::Concatenate { separator } => texts.join(separator),
    }
}

fn longest(texts: &[&str]) -> String {
    let mut winner = "";
    for &text in texts {
        if text.len() > winner.len() {
            winner = text;
        }
    }
    winner.to_string()
}

/// Plurality over normalized answers. The winning group's first
/// original text is returned, so ties resolve toward input order.
fn majority_vote(texts: &[&str]) -> String {
    let mut groups: Vec<(String, usize, &str)> = Vec::new();
    for &text in texts {
        let normalized = normalize_answer(text);
        match groups.iter_mut().find(|(key, _, _)| *key == normalized) {
            Some(group) => group.1 += 1,
            None => groups.push((normalized, 1, text)),
        }
    }
    let mut winner = "";
    let mut winner_count = 0usize;
    for (_, count, original) in &groups {
        if *count > winner_count {
            winner = original;
            winner_count = *count;
        }
    }
    winner.to_string()
}

/// Collapse case and interior whitespace for vote grouping.
fn normalize_answer(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
