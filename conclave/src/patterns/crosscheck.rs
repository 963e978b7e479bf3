//! Cross-check — fan-out, an independent judge, and an agreement score.

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chat::ChatRequest;
use crate::context::RunContext;
use crate::error::RunError;
use crate::events::PatternEvent;
use crate::executor::{AgentConfig, AgentExecutor};
use crate::handle::{EventEmitter, RunHandle};

use super::{call_agent, fan_out, request_from_input, AgentOutcome, PatternInput};

const PHASE: &str = "crosscheck";
const JUDGE_PHASE: &str = "judge";

/// Default judge prompt. `{prompt}` and `{responses}` are substituted.
const DEFAULT_JUDGE_TEMPLATE: &str = "\
You are an impartial judge. Several agents independently answered the same question.

Question:
{prompt}

{responses}

Compare the answers, note where they disagree, and produce the single best final answer.";

/// Result of a cross-check run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossCheckResult {
    /// The judge's verdict text.
    pub final_answer: String,
    /// Fan-out outcomes in input order, failures included.
    pub agent_responses: Vec<AgentOutcome>,
    /// Mean pairwise lexical overlap of the successful responses,
    /// always in (0, 1].
    pub agreement: f64,
    pub total_duration_ms: u64,
}

/// Fans a prompt out, scores how much the responses agree, then asks a
/// judge model for a verdict over all of them.
///
/// Rejects when nothing is judgeable (`NoUsableResponses`) or when the
/// judge call itself fails (`JudgeFailed`).
pub struct CrossCheckPattern {
    executors: Vec<AgentExecutor>,
    judge: AgentExecutor,
    judge_template: String,
}

impl CrossCheckPattern {
    pub fn new(agents: Vec<AgentConfig>, judge: AgentConfig) -> Self {
        Self {
            executors: agents.into_iter().map(AgentExecutor::new).collect(),
            judge: AgentExecutor::new(judge),
            judge_template: DEFAULT_JUDGE_TEMPLATE.to_string(),
        }
    }

    pub fn from_executors(executors: Vec<AgentExecutor>, judge: AgentExecutor) -> Self {
        Self {
            executors,
            judge,
            judge_template: DEFAULT_JUDGE_TEMPLATE.to_string(),
        }
    }

    /// Replace the judge prompt template. `{prompt}` and `{responses}`
    /// are substituted at run time.
    pub fn with_judge_template(mut self, template: impl Into<String>) -> Self {
        self.judge_template = template.into();
        self
    }

    pub fn run(
        &self,
        ctx: &RunContext,
        input: PatternInput,
    ) -> RunHandle<CrossCheckResult, PatternEvent> {
        let executors = self.executors.clone();
        let judge = self.judge.clone();
        let template = self.judge_template.clone();
        let ctx = ctx.child(PHASE);
        RunHandle::spawn(move |emitter| async move {
            drive(executors, judge, template, ctx, input, emitter).await
        })
    }
}

async fn drive(
    executors: Vec<AgentExecutor>,
    judge: AgentExecutor,
    template: String,
    ctx: RunContext,
    input: PatternInput,
    emitter: EventEmitter<PatternEvent>,
) -> Result<CrossCheckResult, RunError> {
    let started = Instant::now();
    emitter.emit(PatternEvent::PhaseStart {
        phase: PHASE.to_string(),
        timestamp: chrono::Utc::now(),
    });

    let request = request_from_input(&input);
    let agent_responses = fan_out(&executors, &ctx, &request, PHASE, &emitter).await;

    let texts: Vec<&str> = agent_responses
        .iter()
        .filter(|outcome| outcome.success)
        .filter_map(|outcome| outcome.text())
        .collect();
    if texts.is_empty() {
        emitter.emit(PatternEvent::PhaseEnd {
            phase: PHASE.to_string(),
            timestamp: chrono::Utc::now(),
        });
        return Err(RunError::NoUsableResponses);
    }
    let agreement = agreement_score(&texts);
    info!(
        responses = texts.len(),
        agreement, "cross-check fan-out scored"
    );

    let judge_prompt = build_judge_prompt(&template, &input.prompt, &agent_responses);
    let (judge_result, _) = call_agent(
        &judge,
        &ctx,
        ChatRequest::from_prompt(judge_prompt),
        JUDGE_PHASE,
        &emitter,
        true,
    )
    .await;

    emitter.emit(PatternEvent::PhaseEnd {
        phase: PHASE.to_string(),
        timestamp: chrono::Utc::now(),
    });

    let judge_run = judge_result.map_err(|error| RunError::JudgeFailed {
        source: Box::new(error),
    })?;
    Ok(CrossCheckResult {
        final_answer: judge_run.output.message.content,
        agent_responses,
        agreement,
        total_duration_ms: started.elapsed().as_millis() as u64,
    })
}

/// Substitute the question and the response block into the template.
fn build_judge_prompt(template: &str, prompt: &str, outcomes: &[AgentOutcome]) -> String {
    let mut responses = String::new();
    for outcome in outcomes.iter().filter(|outcome| outcome.success) {
        if let Some(text) = outcome.text() {
            responses.push_str(&format!("Response from {}:\n{}\n\n", outcome.agent_id, text));
        }
    }
    template
        .replace("{prompt}", prompt)
        .replace("{responses}", responses.trim_end())
}

/// Mean pairwise token-set overlap across the texts.
///
/// Each pair scores `(2 * shared + 1) / (len_a + len_b + 1)`, so the
/// score stays in (0, 1] even for disjoint or empty texts. Fewer than
/// two texts score 1.0.
pub fn agreement_score(texts: &[&str]) -> f64 {
    if texts.len() < 2 {
        return 1.0;
    }
    let sets: Vec<HashSet<String>> = texts.iter().map(|text| token_set(text)).collect();
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            total += pair_overlap(&sets[i], &sets[j]);
            pairs += 1;
        }
    }
    total / pairs as f64
}

fn pair_overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let shared = a.intersection(b).count();
    (2.0 * shared as f64 + 1.0) / ((a.len() + b.len()) as f64 + 1.0)
}

/// Lowercased alphanumeric tokens.
fn token_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}
