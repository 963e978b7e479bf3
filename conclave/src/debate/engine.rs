//! Debate engine — drives the phase protocol over live model calls.
//!
//! Weak mode runs the initial phase only; strong mode runs initial,
//! rebuttal, and revised. When an orchestrator is configured a
//! consensus phase follows, and its summary feeds disagreement
//! extraction. Buffered and streaming entry points share this driver;
//! they differ only in whether token events are relayed.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chat::{ChatRequest, ToolDefinition};
use crate::context::RunContext;
use crate::debate::analysis::{analyze_position_changes, extract_disagreements};
use crate::debate::state::{
    DebateMetadata, DebateMode, DebatePhase, DebateResult, DebateRound,
};
use crate::error::RunError;
use crate::events::PatternEvent;
use crate::executor::{AgentConfig, AgentExecutor};
use crate::handle::{EventEmitter, RunHandle};
use crate::patterns::call_agent;

/// Instruction text wrapped around one phase's base prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseInstructions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append: Option<String>,
}

impl PhaseInstructions {
    fn apply(&self, base: &str) -> String {
        let mut prompt = String::new();
        if let Some(prepend) = &self.prepend {
            prompt.push_str(prepend);
            prompt.push_str("\n\n");
        }
        prompt.push_str(base);
        if let Some(append) = &self.append {
            prompt.push_str("\n\n");
            prompt.push_str(append);
        }
        prompt
    }
}

/// Tool augmentation for the rebuttal phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebuttalTools {
    /// Custom tools advertised to participants.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// Request provider-native web search.
    #[serde(default)]
    pub web_search: bool,
}

/// Configuration for a debate run.
#[derive(Clone)]
pub struct DebateConfig {
    pub mode: DebateMode,
    /// Per-phase instruction text.
    pub instructions: HashMap<DebatePhase, PhaseInstructions>,
    /// Tool augmentation applied to rebuttal requests.
    pub rebuttal_tools: Option<RebuttalTools>,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self::new(DebateMode::Weak)
    }
}

impl DebateConfig {
    pub fn new(mode: DebateMode) -> Self {
        Self {
            mode,
            instructions: HashMap::new(),
            rebuttal_tools: None,
        }
    }

    pub fn with_instructions(mut self, phase: DebatePhase, instructions: PhaseInstructions) -> Self {
        self.instructions.insert(phase, instructions);
        self
    }

    pub fn with_rebuttal_tools(mut self, tools: RebuttalTools) -> Self {
        self.rebuttal_tools = Some(tools);
        self
    }
}

/// Structured multi-phase debate across independent agents.
pub struct DebatePattern {
    participants: Vec<AgentExecutor>,
    orchestrator: Option<AgentExecutor>,
    config: DebateConfig,
}

impl DebatePattern {
    pub fn new(participants: Vec<AgentConfig>, config: DebateConfig) -> Self {
        Self {
            participants: participants.into_iter().map(AgentExecutor::new).collect(),
            orchestrator: None,
            config,
        }
    }

    pub fn from_executors(participants: Vec<AgentExecutor>, config: DebateConfig) -> Self {
        Self {
            participants,
            orchestrator: None,
            config,
        }
    }

    /// Configure an orchestrator; adds the consensus phase.
    pub fn with_orchestrator(mut self, orchestrator: AgentConfig) -> Self {
        self.orchestrator = Some(AgentExecutor::new(orchestrator));
        self
    }

    /// Rounds a completed run will contain: one per participant per
    /// phase, plus one consensus round when an orchestrator is set.
    pub fn expected_rounds(&self) -> usize {
        let phases = DebatePhase::participant_phases(self.config.mode).len();
        self.participants.len() * phases + usize::from(self.orchestrator.is_some())
    }

    /// Run the debate, buffering whole responses per round.
    pub fn run(&self, ctx: &RunContext, topic: impl Into<String>) -> RunHandle<DebateResult, PatternEvent> {
        self.launch(ctx, topic.into(), false)
    }

    /// Run the debate, additionally relaying per-token events. The
    /// transcript is identical to a buffered run of the same script.
    pub fn run_streaming(
        &self,
        ctx: &RunContext,
        topic: impl Into<String>,
    ) -> RunHandle<DebateResult, PatternEvent> {
        self.launch(ctx, topic.into(), true)
    }

    fn launch(&self, ctx: &RunContext, topic: String, streaming: bool) -> RunHandle<DebateResult, PatternEvent> {
        let engine = Engine {
            participants: self.participants.clone(),
            orchestrator: self.orchestrator.clone(),
            config: self.config.clone(),
            streaming,
        };
        let ctx = ctx.child("debate");
        RunHandle::spawn(move |emitter| async move { engine.drive(ctx, topic, emitter).await })
    }
}

struct Engine {
    participants: Vec<AgentExecutor>,
    orchestrator: Option<AgentExecutor>,
    config: DebateConfig,
    streaming: bool,
}

impl Engine {
    async fn drive(
        &self,
        ctx: RunContext,
        topic: String,
        emitter: EventEmitter<PatternEvent>,
    ) -> Result<DebateResult, RunError> {
        let started_at = Utc::now();
        info!(
            mode = %self.config.mode,
            participants = self.participants.len(),
            orchestrated = self.orchestrator.is_some(),
            "debate starting"
        );

        let mut rounds: Vec<DebateRound> = Vec::new();
        for phase in DebatePhase::participant_phases(self.config.mode) {
            self.run_phase(*phase, &ctx, &topic, &mut rounds, &emitter).await;
        }

        let consensus = match &self.orchestrator {
            Some(orchestrator) => {
                self.run_consensus(orchestrator, &ctx, &topic, &mut rounds, &emitter)
                    .await?
            }
            None => String::new(),
        };

        let position_changes = analyze_position_changes(&rounds);
        let unresolved_disagreements = extract_disagreements(&consensus);
        info!(
            rounds = rounds.len(),
            position_changes = position_changes.len(),
            disagreements = unresolved_disagreements.len(),
            "debate complete"
        );

        Ok(DebateResult {
            topic,
            mode: self.config.mode,
            rounds,
            consensus,
            position_changes,
            unresolved_disagreements,
            metadata: DebateMetadata {
                started_at,
                completed_at: Utc::now(),
                participant_count: self.participants.len(),
            },
        })
    }

    /// Visit every participant once, appending one round each. A failed
    /// call records an error round; the protocol keeps going.
    async fn run_phase(
        &self,
        phase: DebatePhase,
        ctx: &RunContext,
        topic: &str,
        rounds: &mut Vec<DebateRound>,
        emitter: &EventEmitter<PatternEvent>,
    ) {
        let phase_name = phase.to_string();
        emitter.emit(PatternEvent::PhaseStart {
            phase: phase_name.clone(),
            timestamp: Utc::now(),
        });

        for participant in &self.participants {
            let request = self.phase_request(phase, topic, participant.agent_id(), rounds);
            let (result, _) =
                call_agent(participant, ctx, request, &phase_name, emitter, self.streaming).await;
            let round = match result {
                Ok(run) => DebateRound {
                    phase,
                    speaker: participant.agent_id().to_string(),
                    content: run.output.message.content,
                    timestamp: Utc::now(),
                    tool_calls: run.output.tool_calls,
                },
                Err(error) => {
                    warn!(
                        speaker = %participant.agent_id(),
                        phase = %phase,
                        error = %error,
                        "debate round failed"
                    );
                    DebateRound {
                        phase,
                        speaker: participant.agent_id().to_string(),
                        content: format!("[no response: {}]", error),
                        timestamp: Utc::now(),
                        tool_calls: Vec::new(),
                    }
                }
            };
            rounds.push(round);
        }

        emitter.emit(PatternEvent::PhaseEnd {
            phase: phase_name,
            timestamp: Utc::now(),
        });
    }

    /// Orchestrator summary over the full transcript. Unlike participant
    /// rounds, a failure here rejects the whole debate.
    async fn run_consensus(
        &self,
        orchestrator: &AgentExecutor,
        ctx: &RunContext,
        topic: &str,
        rounds: &mut Vec<DebateRound>,
        emitter: &EventEmitter<PatternEvent>,
    ) -> Result<String, RunError> {
        let phase = DebatePhase::Consensus;
        let phase_name = phase.to_string();
        emitter.emit(PatternEvent::PhaseStart {
            phase: phase_name.clone(),
            timestamp: Utc::now(),
        });

        let request = self.phase_request(phase, topic, orchestrator.agent_id(), rounds);
        let (result, _) =
            call_agent(orchestrator, ctx, request, &phase_name, emitter, self.streaming).await;

        emitter.emit(PatternEvent::PhaseEnd {
            phase: phase_name,
            timestamp: Utc::now(),
        });

        let run = result.map_err(|error| RunError::JudgeFailed {
            source: Box::new(error),
        })?;
        rounds.push(DebateRound {
            phase,
            speaker: orchestrator.agent_id().to_string(),
            content: run.output.message.content.clone(),
            timestamp: Utc::now(),
            tool_calls: run.output.tool_calls,
        });
        Ok(run.output.message.content)
    }

    /// Build the request one speaker sees for a phase.
    fn phase_request(
        &self,
        phase: DebatePhase,
        topic: &str,
        speaker: &str,
        rounds: &[DebateRound],
    ) -> ChatRequest {
        let base = match phase {
            DebatePhase::Initial => initial_prompt(topic),
            DebatePhase::Rebuttal => rebuttal_prompt(topic, speaker, rounds),
            DebatePhase::Revised => revised_prompt(topic, rounds),
            DebatePhase::Consensus => consensus_prompt(topic, rounds),
        };
        let prompt = match self.config.instructions.get(&phase) {
            Some(instructions) => instructions.apply(&base),
            None => base,
        };
        let mut request = ChatRequest::from_prompt(prompt);
        if phase == DebatePhase::Rebuttal {
            if let Some(augment) = &self.config.rebuttal_tools {
                if !augment.tools.is_empty() {
                    request = request.with_tools(augment.tools.clone());
                }
                if augment.web_search {
                    request = request.with_web_search(true);
                }
            }
        }
        request
    }
}

// ── Phase prompts ────────────────────────────────────────────────────

fn initial_prompt(topic: &str) -> String {
    format!(
        "The topic under debate is:\n\n{}\n\nState your opening position with supporting reasoning.",
        topic
    )
}

fn rebuttal_prompt(topic: &str, speaker: &str, rounds: &[DebateRound]) -> String {
    let mut prompt = format!(
        "The topic under debate is:\n\n{}\n\nOpening positions from the other participants:\n\n",
        topic
    );
    for round in rounds
        .iter()
        .filter(|r| r.phase == DebatePhase::Initial && r.speaker != speaker)
    {
        prompt.push_str(&format!("{} said:\n{}\n\n", round.speaker, round.content));
    }
    prompt.push_str(
        "Critique these positions. Point out weaknesses, missing evidence, and flawed reasoning.",
    );
    prompt
}

fn revised_prompt(topic: &str, rounds: &[DebateRound]) -> String {
    format!(
        "The topic under debate is:\n\n{}\n\nFull transcript so far:\n\n{}Revise or defend your position in light of the discussion. \
         If you changed your mind, say so explicitly.",
        topic,
        format_transcript(rounds)
    )
}

fn consensus_prompt(topic: &str, rounds: &[DebateRound]) -> String {
    format!(
        "The topic under debate was:\n\n{}\n\nFull transcript:\n\n{}Summarize the debate: the points of agreement, any unresolved \
         disagreements as a bulleted list, and a final recommendation.",
        topic,
        format_transcript(rounds)
    )
}

fn format_transcript(rounds: &[DebateRound]) -> String {
    let mut transcript = String::new();
    for round in rounds {
        transcript.push_str(&format!(
            "[{}] {}:\n{}\n\n",
            round.phase, round.speaker, round.content
        ));
    }
    transcript
}
