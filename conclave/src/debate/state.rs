//! Debate protocol state — modes, phases, rounds, and the result record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::ToolCall;

/// Protocol depth for a debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateMode {
    /// Opening positions only.
    Weak,
    /// Opening positions, rebuttals, then revisions.
    Strong,
}

impl std::fmt::Display for DebateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DebateMode::Weak => write!(f, "weak"),
            DebateMode::Strong => write!(f, "strong"),
        }
    }
}

/// Phase of the debate protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Each participant states an opening position.
    Initial,
    /// Each participant critiques the other openings.
    Rebuttal,
    /// Each participant revises or defends its position.
    Revised,
    /// The orchestrator summarizes the transcript.
    Consensus,
}

impl DebatePhase {
    /// Participant-visiting phases for a mode, in protocol order.
    /// The consensus phase is appended separately when an orchestrator
    /// is configured.
    pub fn participant_phases(mode: DebateMode) -> &'static [DebatePhase] {
        match mode {
            DebateMode::Weak => &[DebatePhase::Initial],
            DebateMode::Strong => &[
                DebatePhase::Initial,
                DebatePhase::Rebuttal,
                DebatePhase::Revised,
            ],
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DebatePhase::Initial => write!(f, "initial"),
            DebatePhase::Rebuttal => write!(f, "rebuttal"),
            DebatePhase::Revised => write!(f, "revised"),
            DebatePhase::Consensus => write!(f, "consensus"),
        }
    }
}

/// One speaker's contribution in one phase. Rounds are append-only and
/// never rewritten by later phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRound {
    pub phase: DebatePhase,
    pub speaker: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Tool invocations the speaker made while producing this round.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

/// A detected revision of one participant's stance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionChange {
    pub participant: String,
    /// First line of the participant's opening round.
    pub from: String,
    /// First line of the participant's revised round.
    pub to: String,
    /// The marker phrase that triggered detection.
    pub reason: String,
    pub phase: DebatePhase,
}

/// Wall-clock metadata for a completed debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateMetadata {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub participant_count: usize,
}

/// Immutable record of a completed debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateResult {
    pub topic: String,
    pub mode: DebateMode,
    /// Every round in protocol order: one per participant per phase,
    /// plus the consensus round when an orchestrator spoke.
    pub rounds: Vec<DebateRound>,
    /// Orchestrator summary; empty when no orchestrator is configured.
    pub consensus: String,
    pub position_changes: Vec<PositionChange>,
    pub unresolved_disagreements: Vec<String>,
    pub metadata: DebateMetadata,
}

impl DebateResult {
    /// Rounds spoken in the given phase, in speaking order.
    pub fn rounds_in_phase(&self, phase: DebatePhase) -> impl Iterator<Item = &DebateRound> {
        self.rounds.iter().filter(move |round| round.phase == phase)
    }

    /// The round `participant` spoke in `phase`, if any.
    pub fn round_for(&self, participant: &str, phase: DebatePhase) -> Option<&DebateRound> {
        self.rounds
            .iter()
            .find(|round| round.phase == phase && round.speaker == participant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weak_mode_visits_initial_only() {
        assert_eq!(
            DebatePhase::participant_phases(DebateMode::Weak),
            &[DebatePhase::Initial]
        );
    }

    #[test]
    fn test_strong_mode_visits_three_phases_in_order() {
        assert_eq!(
            DebatePhase::participant_phases(DebateMode::Strong),
            &[
                DebatePhase::Initial,
                DebatePhase::Rebuttal,
                DebatePhase::Revised
            ]
        );
    }

    #[test]
    fn test_phase_display_is_snake_case() {
        assert_eq!(DebatePhase::Initial.to_string(), "initial");
        assert_eq!(DebatePhase::Consensus.to_string(), "consensus");
        assert_eq!(DebateMode::Strong.to_string(), "strong");
    }

    #[test]
    fn test_round_lookup_by_speaker_and_phase() {
        let result = DebateResult {
            topic: "t".into(),
            mode: DebateMode::Weak,
            rounds: vec![
                DebateRound {
                    phase: DebatePhase::Initial,
                    speaker: "alice".into(),
                    content: "a opening".into(),
                    timestamp: Utc::now(),
                    tool_calls: Vec::new(),
                },
                DebateRound {
                    phase: DebatePhase::Initial,
                    speaker: "bob".into(),
                    content: "b opening".into(),
                    timestamp: Utc::now(),
                    tool_calls: Vec::new(),
                },
            ],
            consensus: String::new(),
            position_changes: Vec::new(),
            unresolved_disagreements: Vec::new(),
            metadata: DebateMetadata {
                started_at: Utc::now(),
                completed_at: Utc::now(),
                participant_count: 2,
            },
        };
        assert_eq!(result.rounds_in_phase(DebatePhase::Initial).count(), 2);
        assert_eq!(
            result.round_for("bob", DebatePhase::Initial).unwrap().content,
            "b opening"
        );
        assert!(result.round_for("bob", DebatePhase::Revised).is_none());
    }

    #[test]
    fn test_round_serde_round_trip() {
        let round = DebateRound {
            phase: DebatePhase::Rebuttal,
            speaker: "alice".into(),
            content: "challenge".into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
        };
        let json = serde_json::to_string(&round).unwrap();
        let back: DebateRound = serde_json::from_str(&json).unwrap();
        assert_eq!(back, round);
    }
}
