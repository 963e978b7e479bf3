//! Lexical heuristics over debate text: position-change detection and
//! disagreement extraction.
//!
//! Matching is deliberately literal. The marker phrases and section
//! headings below are part of the observable contract, so prompt
//! templates can steer models toward them.

use crate::debate::state::{DebatePhase, DebateRound, PositionChange};

/// Marker phrases that flag a revised position. Matched
/// case-insensitively anywhere in the round text.
pub const POSITION_CHANGE_MARKERS: &[&str] = &[
    "i have revised",
    "i now agree",
    "after reviewing",
    "my position has evolved",
    "i've updated my position",
    "i stand corrected",
];

/// First marker contained in `text`, if any.
pub fn detect_position_change(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    POSITION_CHANGE_MARKERS
        .iter()
        .copied()
        .find(|&marker| lowered.contains(marker))
}

/// Position summary used in change records: the first non-empty line.
pub fn position_summary(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string()
}

/// Compare each participant's revised round against its opening and
/// record a change wherever a marker phrase appears.
pub fn analyze_position_changes(rounds: &[DebateRound]) -> Vec<PositionChange> {
    let mut changes = Vec::new();
    for round in rounds.iter().filter(|r| r.phase == DebatePhase::Revised) {
        if let Some(marker) = detect_position_change(&round.content) {
            let from = rounds
                .iter()
                .find(|r| r.phase == DebatePhase::Initial && r.speaker == round.speaker)
                .map(|r| position_summary(&r.content))
                .unwrap_or_default();
            changes.push(PositionChange {
                participant: round.speaker.clone(),
                from,
                to: position_summary(&round.content),
                reason: marker.to_string(),
                phase: DebatePhase::Revised,
            });
        }
    }
    changes
}

/// Extract unresolved disagreements from a consensus summary.
///
/// Scans line by line. The first line mentioning "unresolved" or
/// "disagreement" opens the section; bullet lines after it are
/// collected; a line mentioning "recommendation" or "caution" closes
/// it. At most one section is read.
pub fn extract_disagreements(consensus: &str) -> Vec<String> {
    let mut disagreements = Vec::new();
    let mut in_section = false;
    for line in consensus.lines() {
        let lowered = line.to_lowercase();
        if !in_section {
            if lowered.contains("unresolved") || lowered.contains("disagreement") {
                in_section = true;
            }
            continue;
        }
        if lowered.contains("recommendation") || lowered.contains("caution") {
            break;
        }
        if let Some(item) = strip_bullet(line.trim()) {
            disagreements.push(item.to_string());
        }
    }
    disagreements
}

fn strip_bullet(line: &str) -> Option<&str> {
    ["-", "*", "\u{2022}"].iter().find_map(|marker| {
        line.strip_prefix(marker)
            .map(str::trim)
            .filter(|rest| !rest.is_empty())
    })
}
