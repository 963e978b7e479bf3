//! Structured multi-phase debate with position-change detection and
//! disagreement extraction.

pub mod analysis;
pub mod engine;
pub mod state;

pub use analysis::{
    analyze_position_changes, detect_position_change, extract_disagreements, position_summary,
    POSITION_CHANGE_MARKERS,
};
pub use engine::{DebateConfig, DebatePattern, PhaseInstructions, RebuttalTools};
pub use state::{
    DebateMetadata, DebateMode, DebatePhase, DebateResult, DebateRound, PositionChange,
};
