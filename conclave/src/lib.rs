//! Multi-model orchestration runtime.
//!
//! Coordinates independent language-model backends into multi-agent
//! protocols: parallel fan-out, ensemble aggregation, sequential
//! pipelines, judge-based cross-checking, and structured multi-phase
//! debate.
//!
//! The execution core is deliberately small:
//! - [`ModelContract`] — the uniform adapter interface every backend
//!   implements (invocation, streaming, capabilities, cancellation).
//! - [`RunContext`] — cancellation, budget, tracing, and usage
//!   recording propagated down a tree of runs.
//! - [`AgentExecutor`] — retry, budget enforcement, and event relay
//!   wrapped around one model; the unit every pattern is built on.
//! - [`RunHandle`] — the event-stream-plus-result pair returned by
//!   every invocation, from a single model call up to a whole debate.

#![allow(clippy::uninlined_format_args)]

pub mod budget;
pub mod chat;
pub mod context;
pub mod contract;
pub mod debate;
pub mod error;
pub mod events;
pub mod executor;
pub mod handle;
pub mod patterns;
pub mod trace;

// Re-export chat data types
pub use chat::{
    ChatMessage, ChatRequest, ChatResponse, ResponseFormat, Role, SamplingParams, ToolCall,
    ToolDefinition, Usage,
};

// Re-export runtime plumbing
pub use context::{RunContext, SessionUsageRecorder, UsageReport};
pub use contract::{
    CapabilityRequirement, ModelCapabilities, ModelContract, StreamingGranularity,
};
pub use error::{RetryCategory, RunError};
pub use events::{PatternEvent, RunEvent, TerminalEvent};
pub use handle::{EventEmitter, EventStream, PendingResult, ResultSender, RunHandle};
pub use trace::{MemoryTraceSink, NoopTraceSink, SpanInfo, SpanOutcome, TraceEvent, TraceSink};

// Re-export budget types
pub use budget::{
    Budget, BudgetBreach, BudgetTracker, BudgetUsage, ModelRate, PriceTable, StaticPriceTable,
};

// Re-export executor types
pub use executor::{AgentConfig, AgentExecutor, AgentRunMetadata, AgentRunOutput, RetryPolicy};

// Re-export pattern types
pub use patterns::{
    agreement_score, AgentOutcome, AggregationStrategy, CrossCheckPattern, CrossCheckResult,
    EnsemblePattern, EnsembleResult, ParallelPattern, ParallelResult, PatternInput,
    SequentialPattern, SequentialResult,
};

// Re-export debate types
pub use debate::{
    DebateConfig, DebateMetadata, DebateMode, DebatePattern, DebatePhase, DebateResult,
    DebateRound, PhaseInstructions, PositionChange, RebuttalTools,
};
