//! Runtime error taxonomy with retry classification.
//!
//! Every failure surfaced by the executor or a pattern is a `RunError`.
//! The variant decides whether the executor's opt-in retry loop may
//! re-invoke the model.

use thiserror::Error;

/// Classification used by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    /// Transient adapter or transport fault.
    Transient,
    /// Provider rate limit.
    RateLimit,
    /// Caller-side deadline elapsed.
    Timeout,
    /// Terminal by policy; retrying cannot help.
    Terminal,
}

impl RetryCategory {
    pub fn is_retriable(self) -> bool {
        !matches!(self, RetryCategory::Terminal)
    }
}

impl std::fmt::Display for RetryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryCategory::Transient => write!(f, "transient"),
            RetryCategory::RateLimit => write!(f, "rate_limit"),
            RetryCategory::Timeout => write!(f, "timeout"),
            RetryCategory::Terminal => write!(f, "terminal"),
        }
    }
}

/// Unified error type for the orchestration runtime.
#[derive(Debug, Error)]
pub enum RunError {
    // ── Retriable ────────────────────────────────────────────────────

    /// The model adapter failed: network fault, dead subprocess, or a
    /// provider-side error.
    #[error("Model failure: {0}")]
    ModelFailure(String),

    /// The provider rejected the call for rate or quota reasons.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The call outlived a caller-supplied deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    // ── Terminal ─────────────────────────────────────────────────────

    /// A budget ceiling was crossed. The triggering call itself may
    /// have succeeded; its usage is still counted.
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    /// The run's context was cancelled.
    #[error("Cancelled")]
    Cancelled,

    /// The model lacks a capability the request needs.
    #[error("Capability {capability} not supported by {provider}/{model}")]
    Unsupported {
        capability: String,
        provider: String,
        model: String,
    },

    /// A fan-out finished with zero successful responses to work with.
    #[error("No usable responses")]
    NoUsableResponses,

    /// The judge (or consensus) call of a pattern failed.
    #[error("Judge failed: {source}")]
    JudgeFailed {
        #[source]
        source: Box<RunError>,
    },

    /// Anything that does not fit the categories above.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RunError {
    pub fn retry_category(&self) -> RetryCategory {
        match self {
            RunError::ModelFailure(_) => RetryCategory::Transient,
            RunError::RateLimited(_) => RetryCategory::RateLimit,
            RunError::Timeout(_) => RetryCategory::Timeout,
            RunError::BudgetExceeded(_)
            | RunError::Cancelled
            | RunError::Unsupported { .. }
            | RunError::NoUsableResponses
            | RunError::JudgeFailed { .. } => RetryCategory::Terminal,
            // Unknown faults are treated as transient and bounded by
            // the retry policy's attempt cap.
            RunError::Internal(_) => RetryCategory::Transient,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.retry_category().is_retriable()
    }
}
