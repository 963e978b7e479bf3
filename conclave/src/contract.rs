//! Uniform invocation contract implemented by provider adapters.
//!
//! An adapter wraps one backend (HTTP API, local server, subprocess
//! CLI) behind `ModelContract`. Callers get identical invocation,
//! streaming, cancellation, and capability semantics regardless of the
//! backend.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::chat::{ChatRequest, ChatResponse};
use crate::error::RunError;
use crate::handle::RunHandle;

/// How fine-grained an adapter's streaming is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingGranularity {
    /// The whole response arrives at once.
    None,
    /// Multi-token chunks.
    Chunk,
    /// Individual tokens.
    Token,
}

/// Static capability descriptor declared by an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    pub context_window: u32,
    pub structured_output: bool,
    pub tool_calling: bool,
    pub streaming: StreamingGranularity,
    pub system_messages: bool,
    pub prompt_caching: bool,
    pub web_search: bool,
    pub vision: bool,
}

impl Default for ModelCapabilities {
    /// Conservative baseline: plain text in, whole response out.
    fn default() -> Self {
        Self {
            context_window: 8_192,
            structured_output: false,
            tool_calling: false,
            streaming: StreamingGranularity::None,
            system_messages: true,
            prompt_caching: false,
            web_search: false,
            vision: false,
        }
    }
}

impl ModelCapabilities {
    pub fn supports(&self, requirement: CapabilityRequirement) -> bool {
        match requirement {
            CapabilityRequirement::StructuredOutput => self.structured_output,
            CapabilityRequirement::ToolCalling => self.tool_calling,
            CapabilityRequirement::Streaming => self.streaming != StreamingGranularity::None,
            CapabilityRequirement::SystemMessages => self.system_messages,
            CapabilityRequirement::PromptCaching => self.prompt_caching,
            CapabilityRequirement::WebSearch => self.web_search,
            CapabilityRequirement::Vision => self.vision,
        }
    }
}

/// A capability a caller can require before invoking a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityRequirement {
    StructuredOutput,
    ToolCalling,
    Streaming,
    SystemMessages,
    PromptCaching,
    WebSearch,
    Vision,
}

impl std::fmt::Display for CapabilityRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityRequirement::StructuredOutput => write!(f, "structured_output"),
            CapabilityRequirement::ToolCalling => write!(f, "tool_calling"),
            CapabilityRequirement::Streaming => write!(f, "streaming"),
            CapabilityRequirement::SystemMessages => write!(f, "system_messages"),
            CapabilityRequirement::PromptCaching => write!(f, "prompt_caching"),
            CapabilityRequirement::WebSearch => write!(f, "web_search"),
            CapabilityRequirement::Vision => write!(f, "vision"),
        }
    }
}

/// The uniform interface every backend adapter implements.
///
/// One `run` call produces one event stream: zero or more `Token`
/// events in generation order, a `Message` with the accumulated reply,
/// optionally a `Usage`, then `Done`. On failure the stream carries
/// `Error` then `Done` and the handle's result rejects.
///
/// Cancellation is cooperative: adapters observe the token between
/// suspension points and may let an in-flight provider call finish.
pub trait ModelContract: Send + Sync {
    /// Provider name, used for usage reports and price lookups.
    fn provider(&self) -> &str;

    /// Model name within the provider.
    fn model(&self) -> &str;

    /// Static capability descriptor for this model.
    fn capabilities(&self) -> ModelCapabilities;

    /// Start one invocation.
    fn run(&self, request: ChatRequest, cancel: CancellationToken) -> RunHandle<ChatResponse>;

    /// Fail fast with a descriptive error when a required capability is
    /// missing, instead of letting the call silently degrade.
    fn ensure_supports(&self, requirement: CapabilityRequirement) -> Result<(), RunError> {
        if self.capabilities().supports(requirement) {
            Ok(())
        } else {
            Err(RunError::Unsupported {
                capability: requirement.to_string(),
                provider: self.provider().to_string(),
                model: self.model().to_string(),
            })
        }
    }
}
