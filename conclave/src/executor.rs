//! Agent executor — retry, budget enforcement, usage recording, and
//! trace emission wrapped around one model contract.
//!
//! Patterns never talk to a `ModelContract` directly; every call goes
//! through an executor so that cancellation, accounting, and relayed
//! events behave identically everywhere.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chat::{ChatMessage, ChatRequest, ChatResponse, ResponseFormat, Role};
use crate::context::{RunContext, UsageReport};
use crate::contract::{CapabilityRequirement, ModelContract};
use crate::error::RunError;
use crate::events::RunEvent;
use crate::handle::{EventEmitter, RunHandle};
use crate::trace::SpanOutcome;

/// Identity plus model binding for one agent.
#[derive(Clone)]
pub struct AgentConfig {
    pub id: String,
    /// Display name; falls back to the id.
    pub name: Option<String>,
    pub model: Arc<dyn ModelContract>,
    pub system_prompt: Option<String>,
}

impl AgentConfig {
    pub fn new(id: impl Into<String>, model: Arc<dyn ModelContract>) -> Self {
        Self {
            id: id.into(),
            name: None,
            model,
            system_prompt: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Retry policy: full re-invocation with a fixed delay between attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Metadata describing one settled executor run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunMetadata {
    pub provider: String,
    pub model: String,
    pub duration_ms: u64,
    /// Re-invocations after the first attempt; absent when retry is off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

/// Successful executor output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunOutput {
    pub output: ChatResponse,
    pub metadata: AgentRunMetadata,
}

/// Wraps one model behind uniform execution semantics.
///
/// Retry is opt-in and gated on the error's retry category. Each
/// attempt is a full re-invocation with fresh stream state; events from
/// failed attempts are suppressed, never relayed.
#[derive(Clone)]
pub struct AgentExecutor {
    agent: AgentConfig,
    retry: Option<RetryPolicy>,
}

impl AgentExecutor {
    pub fn new(agent: AgentConfig) -> Self {
        Self { agent, retry: None }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn agent(&self) -> &AgentConfig {
        &self.agent
    }

    pub fn agent_id(&self) -> &str {
        &self.agent.id
    }

    /// Run one request through the wrapped model.
    pub fn run(&self, ctx: &RunContext, request: ChatRequest) -> RunHandle<AgentRunOutput> {
        let executor = self.clone();
        let ctx = ctx.clone();
        RunHandle::spawn(move |emitter| async move { executor.drive(ctx, request, emitter).await })
    }

    async fn drive(
        &self,
        ctx: RunContext,
        request: ChatRequest,
        emitter: EventEmitter<RunEvent>,
    ) -> Result<AgentRunOutput, RunError> {
        if ctx.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        self.check_capabilities(&request)?;
        let request = self.apply_system_prompt(request);

        let max_attempts = self
            .retry
            .as_ref()
            .map(|policy| policy.max_attempts.max(1))
            .unwrap_or(1);
        let delay = self
            .retry
            .as_ref()
            .map(|policy| policy.delay)
            .unwrap_or_default();

        ctx.emit_run_start(self.agent.display_name());
        let started = Instant::now();

        let mut attempt: u32 = 0;
        let attempted = loop {
            attempt += 1;
            match self.attempt(&ctx, request.clone(), &emitter).await {
                Ok(response) => break Ok(response),
                Err(error) => {
                    if attempt >= max_attempts || !error.is_retriable() || ctx.is_cancelled() {
                        break Err(error);
                    }
                    warn!(
                        agent_id = %self.agent.id,
                        attempt,
                        category = %error.retry_category(),
                        error = %error,
                        "agent call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };
        let duration = started.elapsed();

        let settled = match attempted {
            Ok(response) => self.settle(&ctx, response).await,
            Err(error) => Err(error),
        };

        match settled {
            Ok(response) => {
                ctx.emit_run_end(self.agent.display_name(), SpanOutcome::Success, duration);
                info!(
                    agent_id = %self.agent.id,
                    model = self.agent.model.model(),
                    duration_ms = duration.as_millis() as u64,
                    "agent run complete"
                );
                Ok(AgentRunOutput {
                    output: response,
                    metadata: AgentRunMetadata {
                        provider: self.agent.model.provider().to_string(),
                        model: self.agent.model.model().to_string(),
                        duration_ms: duration.as_millis() as u64,
                        retry_count: self.retry.as_ref().map(|_| attempt - 1),
                    },
                })
            }
            Err(error) => {
                ctx.emit_run_end(self.agent.display_name(), SpanOutcome::Failure, duration);
                warn!(
                    agent_id = %self.agent.id,
                    model = self.agent.model.model(),
                    error = %error,
                    "agent run failed"
                );
                Err(error)
            }
        }
    }

    /// One full model invocation, relaying its events verbatim.
    ///
    /// Inner `Error` and `Done` are suppressed: the executor owns its
    /// stream's terminal events, and a retried attempt must not leak a
    /// mid-stream failure.
    async fn attempt(
        &self,
        ctx: &RunContext,
        request: ChatRequest,
        emitter: &EventEmitter<RunEvent>,
    ) -> Result<ChatResponse, RunError> {
        let handle = self.agent.model.run(request, ctx.cancellation_token());
        let (mut stream, pending) = handle.split();

        let relay = async {
            while let Some(event) = stream.next().await {
                match event {
                    RunEvent::Error { .. } | RunEvent::Done => {}
                    other => emitter.emit(other),
                }
            }
        };
        let (result, _) = tokio::join!(pending.wait(), relay);
        result
    }

    /// Post-call bookkeeping: usage recording, budget accumulation, and
    /// the budget check. Usage is counted before the check so the
    /// triggering call is never lost.
    async fn settle(&self, ctx: &RunContext, response: ChatResponse) -> Result<ChatResponse, RunError> {
        if let Some(usage) = response.usage {
            if let Some(recorder) = ctx.usage_recorder() {
                recorder
                    .record_usage(UsageReport {
                        provider: self.agent.model.provider().to_string(),
                        model: self.agent.model.model().to_string(),
                        input_tokens: usage.input_tokens,
                        output_tokens: usage.output_tokens,
                        total_tokens: usage.total_tokens,
                    })
                    .await;
            }
            if let Some(tracker) = ctx.budget() {
                tracker.record_call(self.agent.model.provider(), self.agent.model.model(), &usage);
            }
        }
        if let Some(tracker) = ctx.budget() {
            if let Some(breach) = tracker.breach() {
                return Err(RunError::BudgetExceeded(breach.to_string()));
            }
        }
        Ok(response)
    }

    fn check_capabilities(&self, request: &ChatRequest) -> Result<(), RunError> {
        if !request.tools.is_empty() {
            self.agent
                .model
                .ensure_supports(CapabilityRequirement::ToolCalling)?;
        }
        if request.web_search {
            self.agent
                .model
                .ensure_supports(CapabilityRequirement::WebSearch)?;
        }
        if request.response_format == Some(ResponseFormat::Json) {
            self.agent
                .model
                .ensure_supports(CapabilityRequirement::StructuredOutput)?;
        }
        Ok(())
    }

    /// Prepend the agent's system prompt unless the transcript already
    /// opens with one.
    fn apply_system_prompt(&self, mut request: ChatRequest) -> ChatRequest {
        if let Some(prompt) = &self.agent.system_prompt {
            let has_system = request
                .messages
                .first()
                .map(|message| message.role == Role::System)
                .unwrap_or(false);
            if !has_system {
                request.messages.insert(0, ChatMessage::system(prompt.clone()));
            }
        }
        request
    }
}
