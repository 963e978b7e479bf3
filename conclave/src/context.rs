//! Run context — cancellation, budget, tracing, and usage recording
//! bundled into one cheaply cloneable value.
//!
//! Contexts form a tree. A child derives a subordinate cancellation
//! token and an isolated trace span, and shares the parent's budget
//! tracker, usage recorder, and metadata by reference. Cancelling a
//! parent reaches every descendant; cancelling a child never travels
//! upward.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::budget::BudgetTracker;
use crate::trace::{NoopTraceSink, SpanInfo, SpanOutcome, TraceEvent, TraceSink};

/// Usage totals reported after each successful model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// External sink recording per-call usage for session accounting.
#[async_trait]
pub trait SessionUsageRecorder: Send + Sync {
    async fn record_usage(&self, report: UsageReport);
}

/// Per-run bundle of cancellation, budget, trace, and usage state.
#[derive(Clone)]
pub struct RunContext {
    name: Arc<str>,
    cancel: CancellationToken,
    span: SpanInfo,
    trace_sink: Arc<dyn TraceSink>,
    budget: Option<Arc<BudgetTracker>>,
    usage_recorder: Option<Arc<dyn SessionUsageRecorder>>,
    metadata: Arc<HashMap<String, String>>,
}

impl RunContext {
    /// Root context with a fresh cancellation token and trace identity.
    pub fn root(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            cancel: CancellationToken::new(),
            span: SpanInfo::root(),
            trace_sink: Arc::new(NoopTraceSink),
            budget: None,
            usage_recorder: None,
            metadata: Arc::new(HashMap::new()),
        }
    }

    pub fn with_budget(mut self, tracker: BudgetTracker) -> Self {
        self.budget = Some(Arc::new(tracker));
        self
    }

    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace_sink = sink;
        self
    }

    pub fn with_usage_recorder(mut self, recorder: Arc<dyn SessionUsageRecorder>) -> Self {
        self.usage_recorder = Some(recorder);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.metadata).insert(key.into(), value.into());
        self
    }

    /// Derive a child subordinate to this context.
    pub fn child(&self, name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            cancel: self.cancel.child_token(),
            span: self.span.child(),
            trace_sink: Arc::clone(&self.trace_sink),
            budget: self.budget.clone(),
            usage_recorder: self.usage_recorder.clone(),
            metadata: Arc::clone(&self.metadata),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn span(&self) -> &SpanInfo {
        &self.span
    }

    pub fn budget(&self) -> Option<&Arc<BudgetTracker>> {
        self.budget.as_ref()
    }

    pub fn usage_recorder(&self) -> Option<&Arc<dyn SessionUsageRecorder>> {
        self.usage_recorder.as_ref()
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// Cancel this context and every descendant. Idempotent, observable
    /// synchronously.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token handed to model adapters for cooperative cancellation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel this context once the wall-clock limit elapses. The
    /// watchdog ends early if the context is cancelled first.
    pub fn cancel_after(&self, limit: Duration) {
        let cancel = self.cancel.clone();
        let name = Arc::clone(&self.name);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(limit) => {
                    debug!(context = %name, limit_ms = limit.as_millis() as u64, "deadline reached, cancelling");
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        });
    }

    /// Log a `run_start` trace record tagged with this context's span.
    pub fn emit_run_start(&self, name: &str) {
        self.trace_sink.log(&TraceEvent::RunStart {
            trace_id: self.span.trace_id.clone(),
            span_id: self.span.span_id.clone(),
            name: name.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Log the matching `run_end` trace record.
    pub fn emit_run_end(&self, name: &str, outcome: SpanOutcome, duration: Duration) {
        self.trace_sink.log(&TraceEvent::RunEnd {
            trace_id: self.span.trace_id.clone(),
            span_id: self.span.span_id.clone(),
            name: name.to_string(),
            outcome,
            duration_ms: duration.as_millis() as u64,
            timestamp: Utc::now(),
        });
    }
}
