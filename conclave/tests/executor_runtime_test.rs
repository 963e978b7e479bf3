//! Integration tests for the executor runtime — budget enforcement,
//! cancellation, retry, event relay, usage recording, and tracing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use conclave::{
    AgentConfig, AgentExecutor, Budget, BudgetTracker, ChatRequest, ChatResponse, EventEmitter,
    MemoryTraceSink, ModelCapabilities, ModelContract, RetryPolicy, Role, RunContext, RunError,
    RunEvent, RunHandle, SessionUsageRecorder, SpanOutcome, StreamingGranularity, TraceEvent,
    Usage, UsageReport,
};

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

// ── Scripted model ───────────────────────────────────────────────────

#[derive(Clone)]
enum Reply {
    Text(&'static str),
    TextWithUsage(&'static str, u64, u64),
    Fail(&'static str),
}

/// Deterministic adapter that plays back a reply script, one entry per
/// invocation, and records every request it saw.
struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
    stream_tokens: bool,
}

impl ScriptedModel {
    fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn mock_model(replies: Vec<Reply>) -> Arc<ScriptedModel> {
    Arc::new(ScriptedModel {
        replies: Mutex::new(replies.into()),
        requests: Mutex::new(Vec::new()),
        stream_tokens: false,
    })
}

fn mock_streaming_model(replies: Vec<Reply>) -> Arc<ScriptedModel> {
    Arc::new(ScriptedModel {
        replies: Mutex::new(replies.into()),
        requests: Mutex::new(Vec::new()),
        stream_tokens: true,
    })
}

fn emit_reply(
    emitter: &EventEmitter<RunEvent>,
    content: &str,
    usage: Option<Usage>,
    stream_tokens: bool,
) -> ChatResponse {
    if stream_tokens {
        for word in content.split_whitespace() {
            emitter.emit(RunEvent::Token {
                text: word.to_string(),
            });
        }
    }
    let mut response = ChatResponse::assistant(content);
    emitter.emit(RunEvent::Message {
        message: response.message.clone(),
    });
    if let Some(usage) = usage {
        response = response.with_usage(usage);
        emitter.emit(RunEvent::Usage { usage });
    }
    response
}

impl ModelContract for ScriptedModel {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "mock-1"
    }

    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities {
            tool_calling: true,
            streaming: StreamingGranularity::Token,
            web_search: true,
            ..Default::default()
        }
    }

    fn run(&self, request: ChatRequest, _cancel: CancellationToken) -> RunHandle<ChatResponse> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Fail("script exhausted"));
        let stream_tokens = self.stream_tokens;
        RunHandle::spawn(move |emitter| async move {
            match reply {
                Reply::Text(content) => Ok(emit_reply(&emitter, content, None, stream_tokens)),
                Reply::TextWithUsage(content, input, output) => Ok(emit_reply(
                    &emitter,
                    content,
                    Some(Usage::new(input, output)),
                    stream_tokens,
                )),
                Reply::Fail(message) => Err(RunError::ModelFailure(message.to_string())),
            }
        })
    }
}

/// Adapter that never answers; it only reacts to cancellation.
struct SlowModel;

impl ModelContract for SlowModel {
    fn provider(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "slow"
    }

    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities::default()
    }

    fn run(&self, _request: ChatRequest, cancel: CancellationToken) -> RunHandle<ChatResponse> {
        RunHandle::spawn(move |_emitter| async move {
            tokio::select! {
                _ = cancel.cancelled() => Err(RunError::Cancelled),
                _ = tokio::time::sleep(Duration::from_secs(60)) => {
                    Ok(ChatResponse::assistant("too late"))
                }
            }
        })
    }
}

#[derive(Default)]
struct RecordingUsageRecorder {
    reports: Mutex<Vec<UsageReport>>,
}

impl RecordingUsageRecorder {
    fn reports(&self) -> Vec<UsageReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionUsageRecorder for RecordingUsageRecorder {
    async fn record_usage(&self, report: UsageReport) {
        self.reports.lock().unwrap().push(report);
    }
}

fn executor_for(model: Arc<ScriptedModel>) -> AgentExecutor {
    AgentExecutor::new(AgentConfig::new("a1", model))
}

// ── Budget enforcement ───────────────────────────────────────────────

#[tokio::test]
async fn test_budget_breach_rejects_after_counting_usage() {
    init_tracing();
    let model = mock_model(vec![Reply::TextWithUsage("big answer", 1_000, 100)]);
    let ctx = RunContext::root("budgeted")
        .with_budget(BudgetTracker::new(Budget::unlimited().with_max_tokens(100)));
    let executor = executor_for(model.clone());

    let error = executor
        .run(&ctx, ChatRequest::from_prompt("q"))
        .result()
        .await
        .unwrap_err();
    assert!(matches!(error, RunError::BudgetExceeded(_)));
    // The breaching call itself still counts.
    assert_eq!(ctx.budget().unwrap().usage().total_tokens, 1_100);
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn test_calls_within_budget_succeed() {
    let model = mock_model(vec![Reply::TextWithUsage("fine", 50, 20)]);
    let ctx = RunContext::root("budgeted")
        .with_budget(BudgetTracker::new(Budget::unlimited().with_max_tokens(100)));
    let executor = executor_for(model);

    let run = executor
        .run(&ctx, ChatRequest::from_prompt("q"))
        .result()
        .await
        .unwrap();
    assert_eq!(run.output.text(), "fine");
    assert_eq!(ctx.budget().unwrap().usage().total_tokens, 70);
}

#[tokio::test]
async fn test_budget_exceeded_is_not_retried() {
    let model = mock_model(vec![
        Reply::TextWithUsage("first", 1_000, 100),
        Reply::TextWithUsage("second", 1_000, 100),
    ]);
    let ctx = RunContext::root("budgeted")
        .with_budget(BudgetTracker::new(Budget::unlimited().with_max_tokens(100)));
    let executor = executor_for(model.clone()).with_retry(RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_millis(1),
    });

    let error = executor
        .run(&ctx, ChatRequest::from_prompt("q"))
        .result()
        .await
        .unwrap_err();
    assert!(matches!(error, RunError::BudgetExceeded(_)));
    assert_eq!(model.call_count(), 1);
}

// ── Cancellation ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancelled_context_skips_the_model() {
    let model = mock_model(vec![Reply::Text("never sent")]);
    let ctx = RunContext::root("cancelled");
    ctx.cancel();
    let executor = executor_for(model.clone());

    let result = executor
        .run(&ctx, ChatRequest::from_prompt("q"))
        .result()
        .await;
    assert!(matches!(result, Err(RunError::Cancelled)));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_cancel_mid_flight_rejects_with_cancelled() {
    let ctx = RunContext::root("mid-flight");
    let executor = AgentExecutor::new(AgentConfig::new("slow", Arc::new(SlowModel)));

    let handle = executor.run(&ctx, ChatRequest::from_prompt("q"));
    ctx.cancel();
    let result = handle.result().await;
    assert!(matches!(result, Err(RunError::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_in_flight_runs() {
    let ctx = RunContext::root("deadline");
    ctx.cancel_after(Duration::from_millis(10));
    let executor = AgentExecutor::new(AgentConfig::new("slow", Arc::new(SlowModel)));

    let result = executor
        .run(&ctx, ChatRequest::from_prompt("q"))
        .result()
        .await;
    assert!(matches!(result, Err(RunError::Cancelled)));
}

// ── Retry ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_retry_reinvokes_until_success() {
    init_tracing();
    let model = mock_model(vec![
        Reply::Fail("one"),
        Reply::Fail("two"),
        Reply::Text("third time lucky"),
    ]);
    let ctx = RunContext::root("retry");
    let executor = executor_for(model.clone()).with_retry(RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_millis(1),
    });

    let run = executor
        .run(&ctx, ChatRequest::from_prompt("q"))
        .result()
        .await
        .unwrap();
    assert_eq!(run.output.text(), "third time lucky");
    assert_eq!(run.metadata.retry_count, Some(2));
    assert_eq!(model.call_count(), 3);
}

#[tokio::test]
async fn test_retry_exhaustion_surfaces_the_last_error() {
    let model = mock_model(vec![Reply::Fail("one"), Reply::Fail("two")]);
    let ctx = RunContext::root("retry");
    let executor = executor_for(model.clone()).with_retry(RetryPolicy {
        max_attempts: 2,
        delay: Duration::from_millis(1),
    });

    let error = executor
        .run(&ctx, ChatRequest::from_prompt("q"))
        .result()
        .await
        .unwrap_err();
    assert!(error.to_string().contains("two"));
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn test_retry_is_off_by_default() {
    let model = mock_model(vec![Reply::Fail("one"), Reply::Text("unused")]);
    let ctx = RunContext::root("no-retry");
    let executor = executor_for(model.clone());

    let result = executor
        .run(&ctx, ChatRequest::from_prompt("q"))
        .result()
        .await;
    assert!(matches!(result, Err(RunError::ModelFailure(_))));
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn test_first_try_success_reports_zero_retries() {
    let model = mock_model(vec![Reply::Text("immediate")]);
    let ctx = RunContext::root("retry");
    let executor = executor_for(model).with_retry(RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_millis(1),
    });

    let run = executor
        .run(&ctx, ChatRequest::from_prompt("q"))
        .result()
        .await
        .unwrap();
    assert_eq!(run.metadata.retry_count, Some(0));
}

// ── Event relay ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_token_relay_preserves_generation_order() {
    let model = mock_streaming_model(vec![Reply::Text("alpha beta gamma")]);
    let ctx = RunContext::root("relay");
    let executor = executor_for(model);

    let handle = executor.run(&ctx, ChatRequest::from_prompt("q"));
    let (stream, pending) = handle.split();
    let (events, result) = tokio::join!(stream.collect(), pending.wait());
    result.unwrap();

    let tokens: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            RunEvent::Token { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(tokens, vec!["alpha", "beta", "gamma"]);

    let types: Vec<&str> = events.iter().map(RunEvent::event_type).collect();
    assert_eq!(types.last(), Some(&"done"));
    assert_eq!(types.iter().filter(|t| **t == "done").count(), 1);
}

#[tokio::test]
async fn test_failed_attempt_events_never_leak() {
    let model = mock_streaming_model(vec![Reply::Fail("flaky"), Reply::Text("ok")]);
    let ctx = RunContext::root("relay");
    let executor = executor_for(model).with_retry(RetryPolicy {
        max_attempts: 2,
        delay: Duration::from_millis(1),
    });

    let handle = executor.run(&ctx, ChatRequest::from_prompt("q"));
    let (stream, pending) = handle.split();
    let (events, result) = tokio::join!(stream.collect(), pending.wait());
    result.unwrap();

    let types: Vec<&str> = events.iter().map(RunEvent::event_type).collect();
    // The failed first attempt must not leave a mid-stream error.
    assert!(!types.contains(&"error"));
    assert_eq!(types.iter().filter(|t| **t == "done").count(), 1);
}

#[tokio::test]
async fn test_final_failure_emits_error_then_done() {
    let model = mock_model(vec![Reply::Fail("down")]);
    let ctx = RunContext::root("relay");
    let executor = executor_for(model);

    let handle = executor.run(&ctx, ChatRequest::from_prompt("q"));
    let (stream, pending) = handle.split();
    let (events, result) = tokio::join!(stream.collect(), pending.wait());
    assert!(result.is_err());

    let types: Vec<&str> = events.iter().map(RunEvent::event_type).collect();
    assert_eq!(types, vec!["error", "done"]);
}

#[tokio::test]
async fn test_result_resolves_without_draining_the_stream() {
    let model = mock_streaming_model(vec![Reply::Text(
        "a long streamed answer with quite a few separate words in it",
    )]);
    let ctx = RunContext::root("undrained");
    let executor = executor_for(model);

    // Never touch the event stream.
    let run = executor
        .run(&ctx, ChatRequest::from_prompt("q"))
        .result()
        .await
        .unwrap();
    assert!(run.output.text().starts_with("a long streamed"));
}

// ── System prompt and capabilities ───────────────────────────────────

#[tokio::test]
async fn test_system_prompt_is_prepended_once() {
    let model = mock_model(vec![Reply::Text("hi")]);
    let ctx = RunContext::root("sys");
    let executor = AgentExecutor::new(
        AgentConfig::new("a1", model.clone()).with_system_prompt("You are terse."),
    );

    executor
        .run(&ctx, ChatRequest::from_prompt("question"))
        .result()
        .await
        .unwrap();

    let requests = model.recorded_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].messages.len(), 2);
    assert_eq!(requests[0].messages[0].role, Role::System);
    assert_eq!(requests[0].messages[0].content, "You are terse.");
    assert_eq!(requests[0].messages[1].content, "question");
}

// ── Usage recording and tracing ──────────────────────────────────────

#[tokio::test]
async fn test_usage_recorder_called_exactly_once() {
    let model = mock_model(vec![Reply::TextWithUsage("hi", 10, 5)]);
    let recorder = Arc::new(RecordingUsageRecorder::default());
    let ctx = RunContext::root("usage").with_usage_recorder(recorder.clone());
    let executor = executor_for(model);

    executor
        .run(&ctx, ChatRequest::from_prompt("q"))
        .result()
        .await
        .unwrap();

    let reports = recorder.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].provider, "scripted");
    assert_eq!(reports[0].model, "mock-1");
    assert_eq!(reports[0].input_tokens, 10);
    assert_eq!(reports[0].output_tokens, 5);
    assert_eq!(reports[0].total_tokens, 15);
}

#[tokio::test]
async fn test_usage_recorded_once_despite_retries() {
    let model = mock_model(vec![Reply::Fail("one"), Reply::TextWithUsage("hi", 10, 5)]);
    let recorder = Arc::new(RecordingUsageRecorder::default());
    let ctx = RunContext::root("usage").with_usage_recorder(recorder.clone());
    let executor = executor_for(model).with_retry(RetryPolicy {
        max_attempts: 2,
        delay: Duration::from_millis(1),
    });

    executor
        .run(&ctx, ChatRequest::from_prompt("q"))
        .result()
        .await
        .unwrap();
    assert_eq!(recorder.reports().len(), 1);
}

#[tokio::test]
async fn test_failed_runs_record_no_usage() {
    let model = mock_model(vec![Reply::Fail("down")]);
    let recorder = Arc::new(RecordingUsageRecorder::default());
    let ctx = RunContext::root("usage").with_usage_recorder(recorder.clone());
    let executor = executor_for(model);

    let result = executor
        .run(&ctx, ChatRequest::from_prompt("q"))
        .result()
        .await;
    assert!(result.is_err());
    assert!(recorder.reports().is_empty());
}

#[tokio::test]
async fn test_trace_pairs_run_start_with_run_end() {
    let model = mock_model(vec![Reply::Text("traced")]);
    let sink = Arc::new(MemoryTraceSink::new());
    let ctx = RunContext::root("traced").with_trace_sink(sink.clone());
    let executor = executor_for(model);

    executor
        .run(&ctx, ChatRequest::from_prompt("q"))
        .result()
        .await
        .unwrap();

    let events = sink.snapshot();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type(), "run_start");
    assert_eq!(events[1].event_type(), "run_end");
    assert_eq!(events[0].span_id(), events[1].span_id());
    match &events[1] {
        TraceEvent::RunEnd { outcome, .. } => assert_eq!(*outcome, SpanOutcome::Success),
        other => panic!("expected run_end, got {:?}", other),
    }
}

#[tokio::test]
async fn test_failed_run_traces_a_failure_outcome() {
    let model = mock_model(vec![Reply::Fail("down")]);
    let sink = Arc::new(MemoryTraceSink::new());
    let ctx = RunContext::root("traced").with_trace_sink(sink.clone());
    let executor = executor_for(model);

    let _ = executor
        .run(&ctx, ChatRequest::from_prompt("q"))
        .result()
        .await;

    let events = sink.snapshot();
    assert_eq!(events.len(), 2);
    match &events[1] {
        TraceEvent::RunEnd { outcome, .. } => assert_eq!(*outcome, SpanOutcome::Failure),
        other => panic!("expected run_end, got {:?}", other),
    }
}
