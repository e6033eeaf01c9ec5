//! Integration coverage for the runtime's named test scenarios: a no-tool
//! React turn, a single tool call, mid-run cancellation, and a failing tool
//! whose error is reported back to the model rather than aborting the run.

use std::sync::Arc;
use std::time::Duration;

use agent_core::tool::ToolInvocationContext;
use agent_core::{
    run, AgentError, ChatParams, Chunk, FinishReason, ForwardedProps, LlmClient, LlmResponse,
    LlmUsage, Message, MockLlm, RunDirectory, RunRequest, RuntimeResolver, Tool, ToolError,
    ToolOrigin, ToolRegistry, ToolResult, ToolSpec,
};
use agent_protocol::{Event, Role, StopReason};
use async_trait::async_trait;
use tokio::sync::mpsc;

struct FixedResolver {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
}

#[async_trait]
impl RuntimeResolver for FixedResolver {
    async fn resolve_llm(&self, _props: &ForwardedProps) -> Result<Arc<dyn LlmClient>, AgentError> {
        Ok(self.llm.clone())
    }

    async fn resolve_tools(&self, _props: &ForwardedProps) -> Result<Arc<ToolRegistry>, AgentError> {
        Ok(self.tools.clone())
    }
}

fn react_props() -> ForwardedProps {
    ForwardedProps {
        agent_type: "react".to_string(),
        model_id: "mock".to_string(),
        ..Default::default()
    }
}

async fn drain(mut rx: mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn wire_types(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(|e| e.wire_type()).collect()
}

struct AddTool;

#[async_trait]
impl Tool for AddTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "add".into(),
            description: "adds two numbers".into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                "required": ["a", "b"]
            }),
            origin: ToolOrigin::Local,
        }
    }

    async fn invoke(
        &self,
        arguments: serde_json::Value,
        _cx: &mut ToolInvocationContext,
    ) -> Result<ToolResult, ToolError> {
        let a = arguments["a"].as_f64().unwrap_or(0.0);
        let b = arguments["b"].as_f64().unwrap_or(0.0);
        Ok(ToolResult::text((a + b).to_string()))
    }
}

struct AlwaysFailsTool;

#[async_trait]
impl Tool for AlwaysFailsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "flaky".into(),
            description: "always fails".into(),
            input_schema: serde_json::json!({"type": "object"}),
            origin: ToolOrigin::Local,
        }
    }

    async fn invoke(
        &self,
        _arguments: serde_json::Value,
        _cx: &mut ToolInvocationContext,
    ) -> Result<ToolResult, ToolError> {
        Err(ToolError::Transport("connection reset".into()))
    }
}

fn stop_response(content: &str) -> LlmResponse {
    LlmResponse {
        content: content.to_string(),
        tool_calls: vec![],
        usage: Some(LlmUsage { prompt_tokens: 1, completion_tokens: 1, total_tokens: 2 }),
        finish_reason: FinishReason::Stop,
    }
}

fn tool_call_response(id: &str, name: &str, arguments: serde_json::Value) -> LlmResponse {
    LlmResponse {
        content: String::new(),
        tool_calls: vec![agent_core::ToolCallRequest { id: id.to_string(), name: name.to_string(), arguments }],
        usage: Some(LlmUsage { prompt_tokens: 1, completion_tokens: 1, total_tokens: 2 }),
        finish_reason: FinishReason::ToolCalls,
    }
}

// S1 — No-tool React: a single `"Hello!"` reply produces exactly the
// step/final-message event sequence, ending with one `RUN_FINISHED`.
#[tokio::test]
async fn s1_no_tool_react_turn() {
    let llm = Arc::new(MockLlm::fixed_text("Hello!"));
    let resolver = Arc::new(FixedResolver { llm, tools: Arc::new(ToolRegistry::new()) });
    let directory = Arc::new(RunDirectory::new());
    let (tx, rx) = mpsc::channel(64);

    let request = RunRequest {
        thread_id: "t1".into(),
        run_id: Some("r1".into()),
        messages: vec![Message::user("m1", "Say hi.")],
        forwarded_props: react_props(),
    };

    run(request, resolver, directory, tx).await;
    let events = drain(rx).await;
    let types = wire_types(&events);

    assert_eq!(
        types,
        vec![
            "RUN_STARTED",
            "STEP_STARTED",
            "STEP_CONTENT",
            "STEP_FINISHED",
            "TEXT_MESSAGE_START",
            "TEXT_MESSAGE_CONTENT",
            "TEXT_MESSAGE_END",
            "RUN_FINISHED",
        ]
    );
    match &events[2] {
        Event::StepContent { step_name, delta, .. } => {
            assert_eq!(step_name, "thinking");
            assert_eq!(delta, "Hello!");
        }
        other => panic!("expected StepContent, got {other:?}"),
    }
    match events.last().unwrap() {
        Event::RunFinished { result, .. } => assert!(result.is_some()),
        other => panic!("expected RunFinished, got {other:?}"),
    }
}

// S2 — Single tool call: `add(2,3)` is invoked once, the result is reported
// back, and the model's second turn produces the final answer.
#[tokio::test]
async fn s2_single_tool_call() {
    let llm = Arc::new(MockLlm::new(vec![
        tool_call_response("tc1", "add", serde_json::json!({"a": 2, "b": 3})),
        stop_response("5"),
    ]));
    let mut registry = ToolRegistry::new();
    registry.register_local(Arc::new(AddTool));
    let resolver = Arc::new(FixedResolver { llm, tools: Arc::new(registry) });
    let directory = Arc::new(RunDirectory::new());
    let (tx, rx) = mpsc::channel(64);

    let request = RunRequest {
        thread_id: "t1".into(),
        run_id: Some("r1".into()),
        messages: vec![Message::user("m1", "What is 2+3?")],
        forwarded_props: react_props(),
    };

    run(request, resolver, directory, tx).await;
    let events = drain(rx).await;
    let types = wire_types(&events);

    assert_eq!(
        types,
        vec![
            "RUN_STARTED",
            "STEP_STARTED",
            "STEP_FINISHED",
            "TOOL_CALL_START",
            "TOOL_CALL_ARGS",
            "TOOL_CALL_END",
            "TOOL_CALL_RESULT",
            "STEP_STARTED",
            "STEP_CONTENT",
            "STEP_FINISHED",
            "TEXT_MESSAGE_START",
            "TEXT_MESSAGE_CONTENT",
            "TEXT_MESSAGE_END",
            "RUN_FINISHED",
        ]
    );

    let args_event = events.iter().find(|e| e.wire_type() == "TOOL_CALL_ARGS").unwrap();
    match args_event {
        Event::ToolCallArgs { delta, .. } => {
            let value: serde_json::Value = serde_json::from_str(delta).unwrap();
            assert_eq!(value, serde_json::json!({"a": 2, "b": 3}));
        }
        other => panic!("expected ToolCallArgs, got {other:?}"),
    }

    let result_event = events.iter().find(|e| e.wire_type() == "TOOL_CALL_RESULT").unwrap();
    match result_event {
        Event::ToolCallResult { content, role, .. } => {
            assert_eq!(content, "5");
            assert_eq!(*role, Role::Tool);
        }
        other => panic!("expected ToolCallResult, got {other:?}"),
    }
}

// S3 — Cancellation: stopping the run mid-flight ends it with exactly one
// `RUN_ERROR(code=CANCELLED)` and nothing after.
#[tokio::test]
async fn s3_cancellation_ends_the_run_with_a_cancelled_error() {
    struct SlowLlm;

    #[async_trait]
    impl LlmClient for SlowLlm {
        async fn chat(
            &self,
            _messages: &[Message],
            _tools: &[ToolSpec],
            _params: &ChatParams,
        ) -> Result<LlmResponse, AgentError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(stop_response("too late"))
        }

        async fn chat_stream(
            &self,
            _messages: &[Message],
            _tools: &[ToolSpec],
            _params: &ChatParams,
            _chunk_tx: mpsc::Sender<Chunk>,
        ) -> Result<LlmResponse, AgentError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(stop_response("too late"))
        }
    }

    let resolver = Arc::new(FixedResolver { llm: Arc::new(SlowLlm), tools: Arc::new(ToolRegistry::new()) });
    let directory = Arc::new(RunDirectory::new());
    let (tx, rx) = mpsc::channel(64);

    let request = RunRequest {
        thread_id: "t1".into(),
        run_id: Some("r1".into()),
        messages: vec![Message::user("m1", "Say hi.")],
        forwarded_props: react_props(),
    };

    let directory_for_stop = directory.clone();
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        directory_for_stop.signal_cancel("r1")
    });

    run(request, resolver, directory, tx).await;
    let stopped = stopper.await.unwrap();
    assert!(stopped);

    let events = drain(rx).await;
    let types = wire_types(&events);
    assert_eq!(types.first(), Some(&"RUN_STARTED"));
    assert_eq!(types.last(), Some(&"RUN_ERROR"));
    assert_eq!(types.iter().filter(|t| **t == "RUN_ERROR").count(), 1);
    match events.last().unwrap() {
        Event::RunError { code, .. } => assert_eq!(*code, agent_protocol::ErrorCode::Cancelled),
        other => panic!("expected RunError, got {other:?}"),
    }
}

// React's iteration cap: a model that keeps requesting the same tool call
// forever never gets the chance to stop on its own, so `run_loop` exhausts
// its cap and reports `stop_reason=length` rather than looking identical to
// a normal stop.
#[tokio::test]
async fn react_loop_cap_exhaustion_reports_stop_reason_length() {
    let llm = Arc::new(MockLlm::new(vec![tool_call_response(
        "tc1",
        "add",
        serde_json::json!({"a": 1, "b": 1}),
    )]));
    let mut registry = ToolRegistry::new();
    registry.register_local(Arc::new(AddTool));
    let (sink_tx, _sink_rx) = mpsc::channel(16);
    let mut ctx = agent_core::RunContext::new(
        "r1",
        "t1",
        Arc::new(registry),
        llm,
        vec![Message::user("m1", "keep calling add forever")],
        sink_tx,
    );

    let (actions_tx, mut actions_rx) = mpsc::channel(256);
    tokio::spawn(async move { while actions_rx.recv().await.is_some() {} });

    let strategy = agent_core::strategy::ReactStrategy::new(1);
    let outcome = strategy.run_loop(&mut ctx, &actions_tx).await.unwrap();
    assert_eq!(outcome.stop_reason(), StopReason::Length);
}

// S4 — Tool failure reported to model: a failing tool produces a
// `TOOL_CALL_RESULT` carrying the failure text (never a `RUN_ERROR`), and the
// run still finishes normally once the model apologises.
#[tokio::test]
async fn s4_tool_failure_is_reported_to_the_model_not_the_wire() {
    let llm = Arc::new(MockLlm::new(vec![
        tool_call_response("tc1", "flaky", serde_json::json!({})),
        stop_response("Sorry, I couldn't complete that."),
    ]));
    let mut registry = ToolRegistry::new();
    registry.register_local(Arc::new(AlwaysFailsTool));
    let resolver = Arc::new(FixedResolver { llm, tools: Arc::new(registry) });
    let directory = Arc::new(RunDirectory::new());
    let (tx, rx) = mpsc::channel(64);

    let request = RunRequest {
        thread_id: "t1".into(),
        run_id: Some("r1".into()),
        messages: vec![Message::user("m1", "Do the flaky thing.")],
        forwarded_props: react_props(),
    };

    run(request, resolver, directory, tx).await;
    let events = drain(rx).await;
    let types = wire_types(&events);

    assert!(!types.contains(&"RUN_ERROR"));
    assert_eq!(types.last(), Some(&"RUN_FINISHED"));

    let result_event = events.iter().find(|e| e.wire_type() == "TOOL_CALL_RESULT").unwrap();
    match result_event {
        Event::ToolCallResult { content, .. } => {
            assert!(content.contains("connection reset"), "got: {content}");
        }
        other => panic!("expected ToolCallResult, got {other:?}"),
    }
}
