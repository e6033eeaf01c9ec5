//! Agent Runtime / Scheduler (spec §4.6, C8): the single entry point `run`.
//!
//! Drives a strategy to completion, translating its `SemanticAction`s into
//! wire `Event`s, maintaining the tool-call table's wire-visible shape, and
//! handling cancellation and uncaught failures. `run` never panics on a
//! strategy error — every failure path ends in exactly one `RunError` (spec
//! §3 "a run emits... exactly one of RunFinished or RunError as its last
//! event").

pub mod request;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use agent_protocol::{Event, RunFinishedResult, StopReason, UsagePayload};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub use request::{ForwardedProps, RunRequest};

use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::message::Message;
use crate::run_context::RunContext;
use crate::run_directory::RunDirectory;
use crate::strategy::{
    AgenticRagStrategy, PlanAndExecuteStrategy, ReactStrategy, ReflexionStrategy, SemanticAction,
    Strategy,
};
use crate::tool::retriever::synthetic_tool_name;
use crate::tool::ToolRegistry;

/// What a run needs that the core cannot construct on its own: a concrete
/// `LlmClient` for the requested model, and a `ToolRegistry` with the
/// requested corpora/tool-servers/skills already wired in. The caller (the
/// serving layer) owns configuration, credentials, and connection pooling;
/// this boundary keeps the core ignorant of both (spec §1 out-of-scope list).
#[async_trait]
pub trait RuntimeResolver: Send + Sync {
    async fn resolve_llm(&self, props: &ForwardedProps) -> Result<Arc<dyn LlmClient>, AgentError>;
    async fn resolve_tools(&self, props: &ForwardedProps) -> Result<Arc<ToolRegistry>, AgentError>;
}

struct LogicalClock {
    counter: AtomicU64,
}

impl LogicalClock {
    fn new() -> Self {
        LogicalClock { counter: AtomicU64::new(0) }
    }

    fn tick(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }
}

fn select_strategy(props: &ForwardedProps) -> Result<Box<dyn Strategy>, AgentError> {
    match props.agent_type.as_str() {
        "react" => Ok(Box::new(ReactStrategy::default())),
        "agentic_rag" => {
            let corpus_id = props.knowledge_base_ids.first().ok_or_else(|| {
                AgentError::Configuration(
                    "agentic_rag requires at least one knowledge_base_id".to_string(),
                )
            })?;
            Ok(Box::new(AgenticRagStrategy::new(synthetic_tool_name(corpus_id))))
        }
        "plan_execute" => Ok(Box::new(PlanAndExecuteStrategy::default())),
        "reflexion" => Ok(Box::new(ReflexionStrategy::default())),
        other => Err(AgentError::Configuration(format!("unknown agent_type '{other}'"))),
    }
}

/// Consumes `SemanticAction`s from a strategy and emits the matching wire
/// events, maintaining no state of its own beyond the logical clock — the
/// tool-call table itself lives on `RunContext`, already updated by the
/// strategy before it sends the corresponding action. The one exception is
/// `stop_reason`, known only once the strategy sends `Done`; it is stashed in
/// `stop_reason` for `run` to read once this future (and the driving
/// strategy) has finished.
async fn translate_actions(
    mut actions: mpsc::Receiver<SemanticAction>,
    sink: mpsc::Sender<Event>,
    clock: Arc<LogicalClock>,
    stop_reason: Arc<Mutex<Option<StopReason>>>,
) {
    use agent_protocol::Role as WireRole;

    while let Some(action) = actions.recv().await {
        let event = match action {
            SemanticAction::EmitStepStart { step_name } => {
                Some(Event::StepStarted { step_name, timestamp: clock.tick() })
            }
            SemanticAction::EmitStepContent { step_name, delta } => {
                Some(Event::StepContent { step_name, delta, timestamp: clock.tick() })
            }
            SemanticAction::EmitStepEnd { step_name } => {
                Some(Event::StepFinished { step_name, timestamp: clock.tick() })
            }
            SemanticAction::EmitAssistantTextChunk { .. } => {
                // Reserved for strategies that stream assistant text outside
                // the final-message framing; none of the four strategies in
                // this runtime emit it today.
                None
            }
            SemanticAction::RequestToolCall { id, name, parent_message_id } => {
                Some(Event::ToolCallStart {
                    tool_call_id: id,
                    tool_call_name: name,
                    parent_message_id,
                    timestamp: clock.tick(),
                })
            }
            SemanticAction::EmitToolCallArgsDelta { tool_call_id, delta } => {
                Some(Event::ToolCallArgs { tool_call_id, delta, timestamp: clock.tick() })
            }
            SemanticAction::EndToolCallArgs { tool_call_id } => {
                Some(Event::ToolCallEnd { tool_call_id, timestamp: clock.tick() })
            }
            SemanticAction::RecordToolResult { tool_call_id, outcome } => {
                let content = match outcome {
                    Ok(result) => result.content,
                    Err(err) => err.as_tool_result_content(),
                };
                Some(Event::ToolCallResult {
                    message_id: format!("msg-{}", uuid::Uuid::new_v4()),
                    tool_call_id,
                    content,
                    role: WireRole::Tool,
                    timestamp: clock.tick(),
                })
            }
            SemanticAction::EmitFinalAssistantStart { message_id } => {
                Some(Event::TextMessageStart { message_id, role: WireRole::Assistant, timestamp: clock.tick() })
            }
            SemanticAction::EmitFinalAssistantChunk { message_id, delta } => {
                Some(Event::TextMessageContent { message_id, delta, timestamp: clock.tick() })
            }
            SemanticAction::EmitFinalAssistantEnd { message_id } => {
                Some(Event::TextMessageEnd { message_id, timestamp: clock.tick() })
            }
            SemanticAction::Done { stop_reason: reason, .. } => {
                *stop_reason.lock().expect("stop_reason lock poisoned") = Some(reason);
                None
            }
        };

        if let Some(event) = event {
            if sink.send(event).await.is_err() {
                return;
            }
        }
    }
}

async fn emit_terminal_error(
    sink: &mpsc::Sender<Event>,
    clock: &LogicalClock,
    error: AgentError,
) {
    let event = Event::RunError {
        message: error.sanitised_message(),
        code: error.wire_code(),
        timestamp: clock.tick(),
    };
    sink.send(event).await.ok();
}

/// Drives one run to completion, writing every event it produces to `sink`
/// and deregistering from `directory` before returning (spec §4.6).
pub async fn run(
    request: RunRequest,
    resolver: Arc<dyn RuntimeResolver>,
    directory: Arc<RunDirectory>,
    sink: mpsc::Sender<Event>,
) {
    let run_id = request.run_id.clone().unwrap_or_else(|| format!("run-{}", uuid::Uuid::new_v4()));
    let thread_id = request.thread_id.clone();
    let clock = Arc::new(LogicalClock::new());

    if sink
        .send(Event::RunStarted {
            thread_id: thread_id.clone(),
            run_id: run_id.clone(),
            timestamp: clock.tick(),
        })
        .await
        .is_err()
    {
        return;
    }

    let llm = match resolver.resolve_llm(&request.forwarded_props).await {
        Ok(llm) => llm,
        Err(e) => {
            emit_terminal_error(&sink, &clock, e).await;
            return;
        }
    };
    let tools = match resolver.resolve_tools(&request.forwarded_props).await {
        Ok(tools) => tools,
        Err(e) => {
            emit_terminal_error(&sink, &clock, e).await;
            return;
        }
    };
    let strategy = match select_strategy(&request.forwarded_props) {
        Ok(s) => s,
        Err(e) => {
            emit_terminal_error(&sink, &clock, e).await;
            return;
        }
    };

    let mut messages = request.messages;
    if let Some(prompt) = &request.forwarded_props.system_prompt {
        messages.insert(0, Message::system(format!("msg-{}", uuid::Uuid::new_v4()), prompt.clone()));
    }

    let mut ctx = RunContext::new(run_id.clone(), thread_id.clone(), tools, llm, messages, sink.clone());
    directory.register(run_id.clone(), ctx.cancel_sender());
    let mut cancel_rx = ctx.cancel_receiver();

    info!(run_id = %run_id, agent_type = %request.forwarded_props.agent_type, "run started");

    let stop_reason: Arc<Mutex<Option<StopReason>>> = Arc::new(Mutex::new(None));

    let driver = async {
        if let Err(e) = strategy.prepare(&mut ctx).await {
            return Err(e);
        }
        let (actions_tx, actions_rx) = mpsc::channel(256);
        let translate = translate_actions(actions_rx, sink.clone(), clock.clone(), stop_reason.clone());
        let drive = strategy.step(&mut ctx, actions_tx);
        let (result, _) = tokio::join!(drive, translate);
        result
    };

    let outcome = tokio::select! {
        result = driver => result,
        _ = cancel_rx.changed() => Err(AgentError::Cancelled),
    };

    match outcome {
        Ok(()) => {
            let usage = ctx.usage();
            let result = Some(RunFinishedResult {
                usage: Some(UsagePayload {
                    prompt_tokens: usage.prompt_tokens,
                    completion_tokens: usage.completion_tokens,
                    total_tokens: usage.total_tokens,
                }),
                stop_reason: *stop_reason.lock().expect("stop_reason lock poisoned"),
            });
            sink.send(Event::RunFinished {
                thread_id: thread_id.clone(),
                run_id: run_id.clone(),
                result,
                timestamp: clock.tick(),
            })
            .await
            .ok();
        }
        Err(e) => {
            if !matches!(e, AgentError::Cancelled) {
                warn!(run_id = %run_id, error = %e, "run terminated with an error");
            }
            emit_terminal_error(&sink, &clock, e).await;
        }
    }

    directory.deregister(&run_id);
}
