//! React strategy (spec §4.5.1): think, act on any requested tools, repeat.

use std::collections::HashMap;

use agent_protocol::StopReason;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{SemanticAction, Strategy};
use crate::error::AgentError;
use crate::llm::{ChatParams, Chunk, FinishReason};
use crate::message::Message;
use crate::run_context::RunContext;
use crate::tool::ToolInvocationContext;

pub const DEFAULT_MAX_ITERATIONS: usize = 25;
pub const THINKING_STEP: &str = "thinking";

/// Re-streams the buffered `thinking` text as the final assistant message
/// rather than asking the model for a fresh final turn (spec §9 open
/// question — the source allows either; this implementation picks one and
/// is consistent about it for every run).
pub struct ReactStrategy {
    max_iterations: usize,
}

impl Default for ReactStrategy {
    fn default() -> Self {
        ReactStrategy { max_iterations: DEFAULT_MAX_ITERATIONS }
    }
}

impl ReactStrategy {
    pub fn new(max_iterations: usize) -> Self {
        ReactStrategy { max_iterations }
    }

    /// Runs one think-then-act iteration. Returns `Ok(Some(final_text))` once
    /// the model stops requesting tools (the caller should emit the final
    /// assistant message and finish); `Ok(None)` to keep looping.
    pub(super) async fn think_and_act(
        &self,
        ctx: &mut RunContext,
        actions: &mpsc::Sender<SemanticAction>,
    ) -> Result<Option<String>, AgentError> {
        ctx.open_step(THINKING_STEP)
            .map_err(|e| AgentError::Internal(e.to_string()))?;
        actions
            .send(SemanticAction::EmitStepStart { step_name: THINKING_STEP.to_string() })
            .await
            .ok();

        let tools = ctx.tools.describe();
        let (chunk_tx, mut chunk_rx) = mpsc::channel(64);
        let messages: Vec<Message> = ctx.messages().to_vec();
        let llm = ctx.llm.clone();
        let params = ChatParams::default();

        // Tool-call argument deltas arrive tagged with the provider's stable
        // per-turn index, with id/name known only on the first delta for
        // that index (spec §4.1); `index_to_id` lets later deltas for the
        // same call find the tool-call id their `RequestToolCall` already
        // opened.
        let forward = async {
            let mut index_to_id: HashMap<usize, String> = HashMap::new();
            while let Some(chunk) = chunk_rx.recv().await {
                match chunk {
                    Chunk::TextDelta(delta) => {
                        ctx.append_step_content(THINKING_STEP, &delta).ok();
                        actions
                            .send(SemanticAction::EmitStepContent {
                                step_name: THINKING_STEP.to_string(),
                                delta,
                            })
                            .await
                            .ok();
                    }
                    Chunk::ToolCallArgDelta(delta) => {
                        let id = match index_to_id.get(&delta.index) {
                            Some(id) => id.clone(),
                            None => {
                                let id = delta.id.clone().unwrap_or_else(|| format!("tc-{}", delta.index));
                                index_to_id.insert(delta.index, id.clone());
                                ctx.start_tool_call(id.clone(), delta.name.clone().unwrap_or_default(), None);
                                actions
                                    .send(SemanticAction::RequestToolCall {
                                        id: id.clone(),
                                        name: delta.name.clone().unwrap_or_default(),
                                        parent_message_id: None,
                                    })
                                    .await
                                    .ok();
                                id
                            }
                        };
                        if !delta.arguments_delta.is_empty() {
                            ctx.append_tool_call_args(&id, &delta.arguments_delta).ok();
                            actions
                                .send(SemanticAction::EmitToolCallArgsDelta {
                                    tool_call_id: id,
                                    delta: delta.arguments_delta,
                                })
                                .await
                                .ok();
                        }
                    }
                    Chunk::Finish { .. } => {}
                }
            }
        };

        let call = llm.chat_stream(&messages, &tools, &params, chunk_tx);
        let (response, _) = tokio::join!(call, forward);
        let response = response?;

        ctx.add_usage(&response.usage.clone().unwrap_or_default());
        ctx.finish_step(THINKING_STEP).map_err(|e| AgentError::Internal(e.to_string()))?;
        actions
            .send(SemanticAction::EmitStepEnd { step_name: THINKING_STEP.to_string() })
            .await
            .ok();

        if response.finish_reason != FinishReason::ToolCalls || response.tool_calls.is_empty() {
            return Ok(Some(response.content));
        }

        for call in response.tool_calls {
            // Normally already opened by a `ToolCallArgDelta` above; this
            // only triggers if a provider reports a tool call with no
            // streamed deltas at all.
            if ctx.tool_call(&call.id).is_none() {
                ctx.start_tool_call(call.id.clone(), call.name.clone(), None);
                actions
                    .send(SemanticAction::RequestToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        parent_message_id: None,
                    })
                    .await
                    .ok();
            }
            ctx.complete_tool_call_args(&call.id, call.arguments.clone())
                .map_err(|e| AgentError::Internal(e.to_string()))?;
            actions
                .send(SemanticAction::EndToolCallArgs { tool_call_id: call.id.clone() })
                .await
                .ok();
            ctx.mark_tool_call_running(&call.id)
                .map_err(|e| AgentError::Internal(e.to_string()))?;

            let cx = ToolInvocationContext::new(
                std::time::Duration::from_secs(60),
                ctx.cancel_receiver(),
            );
            let outcome = ctx.tools.invoke(&call.name, call.arguments.clone(), &cx).await;
            let content = ctx
                .record_tool_result(&call.id, outcome.clone())
                .map_err(|e| AgentError::Internal(e.to_string()))?;
            actions
                .send(SemanticAction::RecordToolResult { tool_call_id: call.id.clone(), outcome })
                .await
                .ok();

            let message_id = format!("msg-{}", uuid::Uuid::new_v4());
            ctx.append_message(Message::tool_result(message_id, call.id.clone(), content));
        }

        Ok(None)
    }

    pub(super) async fn emit_final(
        &self,
        ctx: &mut RunContext,
        actions: &mpsc::Sender<SemanticAction>,
        text: String,
    ) {
        let message_id = format!("msg-{}", uuid::Uuid::new_v4());
        actions
            .send(SemanticAction::EmitFinalAssistantStart { message_id: message_id.clone() })
            .await
            .ok();
        actions
            .send(SemanticAction::EmitFinalAssistantChunk {
                message_id: message_id.clone(),
                delta: text.clone(),
            })
            .await
            .ok();
        actions
            .send(SemanticAction::EmitFinalAssistantEnd { message_id: message_id.clone() })
            .await
            .ok();
        ctx.append_message(Message::assistant(message_id, text));
    }
}

/// How the think-act loop ended: the model stopped requesting tools on its
/// own, or the iteration cap was exhausted first (spec §4.5.1: "on
/// exhaustion the strategy emits a truncation notice and finishes with
/// `stop_reason=length`").
pub enum LoopOutcome {
    Answered(String),
    Exhausted(String),
}

impl LoopOutcome {
    pub fn text(&self) -> &str {
        match self {
            LoopOutcome::Answered(text) | LoopOutcome::Exhausted(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            LoopOutcome::Answered(text) | LoopOutcome::Exhausted(text) => text,
        }
    }

    pub fn stop_reason(&self) -> StopReason {
        match self {
            LoopOutcome::Answered(_) => StopReason::Stop,
            LoopOutcome::Exhausted(_) => StopReason::Length,
        }
    }
}

impl ReactStrategy {
    /// Drives the think-act loop to completion and returns the resulting
    /// outcome, without emitting a final-assistant message or `Done` —
    /// callers that embed this loop inside a larger run (Plan-and-Execute's
    /// per-task execution, Reflexion's base attempt) own when those fire.
    pub async fn run_loop(
        &self,
        ctx: &mut RunContext,
        actions: &mpsc::Sender<SemanticAction>,
    ) -> Result<LoopOutcome, AgentError> {
        for _ in 0..self.max_iterations {
            if ctx.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            if let Some(final_text) = self.think_and_act(ctx, actions).await? {
                return Ok(LoopOutcome::Answered(final_text));
            }
        }
        Ok(LoopOutcome::Exhausted(
            "I wasn't able to finish within the allotted number of steps.".to_string(),
        ))
    }
}

#[async_trait]
impl Strategy for ReactStrategy {
    async fn step(
        &self,
        ctx: &mut RunContext,
        actions: mpsc::Sender<SemanticAction>,
    ) -> Result<(), AgentError> {
        let outcome = self.run_loop(ctx, &actions).await?;
        let stop_reason = outcome.stop_reason();
        self.emit_final(ctx, &actions, outcome.into_text()).await;
        let usage = ctx.usage();
        actions.send(SemanticAction::Done { usage: Some(usage), stop_reason }).await.ok();
        Ok(())
    }
}
