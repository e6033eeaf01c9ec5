//! Agentic RAG strategy (spec §4.5.2): an initial retrieval-directive phase,
//! then a React loop with the retriever still available as an ordinary tool.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::react::ReactStrategy;
use super::{SemanticAction, Strategy};
use crate::error::AgentError;
use crate::llm::ChatParams;
use crate::message::Message;

const RETRIEVAL_STEP: &str = "retrieval";

/// Wraps a `ReactStrategy` for the reasoning loop; the retrieval phase first
/// asks the model (offered only the corpus tool) whether retrieval is worth
/// doing and, if so, what to query for — the model's own tool call is then
/// executed, rather than this strategy assuming retrieval is always needed.
pub struct AgenticRagStrategy {
    corpus_tool_name: String,
    react: ReactStrategy,
}

impl AgenticRagStrategy {
    pub fn new(corpus_tool_name: impl Into<String>) -> Self {
        AgenticRagStrategy { corpus_tool_name: corpus_tool_name.into(), react: ReactStrategy::default() }
    }

    async fn retrieve(
        &self,
        ctx: &mut crate::run_context::RunContext,
        actions: &mpsc::Sender<SemanticAction>,
    ) -> Result<(), AgentError> {
        ctx.open_step(RETRIEVAL_STEP).map_err(|e| AgentError::Internal(e.to_string()))?;
        actions
            .send(SemanticAction::EmitStepStart { step_name: RETRIEVAL_STEP.to_string() })
            .await
            .ok();

        let retrieval_spec = ctx.tools.spec(&self.corpus_tool_name).ok_or_else(|| {
            AgentError::Configuration(format!("unknown retrieval tool '{}'", self.corpus_tool_name))
        })?;

        let mut messages = ctx.messages().to_vec();
        messages.push(Message::system(
            format!("msg-{}", uuid::Uuid::new_v4()),
            format!(
                "Decide whether retrieving background passages would help answer the \
                 preceding request. If it would, call the `{}` tool with the query (and an \
                 optional top_k) you want searched. If retrieval would not help, reply with \
                 exactly NONE and call no tool.",
                self.corpus_tool_name
            ),
        ));
        let response = ctx.llm.chat(&messages, std::slice::from_ref(&retrieval_spec), &ChatParams::default()).await?;
        ctx.add_usage(&response.usage.clone().unwrap_or_default());

        if let Some(call) = response.tool_calls.into_iter().next() {
            ctx.start_tool_call(call.id.clone(), call.name.clone(), None);
            actions
                .send(SemanticAction::RequestToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    parent_message_id: None,
                })
                .await
                .ok();
            let args_text = call.arguments.to_string();
            ctx.append_tool_call_args(&call.id, &args_text).ok();
            actions
                .send(SemanticAction::EmitToolCallArgsDelta { tool_call_id: call.id.clone(), delta: args_text })
                .await
                .ok();
            ctx.complete_tool_call_args(&call.id, call.arguments.clone())
                .map_err(|e| AgentError::Internal(e.to_string()))?;
            actions
                .send(SemanticAction::EndToolCallArgs { tool_call_id: call.id.clone() })
                .await
                .ok();
            ctx.mark_tool_call_running(&call.id).map_err(|e| AgentError::Internal(e.to_string()))?;

            let timeout = std::time::Duration::from_secs(30);
            let cx = crate::tool::ToolInvocationContext::new(timeout, ctx.cancel_receiver());
            let outcome = ctx.tools.invoke(&call.name, call.arguments.clone(), &cx).await;
            let content = ctx
                .record_tool_result(&call.id, outcome.clone())
                .map_err(|e| AgentError::Internal(e.to_string()))?;
            actions
                .send(SemanticAction::RecordToolResult { tool_call_id: call.id.clone(), outcome })
                .await
                .ok();

            ctx.append_step_content(RETRIEVAL_STEP, &content)
                .map_err(|e| AgentError::Internal(e.to_string()))?;

            let message_id = format!("msg-{}", uuid::Uuid::new_v4());
            ctx.append_message(Message::tool_result(message_id, call.id.clone(), content));
        } else {
            ctx.append_step_content(RETRIEVAL_STEP, &response.content)
                .map_err(|e| AgentError::Internal(e.to_string()))?;
        }

        ctx.finish_step(RETRIEVAL_STEP).map_err(|e| AgentError::Internal(e.to_string()))?;
        actions
            .send(SemanticAction::EmitStepEnd { step_name: RETRIEVAL_STEP.to_string() })
            .await
            .ok();
        Ok(())
    }
}

#[async_trait]
impl Strategy for AgenticRagStrategy {
    async fn step(
        &self,
        ctx: &mut crate::run_context::RunContext,
        actions: mpsc::Sender<SemanticAction>,
    ) -> Result<(), AgentError> {
        self.retrieve(ctx, &actions).await?;
        self.react.step(ctx, actions).await
    }
}
