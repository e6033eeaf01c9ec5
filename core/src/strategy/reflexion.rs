//! Reflexion strategy (spec §4.5.4): wraps a base strategy with a
//! critique-and-revise loop bounded by a maximum number of retries.

use agent_protocol::StopReason;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::react::ReactStrategy;
use super::{SemanticAction, Strategy};
use crate::error::AgentError;
use crate::llm::ChatParams;
use crate::message::Message;
use crate::run_context::RunContext;

const CRITIQUE_STEP: &str = "critique";

/// Runs `base` to produce an attempt, asks the model to judge it, and — if
/// the model finds a flaw — feeds the critique back in and tries again, up
/// to `max_retries` additional attempts. The base strategy's own step
/// wiring (steps, tool calls) is reused unchanged each attempt; only the
/// critique/final-assistant framing belongs to this strategy.
pub struct ReflexionStrategy {
    base: ReactStrategy,
    max_retries: usize,
}

impl Default for ReflexionStrategy {
    fn default() -> Self {
        ReflexionStrategy { base: ReactStrategy::default(), max_retries: 2 }
    }
}

impl ReflexionStrategy {
    pub fn new(base: ReactStrategy, max_retries: usize) -> Self {
        ReflexionStrategy { base, max_retries }
    }

    async fn critique(
        &self,
        ctx: &mut RunContext,
        actions: &mpsc::Sender<SemanticAction>,
        attempt: &str,
    ) -> Result<Option<String>, AgentError> {
        ctx.open_step(CRITIQUE_STEP).map_err(|e| AgentError::Internal(e.to_string()))?;
        actions
            .send(SemanticAction::EmitStepStart { step_name: CRITIQUE_STEP.to_string() })
            .await
            .ok();

        let mut messages = ctx.messages().to_vec();
        messages.push(Message::system(
            format!("msg-{}", uuid::Uuid::new_v4()),
            format!(
                "Here is a candidate answer:\n{attempt}\n\n\
                 Judge it critically. If it is correct and complete, reply with \
                 exactly OK. Otherwise reply with a short critique of what is \
                 wrong and what to fix."
            ),
        ));
        let response = ctx.llm.chat(&messages, &[], &ChatParams::default()).await?;
        ctx.add_usage(&response.usage.clone().unwrap_or_default());
        ctx.append_step_content(CRITIQUE_STEP, &response.content)
            .map_err(|e| AgentError::Internal(e.to_string()))?;
        actions
            .send(SemanticAction::EmitStepContent {
                step_name: CRITIQUE_STEP.to_string(),
                delta: response.content.clone(),
            })
            .await
            .ok();
        ctx.finish_step(CRITIQUE_STEP).map_err(|e| AgentError::Internal(e.to_string()))?;
        actions
            .send(SemanticAction::EmitStepEnd { step_name: CRITIQUE_STEP.to_string() })
            .await
            .ok();

        if response.content.trim().eq_ignore_ascii_case("ok") {
            Ok(None)
        } else {
            Ok(Some(response.content))
        }
    }
}

#[async_trait]
impl Strategy for ReflexionStrategy {
    async fn step(
        &self,
        ctx: &mut RunContext,
        actions: mpsc::Sender<SemanticAction>,
    ) -> Result<(), AgentError> {
        let mut attempt = self.base.run_loop(ctx, &actions).await?.into_text();

        for _ in 0..self.max_retries {
            if ctx.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            match self.critique(ctx, &actions, &attempt).await? {
                None => break,
                Some(critique) => {
                    ctx.append_message(Message::system(
                        format!("msg-{}", uuid::Uuid::new_v4()),
                        format!(
                            "Your previous attempt was:\n{attempt}\n\nA reviewer found this \
                             issue, address it in your next attempt:\n{critique}"
                        ),
                    ));
                    attempt = self.base.run_loop(ctx, &actions).await?.into_text();
                }
            }
        }

        self.base.emit_final(ctx, &actions, attempt).await;
        let usage = ctx.usage();
        actions
            .send(SemanticAction::Done { usage: Some(usage), stop_reason: StopReason::Stop })
            .await
            .ok();
        Ok(())
    }
}
