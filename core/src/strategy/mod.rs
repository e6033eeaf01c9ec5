//! The `Strategy` contract (spec §4.5, §9) and the four reasoning
//! strategies that implement it.
//!
//! A strategy owns its control flow end to end: given a `RunContext`, it
//! drives the run to completion, emitting a `SemanticAction` for every
//! externally-visible effect along the way. The scheduler (`crate::runtime`)
//! only ever sees `SemanticAction`s — it translates them into wire events
//! and maintains the tool-call table, but has no knowledge of which
//! strategy produced them (spec §9 "keeps the Runtime independent of
//! strategy internals").
//!
//! Strategies dispatch tool calls themselves (spec §2 "the strategy
//! dispatches through the Tool Registry") via `RunContext::tools`; the
//! `RequestToolCall`/`RecordToolResult` actions exist purely so the
//! scheduler can mirror the call into wire events and the tool-call table,
//! not to ask the scheduler to perform the call.

pub mod agentic_rag;
pub mod plan_execute;
pub mod react;
pub mod reflexion;

use agent_protocol::StopReason;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::llm::LlmUsage;
use crate::run_context::RunContext;
use crate::tool::{ToolError, ToolResult};

pub use agentic_rag::AgenticRagStrategy;
pub use plan_execute::PlanAndExecuteStrategy;
pub use react::ReactStrategy;
pub use reflexion::ReflexionStrategy;

pub type ToolOutcome = Result<ToolResult, ToolError>;

/// One externally-visible effect a strategy produces (spec §4.5).
#[derive(Debug)]
pub enum SemanticAction {
    EmitStepStart { step_name: String },
    EmitStepContent { step_name: String, delta: String },
    EmitStepEnd { step_name: String },
    EmitAssistantTextChunk { delta: String },
    /// A tool call has been identified (id/name known); carries no
    /// arguments — those stream separately via `EmitToolCallArgsDelta` so a
    /// provider's per-index argument fragments reach the wire as they arrive
    /// (spec §4.1 "stable tool-call indices across chunks").
    RequestToolCall {
        id: String,
        name: String,
        parent_message_id: Option<String>,
    },
    /// One fragment of a tool call's argument text. Callers that already
    /// have the full arguments up front (no streaming available) send a
    /// single delta containing the whole JSON text.
    EmitToolCallArgsDelta { tool_call_id: String, delta: String },
    /// The tool call's arguments are fully assembled; no more deltas follow.
    EndToolCallArgs { tool_call_id: String },
    RecordToolResult {
        tool_call_id: String,
        outcome: ToolOutcome,
    },
    EmitFinalAssistantStart { message_id: String },
    EmitFinalAssistantChunk { message_id: String, delta: String },
    EmitFinalAssistantEnd { message_id: String },
    Done { usage: Option<LlmUsage>, stop_reason: StopReason },
}

/// `{prepare(ctx), step(ctx) -> lazy sequence of SemanticAction}` (spec §9).
///
/// `step` drives the run to completion, sending a `SemanticAction` through
/// `actions` for each effect as it happens; it returns once the strategy has
/// sent `Done` (normal termination) or returns `Err` (uncaught failure, spec
/// §4.6 step 7).
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Any setup before the main loop (e.g. seeding a system prompt).
    /// Default is a no-op.
    async fn prepare(&self, _ctx: &mut RunContext) -> Result<(), AgentError> {
        Ok(())
    }

    async fn step(
        &self,
        ctx: &mut RunContext,
        actions: mpsc::Sender<SemanticAction>,
    ) -> Result<(), AgentError>;
}
