//! # agent-core
//!
//! The agent runtime: message/tool/run-context data model, an LLM client
//! abstraction, a tool registry backed by local and remote tool sources, a
//! retriever interface, four reasoning strategies (React, AgenticRAG,
//! PlanAndExecute, Reflexion), and the scheduler that drives a strategy to
//! completion while emitting a strictly-ordered event stream.
//!
//! ## Main modules
//!
//! - [`error`]: [`AgentError`] — the single error type returned at the
//!   runtime boundary; every narrower error type in this crate converts into
//!   it via `#[from]`.
//! - [`message`]: [`Message`], [`Role`] — the conversation data model shared
//!   by every strategy.
//! - [`llm`]: [`LlmClient`] trait, streamed [`Chunk`]s, [`LlmUsage`]; a mock
//!   implementation for tests and an OpenAI-compatible HTTP client.
//! - [`tool`]: [`Tool`] trait, [`ToolRegistry`], [`Retriever`]; remote
//!   tool-server clients in [`tool::remote`].
//! - [`strategy`]: the [`Strategy`] trait and [`SemanticAction`] contract the
//!   scheduler drives, plus the four strategy implementations.
//! - [`run_context`]: [`RunContext`] — sole owner of one run's mutable state.
//! - [`run_directory`]: [`RunDirectory`] — process-wide registry of running
//!   runs, used to deliver cancellation.
//! - [`runtime`]: [`RunRequest`] and the scheduler entry point that drives a
//!   strategy to completion and emits [`agent_protocol::Event`]s.

pub mod error;
pub mod llm;
pub mod message;
pub mod run_context;
pub mod run_directory;
pub mod runtime;
pub mod strategy;
pub mod tool;

pub use error::AgentError;
pub use llm::{
    ChatParams, Chunk, FinishReason, LlmClient, LlmResponse, LlmUsage, MockLlm, OpenAiClient,
    ToolCallDelta, ToolCallRequest, ToolChoiceMode,
};
pub use message::{Message, Role};
pub use run_context::{RunContext, Step, StepStatus, ToolCallRecord, ToolCallStatus};
pub use run_directory::RunDirectory;
pub use runtime::{run, ForwardedProps, RunRequest, RuntimeResolver};
pub use strategy::{SemanticAction, Strategy};
pub use tool::{Retriever, Tool, ToolError, ToolOrigin, ToolRegistry, ToolResult, ToolSpec};
