//! Tool Registry (spec §4.2, C3) and the capabilities it dispatches to.
//!
//! A `Tool` is a local, in-process callable. The registry also fronts two
//! other invoker kinds that do not implement this trait directly: remote
//! tool-server handles (`remote::RemoteToolServerClient`) and the retriever
//! facade (`Retriever`) — both are adapted into the registry's dispatch table
//! by `registry::ToolRegistry::register_remote`/`register_retriever`.

pub mod registry;
pub mod remote;
pub mod retriever;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

pub use registry::ToolRegistry;
pub use retriever::Retriever;

/// Where a tool's invocation is actually dispatched (spec §3 Tool.origin).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolOrigin {
    Local,
    RemoteServer { server_id: String },
    Retriever { corpus_id: String },
}

/// Static description of one tool, fixed at run start (spec §3 Tool).
#[derive(Clone, Debug, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub origin: ToolOrigin,
}

/// The outcome of a successful invocation.
#[derive(Clone, Debug)]
pub struct ToolResult {
    pub content: String,
}

impl ToolResult {
    pub fn text(content: impl Into<String>) -> Self {
        ToolResult { content: content.into() }
    }
}

/// Classification of a failed invocation (spec §4.2).
#[derive(Clone, Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("arguments failed schema validation: {0}")]
    BadArguments(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote tool returned an error: {0}")]
    Remote(String),
    #[error("tool invocation timed out")]
    Timeout,
    #[error("tool invocation cancelled")]
    Cancelled,
}

impl ToolError {
    /// Text suitable for a `TOOL_CALL_RESULT` payload on failure (spec §7:
    /// per-call failures are reified into tool-result messages, never a raw
    /// error object).
    pub fn as_tool_result_content(&self) -> String {
        format!("error: {self}")
    }
}

/// Per-invocation context: the invocation's deadline and a way to observe the
/// run's cancel signal (spec §4.2 "cancellation is honoured").
pub struct ToolInvocationContext {
    pub timeout: Duration,
    pub cancelled: tokio::sync::watch::Receiver<bool>,
    pub started_at: Instant,
}

impl ToolInvocationContext {
    pub fn new(timeout: Duration, cancelled: tokio::sync::watch::Receiver<bool>) -> Self {
        ToolInvocationContext {
            timeout,
            cancelled,
            started_at: Instant::now(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }
}

/// A locally-executed tool capability.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn invoke(
        &self,
        arguments: serde_json::Value,
        cx: &mut ToolInvocationContext,
    ) -> Result<ToolResult, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_messages_never_contain_the_word_panic_or_backtrace() {
        let err = ToolError::Transport("connection reset".into());
        let text = err.as_tool_result_content();
        assert!(text.contains("connection reset"));
        assert!(!text.contains("panic"));
    }
}
