//! The runtime's single error type (spec §7 error taxonomy).
//!
//! Narrower error types in this crate (`ToolError`, `RemoteToolError`,
//! `McpSessionError`-shaped transport errors) convert into `AgentError` via
//! `#[from]` at the point they cross into the scheduler; nothing downstream
//! of that boundary should need to inspect a provider- or transport-specific
//! error type again.

use agent_protocol::ErrorCode;

use crate::tool::ToolError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("llm transport error: {0}")]
    LlmTransport(String),

    #[error("llm provider error: {0}")]
    LlmProvider(String),

    #[error("llm rejected request as malformed: {0}")]
    LlmBadRequest(String),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("run cancelled")]
    Cancelled,

    #[error("could not parse plan: {0}")]
    PlanParseError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// The `RUN_ERROR.code` this error surfaces as (spec §6.3/§7).
    ///
    /// Tool errors normally never reach here — the registry reifies them into
    /// a failed tool-result message instead — but a strategy may choose to
    /// escalate one (e.g. a tool-less run that can't proceed) so the mapping
    /// is defined for completeness.
    pub fn wire_code(&self) -> ErrorCode {
        match self {
            AgentError::Configuration(_) => ErrorCode::Configuration,
            AgentError::LlmTransport(_) | AgentError::LlmProvider(_) => ErrorCode::LlmError,
            AgentError::LlmBadRequest(_) => ErrorCode::Internal,
            AgentError::Tool(_) => ErrorCode::ToolError,
            AgentError::Cancelled => ErrorCode::Cancelled,
            AgentError::PlanParseError(_) => ErrorCode::PlanParseError,
            AgentError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// A message safe to put on the wire — never a raw stack trace (spec §7).
    pub fn sanitised_message(&self) -> String {
        match self {
            AgentError::Internal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_maps_to_configuration_code() {
        let err = AgentError::Configuration("unknown model".into());
        assert_eq!(err.wire_code(), ErrorCode::Configuration);
    }

    #[test]
    fn internal_errors_are_sanitised_on_the_wire() {
        let err = AgentError::Internal("panic at src/foo.rs:42".into());
        assert_eq!(err.sanitised_message(), "an internal error occurred");
    }

    #[test]
    fn cancelled_maps_to_cancelled_code() {
        assert_eq!(AgentError::Cancelled.wire_code(), ErrorCode::Cancelled);
    }
}
