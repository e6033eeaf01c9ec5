//! Provider-agnostic LLM client abstraction (spec §4.1).
//!
//! `chat` is the single-call form; `chat_stream` drives the same request but
//! forwards `Chunk`s as they arrive so a strategy can re-emit them as
//! `STEP_CONTENT`/`TOOL_CALL_ARGS` deltas without waiting for completion.
//! Both return the same `LlmResponse` once the turn is complete. Clients are
//! retry-free by design (spec §9 "keep retries strategy-local"): a transport
//! failure is surfaced immediately as `AgentError::LlmTransport`.

mod mock;
mod openai;

pub use mock::MockLlm;
pub use openai::OpenAiClient;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::AgentError;
use crate::message::Message;
use crate::tool::ToolSpec;

/// Tool choice mode for chat completions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ToolChoiceMode {
    #[default]
    Auto,
    None,
    Required,
}

impl std::str::FromStr for ToolChoiceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "none" => Ok(Self::None),
            "required" => Ok(Self::Required),
            _ => Err(format!(
                "unknown tool_choice: {s} (use auto, none, or required)"
            )),
        }
    }
}

/// Parameters frozen at client construction plus per-call overrides the
/// strategy supplies (spec §4.1: "Configuration ... is frozen at client
/// construction"; `ChatParams` is what varies per call).
#[derive(Clone, Debug, Default)]
pub struct ChatParams {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub tool_choice: ToolChoiceMode,
}

/// Provider-independent finish reason (spec §4.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Error,
}

/// A tool call the model requested, with arguments already parsed as JSON.
#[derive(Clone, Debug)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One increment of a streamed reply (spec §4.1 `chat_stream`).
///
/// `ToolCallArgDelta::index` is the provider's stable index for the call
/// within this turn — multiple deltas with the same index belong to the same
/// call and their `arguments_delta` strings concatenate into the full
/// argument JSON text once the call's `Finish`/next call boundary arrives.
#[derive(Clone, Debug)]
pub enum Chunk {
    TextDelta(String),
    ToolCallArgDelta(ToolCallDelta),
    Finish {
        reason: FinishReason,
        usage: Option<LlmUsage>,
    },
}

#[derive(Clone, Debug)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments_delta: String,
}

#[derive(Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl LlmUsage {
    pub fn add(&mut self, other: &LlmUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// The completed reply to one `chat`/`chat_stream` call.
#[derive(Clone, Debug)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Option<LlmUsage>,
    pub finish_reason: FinishReason,
}

/// Provider-agnostic chat + streaming-chat capability (spec §4.1, C2).
///
/// Implementations: `MockLlm` for tests, `OpenAiClient` for OpenAI-compatible
/// HTTP APIs. No retries inside any implementation — retry policy belongs to
/// the strategy (spec §9).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One-shot completion: no intermediate chunks observed by the caller.
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        params: &ChatParams,
    ) -> Result<LlmResponse, AgentError>;

    /// Streaming completion. Sends each `Chunk` through `chunk_tx` as it
    /// arrives and returns the same `LlmResponse` `chat` would have, once the
    /// turn finishes.
    ///
    /// Default implementation falls back to `chat` and emits the whole reply
    /// as a single `TextDelta` followed by `Finish` — a provider that cannot
    /// stream can still satisfy the trait.
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        params: &ChatParams,
        chunk_tx: mpsc::Sender<Chunk>,
    ) -> Result<LlmResponse, AgentError> {
        let response = self.chat(messages, tools, params).await?;
        if !response.content.is_empty() {
            let _ = chunk_tx.send(Chunk::TextDelta(response.content.clone())).await;
        }
        let _ = chunk_tx
            .send(Chunk::Finish {
                reason: response.finish_reason,
                usage: response.usage,
            })
            .await;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubLlm {
        content: String,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn chat(
            &self,
            _messages: &[Message],
            _tools: &[ToolSpec],
            _params: &ChatParams,
        ) -> Result<LlmResponse, AgentError> {
            Ok(LlmResponse {
                content: self.content.clone(),
                tool_calls: vec![],
                usage: None,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    #[test]
    fn tool_choice_mode_from_str_parses_known_values() {
        assert_eq!("auto".parse::<ToolChoiceMode>().unwrap(), ToolChoiceMode::Auto);
        assert_eq!("none".parse::<ToolChoiceMode>().unwrap(), ToolChoiceMode::None);
        assert_eq!(
            "required".parse::<ToolChoiceMode>().unwrap(),
            ToolChoiceMode::Required
        );
    }

    #[test]
    fn tool_choice_mode_from_str_rejects_unknown_value() {
        let err = "unexpected".parse::<ToolChoiceMode>().unwrap_err();
        assert!(err.contains("unknown tool_choice"));
    }

    #[tokio::test]
    async fn default_chat_stream_sends_text_then_finish() {
        let llm = StubLlm { content: "hello".to_string() };
        let (tx, mut rx) = mpsc::channel(4);
        let resp = llm
            .chat_stream(&[], &[], &ChatParams::default(), tx)
            .await
            .unwrap();
        assert_eq!(resp.content, "hello");
        match rx.recv().await.unwrap() {
            Chunk::TextDelta(s) => assert_eq!(s, "hello"),
            other => panic!("expected TextDelta, got {other:?}"),
        }
        match rx.recv().await.unwrap() {
            Chunk::Finish { reason, .. } => assert_eq!(reason, FinishReason::Stop),
            other => panic!("expected Finish, got {other:?}"),
        }
    }
}
