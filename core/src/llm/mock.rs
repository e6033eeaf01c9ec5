//! Fixed/scripted LLM client for tests (no network, no provider).

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChatParams, Chunk, FinishReason, LlmClient, LlmResponse};
use crate::error::AgentError;
use crate::message::Message;
use crate::tool::ToolSpec;

/// Returns one `LlmResponse` per call, in order; the last response repeats
/// once the script is exhausted so a strategy that loops one extra time
/// doesn't panic mid-test.
pub struct MockLlm {
    script: Mutex<Vec<LlmResponse>>,
}

impl MockLlm {
    pub fn new(script: Vec<LlmResponse>) -> Self {
        assert!(!script.is_empty(), "MockLlm needs at least one scripted response");
        MockLlm {
            script: Mutex::new(script),
        }
    }

    /// Convenience for a single-turn, no-tool-call response.
    pub fn fixed_text(text: impl Into<String>) -> Self {
        MockLlm::new(vec![LlmResponse {
            content: text.into(),
            tool_calls: vec![],
            usage: None,
            finish_reason: FinishReason::Stop,
        }])
    }

    fn next_response(&self) -> LlmResponse {
        let mut script = self.script.lock().expect("MockLlm script lock poisoned");
        if script.len() > 1 {
            script.remove(0)
        } else {
            script[0].clone()
        }
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn chat(
        &self,
        _messages: &[Message],
        _tools: &[ToolSpec],
        _params: &ChatParams,
    ) -> Result<LlmResponse, AgentError> {
        Ok(self.next_response())
    }

    async fn chat_stream(
        &self,
        _messages: &[Message],
        _tools: &[ToolSpec],
        _params: &ChatParams,
        chunk_tx: mpsc::Sender<Chunk>,
    ) -> Result<LlmResponse, AgentError> {
        let response = self.next_response();
        if !response.content.is_empty() {
            let _ = chunk_tx.send(Chunk::TextDelta(response.content.clone())).await;
        }
        for (index, call) in response.tool_calls.iter().enumerate() {
            let _ = chunk_tx
                .send(Chunk::ToolCallArgDelta(super::ToolCallDelta {
                    index,
                    id: Some(call.id.clone()),
                    name: Some(call.name.clone()),
                    arguments_delta: call.arguments.to_string(),
                }))
                .await;
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

    #[tokio::test]
    async fn fixed_text_returns_same_response_every_call() {
        let llm = MockLlm::fixed_text("hi");
        let params = ChatParams::default();
        let first = llm.chat(&[], &[], &params).await.unwrap();
        let second = llm.chat(&[], &[], &params).await.unwrap();
        assert_eq!(first.content, "hi");
        assert_eq!(second.content, "hi");
    }

    #[tokio::test]
    async fn scripted_responses_are_consumed_in_order() {
        let llm = MockLlm::new(vec![
            LlmResponse {
                content: "first".into(),
                tool_calls: vec![],
                usage: None,
                finish_reason: FinishReason::Stop,
            },
            LlmResponse {
                content: "second".into(),
                tool_calls: vec![],
                usage: None,
                finish_reason: FinishReason::Stop,
            },
        ]);
        let params = ChatParams::default();
        let first = llm.chat(&[], &[], &params).await.unwrap();
        let second = llm.chat(&[], &[], &params).await.unwrap();
        let third = llm.chat(&[], &[], &params).await.unwrap();
        assert_eq!(first.content, "first");
        assert_eq!(second.content, "second");
        assert_eq!(third.content, "second");
    }
}
