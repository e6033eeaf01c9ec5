//! OpenAI-compatible chat completions client.
//!
//! Talks to any server implementing the `/chat/completions` surface (OpenAI
//! itself, or a compatible gateway — the base URL is part of configuration,
//! spec §4.1). Streaming responses are Server-Sent Events; `eventsource-stream`
//! turns the response body into a stream of `data: ...` frames, mirroring the
//! manual SSE line-parsing the remote tool-server HTTP transport does, but
//! via a dedicated crate since this path has no session-id/MCP envelope to
//! track alongside it.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{
    ChatParams, Chunk, FinishReason, LlmClient, LlmResponse, LlmUsage, ToolCallDelta,
    ToolCallRequest, ToolChoiceMode,
};
use crate::error::AgentError;
use crate::message::{Message, Role};
use crate::tool::ToolSpec;

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
    default_top_p: Option<f32>,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        OpenAiClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            default_temperature: None,
            default_max_tokens: None,
            default_top_p: None,
        }
    }

    /// Sets the sampling defaults frozen at construction (spec §4.1); a
    /// per-call `ChatParams` value still wins when present.
    pub fn with_defaults(mut self, temperature: Option<f32>, max_tokens: Option<u32>, top_p: Option<f32>) -> Self {
        self.default_temperature = temperature;
        self.default_max_tokens = max_tokens;
        self.default_top_p = top_p;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, messages: &[Message], tools: &[ToolSpec], params: &ChatParams, stream: bool) -> WireRequest {
        WireRequest {
            model: self.model.clone(),
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: tools.iter().map(WireTool::from).collect(),
            tool_choice: wire_tool_choice(params.tool_choice, tools.is_empty()),
            temperature: params.temperature.or(self.default_temperature),
            max_tokens: params.max_tokens.or(self.default_max_tokens),
            top_p: params.top_p.or(self.default_top_p),
            stream,
            stream_options: stream.then_some(WireStreamOptions { include_usage: true }),
        }
    }

    async fn send(&self, body: &WireRequest) -> Result<reqwest::Response, AgentError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::LlmTransport(e.to_string()))?;

        if response.status() == reqwest::StatusCode::BAD_REQUEST {
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::LlmBadRequest(text));
        }
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AgentError::LlmProvider(format!("{status}: {text}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        params: &ChatParams,
    ) -> Result<LlmResponse, AgentError> {
        let body = self.build_request(messages, tools, params, false);
        let response = self.send(&body).await?;
        let parsed: WireCompletion = response
            .json()
            .await
            .map_err(|e| AgentError::LlmProvider(format!("unparseable response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::LlmProvider("no choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(WireToolCall::into_request)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: parsed.usage.map(Into::into),
            finish_reason: finish_reason_from_wire(choice.finish_reason.as_deref()),
        })
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
        params: &ChatParams,
        chunk_tx: mpsc::Sender<Chunk>,
    ) -> Result<LlmResponse, AgentError> {
        let body = self.build_request(messages, tools, params, true);
        let response = self.send(&body).await?;

        let mut content = String::new();
        let mut pending_calls: BTreeMap<usize, PendingCall> = BTreeMap::new();
        let mut usage = None;
        let mut finish_reason = FinishReason::Stop;

        let mut events = response.bytes_stream().eventsource();
        let first_byte_timeout = Duration::from_secs(30);
        let inter_chunk_timeout = Duration::from_secs(30);
        let mut first = true;

        loop {
            let timeout = if first { first_byte_timeout } else { inter_chunk_timeout };
            let next = tokio::time::timeout(timeout, events.next())
                .await
                .map_err(|_| AgentError::LlmTransport("timed out waiting for stream chunk".to_string()))?;
            first = false;

            let Some(event) = next else { break };
            let event = event.map_err(|e| AgentError::LlmTransport(e.to_string()))?;
            if event.data == "[DONE]" {
                break;
            }
            let chunk: WireChunk = serde_json::from_str(&event.data)
                .map_err(|e| AgentError::LlmProvider(format!("unparseable stream chunk: {e}")))?;

            if let Some(u) = chunk.usage {
                usage = Some(LlmUsage::from(u));
            }

            let Some(choice) = chunk.choices.into_iter().next() else {
                continue;
            };

            if let Some(reason) = choice.finish_reason.as_deref() {
                finish_reason = finish_reason_from_wire(Some(reason));
            }

            if let Some(delta) = choice.delta.content {
                if !delta.is_empty() {
                    content.push_str(&delta);
                    let _ = chunk_tx.send(Chunk::TextDelta(delta)).await;
                }
            }

            for tc in choice.delta.tool_calls.unwrap_or_default() {
                let entry = pending_calls.entry(tc.index).or_default();
                if let Some(id) = tc.id.clone() {
                    entry.id = Some(id);
                }
                if let Some(func) = &tc.function {
                    if let Some(name) = func.name.clone() {
                        entry.name = Some(name);
                    }
                    if let Some(args) = &func.arguments {
                        entry.arguments.push_str(args);
                        let _ = chunk_tx
                            .send(Chunk::ToolCallArgDelta(ToolCallDelta {
                                index: tc.index,
                                id: tc.id.clone(),
                                name: func.name.clone(),
                                arguments_delta: args.clone(),
                            }))
                            .await;
                    }
                }
            }
        }

        let mut tool_calls = Vec::with_capacity(pending_calls.len());
        for (_, call) in pending_calls {
            let arguments = if call.arguments.is_empty() {
                serde_json::Value::Object(Default::default())
            } else {
                serde_json::from_str(&call.arguments)
                    .map_err(|e| AgentError::LlmProvider(format!("bad tool call arguments: {e}")))?
            };
            tool_calls.push(ToolCallRequest {
                id: call.id.unwrap_or_default(),
                name: call.name.unwrap_or_default(),
                arguments,
            });
        }
        if !tool_calls.is_empty() {
            finish_reason = FinishReason::ToolCalls;
        }

        let _ = chunk_tx.send(Chunk::Finish { reason: finish_reason, usage }).await;

        Ok(LlmResponse {
            content,
            tool_calls,
            usage,
            finish_reason,
        })
    }
}

#[derive(Default)]
struct PendingCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

fn finish_reason_from_wire(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("stop") => FinishReason::Stop,
        Some("tool_calls") => FinishReason::ToolCalls,
        Some("length") => FinishReason::Length,
        Some(_) | None => FinishReason::Stop,
    }
}

fn wire_tool_choice(mode: ToolChoiceMode, no_tools: bool) -> Option<String> {
    if no_tools {
        return None;
    }
    Some(
        match mode {
            ToolChoiceMode::Auto => "auto",
            ToolChoiceMode::None => "none",
            ToolChoiceMode::Required => "required",
        }
        .to_string(),
    )
}

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<WireStreamOptions>,
}

#[derive(Serialize)]
struct WireStreamOptions {
    include_usage: bool,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

impl From<&Message> for WireMessage {
    fn from(m: &Message) -> Self {
        WireMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
                Role::Tool => "tool",
            },
            content: m.content.clone(),
        }
    }
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionSpec,
}

#[derive(Serialize)]
struct WireFunctionSpec {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolSpec> for WireTool {
    fn from(spec: &ToolSpec) -> Self {
        WireTool {
            kind: "function",
            function: WireFunctionSpec {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.input_schema.clone(),
            },
        }
    }
}

#[derive(Deserialize)]
struct WireCompletion {
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunctionCall,
}

impl WireToolCall {
    fn into_request(self) -> Result<ToolCallRequest, AgentError> {
        let arguments = serde_json::from_str(&self.function.arguments)
            .map_err(|e| AgentError::LlmProvider(format!("bad tool call arguments: {e}")))?;
        Ok(ToolCallRequest {
            id: self.id,
            name: self.function.name,
            arguments,
        })
    }
}

#[derive(Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<WireUsage> for LlmUsage {
    fn from(u: WireUsage) -> Self {
        LlmUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Deserialize)]
struct WireChunk {
    choices: Vec<WireChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChunkChoice {
    delta: WireDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Deserialize)]
struct WireToolCallDelta {
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionCallDelta>,
}

#[derive(Deserialize)]
struct WireFunctionCallDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_maps_tool_calls() {
        assert_eq!(finish_reason_from_wire(Some("tool_calls")), FinishReason::ToolCalls);
        assert_eq!(finish_reason_from_wire(Some("length")), FinishReason::Length);
        assert_eq!(finish_reason_from_wire(None), FinishReason::Stop);
    }

    #[test]
    fn tool_choice_is_none_when_no_tools_offered() {
        assert_eq!(wire_tool_choice(ToolChoiceMode::Auto, true), None);
        assert_eq!(wire_tool_choice(ToolChoiceMode::Required, false), Some("required".to_string()));
    }
}
