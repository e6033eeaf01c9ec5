//! HTTP request/response-streaming transport (spec §4.3 "server-sent events
//! for server->client messages").
//!
//! Each JSON-RPC request is POSTed; the server may answer with a plain JSON
//! body or with an SSE stream carrying a single `data:` event holding the
//! JSON-RPC response — mirroring the MCP Streamable-HTTP convention. A
//! session id handed back on the first response is carried on subsequent
//! requests via a header.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ConnectionState, RemoteTransport};
use crate::tool::{ToolError, ToolOrigin, ToolResult, ToolSpec};

const SESSION_HEADER: &str = "MCP-Session-Id";

pub struct HttpSseTransport {
    base_url: String,
    bearer_token: Option<String>,
    http: reqwest::Client,
    next_id: AtomicI64,
    session_id: Mutex<Option<String>>,
}

impl HttpSseTransport {
    pub fn new(base_url: impl Into<String>, bearer_token: Option<String>) -> Self {
        HttpSseTransport {
            base_url: base_url.into(),
            bearer_token,
            http: reqwest::Client::new(),
            next_id: AtomicI64::new(1),
            session_id: Mutex::new(None),
        }
    }

    async fn request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let envelope = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});

        let mut req = self
            .http
            .post(&self.base_url)
            .header("Accept", "application/json, text/event-stream")
            .json(&envelope)
            .timeout(timeout);
        if let Some(token) = &self.bearer_token {
            req = req.bearer_auth(token);
        }
        if let Some(session_id) = self.session_id.lock().expect("session id lock poisoned").clone() {
            req = req.header(SESSION_HEADER, session_id);
        }

        let response = req.send().await.map_err(|e| ToolError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ToolError::Transport(format!("http status {}", response.status())));
        }
        if let Some(session_id) = response.headers().get(SESSION_HEADER) {
            if let Ok(session_id) = session_id.to_str() {
                *self.session_id.lock().expect("session id lock poisoned") = Some(session_id.to_string());
            }
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await.map_err(|e| ToolError::Transport(e.to_string()))?;

        if content_type.contains("text/event-stream") {
            parse_sse_json_payload(&body)
        } else {
            serde_json::from_str(&body).map_err(|e| ToolError::Transport(e.to_string()))
        }
    }
}

fn parse_sse_json_payload(body: &str) -> Result<Value, ToolError> {
    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) {
            return serde_json::from_str(data.trim()).map_err(|e| ToolError::Transport(e.to_string()));
        }
    }
    Err(ToolError::Transport("SSE response carried no data event".into()))
}

#[async_trait]
impl RemoteTransport for HttpSseTransport {
    async fn connect(&self, on_state: &dyn Fn(ConnectionState)) -> Result<(), ToolError> {
        on_state(ConnectionState::Authenticating);
        self.request("initialize", json!({}), Duration::from_secs(10)).await?;
        self.request("notifications/initialized", json!({}), Duration::from_secs(10))
            .await
            .ok();
        on_state(ConnectionState::Ready);
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError> {
        let response = self.request("tools/list", json!({}), Duration::from_secs(10)).await?;
        let tools = response
            .get("result")
            .and_then(|r| r.get("tools"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(tools
            .into_iter()
            .filter_map(|t| {
                Some(ToolSpec {
                    name: t.get("name")?.as_str()?.to_string(),
                    description: t
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    input_schema: t.get("inputSchema").cloned().unwrap_or(json!({})),
                    origin: ToolOrigin::RemoteServer { server_id: self.base_url.clone() },
                })
            })
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<ToolResult, ToolError> {
        let response = self
            .request("tools/call", json!({"name": name, "arguments": arguments}), timeout)
            .await?;
        if let Some(error) = response.get("error") {
            return Err(ToolError::Remote(error.to_string()));
        }
        let content = response
            .get("result")
            .and_then(|r| r.get("content"))
            .map(|c| c.to_string())
            .unwrap_or_default();
        Ok(ToolResult::text(content))
    }

    async fn close(&self) -> Result<(), ToolError> {
        *self.session_id.lock().expect("session id lock poisoned") = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_value_out_of_a_single_sse_data_line() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n";
        let value = parse_sse_json_payload(body).unwrap();
        assert_eq!(value["id"], 1);
    }

    #[test]
    fn rejects_sse_body_without_a_data_line() {
        let body = "event: message\n\n";
        assert!(parse_sse_json_payload(body).is_err());
    }
}
