//! Local subprocess transport (spec §4.3 "Local subprocess, exchanging the
//! same JSON-RPC envelope over stdio").
//!
//! One line of JSON per request/response/notification, matching the
//! newline-delimited JSON-RPC convention a subprocess tool server speaks.
//! Responses are correlated back to requests by JSON-RPC `id`; a response
//! for an unknown id is logged and discarded (spec §4.3).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};

use super::{ConnectionState, RemoteTransport};
use crate::tool::{ToolError, ToolOrigin, ToolResult, ToolSpec};

type PendingTable = Arc<Mutex<HashMap<i64, oneshot::Sender<Value>>>>;

pub struct SubprocessTransport {
    command: String,
    args: Vec<String>,
    next_id: AtomicI64,
    inner: Mutex<Option<Inner>>,
}

struct Inner {
    child: Child,
    stdin: tokio::process::ChildStdin,
    pending: PendingTable,
}

impl SubprocessTransport {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        SubprocessTransport {
            command: command.into(),
            args,
            next_id: AtomicI64::new(1),
            inner: Mutex::new(None),
        }
    }

    fn next_request_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value, ToolError> {
        let id = self.next_request_id();
        let (tx, rx) = oneshot::channel();

        let mut guard = self.inner.lock().await;
        let inner = guard
            .as_mut()
            .ok_or_else(|| ToolError::Transport("subprocess not connected".into()))?;
        inner.pending.lock().await.insert(id, tx);

        let envelope = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        let mut line = serde_json::to_vec(&envelope).map_err(|e| ToolError::Transport(e.to_string()))?;
        line.push(b'\n');
        inner
            .stdin
            .write_all(&line)
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;
        drop(guard);

        tokio::time::timeout(timeout, rx)
            .await
            .map_err(|_| ToolError::Timeout)?
            .map_err(|_| ToolError::Transport("subprocess closed before responding".into()))
    }
}

#[async_trait]
impl RemoteTransport for SubprocessTransport {
    async fn connect(&self, on_state: &dyn Fn(ConnectionState)) -> Result<(), ToolError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ToolError::Transport(format!("failed to spawn tool server: {e}")))?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));

        let reader_pending = pending.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(value) = serde_json::from_str::<Value>(&line) else {
                    continue;
                };
                let Some(id) = value.get("id").and_then(Value::as_i64) else {
                    continue;
                };
                if let Some(sender) = reader_pending.lock().await.remove(&id) {
                    let _ = sender.send(value);
                }
            }
        });

        *self.inner.lock().await = Some(Inner { child, stdin, pending });

        on_state(ConnectionState::Authenticating);
        self.request("initialize", json!({}), Duration::from_secs(10)).await?;
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
                    origin: ToolOrigin::RemoteServer { server_id: self.command.clone() },
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
        let mut guard = self.inner.lock().await;
        if let Some(mut inner) = guard.take() {
            let _ = inner.child.kill().await;
        }
        Ok(())
    }
}
