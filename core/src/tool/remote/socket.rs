//! Bidirectional socket transport (spec §4.3/§6.4): an explicit envelope
//! `{type, session_id, payload, timestamp}` over a websocket, `payload`
//! carrying a JSON-RPC 2.0 object. First message is `auth` with a bearer
//! token; the server replies with a session id or a failure. After auth,
//! `ping`/`pong` envelopes are the heartbeat: the server pings, the client
//! must pong with the same session id, and the client treats a missing
//! `ping` beyond `heartbeat_interval * 3` as a dead connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::{ConnectionState, RemoteTransport};
use crate::tool::{ToolError, ToolOrigin, ToolResult, ToolSpec};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    timestamp: u64,
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

type PendingTable = Arc<Mutex<HashMap<i64, oneshot::Sender<Value>>>>;

struct ConnectedState {
    session_id: String,
    outbound: mpsc::UnboundedSender<WsMessage>,
    pending: PendingTable,
    last_ping: Arc<Mutex<Instant>>,
}

pub struct SocketTransport {
    url: String,
    bearer_token: String,
    /// Server's advertised heartbeat interval; the watchdog fires at 3x this.
    heartbeat_interval: Duration,
    next_id: AtomicI64,
    connected: Mutex<Option<ConnectedState>>,
}

impl SocketTransport {
    pub fn new(url: impl Into<String>, bearer_token: impl Into<String>, heartbeat_interval: Duration) -> Self {
        SocketTransport {
            url: url.into(),
            bearer_token: bearer_token.into(),
            heartbeat_interval,
            next_id: AtomicI64::new(1),
            connected: Mutex::new(None),
        }
    }

    fn is_dead(last_ping: &Instant, heartbeat_interval: Duration) -> bool {
        last_ping.elapsed() > heartbeat_interval * 3
    }
}

#[async_trait]
impl RemoteTransport for SocketTransport {
    async fn connect(&self, on_state: &dyn Fn(ConnectionState)) -> Result<(), ToolError> {
        on_state(ConnectionState::Connecting);
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;
        let (mut write, mut read) = ws_stream.split();

        on_state(ConnectionState::Authenticating);
        let auth = Envelope {
            kind: "auth".into(),
            session_id: None,
            token: Some(self.bearer_token.clone()),
            payload: None,
            timestamp: now_millis(),
        };
        write
            .send(WsMessage::Text(serde_json::to_string(&auth).unwrap()))
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        let auth_reply = read
            .next()
            .await
            .ok_or_else(|| ToolError::Transport("socket closed before auth reply".into()))?
            .map_err(|e| ToolError::Transport(e.to_string()))?;
        let auth_envelope: Envelope = match auth_reply {
            WsMessage::Text(text) => {
                serde_json::from_str(&text).map_err(|e| ToolError::Transport(e.to_string()))?
            }
            _ => return Err(ToolError::Transport("expected text auth reply".into())),
        };
        if auth_envelope.kind == "error" {
            return Err(ToolError::Transport(format!(
                "authentication rejected: {:?}",
                auth_envelope.payload
            )));
        }
        let session_id = auth_envelope
            .session_id
            .ok_or_else(|| ToolError::Transport("auth reply carried no session id".into()))?;

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if write.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let last_ping = Arc::new(Mutex::new(Instant::now()));

        let reader_pending = pending.clone();
        let reader_last_ping = last_ping.clone();
        let reader_session_id = session_id.clone();
        let reader_outbound = outbound_tx.clone();
        tokio::spawn(async move {
            while let Some(Ok(msg)) = read.next().await {
                let WsMessage::Text(text) = msg else { continue };
                let Ok(envelope) = serde_json::from_str::<Envelope>(&text) else { continue };
                match envelope.kind.as_str() {
                    "ping" => {
                        *reader_last_ping.lock().await = Instant::now();
                        let pong = Envelope {
                            kind: "pong".into(),
                            session_id: Some(reader_session_id.clone()),
                            token: None,
                            payload: None,
                            timestamp: now_millis(),
                        };
                        let _ = reader_outbound.send(WsMessage::Text(serde_json::to_string(&pong).unwrap()));
                    }
                    "message" => {
                        if let Some(payload) = envelope.payload {
                            if let Some(id) = payload.get("id").and_then(Value::as_i64) {
                                if let Some(sender) = reader_pending.lock().await.remove(&id) {
                                    let _ = sender.send(payload);
                                }
                            }
                        }
                    }
                    "close" | "error" => break,
                    _ => {}
                }
            }
        });

        *self.connected.lock().await = Some(ConnectedState {
            session_id,
            outbound: outbound_tx,
            pending,
            last_ping,
        });
        on_state(ConnectionState::Ready);
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError> {
        let response = self.call_jsonrpc("tools/list", json!({}), Duration::from_secs(10)).await?;
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
                    origin: ToolOrigin::RemoteServer { server_id: self.url.clone() },
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
            .call_jsonrpc("tools/call", json!({"name": name, "arguments": arguments}), timeout)
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
        if let Some(state) = self.connected.lock().await.take() {
            let close = Envelope {
                kind: "close".into(),
                session_id: Some(state.session_id),
                token: None,
                payload: None,
                timestamp: now_millis(),
            };
            let _ = state.outbound.send(WsMessage::Text(serde_json::to_string(&close).unwrap()));
        }
        Ok(())
    }
}

impl SocketTransport {
    async fn call_jsonrpc(&self, method: &str, params: Value, timeout: Duration) -> Result<Value, ToolError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let guard = self.connected.lock().await;
        let state = guard
            .as_ref()
            .ok_or_else(|| ToolError::Transport("socket not connected".into()))?;

        if Self::is_dead(&*state.last_ping.lock().await, self.heartbeat_interval) {
            return Err(ToolError::Transport("missed heartbeat, connection presumed dead".into()));
        }

        let (tx, rx) = oneshot::channel();
        state.pending.lock().await.insert(id, tx);

        let envelope = Envelope {
            kind: "message".into(),
            session_id: Some(state.session_id.clone()),
            token: None,
            payload: Some(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})),
            timestamp: now_millis(),
        };
        state
            .outbound
            .send(WsMessage::Text(serde_json::to_string(&envelope).unwrap()))
            .map_err(|_| ToolError::Transport("socket writer task gone".into()))?;
        drop(guard);

        tokio::time::timeout(timeout, rx)
            .await
            .map_err(|_| ToolError::Timeout)?
            .map_err(|_| ToolError::Transport("socket closed before responding".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_dead_once_past_three_missed_heartbeat_intervals() {
        let interval = Duration::from_millis(10);
        let stale = Instant::now() - Duration::from_millis(31);
        assert!(SocketTransport::is_dead(&stale, interval));
        let fresh = Instant::now();
        assert!(!SocketTransport::is_dead(&fresh, interval));
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = Envelope {
            kind: "ping".into(),
            session_id: Some("s1".into()),
            token: None,
            payload: None,
            timestamp: 1234,
        };
        let json = serde_json::to_string(&envelope).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, "ping");
        assert_eq!(back.session_id.as_deref(), Some("s1"));
    }
}
