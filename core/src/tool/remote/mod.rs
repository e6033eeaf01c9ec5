//! Remote Tool-Server Client (spec §4.3, C4).
//!
//! One `RemoteToolServerClient` wraps one `RemoteTransport` (subprocess,
//! HTTP/SSE, or bidirectional socket — `subprocess`/`http_sse`/`socket`
//! below) and adds the connection state machine and reconnect-with-backoff
//! policy that is the same regardless of transport. Transports only need to
//! know how to connect, list tools, call a tool, and close; everything about
//! *when* to retry lives here.

pub mod http_sse;
pub mod socket;
pub mod subprocess;

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::tool::{ToolError, ToolResult, ToolSpec};

/// spec §4.3: `Disconnected -> Connecting -> Authenticating -> Ready ->
/// (Ready <-> Reconnecting) -> Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
    Reconnecting,
    Closed,
}

/// What every transport must support; the state machine and reconnect policy
/// live in `RemoteToolServerClient`, not here.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Establishes the connection, including any auth handshake. Reports
    /// progress through `on_state` so the client can surface `Authenticating`
    /// for transports that have one (spec §4.3 socket transport).
    async fn connect(&self, on_state: &dyn Fn(ConnectionState)) -> Result<(), ToolError>;
    async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError>;
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<ToolResult, ToolError>;
    async fn close(&self) -> Result<(), ToolError>;
}

#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        (self.initial_backoff.saturating_mul(factor)).min(self.max_backoff)
    }
}

pub struct RemoteToolServerClient {
    server_id: String,
    transport: Box<dyn RemoteTransport>,
    state: Mutex<ConnectionState>,
    reconnect: ReconnectPolicy,
}

impl RemoteToolServerClient {
    pub fn new(server_id: impl Into<String>, transport: Box<dyn RemoteTransport>) -> Self {
        RemoteToolServerClient::with_policy(server_id, transport, ReconnectPolicy::default())
    }

    pub fn with_policy(
        server_id: impl Into<String>,
        transport: Box<dyn RemoteTransport>,
        reconnect: ReconnectPolicy,
    ) -> Self {
        RemoteToolServerClient {
            server_id: server_id.into(),
            transport,
            state: Mutex::new(ConnectionState::Disconnected),
            reconnect,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().expect("connection state lock poisoned")
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().expect("connection state lock poisoned") = state;
    }

    pub async fn connect(&self) -> Result<(), ToolError> {
        self.set_state(ConnectionState::Connecting);
        let result = self
            .transport
            .connect(&|s| self.set_state(s))
            .await;
        match result {
            Ok(()) => {
                self.set_state(ConnectionState::Ready);
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Closed);
                Err(e)
            }
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError> {
        self.with_reconnect(|| self.transport.list_tools()).await
    }

    pub async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
        timeout: Duration,
    ) -> Result<ToolResult, ToolError> {
        self.with_reconnect(|| self.transport.call_tool(name, arguments.clone(), timeout))
            .await
    }

    pub async fn close(&self) -> Result<(), ToolError> {
        let result = self.transport.close().await;
        self.set_state(ConnectionState::Closed);
        result
    }

    /// Runs `op`; on `ToolError::Transport` while `Ready`, reconnects with
    /// exponential backoff up to `max_retries` before giving up (spec §4.3).
    async fn with_reconnect<F, Fut, T>(&self, op: F) -> Result<T, ToolError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ToolError>>,
    {
        if self.state() == ConnectionState::Closed {
            return Err(ToolError::Transport(format!(
                "remote tool server {} is closed",
                self.server_id
            )));
        }

        match op().await {
            Ok(value) => Ok(value),
            Err(ToolError::Transport(reason)) => {
                self.set_state(ConnectionState::Reconnecting);
                let mut attempt = 0;
                loop {
                    if attempt >= self.reconnect.max_retries {
                        self.set_state(ConnectionState::Closed);
                        return Err(ToolError::Transport(reason));
                    }
                    tokio::time::sleep(self.reconnect.backoff_for(attempt)).await;
                    attempt += 1;
                    if self.transport.connect(&|s| self.set_state(s)).await.is_ok() {
                        self.set_state(ConnectionState::Ready);
                        return op().await;
                    }
                }
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyTransport {
        failures_before_success: u32,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl RemoteTransport for FlakyTransport {
        async fn connect(&self, _on_state: &dyn Fn(ConnectionState)) -> Result<(), ToolError> {
            Ok(())
        }

        async fn list_tools(&self) -> Result<Vec<ToolSpec>, ToolError> {
            Ok(vec![])
        }

        async fn call_tool(
            &self,
            _name: &str,
            _arguments: serde_json::Value,
            _timeout: Duration,
        ) -> Result<ToolResult, ToolError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures_before_success {
                Err(ToolError::Transport("dropped".into()))
            } else {
                Ok(ToolResult::text("ok"))
            }
        }

        async fn close(&self) -> Result<(), ToolError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn reconnects_and_succeeds_within_retry_budget() {
        let transport = FlakyTransport {
            failures_before_success: 2,
            attempts: AtomicU32::new(0),
        };
        let client = RemoteToolServerClient::with_policy(
            "srv1",
            Box::new(transport),
            ReconnectPolicy {
                max_retries: 5,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
        );
        client.connect().await.unwrap();
        let result = client
            .invoke("add", serde_json::json!({"a": 1}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result.content, "ok");
        assert_eq!(client.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn closes_after_exhausting_retries() {
        let transport = FlakyTransport {
            failures_before_success: 100,
            attempts: AtomicU32::new(0),
        };
        let client = RemoteToolServerClient::with_policy(
            "srv1",
            Box::new(transport),
            ReconnectPolicy {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            },
        );
        client.connect().await.unwrap();
        let err = client
            .invoke("add", serde_json::json!({"a": 1}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Transport(_)));
        assert_eq!(client.state(), ConnectionState::Closed);
    }
}
