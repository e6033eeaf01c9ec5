//! Tool Registry (spec §4.2): resolves a tool name to whichever invoker owns
//! it — a local callable, a remote tool-server, or a retriever corpus — and
//! validates arguments against the tool's schema before dispatching.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jsonschema::JSONSchema;
use serde_json::{json, Value};

use super::remote::RemoteToolServerClient;
use super::retriever::{synthetic_tool_name, Retriever};
use super::{Tool, ToolError, ToolInvocationContext, ToolOrigin, ToolResult, ToolSpec};

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

struct RemoteEntry {
    server_id: String,
    remote_name: String,
    spec: ToolSpec,
}

struct RetrieverEntry {
    corpus_id: String,
    retriever: Arc<dyn Retriever>,
    spec: ToolSpec,
}

/// The dispatch table for one run; frozen once the run's tool set is
/// resolved (spec §3 "the set of tools available to a run is fixed at run
/// start").
#[derive(Default)]
pub struct ToolRegistry {
    local: HashMap<String, Arc<dyn Tool>>,
    remote: HashMap<String, RemoteEntry>,
    remote_clients: HashMap<String, Arc<RemoteToolServerClient>>,
    retrievers: HashMap<String, RetrieverEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_local(&mut self, tool: Arc<dyn Tool>) {
        let spec = tool.spec();
        self.local.insert(spec.name, tool);
    }

    /// Lists the remote server's tools and adds each under this registry,
    /// tagged with `server_id` so `invoke` knows where to route it.
    pub async fn register_remote_server(
        &mut self,
        server_id: impl Into<String>,
        client: Arc<RemoteToolServerClient>,
    ) -> Result<(), ToolError> {
        let server_id = server_id.into();
        let tools = client.list_tools().await?;
        for spec in tools {
            self.remote.insert(
                spec.name.clone(),
                RemoteEntry {
                    server_id: server_id.clone(),
                    remote_name: spec.name.clone(),
                    spec,
                },
            );
        }
        self.remote_clients.insert(server_id, client);
        Ok(())
    }

    /// Adds a synthetic retrieval tool for `corpus_id` (spec §4.4).
    pub fn register_retriever(&mut self, corpus_id: impl Into<String>, retriever: Arc<dyn Retriever>) {
        let corpus_id = corpus_id.into();
        let name = synthetic_tool_name(&corpus_id);
        let spec = ToolSpec {
            name: name.clone(),
            description: format!("Search the '{corpus_id}' knowledge base for relevant passages."),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "top_k": {"type": "integer", "minimum": 1}
                },
                "required": ["query"]
            }),
            origin: ToolOrigin::Retriever { corpus_id: corpus_id.clone() },
        };
        self.retrievers.insert(name, RetrieverEntry { corpus_id, retriever, spec });
    }

    /// All tools visible to the LLM for this run (spec §4.2 `describe`).
    pub fn describe(&self) -> Vec<ToolSpec> {
        let mut specs: Vec<ToolSpec> = self.local.values().map(|t| t.spec()).collect();
        specs.extend(self.remote.values().map(|e| e.spec.clone()));
        specs.extend(self.retrievers.values().map(|e| e.spec.clone()));
        specs
    }

    /// The spec for a single named tool, for callers that want to offer the
    /// model a narrowed tool list (e.g. a retrieval-only directive turn).
    pub fn spec(&self, name: &str) -> Option<ToolSpec> {
        self.find_spec(name)
    }

    pub async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        cx: &ToolInvocationContext,
    ) -> Result<ToolResult, ToolError> {
        if cx.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let spec = self
            .find_spec(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        validate_arguments(&spec.input_schema, &arguments)?;

        let operation = self.dispatch(name, arguments, cx.timeout);
        let mut cancelled = cx.cancelled.clone();
        tokio::select! {
            result = operation => result,
            _ = cancelled.changed() => Err(ToolError::Cancelled),
        }
    }

    fn find_spec(&self, name: &str) -> Option<ToolSpec> {
        if let Some(tool) = self.local.get(name) {
            return Some(tool.spec());
        }
        if let Some(entry) = self.remote.get(name) {
            return Some(entry.spec.clone());
        }
        if let Some(entry) = self.retrievers.get(name) {
            return Some(entry.spec.clone());
        }
        None
    }

    async fn dispatch(&self, name: &str, arguments: Value, timeout: Duration) -> Result<ToolResult, ToolError> {
        if let Some(tool) = self.local.get(name) {
            let (_tx, rx) = tokio::sync::watch::channel(false);
            let mut cx = ToolInvocationContext::new(timeout, rx);
            return tokio::time::timeout(timeout, tool.invoke(arguments, &mut cx))
                .await
                .map_err(|_| ToolError::Timeout)?;
        }
        if let Some(entry) = self.remote.get(name) {
            let client = self
                .remote_clients
                .get(&entry.server_id)
                .ok_or_else(|| ToolError::Transport(format!("unknown remote server {}", entry.server_id)))?;
            return client.invoke(&entry.remote_name, arguments, timeout).await;
        }
        if let Some(entry) = self.retrievers.get(name) {
            let query = arguments
                .get("query")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::BadArguments("missing 'query'".to_string()))?;
            let top_k = arguments.get("top_k").and_then(Value::as_u64).unwrap_or(5) as usize;
            let passages = entry.retriever.search(&entry.corpus_id, query, top_k).await?;
            let content = serde_json::to_string(&passages).map_err(|e| ToolError::Remote(e.to_string()))?;
            return Ok(ToolResult::text(content));
        }
        Err(ToolError::NotFound(name.to_string()))
    }
}

fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), ToolError> {
    if schema.is_null() {
        return Ok(());
    }
    let compiled = JSONSchema::compile(schema)
        .map_err(|e| ToolError::BadArguments(format!("invalid schema: {e}")))?;
    if let Err(errors) = compiled.validate(arguments) {
        let message = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
        return Err(ToolError::BadArguments(message));
    }
    Ok(())
}

pub fn default_timeout() -> Duration {
    DEFAULT_TOOL_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct AddTool;

    #[async_trait]
    impl Tool for AddTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "add".into(),
                description: "adds two numbers".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
                    "required": ["a", "b"]
                }),
                origin: ToolOrigin::Local,
            }
        }

        async fn invoke(
            &self,
            arguments: Value,
            _cx: &mut ToolInvocationContext,
        ) -> Result<ToolResult, ToolError> {
            let a = arguments["a"].as_f64().unwrap_or(0.0);
            let b = arguments["b"].as_f64().unwrap_or(0.0);
            Ok(ToolResult::text((a + b).to_string()))
        }
    }

    fn fresh_context() -> ToolInvocationContext {
        let (_tx, rx) = tokio::sync::watch::channel(false);
        ToolInvocationContext::new(Duration::from_secs(1), rx)
    }

    #[tokio::test]
    async fn invokes_a_registered_local_tool() {
        let mut registry = ToolRegistry::new();
        registry.register_local(Arc::new(AddTool));
        let cx = fresh_context();
        let result = registry
            .invoke("add", json!({"a": 2, "b": 3}), &cx)
            .await
            .unwrap();
        assert_eq!(result.content, "5");
    }

    #[tokio::test]
    async fn rejects_arguments_failing_schema_validation() {
        let mut registry = ToolRegistry::new();
        registry.register_local(Arc::new(AddTool));
        let cx = fresh_context();
        let err = registry.invoke("add", json!({"a": "x"}), &cx).await.unwrap_err();
        assert!(matches!(err, ToolError::BadArguments(_)));
    }

    #[tokio::test]
    async fn reports_not_found_for_unknown_tool() {
        let registry = ToolRegistry::new();
        let cx = fresh_context();
        let err = registry.invoke("missing", json!({}), &cx).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
