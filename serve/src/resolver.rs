//! Default `RuntimeResolver`: turns `forwarded_props.model_id` into an
//! `OpenAiClient` configured from the process environment (populated by
//! `agent-config` at startup), and builds an empty `ToolRegistry` — wiring
//! concrete local tools, remote tool-servers, and retrievers onto that
//! registry is a deployment concern outside the core (spec §1).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use agent_core::{AgentError, ForwardedProps, LlmClient, OpenAiClient, RuntimeResolver, ToolRegistry};

pub struct EnvResolver {
    base_url: String,
    api_key: String,
}

impl EnvResolver {
    pub fn from_env() -> Self {
        EnvResolver {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
        }
    }
}

#[async_trait]
impl RuntimeResolver for EnvResolver {
    async fn resolve_llm(&self, props: &ForwardedProps) -> Result<Arc<dyn LlmClient>, AgentError> {
        if self.api_key.is_empty() {
            return Err(AgentError::Configuration(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }
        if props.model_id.is_empty() {
            return Err(AgentError::Configuration("model_id is required".to_string()));
        }
        let client = OpenAiClient::new(self.base_url.clone(), self.api_key.clone(), props.model_id.clone())
            .with_defaults(props.temperature, props.max_tokens, None);
        Ok(Arc::new(client))
    }

    async fn resolve_tools(&self, props: &ForwardedProps) -> Result<Arc<ToolRegistry>, AgentError> {
        if !props.knowledge_base_ids.is_empty() || !props.mcp_connection_ids.is_empty() {
            warn!(
                knowledge_base_ids = ?props.knowledge_base_ids,
                mcp_connection_ids = ?props.mcp_connection_ids,
                "no retriever or remote tool-server wiring configured for this deployment; \
                 tools referencing these ids will fail with ToolNotFound"
            );
        }
        Ok(Arc::new(ToolRegistry::new()))
    }
}
