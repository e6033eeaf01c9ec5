//! The JSON shapes on the wire for `POST /agent/run` and its stop endpoint
//! (spec §6.1/§6.2). Decoded into `agent_core` types at the edge; nothing
//! downstream of `run_endpoint::post_run` touches these again.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub id: String,
    pub role: String,
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct WireForwardedProps {
    pub agent_type: String,
    pub model_id: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub knowledge_base_ids: Vec<String>,
    #[serde(default)]
    pub mcp_connection_ids: Vec<String>,
    #[serde(default)]
    pub skill_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RunRequestBody {
    pub thread_id: String,
    pub run_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
    pub forwarded_props: WireForwardedProps,
}

#[derive(Debug, Serialize)]
pub struct StopResponseBody {
    pub code: u32,
    pub data: StopResponseData,
}

#[derive(Debug, Serialize)]
pub struct StopResponseData {
    pub run_id: String,
    pub stopped: bool,
}
