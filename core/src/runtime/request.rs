//! The inbound request shape for `runtime::run` (spec §4.6/§6.1).

use crate::message::Message;

/// The opaque properties bag a caller attaches to a run (spec §6.1
/// `forwarded_props`). Everything here is resolved by a `RuntimeResolver`
/// before the strategy starts; the core never interprets `model_id` or the
/// various `*_ids` lists itself.
#[derive(Clone, Debug, Default)]
pub struct ForwardedProps {
    pub agent_type: String,
    pub model_id: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
    pub knowledge_base_ids: Vec<String>,
    pub mcp_connection_ids: Vec<String>,
    pub skill_ids: Vec<String>,
}

/// One call to `POST /agent/run` (spec §6.1), already decoded from the wire
/// body into the core's own types.
pub struct RunRequest {
    pub thread_id: String,
    /// Client-supplied run id; a fresh one is generated when absent.
    pub run_id: Option<String>,
    pub messages: Vec<Message>,
    pub forwarded_props: ForwardedProps,
}
