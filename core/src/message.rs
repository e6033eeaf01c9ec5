//! Conversation data model (spec §3 Message).
//!
//! A `Message` is immutable once appended to a `RunContext`; strategies only
//! ever append, never mutate or remove.

use agent_protocol::Role as WireRole;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl From<Role> for WireRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => WireRole::User,
            Role::Assistant => WireRole::Assistant,
            Role::System => WireRole::System,
            Role::Tool => WireRole::Tool,
        }
    }
}

/// One item in a conversation thread (spec §3).
///
/// `tool_call_id` is set only on tool-result messages (`role == Tool`); it
/// names the `ToolCall` this message is the result of.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Message {
            id: id.into(),
            role: Role::User,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Message {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn system(id: impl Into<String>, content: impl Into<String>) -> Self {
        Message {
            id: id.into(),
            role: Role::System,
            content: content.into(),
            tool_call_id: None,
        }
    }

    /// A tool-result message, tied back to the `ToolCall` it answers.
    pub fn tool_result(
        id: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Message {
            id: id.into(),
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}
