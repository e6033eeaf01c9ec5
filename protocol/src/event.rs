//! Wire-level event types (spec §3 Event, §6.3 Event wire types).
//!
//! Each variant carries its own `timestamp` (a monotonically non-decreasing
//! logical clock value within one run, per §3) and the payload fields listed
//! in §6.3. The encoder (`crate::encoder`) turns an `Event` into bytes; this
//! module only defines the shape.

use serde::Serialize;
use serde_json::Value;

/// Role of a message, carried on `TextMessageStart` and `ToolCallResult`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// `RUN_ERROR.code` values (spec §6.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Configuration,
    LlmError,
    ToolError,
    Cancelled,
    Timeout,
    PlanParseError,
    Internal,
}

/// Token usage surfaced in `RUN_FINISHED.result.usage`.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct UsagePayload {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Why the run stopped, surfaced in `RUN_FINISHED.result.stop_reason` (spec
/// §4.5.1: "on exhaustion the strategy ... finishes with `stop_reason=length`").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model stopped on its own (no more tool calls requested).
    Stop,
    /// A strategy's iteration cap was exhausted before the model stopped.
    Length,
}

/// One state-delta operation (§9 open question: optional extension, shape left
/// to callers; `op` follows JSON-Patch naming but is not validated here).
#[derive(Clone, Debug, Serialize)]
pub struct StateDeltaOp {
    pub op: String,
    pub path: String,
    pub value: Value,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunFinishedResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsagePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

/// Wire event: the fifteen variants of spec §3/§6.3.
///
/// `#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]` gives each
/// variant the exact wire type name in the §6.3 table (e.g. `RUN_STARTED`).
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    RunStarted {
        thread_id: String,
        run_id: String,
        timestamp: u64,
    },
    RunFinished {
        thread_id: String,
        run_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<RunFinishedResult>,
        timestamp: u64,
    },
    RunError {
        message: String,
        code: ErrorCode,
        timestamp: u64,
    },
    StepStarted {
        step_name: String,
        timestamp: u64,
    },
    StepContent {
        step_name: String,
        delta: String,
        timestamp: u64,
    },
    StepFinished {
        step_name: String,
        timestamp: u64,
    },
    TextMessageStart {
        message_id: String,
        role: Role,
        timestamp: u64,
    },
    TextMessageContent {
        message_id: String,
        delta: String,
        timestamp: u64,
    },
    TextMessageEnd {
        message_id: String,
        timestamp: u64,
    },
    ToolCallStart {
        tool_call_id: String,
        tool_call_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
        timestamp: u64,
    },
    ToolCallArgs {
        tool_call_id: String,
        delta: String,
        timestamp: u64,
    },
    ToolCallEnd {
        tool_call_id: String,
        timestamp: u64,
    },
    ToolCallResult {
        message_id: String,
        tool_call_id: String,
        content: String,
        role: Role,
        timestamp: u64,
    },
    StateSnapshot {
        snapshot: Value,
        timestamp: u64,
    },
    StateDelta {
        delta: Vec<StateDeltaOp>,
        timestamp: u64,
    },
}

impl Event {
    /// The wire type name, e.g. `"RUN_STARTED"` — useful for SSE `event:` lines
    /// without re-deriving it from the serialized JSON.
    pub fn wire_type(&self) -> &'static str {
        match self {
            Event::RunStarted { .. } => "RUN_STARTED",
            Event::RunFinished { .. } => "RUN_FINISHED",
            Event::RunError { .. } => "RUN_ERROR",
            Event::StepStarted { .. } => "STEP_STARTED",
            Event::StepContent { .. } => "STEP_CONTENT",
            Event::StepFinished { .. } => "STEP_FINISHED",
            Event::TextMessageStart { .. } => "TEXT_MESSAGE_START",
            Event::TextMessageContent { .. } => "TEXT_MESSAGE_CONTENT",
            Event::TextMessageEnd { .. } => "TEXT_MESSAGE_END",
            Event::ToolCallStart { .. } => "TOOL_CALL_START",
            Event::ToolCallArgs { .. } => "TOOL_CALL_ARGS",
            Event::ToolCallEnd { .. } => "TOOL_CALL_END",
            Event::ToolCallResult { .. } => "TOOL_CALL_RESULT",
            Event::StateSnapshot { .. } => "STATE_SNAPSHOT",
            Event::StateDelta { .. } => "STATE_DELTA",
        }
    }

    /// The event's logical timestamp.
    pub fn timestamp(&self) -> u64 {
        match self {
            Event::RunStarted { timestamp, .. }
            | Event::RunFinished { timestamp, .. }
            | Event::RunError { timestamp, .. }
            | Event::StepStarted { timestamp, .. }
            | Event::StepContent { timestamp, .. }
            | Event::StepFinished { timestamp, .. }
            | Event::TextMessageStart { timestamp, .. }
            | Event::TextMessageContent { timestamp, .. }
            | Event::TextMessageEnd { timestamp, .. }
            | Event::ToolCallStart { timestamp, .. }
            | Event::ToolCallArgs { timestamp, .. }
            | Event::ToolCallEnd { timestamp, .. }
            | Event::ToolCallResult { timestamp, .. }
            | Event::StateSnapshot { timestamp, .. }
            | Event::StateDelta { timestamp, .. } => *timestamp,
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_type_matches_serialized_tag() {
        let ev = Event::RunStarted {
            thread_id: "t1".into(),
            run_id: "r1".into(),
            timestamp: 1,
        };
        let value = ev.to_value().unwrap();
        assert_eq!(value["type"], ev.wire_type());
    }

    #[test]
    fn run_finished_omits_missing_usage() {
        let ev = Event::RunFinished {
            thread_id: "t1".into(),
            run_id: "r1".into(),
            result: None,
            timestamp: 2,
        };
        let value = ev.to_value().unwrap();
        assert!(value.get("result").is_none());
    }
}
