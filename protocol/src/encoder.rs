//! Event encoder (spec §4.7): turns one `Event` into a wire frame.
//!
//! Stateless and order-preserving — grounded on the teacher's
//! `stream-event::envelope::to_json`, which is likewise a pure function from
//! one event to one JSON value with no buffering or reordering.

use crate::event::Event;

/// Negotiated wire format (spec §6.1 content negotiation).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    /// `Accept: text/event-stream` → SSE frames.
    Sse,
    /// `Accept: application/octet-stream` → length-prefixed JSON.
    LengthPrefixed,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Stateless encoder: `Event` -> wire bytes. Never reorders or buffers.
#[derive(Clone, Copy, Debug, Default)]
pub struct EventEncoder;

impl EventEncoder {
    pub fn new() -> Self {
        Self
    }

    pub fn encode(&self, event: &Event, format: WireFormat) -> Result<Vec<u8>, EncodeError> {
        match format {
            WireFormat::Sse => self.encode_sse(event),
            WireFormat::LengthPrefixed => self.encode_length_prefixed(event),
        }
    }

    /// `event: <TYPE>\ndata: <json>\n\n` (spec §4.7 / §6.3).
    pub fn encode_sse(&self, event: &Event) -> Result<Vec<u8>, EncodeError> {
        let json = serde_json::to_string(event)?;
        let mut out = String::with_capacity(json.len() + 32);
        out.push_str("event: ");
        out.push_str(event.wire_type());
        out.push('\n');
        out.push_str("data: ");
        out.push_str(&json);
        out.push_str("\n\n");
        Ok(out.into_bytes())
    }

    /// 4-byte big-endian length prefix followed by the JSON payload.
    pub fn encode_length_prefixed(&self, event: &Event) -> Result<Vec<u8>, EncodeError> {
        let json = serde_json::to_vec(event)?;
        let len = u32::try_from(json.len()).map_err(|_| {
            EncodeError::Serialize(serde::ser::Error::custom("event payload exceeds u32 length"))
        })?;
        let mut out = Vec::with_capacity(4 + json.len());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&json);
        Ok(out)
    }

    /// Parses one SSE frame back into `(wire_type, json_value)`. Used by the
    /// round-trip property test (spec §8 property 8); the runtime itself
    /// never decodes events it produced.
    pub fn decode_sse(&self, frame: &str) -> Result<(String, serde_json::Value), EncodeError> {
        let mut wire_type = String::new();
        let mut data_line = String::new();
        for line in frame.lines() {
            if let Some(rest) = line.strip_prefix("event: ") {
                wire_type = rest.to_string();
            } else if let Some(rest) = line.strip_prefix("data: ") {
                data_line = rest.to_string();
            }
        }
        let value: serde_json::Value = serde_json::from_str(&data_line)?;
        Ok((wire_type, value))
    }
}

use serde::ser::Error as _;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;

    fn sample() -> Event {
        Event::StepContent {
            step_name: "thinking".into(),
            delta: "hello".into(),
            timestamp: 7,
        }
    }

    #[test]
    fn sse_round_trip_recovers_logical_event() {
        let enc = EventEncoder::new();
        let ev = sample();
        let frame = enc.encode_sse(&ev).unwrap();
        let frame = String::from_utf8(frame).unwrap();
        assert!(frame.starts_with("event: STEP_CONTENT\n"));
        assert!(frame.ends_with("\n\n"));
        let (wire_type, value) = enc.decode_sse(&frame).unwrap();
        assert_eq!(wire_type, "STEP_CONTENT");
        assert_eq!(value["step_name"], "thinking");
        assert_eq!(value["delta"], "hello");
        assert_eq!(value["timestamp"], 7);
    }

    #[test]
    fn length_prefixed_prefix_matches_payload_len() {
        let enc = EventEncoder::new();
        let ev = sample();
        let framed = enc.encode_length_prefixed(&ev).unwrap();
        let len = u32::from_be_bytes(framed[0..4].try_into().unwrap()) as usize;
        assert_eq!(framed.len() - 4, len);
        let value: serde_json::Value = serde_json::from_slice(&framed[4..]).unwrap();
        assert_eq!(value["type"], "STEP_CONTENT");
    }

    #[test]
    fn encoder_does_not_reorder_a_sequence() {
        let enc = EventEncoder::new();
        let events = vec![
            Event::RunStarted {
                thread_id: "t".into(),
                run_id: "r".into(),
                timestamp: 1,
            },
            sample(),
            Event::RunFinished {
                thread_id: "t".into(),
                run_id: "r".into(),
                result: None,
                timestamp: 9,
            },
        ];
        let encoded: Vec<_> = events
            .iter()
            .map(|e| enc.encode_sse(e).unwrap())
            .collect();
        let decoded: Vec<_> = encoded
            .iter()
            .map(|f| enc.decode_sse(std::str::from_utf8(f).unwrap()).unwrap().0)
            .collect();
        assert_eq!(
            decoded,
            vec!["RUN_STARTED".to_string(), "STEP_CONTENT".to_string(), "RUN_FINISHED".to_string()]
        );
    }
}
