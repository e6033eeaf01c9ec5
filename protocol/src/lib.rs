//! Wire-level event types and encoders for the agent runtime's event stream
//! (spec §3 Event, §4.7 Event Encoder, §6.3 Event wire types).
//!
//! This crate has no dependency on the runtime core: it defines the wire
//! shape only. `agent-core` builds `Event` values as it drives a run and
//! hands them to `EventEncoder`.

pub mod encoder;
pub mod event;

pub use encoder::{EncodeError, EventEncoder, WireFormat};
pub use event::{ErrorCode, Event, Role, RunFinishedResult, StateDeltaOp, StopReason, UsagePayload};
