//! Per-run mutable state (spec §3 RunContext, C6).
//!
//! Owned exclusively by the one Runtime invocation driving this run; no
//! concurrent writes are permitted (spec §3). Other components — strategies,
//! the tool registry — only ever see opaque ids (`ToolCall` ids, message
//! ids, step names) and resolve them through this context rather than
//! holding object references (spec §9 "cyclic/graph state").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use agent_protocol::Event;
use tokio::sync::{mpsc, watch};

use crate::llm::{LlmClient, LlmUsage};
use crate::message::Message;
use crate::tool::{ToolError, ToolRegistry, ToolResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepStatus {
    Running,
    Completed,
}

/// A named phase of reasoning (spec §3 Step). Steps are totally ordered and
/// do not overlap within a run.
#[derive(Clone, Debug)]
pub struct Step {
    pub name: String,
    pub status: StepStatus,
    pub started_at: Instant,
    pub ended_at: Option<Instant>,
    pub content: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolCallStatus {
    Started,
    ArgsComplete,
    Running,
    Succeeded,
    Failed,
}

/// A pending or completed tool invocation (spec §3 ToolCall). Transitions
/// monotonically; never returns to an earlier status.
#[derive(Clone, Debug)]
pub struct ToolCallRecord {
    pub id: String,
    pub tool_name: String,
    pub parent_message_id: Option<String>,
    pub arguments_text: String,
    pub arguments: Option<serde_json::Value>,
    pub status: ToolCallStatus,
    pub result: Option<ToolResult>,
    pub error: Option<String>,
    pub started_at: Instant,
    pub ended_at: Option<Instant>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunContextError {
    #[error("step '{0}' is already running; steps do not nest")]
    StepAlreadyRunning(String),
    #[error("no running step named '{0}'")]
    NoRunningStep(String),
    #[error("unknown tool call id '{0}'")]
    UnknownToolCall(String),
}

pub struct RunContext {
    pub run_id: String,
    pub thread_id: String,
    pub tools: Arc<ToolRegistry>,
    pub llm: Arc<dyn LlmClient>,
    messages: Vec<Message>,
    steps: Vec<Step>,
    running_step: Option<String>,
    tool_calls: HashMap<String, ToolCallRecord>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    usage: LlmUsage,
    sink: mpsc::Sender<Event>,
}

impl RunContext {
    pub fn new(
        run_id: impl Into<String>,
        thread_id: impl Into<String>,
        tools: Arc<ToolRegistry>,
        llm: Arc<dyn LlmClient>,
        messages: Vec<Message>,
        sink: mpsc::Sender<Event>,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        RunContext {
            run_id: run_id.into(),
            thread_id: thread_id.into(),
            tools,
            llm,
            messages,
            steps: Vec::new(),
            running_step: None,
            tool_calls: HashMap::new(),
            cancel_tx,
            cancel_rx,
            usage: LlmUsage::default(),
            sink,
        }
    }

    pub fn sink(&self) -> mpsc::Sender<Event> {
        self.sink.clone()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn append_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn open_step(&mut self, name: impl Into<String>) -> Result<(), RunContextError> {
        let name = name.into();
        if self.running_step.is_some() {
            return Err(RunContextError::StepAlreadyRunning(name));
        }
        self.running_step = Some(name.clone());
        self.steps.push(Step {
            name,
            status: StepStatus::Running,
            started_at: Instant::now(),
            ended_at: None,
            content: String::new(),
        });
        Ok(())
    }

    pub fn append_step_content(&mut self, name: &str, delta: &str) -> Result<(), RunContextError> {
        let step = self
            .steps
            .iter_mut()
            .rev()
            .find(|s| s.name == name && s.status == StepStatus::Running)
            .ok_or_else(|| RunContextError::NoRunningStep(name.to_string()))?;
        step.content.push_str(delta);
        Ok(())
    }

    pub fn finish_step(&mut self, name: &str) -> Result<(), RunContextError> {
        let step = self
            .steps
            .iter_mut()
            .rev()
            .find(|s| s.name == name && s.status == StepStatus::Running)
            .ok_or_else(|| RunContextError::NoRunningStep(name.to_string()))?;
        step.status = StepStatus::Completed;
        step.ended_at = Some(Instant::now());
        if self.running_step.as_deref() == Some(name) {
            self.running_step = None;
        }
        Ok(())
    }

    pub fn start_tool_call(
        &mut self,
        id: impl Into<String>,
        tool_name: impl Into<String>,
        parent_message_id: Option<String>,
    ) {
        let id = id.into();
        self.tool_calls.insert(
            id.clone(),
            ToolCallRecord {
                id,
                tool_name: tool_name.into(),
                parent_message_id,
                arguments_text: String::new(),
                arguments: None,
                status: ToolCallStatus::Started,
                result: None,
                error: None,
                started_at: Instant::now(),
                ended_at: None,
            },
        );
    }

    pub fn append_tool_call_args(&mut self, id: &str, delta: &str) -> Result<(), RunContextError> {
        let call = self
            .tool_calls
            .get_mut(id)
            .ok_or_else(|| RunContextError::UnknownToolCall(id.to_string()))?;
        call.arguments_text.push_str(delta);
        Ok(())
    }

    pub fn complete_tool_call_args(
        &mut self,
        id: &str,
        arguments: serde_json::Value,
    ) -> Result<(), RunContextError> {
        let call = self
            .tool_calls
            .get_mut(id)
            .ok_or_else(|| RunContextError::UnknownToolCall(id.to_string()))?;
        call.arguments = Some(arguments);
        call.status = ToolCallStatus::ArgsComplete;
        Ok(())
    }

    pub fn mark_tool_call_running(&mut self, id: &str) -> Result<(), RunContextError> {
        let call = self
            .tool_calls
            .get_mut(id)
            .ok_or_else(|| RunContextError::UnknownToolCall(id.to_string()))?;
        call.status = ToolCallStatus::Running;
        Ok(())
    }

    pub fn record_tool_result(
        &mut self,
        id: &str,
        outcome: Result<ToolResult, ToolError>,
    ) -> Result<String, RunContextError> {
        let call = self
            .tool_calls
            .get_mut(id)
            .ok_or_else(|| RunContextError::UnknownToolCall(id.to_string()))?;
        call.ended_at = Some(Instant::now());
        let content = match outcome {
            Ok(result) => {
                call.status = ToolCallStatus::Succeeded;
                let content = result.content.clone();
                call.result = Some(result);
                content
            }
            Err(err) => {
                call.status = ToolCallStatus::Failed;
                let content = err.as_tool_result_content();
                call.error = Some(content.clone());
                content
            }
        };
        Ok(content)
    }

    pub fn tool_call(&self, id: &str) -> Option<&ToolCallRecord> {
        self.tool_calls.get(id)
    }

    pub fn add_usage(&mut self, usage: &LlmUsage) {
        self.usage.add(usage);
    }

    pub fn usage(&self) -> LlmUsage {
        self.usage
    }

    pub fn cancel_receiver(&self) -> watch::Receiver<bool> {
        self.cancel_rx.clone()
    }

    pub fn cancel_sender(&self) -> watch::Sender<bool> {
        self.cancel_tx.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;

    fn fresh_context() -> RunContext {
        let (tx, _rx) = mpsc::channel(16);
        RunContext::new(
            "r1",
            "t1",
            Arc::new(ToolRegistry::new()),
            Arc::new(MockLlm::fixed_text("x")),
            vec![],
            tx,
        )
    }

    #[test]
    fn steps_do_not_nest() {
        let mut ctx = fresh_context();
        ctx.open_step("thinking").unwrap();
        let err = ctx.open_step("planning").unwrap_err();
        assert!(matches!(err, RunContextError::StepAlreadyRunning(_)));
    }

    #[test]
    fn a_step_can_reopen_after_it_finishes() {
        let mut ctx = fresh_context();
        ctx.open_step("thinking").unwrap();
        ctx.finish_step("thinking").unwrap();
        assert!(ctx.open_step("thinking").is_ok());
    }

    #[test]
    fn tool_call_transitions_from_started_to_succeeded() {
        let mut ctx = fresh_context();
        ctx.start_tool_call("tc1", "add", None);
        assert_eq!(ctx.tool_call("tc1").unwrap().status, ToolCallStatus::Started);
        ctx.record_tool_result("tc1", Ok(ToolResult::text("5"))).unwrap();
        assert_eq!(ctx.tool_call("tc1").unwrap().status, ToolCallStatus::Succeeded);
    }

    #[test]
    fn cancel_signal_is_observed_through_the_receiver() {
        let ctx = fresh_context();
        let rx = ctx.cancel_receiver();
        assert!(!*rx.borrow());
        ctx.cancel_sender().send(true).unwrap();
        assert!(*rx.borrow());
    }
}
