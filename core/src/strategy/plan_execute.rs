//! Plan-and-Execute strategy (spec §4.5.3): a planning step produces a task
//! graph, each task runs to completion through an inner React sub-loop in
//! dependency order, and a synthesis step produces the final answer.

use std::collections::{HashSet, VecDeque};

use agent_protocol::StopReason;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use super::react::ReactStrategy;
use super::{SemanticAction, Strategy};
use crate::error::AgentError;
use crate::llm::ChatParams;
use crate::message::Message;
use crate::run_context::RunContext;

const PLANNING_STEP: &str = "planning";
const SYNTHESIS_STEP: &str = "synthesis";
const MAX_REFORMAT_ATTEMPTS: usize = 2;

#[derive(Debug, Deserialize)]
struct Plan {
    #[allow(dead_code)]
    goal: String,
    tasks: Vec<PlanTask>,
}

#[derive(Debug, Clone, Deserialize)]
struct PlanTask {
    id: String,
    title: String,
    description: String,
    #[serde(default)]
    dependencies: Vec<String>,
}

pub struct PlanAndExecuteStrategy {
    max_task_iterations: usize,
}

impl Default for PlanAndExecuteStrategy {
    fn default() -> Self {
        PlanAndExecuteStrategy { max_task_iterations: 10 }
    }
}

impl PlanAndExecuteStrategy {
    pub fn new(max_task_iterations: usize) -> Self {
        PlanAndExecuteStrategy { max_task_iterations }
    }

    async fn produce_plan(
        &self,
        ctx: &mut RunContext,
        actions: &mpsc::Sender<SemanticAction>,
    ) -> Result<Plan, AgentError> {
        ctx.open_step(PLANNING_STEP).map_err(|e| AgentError::Internal(e.to_string()))?;
        actions
            .send(SemanticAction::EmitStepStart { step_name: PLANNING_STEP.to_string() })
            .await
            .ok();

        let mut last_error = String::new();
        let mut plan_text = String::new();
        for attempt in 0..MAX_REFORMAT_ATTEMPTS {
            let mut messages = ctx.messages().to_vec();
            if attempt > 0 {
                messages.push(Message::system(
                    format!("msg-{}", uuid::Uuid::new_v4()),
                    format!(
                        "Your previous plan could not be parsed ({last_error}). \
                         Reply with ONLY a JSON object of the shape \
                         {{\"goal\": string, \"tasks\": [{{\"id\": string, \"title\": string, \
                         \"description\": string, \"dependencies\": [string]}}]}}."
                    ),
                ));
            }
            let response = ctx
                .llm
                .chat(&messages, &ctx.tools.describe(), &ChatParams::default())
                .await?;
            ctx.add_usage(&response.usage.clone().unwrap_or_default());
            ctx.append_step_content(PLANNING_STEP, &response.content)
                .map_err(|e| AgentError::Internal(e.to_string()))?;
            actions
                .send(SemanticAction::EmitStepContent {
                    step_name: PLANNING_STEP.to_string(),
                    delta: response.content.clone(),
                })
                .await
                .ok();

            plan_text = response.content;
            match parse_plan(&plan_text) {
                Ok(plan) => {
                    ctx.finish_step(PLANNING_STEP).map_err(|e| AgentError::Internal(e.to_string()))?;
                    actions
                        .send(SemanticAction::EmitStepEnd { step_name: PLANNING_STEP.to_string() })
                        .await
                        .ok();
                    return Ok(plan);
                }
                Err(e) => last_error = e,
            }
        }

        ctx.finish_step(PLANNING_STEP).map_err(|e| AgentError::Internal(e.to_string()))?;
        actions
            .send(SemanticAction::EmitStepEnd { step_name: PLANNING_STEP.to_string() })
            .await
            .ok();
        Err(AgentError::PlanParseError(format!(
            "could not parse a task plan after {MAX_REFORMAT_ATTEMPTS} attempts: {last_error} (last reply: {plan_text})"
        )))
    }
}

/// Extracts a `{goal, tasks}` JSON object from the model's reply, tolerating
/// a fenced code block around it.
fn parse_plan(text: &str) -> Result<Plan, String> {
    let trimmed = text.trim();
    let candidate = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```").trim())
        .unwrap_or(trimmed);
    serde_json::from_str::<Plan>(candidate).map_err(|e| e.to_string())
}

/// Orders tasks so every dependency is scheduled before its dependents.
/// Returns an error string naming the cycle if one exists.
fn topological_order(tasks: &[PlanTask]) -> Result<Vec<PlanTask>, String> {
    let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    let mut remaining: VecDeque<PlanTask> = tasks.iter().cloned().collect();
    let mut done: HashSet<String> = HashSet::new();
    let mut ordered = Vec::with_capacity(tasks.len());

    while !remaining.is_empty() {
        let before = remaining.len();
        let mut i = 0;
        while i < remaining.len() {
            let ready = remaining[i]
                .dependencies
                .iter()
                .all(|d| !ids.contains(d.as_str()) || done.contains(d));
            if ready {
                let task = remaining.remove(i).unwrap();
                done.insert(task.id.clone());
                ordered.push(task);
            } else {
                i += 1;
            }
        }
        if remaining.len() == before {
            let stuck: Vec<&str> = remaining.iter().map(|t| t.id.as_str()).collect();
            return Err(format!("cyclic or unresolved task dependencies among: {}", stuck.join(", ")));
        }
    }
    Ok(ordered)
}

#[async_trait]
impl Strategy for PlanAndExecuteStrategy {
    async fn step(
        &self,
        ctx: &mut RunContext,
        actions: mpsc::Sender<SemanticAction>,
    ) -> Result<(), AgentError> {
        let plan = self.produce_plan(ctx, &actions).await?;
        let ordered = topological_order(&plan.tasks).map_err(AgentError::PlanParseError)?;

        for task in &ordered {
            if ctx.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            let step_name = format!("executing:{}", task.id);
            ctx.open_step(&step_name).map_err(|e| AgentError::Internal(e.to_string()))?;
            actions
                .send(SemanticAction::EmitStepStart { step_name: step_name.clone() })
                .await
                .ok();

            let brief = format!(
                "Task '{}': {}\n{}",
                task.id, task.title, task.description
            );
            ctx.append_message(Message::system(format!("msg-{}", uuid::Uuid::new_v4()), brief));

            let inner = ReactStrategy::new(self.max_task_iterations);
            let task_result = inner.run_loop(ctx, &actions).await?;
            ctx.append_message(Message::system(
                format!("msg-{}", uuid::Uuid::new_v4()),
                format!("Result of task '{}': {}", task.id, task_result.text()),
            ));

            ctx.finish_step(&step_name).map_err(|e| AgentError::Internal(e.to_string()))?;
            actions.send(SemanticAction::EmitStepEnd { step_name }).await.ok();
        }

        ctx.open_step(SYNTHESIS_STEP).map_err(|e| AgentError::Internal(e.to_string()))?;
        actions
            .send(SemanticAction::EmitStepStart { step_name: SYNTHESIS_STEP.to_string() })
            .await
            .ok();
        let messages = ctx.messages().to_vec();
        let response = ctx
            .llm
            .chat(&messages, &[], &ChatParams::default())
            .await?;
        ctx.add_usage(&response.usage.clone().unwrap_or_default());
        ctx.append_step_content(SYNTHESIS_STEP, &response.content)
            .map_err(|e| AgentError::Internal(e.to_string()))?;
        ctx.finish_step(SYNTHESIS_STEP).map_err(|e| AgentError::Internal(e.to_string()))?;
        actions
            .send(SemanticAction::EmitStepEnd { step_name: SYNTHESIS_STEP.to_string() })
            .await
            .ok();

        let message_id = format!("msg-{}", uuid::Uuid::new_v4());
        actions
            .send(SemanticAction::EmitFinalAssistantStart { message_id: message_id.clone() })
            .await
            .ok();
        actions
            .send(SemanticAction::EmitFinalAssistantChunk {
                message_id: message_id.clone(),
                delta: response.content.clone(),
            })
            .await
            .ok();
        actions
            .send(SemanticAction::EmitFinalAssistantEnd { message_id: message_id.clone() })
            .await
            .ok();
        ctx.append_message(Message::assistant(message_id, response.content));

        let usage = ctx.usage();
        actions
            .send(SemanticAction::Done { usage: Some(usage), stop_reason: StopReason::Stop })
            .await
            .ok();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_fenced_plan() {
        let text = "```json\n{\"goal\": \"g\", \"tasks\": [{\"id\": \"t1\", \"title\": \"a\", \"description\": \"b\", \"dependencies\": []}]}\n```";
        let plan = parse_plan(text).unwrap();
        assert_eq!(plan.tasks.len(), 1);
    }

    #[test]
    fn orders_tasks_by_dependency() {
        let tasks = vec![
            PlanTask { id: "b".into(), title: "B".into(), description: "".into(), dependencies: vec!["a".into()] },
            PlanTask { id: "a".into(), title: "A".into(), description: "".into(), dependencies: vec![] },
        ];
        let ordered = topological_order(&tasks).unwrap();
        assert_eq!(ordered[0].id, "a");
        assert_eq!(ordered[1].id, "b");
    }

    #[test]
    fn rejects_a_dependency_cycle() {
        let tasks = vec![
            PlanTask { id: "a".into(), title: "A".into(), description: "".into(), dependencies: vec!["b".into()] },
            PlanTask { id: "b".into(), title: "B".into(), description: "".into(), dependencies: vec!["a".into()] },
        ];
        assert!(topological_order(&tasks).is_err());
    }
}
