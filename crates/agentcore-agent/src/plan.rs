//! Plan Executor (§4.10) — runs a plan the external Decomposer already
//! broke into `steps` + `dependency_graph` + `parallel_groups`. This module
//! only sequences and retries; it never invents steps or dependencies.

use crate::runtime::{AgentRuntime, RunContext};
use agentcore_core::{AgentId, PlanId, UserId};
use agentcore_llm::{LlmMessage, LlmProvider, LlmRequest, StreamDelta};
use futures::future::join_all;
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Strictly less than `runtime::DEFAULT_RUN_DEADLINE` (§4.10).
pub const PLAN_DEADLINE_MS: u64 = 180_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanStatus {
    Running,
    Completed,
    Partial,
    Failed,
}

#[derive(Clone, Debug)]
enum StepOutcome {
    Completed(String),
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct PlanStep {
    pub id: String,
    pub title: String,
    pub description: String,
    pub estimated_iterations: u32,
}

/// A plan as handed down by the external Decomposer: steps plus the two
/// views the executor needs over them. `dependency_graph` maps a step id to
/// the ids it depends on; `parallel_groups` is the execution order, each
/// inner vec a set of step ids safe to run concurrently.
#[derive(Clone, Debug)]
pub struct Plan {
    pub id: PlanId,
    pub agent_id: AgentId,
    pub user_id: UserId,
    pub goal: String,
    pub steps: Vec<PlanStep>,
    pub dependency_graph: HashMap<String, Vec<String>>,
    pub parallel_groups: Vec<Vec<String>>,
    pub status: PlanStatus,
    pub completed_steps: Vec<String>,
    pub failed_steps: Vec<String>,
    pub tokens_used: u64,
}

impl Plan {
    pub fn new(
        id: PlanId,
        agent_id: AgentId,
        user_id: UserId,
        goal: impl Into<String>,
        steps: Vec<PlanStep>,
        dependency_graph: HashMap<String, Vec<String>>,
        parallel_groups: Vec<Vec<String>>,
    ) -> Self {
        Self {
            id,
            agent_id,
            user_id,
            goal: goal.into(),
            steps,
            dependency_graph,
            parallel_groups,
            status: PlanStatus::Running,
            completed_steps: Vec::new(),
            failed_steps: Vec::new(),
            tokens_used: 0,
        }
    }

    fn step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}

pub struct PlanExecutor {
    runtime: Arc<AgentRuntime>,
    reviser: Arc<dyn LlmProvider>,
}

impl PlanExecutor {
    pub fn new(runtime: Arc<AgentRuntime>, reviser: Arc<dyn LlmProvider>) -> Self {
        Self { runtime, reviser }
    }

    /// Execute every group in order; each group's steps feed forward as
    /// "prior step summaries" for the situation synthesized in later steps.
    pub async fn execute(&self, mut plan: Plan, cancel: CancellationToken) -> Plan {
        let deadline_at = tokio::time::Instant::now() + Duration::from_millis(PLAN_DEADLINE_MS);
        let mut summaries: Vec<String> = Vec::new();
        let groups = plan.parallel_groups.clone();

        for (group_index, group) in groups.iter().enumerate() {
            if cancel.is_cancelled() || tokio::time::Instant::now() >= deadline_at {
                plan.status = PlanStatus::Failed;
                return plan;
            }

            let outcomes = if group.len() == 1 {
                let id = group[0].clone();
                let step = plan.step(&id).cloned();
                let (outcome, tokens) = match step {
                    Some(step) => self.run_step(plan.agent_id, plan.user_id, step, summaries.clone(), cancel.clone()).await,
                    None => (StepOutcome::Failed("unknown step id".to_string()), 0),
                };
                vec![(id, outcome, tokens)]
            } else {
                let futures = group.iter().map(|id| {
                    let id = id.clone();
                    let step = plan.step(&id).cloned();
                    let agent_id = plan.agent_id;
                    let user_id = plan.user_id;
                    let summaries = summaries.clone();
                    let cancel = cancel.clone();
                    async move {
                        let (outcome, tokens) = match step {
                            Some(step) => self.run_step(agent_id, user_id, step, summaries, cancel).await,
                            None => (StepOutcome::Failed("unknown step id".to_string()), 0),
                        };
                        (id, outcome, tokens)
                    }
                });
                join_all(futures).await
            };

            let mut failed_this_group = Vec::new();
            for (id, outcome, tokens) in outcomes {
                plan.tokens_used += tokens;
                match outcome {
                    StepOutcome::Completed(summary) => {
                        plan.completed_steps.push(id.clone());
                        summaries.push(format!("{id}: {summary}"));
                    }
                    StepOutcome::Failed(reason) => {
                        plan.failed_steps.push(id.clone());
                        failed_this_group.push((id, reason));
                    }
                }
            }

            let more_groups_follow = group_index + 1 < groups.len();
            if !failed_this_group.is_empty() && more_groups_follow {
                self.revise_dependents(&mut plan, &groups[group_index + 1..], &failed_this_group).await;
            }
        }

        plan.status = if plan.failed_steps.is_empty() {
            PlanStatus::Completed
        } else if plan.completed_steps.is_empty() {
            PlanStatus::Failed
        } else {
            PlanStatus::Partial
        };
        plan
    }

    async fn run_step(
        &self,
        agent_id: AgentId,
        user_id: UserId,
        step: PlanStep,
        prior_summaries: Vec<String>,
        cancel: CancellationToken,
    ) -> (StepOutcome, u64) {
        let situation = if prior_summaries.is_empty() {
            format!("Step: {}\n{}", step.title, step.description)
        } else {
            format!(
                "Step: {}\n{}\n\nPrior step summaries:\n{}",
                step.title,
                step.description,
                prior_summaries.join("\n")
            )
        };

        let max_iterations = step.estimated_iterations.max(3);
        let max_tool_calls = (step.estimated_iterations + 2).max(5);

        let mut ctx = RunContext::new(agent_id, user_id, "plan_step", json!({"situation": situation}));
        ctx.max_iterations = Some(max_iterations);
        ctx.max_tool_calls = Some(max_tool_calls);
        ctx.cancel = cancel;

        let result = self.runtime.run(ctx).await;
        let rejected_before_running = result.iterations == 0;
        match result.final_thought {
            Some(msg) if rejected_before_running || msg.starts_with("model error:") => {
                (StepOutcome::Failed(msg), result.tokens_used)
            }
            Some(summary) => (StepOutcome::Completed(summary), result.tokens_used),
            None => (StepOutcome::Failed("step produced no output".to_string()), result.tokens_used),
        }
    }

    /// Best-effort rewrite of later steps whose dependencies touch a failed
    /// step (§4.10). Failure to revise is logged and execution continues
    /// unchanged — the Decomposer's original steps stand.
    async fn revise_dependents(&self, plan: &mut Plan, later_groups: &[Vec<String>], failed: &[(String, String)]) {
        let failed_ids: Vec<&str> = failed.iter().map(|(id, _)| id.as_str()).collect();
        let dependent_ids: Vec<String> = later_groups
            .iter()
            .flatten()
            .filter(|id| {
                plan.dependency_graph
                    .get(*id)
                    .map(|deps| deps.iter().any(|d| failed_ids.contains(&d.as_str())))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        for id in dependent_ids {
            let Some(step) = plan.step(&id).cloned() else { continue };
            let reasons: Vec<&str> = failed.iter().map(|(_, r)| r.as_str()).collect();
            match self.rewrite_step(&step, &reasons).await {
                Ok(rewritten) => {
                    if let Some(target) = plan.steps.iter_mut().find(|s| s.id == id) {
                        target.title = rewritten.0;
                        target.description = rewritten.1;
                    }
                }
                Err(e) => {
                    tracing::warn!(step = %id, error = %e, "plan revision failed, keeping original step");
                }
            }
        }
    }

    async fn rewrite_step(&self, step: &PlanStep, failure_reasons: &[&str]) -> Result<(String, String), String> {
        let prompt = format!(
            "A prerequisite step failed with reason(s): {}.\n\
             Rewrite the following step's title and description to account for this. \
             Respond with exactly two lines: the new title, then the new description.\n\n\
             Title: {}\nDescription: {}",
            failure_reasons.join("; "),
            step.title,
            step.description
        );
        let request = LlmRequest {
            messages: vec![LlmMessage { role: "user".to_string(), content: prompt.into() }],
            max_tokens: Some(300),
            ..Default::default()
        };

        let mut stream = self
            .reviser
            .complete_stream(request, None)
            .await
            .map_err(|e| e.to_string())?;

        let mut text = String::new();
        while let Some(delta) = stream.next().await {
            match delta.map_err(|e| e.to_string())? {
                StreamDelta::Text(t) => text.push_str(&t),
                StreamDelta::Error(e) => return Err(e),
                _ => {}
            }
        }

        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let title = lines.next().ok_or("empty revision response")?.trim().to_string();
        let description = lines.collect::<Vec<_>>().join("\n").trim().to_string();
        if description.is_empty() {
            return Err("revision response missing description".to_string());
        }
        Ok((title, description))
    }
}
