//! Orchestrator (§4.9) — decomposes a goal into subtasks and delegates each
//! to a specialist sub-agent, reusing an existing specialist when one scores
//! well enough against the subtask or creating one otherwise.
//!
//! Three independent layers keep orchestration from recursing without
//! bound: the tool registry omits `orchestrate` for any run at
//! `orchestration_depth >= 1` (enforced in `agentcore_tools::create_runtime_registry`
//! and `AgentRuntime::build_tool_defs`), this trait implementation refuses a
//! call made at `depth >= 1`, and every specialist this module creates is
//! stamped `can_create_children: false` so it can never itself become a
//! manager.

use crate::hierarchy::{HierarchyService, NewSubAgent};
use crate::runtime::{AgentRuntime, RunContext};
use agentcore_core::{AgentId, UserId};
use agentcore_tools::Orchestrable;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const REUSE_SCORE_THRESHOLD: i32 = 20;
const MAX_PARALLEL_SUBRUNS: usize = 5;
const SUBRUN_TIMEOUT: Duration = Duration::from_secs(120);
const SUBRUN_MAX_ITERATIONS: u32 = 3;
const SUBRUN_MAX_TOOL_CALLS: u32 = 3;

struct Subtask {
    title: String,
    description: String,
    required_skills: Vec<String>,
}

fn parse_subtasks(value: &Value) -> Vec<Subtask> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| {
                    let title = v.get("title")?.as_str()?.to_string();
                    let description = v.get("description")?.as_str()?.to_string();
                    let required_skills = v
                        .get("required_skills")
                        .and_then(|s| s.as_array())
                        .map(|s| s.iter().filter_map(|x| x.as_str().map(str::to_string)).collect())
                        .unwrap_or_default();
                    Some(Subtask { title, description, required_skills })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.len() > 2)
        .collect()
}

/// Keyword-overlap score between a candidate specialist and a subtask.
/// Role/name words each worth 10 on a match against the subtask's title and
/// description; an explicit `required_skills` entry matching the role or
/// name is worth 15. Crude but legible, and the threshold is the tunable
/// knob rather than the formula.
fn reuse_score(role: &str, name: &str, subtask: &Subtask) -> i32 {
    let candidate_words: Vec<String> = words(role).into_iter().chain(words(name)).collect();
    let subtask_words: Vec<String> = words(&subtask.title).into_iter().chain(words(&subtask.description)).collect();

    let mut score = 0;
    for w in &candidate_words {
        if subtask_words.contains(w) {
            score += 10;
        }
    }
    for skill in &subtask.required_skills {
        let skill = skill.to_lowercase();
        if role.to_lowercase().contains(&skill) || name.to_lowercase().contains(&skill) {
            score += 15;
        }
    }
    score
}

pub struct Orchestrator {
    runtime: Arc<AgentRuntime>,
    hierarchy: Arc<HierarchyService>,
}

impl Orchestrator {
    pub fn new(runtime: Arc<AgentRuntime>, hierarchy: Arc<HierarchyService>) -> Self {
        Self { runtime, hierarchy }
    }

    /// Pick an existing sub-agent of `manager_id` scoring above the reuse
    /// threshold for `subtask`, or create a new specialist under the manager.
    fn resolve_specialist(&self, manager_id: AgentId, user_id: UserId, subtask: &Subtask) -> Result<(AgentId, bool), String> {
        let manager = self
            .hierarchy
            .get_profile(manager_id, user_id)
            .map_err(|e| e.to_string())?;

        let mut best: Option<(AgentId, i32)> = None;
        for candidate in self.hierarchy.list_profiles(user_id) {
            if candidate.parent_id != Some(manager_id) {
                continue;
            }
            let score = reuse_score(&candidate.role, &candidate.name, subtask);
            if score > REUSE_SCORE_THRESHOLD && best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
                best = Some((candidate.id, score));
            }
        }
        if let Some((id, _)) = best {
            return Ok((id, false));
        }

        let specialist = self
            .hierarchy
            .create_sub_agent(
                manager_id,
                user_id,
                NewSubAgent {
                    name: subtask.title.clone(),
                    role: subtask.required_skills.join(", "),
                    requested_autonomy: manager.autonomy_level,
                    system_prompt: format!(
                        "You are a specialist sub-agent. Your assignment: {}\n\n{}",
                        subtask.title, subtask.description
                    ),
                    provider: manager.routing.provider.clone(),
                    model: manager.routing.model.clone(),
                    can_create_children: false,
                },
            )
            .map_err(|e| e.to_string())?;
        Ok((specialist.id, true))
    }

    async fn run_subtask(
        &self,
        manager_id: AgentId,
        user_id: UserId,
        depth: u32,
        goal: &str,
        subtask: Subtask,
        prior_findings: Option<String>,
    ) -> Value {
        let (agent_id, created) = match self.resolve_specialist(manager_id, user_id, &subtask) {
            Ok(pair) => pair,
            Err(e) => {
                return json!({
                    "title": subtask.title,
                    "status": "failed",
                    "error": e,
                })
            }
        };
        let agent_name = self
            .hierarchy
            .get_profile(agent_id, user_id)
            .map(|p| p.name)
            .unwrap_or_default();

        let mut trigger_context = json!({
            "goal": goal,
            "title": subtask.title,
            "description": subtask.description,
        });
        if let Some(findings) = prior_findings {
            trigger_context["prior_findings"] = json!(findings);
        }

        let mut ctx = RunContext::new(agent_id, user_id, "orchestration", trigger_context);
        ctx.orchestration_depth = depth + 1;
        ctx.max_iterations = Some(SUBRUN_MAX_ITERATIONS);
        ctx.max_tool_calls = Some(SUBRUN_MAX_TOOL_CALLS);

        let reused = !created;
        let run = tokio::time::timeout(SUBRUN_TIMEOUT, self.runtime.run(ctx)).await;
        match run {
            Ok(result) => {
                let status = if result.final_thought.is_some() { "completed" } else { "failed" };
                json!({
                    "title": subtask.title,
                    "agent_name": agent_name,
                    "status": status,
                    "findings": result.final_thought,
                    "iterations": result.iterations,
                    "tokens_used": result.tokens_used,
                    "reused": reused,
                    "created": created,
                })
            }
            Err(_) => json!({
                "title": subtask.title,
                "agent_name": agent_name,
                "status": "timeout",
                "error": format!("specialist did not finish within {}s", SUBRUN_TIMEOUT.as_secs()),
                "reused": reused,
                "created": created,
            }),
        }
    }
}

#[async_trait::async_trait]
impl Orchestrable for Orchestrator {
    async fn orchestrate(
        &self,
        agent_id: AgentId,
        user_id: UserId,
        goal: &str,
        subtasks: Value,
        mode: &str,
        depth: u32,
    ) -> Result<Value, String> {
        if depth >= 1 {
            return Err("orchestrate is unavailable below the top orchestration level".to_string());
        }

        let subtasks = parse_subtasks(&subtasks);
        if subtasks.is_empty() {
            return Err("subtasks must be a non-empty array of {title, description}".to_string());
        }

        let results: Vec<Value> = if mode == "sequential" {
            let mut out = Vec::with_capacity(subtasks.len());
            let mut prior_findings: Option<String> = None;
            for subtask in subtasks {
                let result = self.run_subtask(agent_id, user_id, depth, goal, subtask, prior_findings.clone()).await;
                prior_findings = result.get("findings").and_then(|f| f.as_str()).map(str::to_string);
                out.push(result);
            }
            out
        } else {
            stream::iter(subtasks)
                .map(|subtask| self.run_subtask(agent_id, user_id, depth, goal, subtask, None))
                .buffer_unordered(MAX_PARALLEL_SUBRUNS)
                .collect()
                .await
        };

        let succeeded = results.iter().filter(|r| r.get("status").and_then(|s| s.as_str()) == Some("completed")).count();
        let created = results.iter().filter(|r| r.get("created").and_then(|c| c.as_bool()).unwrap_or(false)).count();
        let reused = results.iter().filter(|r| r.get("reused").and_then(|c| c.as_bool()).unwrap_or(false)).count();

        Ok(json!({
            "success": true,
            "goal": goal,
            "mode": mode,
            "results": results,
            "counts": {
                "total": results.len(),
                "succeeded": succeeded,
                "failed": results.len() - succeeded,
                "reused": reused,
                "created": created,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::CheckpointStore;
    use crate::concurrency::ConcurrencyGuard;
    use crate::hierarchy::InMemoryAgentStore;
    use crate::hooks::HookRegistry;
    use crate::idempotency::IdempotencyCache;
    use crate::permission::PermissionMatrix;
    use crate::profile::{
        AgentProfile, AgentStatus, AgentType, Budgets, ChildCreationPolicy, CreatedByType, HeartbeatConfig,
        InheritanceFlags, ModelRoutingConfig,
    };
    use agentcore_core::AutonomyLevel;
    use agentcore_llm::{LlmError, LlmProvider, LlmRequest, LlmResult, LlmStream, StreamDelta};
    use futures::stream as fstream;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct AlwaysDone;
    #[async_trait::async_trait]
    impl LlmProvider for AlwaysDone {
        fn name(&self) -> &str {
            "scripted"
        }
        fn models(&self) -> &[&str] {
            &["scripted-model"]
        }
        async fn complete_stream(
            &self,
            _request: LlmRequest,
            _cancel: Option<tokio_util::sync::CancellationToken>,
        ) -> LlmResult<LlmStream> {
            let deltas: Vec<Result<StreamDelta, LlmError>> = vec![
                Ok(StreamDelta::ToolCallStart { id: "t1".into(), name: "done".into() }),
                Ok(StreamDelta::ToolCallDelta { id: "t1".into(), arguments: r#"{"summary":"researched it"}"#.into() }),
                Ok(StreamDelta::ToolCallEnd { id: "t1".into() }),
                Ok(StreamDelta::Done { stop_reason: Some("tool_use".into()), usage: None }),
            ];
            Ok(Box::pin(fstream::iter(deltas)))
        }
    }

    fn master(user_id: UserId) -> AgentProfile {
        let id = AgentId::new();
        AgentProfile {
            id,
            user_id,
            name: "Master".into(),
            role: "coordinator".into(),
            agent_type: AgentType::Master,
            parent_id: None,
            hierarchy_level: 0,
            hierarchy_path: vec![id],
            created_by_type: CreatedByType::User,
            created_by_agentic_id: None,
            inheritance: InheritanceFlags::default(),
            routing: ModelRoutingConfig {
                provider: "anthropic".into(),
                model: "scripted-model".into(),
                temperature: 0.5,
                max_tokens: 1024,
                routing_preset: None,
                system_prompt: "coordinate".into(),
            },
            autonomy_level: AutonomyLevel::Autonomous,
            require_approval_for: HashSet::new(),
            child_policy: ChildCreationPolicy::default(),
            budgets: Budgets::default(),
            status: AgentStatus::Active,
            heartbeat: HeartbeatConfig::default(),
            max_prompts_per_hour: 20,
            auto_approve_threshold: 0.9,
        }
    }

    fn build(llm: Arc<dyn LlmProvider>) -> (Orchestrator, Arc<HierarchyService>, TempDir) {
        let workspace = TempDir::new().unwrap();
        let hierarchy = Arc::new(HierarchyService::new(Arc::new(InMemoryAgentStore::new())));
        let runtime = Arc::new(AgentRuntime::new(
            llm,
            workspace.path().to_path_buf(),
            agentcore_tools::create_runtime_handle(),
            agentcore_tools::create_orchestrator_handle(),
            hierarchy.clone(),
            Arc::new(PermissionMatrix::with_defaults()),
            Arc::new(IdempotencyCache::new()),
            Arc::new(CheckpointStore::new()),
            Arc::new(ConcurrencyGuard::new(8)),
            Arc::new(HookRegistry::new()),
            Arc::new(crate::execution_history::ExecutionHistory::new()),
            Arc::new(agentcore_core::audit::InMemoryAuditLog::new()),
        ));
        (Orchestrator::new(runtime, hierarchy.clone()), hierarchy, workspace)
    }

    #[tokio::test]
    async fn orchestrate_creates_specialists_and_runs_them_in_parallel() {
        let (orchestrator, hierarchy, _workspace) = build(Arc::new(AlwaysDone));
        let user_id = UserId::new();
        let m = master(user_id);
        hierarchy.create_profile(m.clone()).unwrap();

        let subtasks = json!([
            {"title": "Research pricing", "description": "Find competitor pricing", "required_skills": ["research"]},
            {"title": "Draft summary", "description": "Write a summary doc", "required_skills": ["writing"]},
        ]);

        let result = orchestrator
            .orchestrate(m.id, user_id, "ship a pricing report", subtasks, "parallel", 0)
            .await
            .unwrap();

        assert_eq!(result["success"], json!(true));
        assert_eq!(result["counts"]["total"], json!(2));
        assert_eq!(result["counts"]["created"], json!(2));
        assert_eq!(result["counts"]["succeeded"], json!(2));
        assert_eq!(hierarchy.list_profiles(user_id).len(), 3);
    }

    #[tokio::test]
    async fn orchestrate_refuses_below_top_level() {
        let (orchestrator, hierarchy, _workspace) = build(Arc::new(AlwaysDone));
        let user_id = UserId::new();
        let m = master(user_id);
        hierarchy.create_profile(m.clone()).unwrap();

        let err = orchestrator
            .orchestrate(m.id, user_id, "goal", json!([{"title": "a", "description": "b"}]), "parallel", 1)
            .await
            .unwrap_err();
        assert!(err.contains("unavailable"));
    }

    #[tokio::test]
    async fn reused_specialist_is_not_recreated() {
        let (orchestrator, hierarchy, _workspace) = build(Arc::new(AlwaysDone));
        let user_id = UserId::new();
        let m = master(user_id);
        hierarchy.create_profile(m.clone()).unwrap();
        hierarchy
            .create_sub_agent(
                m.id,
                user_id,
                NewSubAgent {
                    name: "Research Specialist".into(),
                    role: "market research analysis".into(),
                    requested_autonomy: AutonomyLevel::SemiAutonomous,
                    system_prompt: "research things".into(),
                    provider: "anthropic".into(),
                    model: "scripted-model".into(),
                    can_create_children: false,
                },
            )
            .unwrap();

        let subtasks = json!([
            {"title": "Research market", "description": "research market analysis", "required_skills": ["research"]},
        ]);
        let result = orchestrator.orchestrate(m.id, user_id, "goal", subtasks, "sequential", 0).await.unwrap();

        assert_eq!(result["counts"]["reused"], json!(1));
        assert_eq!(result["counts"]["created"], json!(0));
        assert_eq!(hierarchy.list_profiles(user_id).len(), 2);
    }
}
