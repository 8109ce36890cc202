//! Integration tests for agentcore-agent: wiring the reasoning loop,
//! hierarchy, permissions, checkpoints, and hooks together the way a
//! composition root would.

use agentcore_agent::*;
use agentcore_core::{AgentId, AutonomyLevel, UserId};
use agentcore_llm::{LlmError, LlmProvider, LlmRequest, LlmResult, LlmStream, StreamDelta};
use agentcore_tools::ToolCategory;
use futures::stream;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct ScriptedProvider {
    turns: Mutex<Vec<Vec<StreamDelta>>>,
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }
    fn models(&self) -> &[&str] {
        &["scripted-model"]
    }
    async fn complete_stream(
        &self,
        _request: LlmRequest,
        _cancel: Option<CancellationToken>,
    ) -> LlmResult<LlmStream> {
        let mut turns = self.turns.lock().unwrap();
        let deltas = if turns.is_empty() {
            vec![StreamDelta::Done { stop_reason: None, usage: None }]
        } else {
            turns.remove(0)
        };
        let items: Vec<Result<StreamDelta, LlmError>> = deltas.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(items)))
    }
}

fn done_turn(summary: &str) -> Vec<StreamDelta> {
    vec![
        StreamDelta::ToolCallStart { id: "t1".into(), name: "done".into() },
        StreamDelta::ToolCallDelta { id: "t1".into(), arguments: format!(r#"{{"summary":"{summary}"}}"#) },
        StreamDelta::ToolCallEnd { id: "t1".into() },
        StreamDelta::Done { stop_reason: Some("tool_use".into()), usage: None },
    ]
}

fn master_profile(user_id: UserId) -> AgentProfile {
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
            system_prompt: "be helpful".into(),
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

struct Harness {
    runtime: Arc<AgentRuntime>,
    hierarchy: Arc<HierarchyService>,
    _workspace: TempDir,
}

fn build_harness(llm: Arc<dyn LlmProvider>) -> Harness {
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
        Arc::new(ConcurrencyGuard::new(4)),
        Arc::new(HookRegistry::new()),
        Arc::new(ExecutionHistory::new()),
        Arc::new(agentcore_core::audit::InMemoryAuditLog::new()),
    ));
    Harness { runtime, hierarchy, _workspace: workspace }
}

// ===========================================================================
// Agent Runtime
// ===========================================================================

#[tokio::test]
async fn runtime_runs_a_master_agent_to_completion() {
    let llm = Arc::new(ScriptedProvider { turns: Mutex::new(vec![done_turn("all set")]) });
    let harness = build_harness(llm);
    let user_id = UserId::new();
    let profile = master_profile(user_id);
    harness.hierarchy.create_profile(profile.clone()).unwrap();

    let result = harness.runtime.run(RunContext::new(profile.id, user_id, "manual", Value::Null)).await;
    assert_eq!(result.final_thought.as_deref(), Some("all set"));
    assert_eq!(result.iterations, 1);
}

#[tokio::test]
async fn runtime_honors_a_caller_supplied_deadline() {
    let llm = Arc::new(ScriptedProvider { turns: Mutex::new(vec![]) });
    let harness = build_harness(llm);
    let user_id = UserId::new();
    let profile = master_profile(user_id);
    harness.hierarchy.create_profile(profile.clone()).unwrap();

    let mut ctx = RunContext::new(profile.id, user_id, "manual", Value::Null);
    ctx.deadline = Some(std::time::Duration::from_millis(0));
    let result = harness.runtime.run(ctx).await;
    assert_eq!(result.iterations, 0);
}

// ===========================================================================
// Hierarchy Service
// ===========================================================================

#[test]
fn sub_agent_autonomy_is_capped_at_parent_children_autonomy_cap() {
    let hierarchy = HierarchyService::new(Arc::new(InMemoryAgentStore::new()));
    let user_id = UserId::new();
    let mut parent = master_profile(user_id);
    parent.child_policy.children_autonomy_cap = AutonomyLevel::Supervised;
    hierarchy.create_profile(parent.clone()).unwrap();

    let child = hierarchy
        .create_sub_agent(
            parent.id,
            user_id,
            NewSubAgent {
                name: "helper".into(),
                role: "assistant".into(),
                requested_autonomy: AutonomyLevel::Autonomous,
                system_prompt: "help out".into(),
                provider: "anthropic".into(),
                model: "scripted-model".into(),
                can_create_children: false,
            },
        )
        .unwrap();

    assert_eq!(child.autonomy_level, AutonomyLevel::Supervised);
    assert_eq!(child.hierarchy_level, 1);
    assert_eq!(child.hierarchy_path, vec![parent.id, child.id]);
}

#[test]
fn detach_promotes_to_master_and_rewrites_descendant_paths() {
    let hierarchy = HierarchyService::new(Arc::new(InMemoryAgentStore::new()));
    let user_id = UserId::new();
    let root = master_profile(user_id);
    hierarchy.create_profile(root.clone()).unwrap();

    let new_sub = |name: &str, can_create_children: bool| NewSubAgent {
        name: name.into(),
        role: "assistant".into(),
        requested_autonomy: AutonomyLevel::Supervised,
        system_prompt: "help".into(),
        provider: "anthropic".into(),
        model: "scripted-model".into(),
        can_create_children,
    };

    let child = hierarchy.create_sub_agent(root.id, user_id, new_sub("child", true)).unwrap();
    let grandchild = hierarchy.create_sub_agent(child.id, user_id, new_sub("grandchild", false)).unwrap();

    hierarchy.detach_from_parent(child.id, user_id).unwrap();

    let detached = hierarchy.get_profile(child.id, user_id).unwrap();
    assert_eq!(detached.agent_type, AgentType::Master);
    assert!(detached.parent_id.is_none());
    assert_eq!(detached.hierarchy_path, vec![child.id]);

    let rewritten_grandchild = hierarchy.get_profile(grandchild.id, user_id).unwrap();
    assert_eq!(rewritten_grandchild.hierarchy_path, vec![child.id, grandchild.id]);
}

// ===========================================================================
// Permission Matrix
// ===========================================================================

#[test]
fn permission_matrix_denies_below_min_level_and_allows_above() {
    let matrix = PermissionMatrix::with_defaults();
    let agent_id = AgentId::new();

    let denied = matrix.can_execute(agent_id, "ingestKnowledge", ToolCategory::KnowledgeIngest, 1);
    assert_eq!(denied, Decision::Deny);

    let allowed = matrix.can_execute(agent_id, "ingestKnowledge", ToolCategory::KnowledgeIngest, 5);
    assert_eq!(allowed, Decision::Allow);
}

#[test]
fn unknown_category_defaults_to_allow() {
    let matrix = PermissionMatrix::with_defaults();
    let agent_id = AgentId::new();
    let decision = matrix.can_execute(agent_id, "totallyUnknownTool", ToolCategory::DEFAULT, 1);
    assert_eq!(decision, Decision::Allow);
}

#[test]
fn per_agent_override_takes_precedence_over_matrix() {
    let matrix = PermissionMatrix::with_defaults();
    let agent_id = AgentId::new();
    matrix.set_override(agent_id, "sendEmail", Override::Disable);
    let decision = matrix.can_execute(agent_id, "sendEmail", ToolCategory::CommunicationOutbound, 5);
    assert_eq!(decision, Decision::Deny);
}

// ===========================================================================
// Checkpoint Service
// ===========================================================================

#[test]
fn at_most_one_active_checkpoint_per_agent() {
    let store = CheckpointStore::new();
    let agent_id = AgentId::new();

    store.save(Checkpoint::new(agent_id, "manual".to_string(), json!(null)));
    assert!(store.load(agent_id).is_some());

    let second = Checkpoint::new(agent_id, "manual".to_string(), json!(null));
    let second_id = second.id;
    store.save(second);

    let active = store.load(agent_id).unwrap();
    assert_eq!(active.id, second_id);
    assert_eq!(store.count_active(), 1);
}

// ===========================================================================
// Idempotency Cache
// ===========================================================================

#[test]
fn idempotency_cache_dedups_pending_side_effect_calls() {
    let cache = IdempotencyCache::new();
    let agent_id = AgentId::new();
    let params = json!({"to": "+6281234", "message": "hi"});
    let key = agentcore_agent::idempotency::canonical_key(agent_id, "sendWhatsApp", &params);

    cache.record_pending(&key);
    assert!(matches!(cache.check_duplicate(&key), agentcore_agent::idempotency::DuplicateCheck::Pending));

    cache.record_complete(&key, "sent");
    match cache.check_duplicate(&key) {
        agentcore_agent::idempotency::DuplicateCheck::Completed(result) => assert_eq!(result, "sent"),
        _ => panic!("expected Completed"),
    }
}

// ===========================================================================
// Concurrency Guard
// ===========================================================================

#[tokio::test]
async fn concurrency_guard_times_out_when_saturated() {
    let guard = ConcurrencyGuard::new(1);
    let _permit = guard.acquire(std::time::Duration::from_secs(1)).await.unwrap();
    let second = guard.acquire(std::time::Duration::from_millis(50)).await;
    assert!(second.is_err());
}

#[tokio::test]
async fn concurrency_guard_wakes_waiter_after_release() {
    let guard = Arc::new(ConcurrencyGuard::new(1));
    let permit = guard.acquire(std::time::Duration::from_secs(1)).await.unwrap();

    let waiter_guard = guard.clone();
    let waiter = tokio::spawn(async move { waiter_guard.acquire(std::time::Duration::from_secs(1)).await });

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    drop(permit);
    assert!(waiter.await.unwrap().is_ok());
}

// ===========================================================================
// Hook Registry
// ===========================================================================

#[tokio::test]
async fn hooks_run_in_priority_order_and_thread_context() {
    let registry = HookRegistry::new();
    registry.register(
        "run.started",
        "first",
        10,
        Arc::new(|ctx: Value| {
            Box::pin(async move {
                let mut seen: Vec<String> = ctx["seen"]
                    .as_array()
                    .map(|a| a.iter().map(|v| v.as_str().unwrap().to_string()).collect())
                    .unwrap_or_default();
                seen.push("first".into());
                Some(json!({"seen": seen}))
            })
        }),
    );
    registry.register(
        "run.started",
        "second",
        20,
        Arc::new(|ctx: Value| {
            Box::pin(async move {
                let mut seen: Vec<String> =
                    ctx["seen"].as_array().unwrap().iter().map(|v| v.as_str().unwrap().to_string()).collect();
                seen.push("second".into());
                Some(json!({"seen": seen}))
            })
        }),
    );

    let out = registry.emit("run.started", json!({"seen": Vec::<String>::new()})).await;
    assert_eq!(out["seen"], json!(["first", "second"]));
}
