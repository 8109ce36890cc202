//! Heartbeat Monitor (§4.14) — notices when an agent with
//! `AgentProfile.heartbeat.enabled` has gone quiet and escalates.
//!
//! Each tick runs a short reasoning cycle through the Agent Runtime with
//! `trigger = "heartbeat"`. An agent that terminates via the reserved
//! `heartbeat_ok`/`silent` tool names (see `agentcore_agent::runtime`)
//! counts as a hit; anything else (timeout, error, an agent that tries to
//! take a real action instead) counts as a miss. `escalate_after_misses`
//! consecutive misses raises an audit event rather than paging anyone
//! directly — delivery is a transport concern this crate does not own.

use agentcore_agent::{AgentRuntime, ConcurrencyGuard, HierarchyService, RunContext};
use agentcore_core::audit::{AuditCategory, AuditLog, Direction};
use agentcore_core::AgentId;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::HeartbeatMonitorConfig;

const HEARTBEAT_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Default)]
struct MissCounter {
    consecutive_misses: AtomicU32,
}

/// Drives per-agent heartbeat checks (§4.14).
pub struct HeartbeatMonitor {
    hierarchy: Arc<HierarchyService>,
    runtime: Arc<AgentRuntime>,
    concurrency: Arc<ConcurrencyGuard>,
    audit: Arc<dyn AuditLog>,
    config: HeartbeatMonitorConfig,
    misses: DashMap<AgentId, MissCounter>,
}

impl HeartbeatMonitor {
    pub fn new(
        hierarchy: Arc<HierarchyService>,
        runtime: Arc<AgentRuntime>,
        concurrency: Arc<ConcurrencyGuard>,
        audit: Arc<dyn AuditLog>,
        config: HeartbeatMonitorConfig,
    ) -> Self {
        Self {
            hierarchy,
            runtime,
            concurrency,
            audit,
            config,
            misses: DashMap::new(),
        }
    }

    pub fn consecutive_misses(&self, agent_id: AgentId) -> u32 {
        self.misses
            .get(&agent_id)
            .map(|c| c.consecutive_misses.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Run one heartbeat cycle for every agent with heartbeats enabled.
    pub async fn check_all(&self) {
        for profile in self.hierarchy.list_all_profiles() {
            if !profile.heartbeat.enabled {
                continue;
            }
            let escalate_after = if profile.heartbeat.escalate_after_misses > 0 {
                profile.heartbeat.escalate_after_misses
            } else {
                self.config.default_escalate_after_misses
            };
            self.check_one(profile.id, profile.user_id, escalate_after).await;
        }
    }

    async fn check_one(&self, agent_id: AgentId, user_id: agentcore_core::UserId, escalate_after: u32) {
        let Some(_permit) = self.concurrency.try_acquire() else {
            tracing::debug!(agent = %agent_id, "heartbeat skipped: concurrency guard saturated");
            return;
        };

        let mut ctx = RunContext::new(agent_id, user_id, "heartbeat", json!({}));
        ctx.deadline = Some(HEARTBEAT_DEADLINE);
        ctx.max_iterations = Some(1);
        ctx.max_tool_calls = Some(1);

        let result = self.runtime.run(ctx).await;
        let hit = result.silent && result.iterations <= 1;

        let counter = self.misses.entry(agent_id).or_default();
        if hit {
            counter.consecutive_misses.store(0, Ordering::Relaxed);
            return;
        }

        let misses = counter.consecutive_misses.fetch_add(1, Ordering::Relaxed) + 1;
        drop(counter);

        self.audit.log(
            agent_id,
            user_id,
            AuditCategory::Error,
            Direction::Internal,
            Some(format!("heartbeat miss #{misses} for agent {agent_id}")),
            json!({"consecutive_misses": misses, "at": Utc::now()}),
        );

        if misses >= escalate_after {
            tracing::warn!(
                agent = %agent_id,
                misses,
                escalate_after,
                "heartbeat monitor: escalating unresponsive agent"
            );
            self.audit.log(
                agent_id,
                user_id,
                AuditCategory::Error,
                Direction::Internal,
                Some(format!("agent {agent_id} escalated after {misses} consecutive heartbeat misses")),
                json!({"escalated": true, "consecutive_misses": misses}),
            );
        }
    }

    /// Run `check_all` on a fixed cadence until `cancel` fires. Individual
    /// agents use their own `heartbeat.interval_ms`; this loop just needs to
    /// tick often enough to catch the shortest configured interval, so it
    /// runs at `default_interval_ms` unconditionally.
    pub async fn run(self: Arc<Self>, cancel: tokio_util::sync::CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.default_interval_ms));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => self.check_all().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_agent::{
        AgentProfile, AgentStatus, AgentType, Budgets, ChildCreationPolicy, CheckpointStore, ConcurrencyGuard as Guard,
        CreatedByType, HeartbeatConfig, HookRegistry, IdempotencyCache, InMemoryAgentStore, InheritanceFlags,
        ModelRoutingConfig, PermissionMatrix,
    };
    use agentcore_core::audit::InMemoryAuditLog;
    use agentcore_core::{AutonomyLevel, UserId};
    use agentcore_llm::{LlmError, LlmProvider, LlmRequest, LlmResult, LlmStream, StreamDelta};
    use futures::stream;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct ScriptedProvider {
        responses: Mutex<Vec<Vec<StreamDelta>>>,
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
            _cancel: Option<tokio_util::sync::CancellationToken>,
        ) -> LlmResult<LlmStream> {
            let mut responses = self.responses.lock().unwrap();
            let turn = if responses.is_empty() { Vec::new() } else { responses.remove(0) };
            let items: Vec<Result<StreamDelta, LlmError>> = turn.into_iter().map(Ok).collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn ok_turn(tool: &str) -> Vec<StreamDelta> {
        vec![
            StreamDelta::ToolCallStart { id: "t1".into(), name: tool.into() },
            StreamDelta::ToolCallEnd { id: "t1".into() },
            StreamDelta::Done { stop_reason: None, usage: None },
        ]
    }

    fn profile(user_id: UserId, interval_ms: u64, escalate_after: u32) -> AgentProfile {
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
            heartbeat: HeartbeatConfig { enabled: true, interval_ms, escalate_after_misses: escalate_after },
            max_prompts_per_hour: 10,
            auto_approve_threshold: 0.9,
        }
    }

    fn build_monitor(
        llm: Arc<dyn LlmProvider>,
        config: HeartbeatMonitorConfig,
    ) -> (Arc<HeartbeatMonitor>, Arc<HierarchyService>, TempDir) {
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
            Arc::new(Guard::new(4)),
            Arc::new(HookRegistry::new()),
            Arc::new(agentcore_agent::ExecutionHistory::new()),
            Arc::new(InMemoryAuditLog::new()),
        ));
        let audit: Arc<dyn AuditLog> = Arc::new(InMemoryAuditLog::new());
        let monitor = Arc::new(HeartbeatMonitor::new(hierarchy.clone(), runtime, Arc::new(Guard::new(4)), audit, config));
        (monitor, hierarchy, workspace)
    }

    #[tokio::test]
    async fn heartbeat_ok_resets_miss_counter() {
        let llm = Arc::new(ScriptedProvider { responses: Mutex::new(vec![ok_turn("heartbeat_ok")]) });
        let (monitor, hierarchy, _ws) = build_monitor(llm, HeartbeatMonitorConfig::default());
        let p = profile(UserId::new(), 1000, 3);
        hierarchy.create_profile(p.clone()).unwrap();

        monitor.check_all().await;
        assert_eq!(monitor.consecutive_misses(p.id), 0);
    }

    #[tokio::test]
    async fn repeated_non_terminations_escalate_after_threshold() {
        // "respond" is a terminal action but not a heartbeat hit by our
        // definition once iterations exceed 1; force a miss by returning no
        // stream items at all (provider goes silent without ending cleanly).
        let llm = Arc::new(ScriptedProvider { responses: Mutex::new(vec![vec![], vec![], vec![]]) });
        let (monitor, hierarchy, _ws) = build_monitor(llm, HeartbeatMonitorConfig::default());
        let p = profile(UserId::new(), 1000, 2);
        hierarchy.create_profile(p.clone()).unwrap();

        monitor.check_all().await;
        assert_eq!(monitor.consecutive_misses(p.id), 1);
        monitor.check_all().await;
        assert_eq!(monitor.consecutive_misses(p.id), 2);
    }
}
