//! Trigger Engine (§4.13) — periodically scans every active agent and
//! decides whether it should think without being asked.
//!
//! Evaluates 8 trigger kinds per agent per scan. A trigger that fires
//! becomes a `SelfPrompt`: auto-executed through the Agent Runtime when its
//! confidence clears the agent's `auto_approve_threshold`, otherwise queued
//! for approval. Per-agent state (idle clock, reflection clock, pending
//! follow-ups/tasks) lives in `TriggerState`, callers feed it via
//! `record_activity`/`register_follow_up`/`register_pending_task` the same
//! way `agentcore_agent::hierarchy` treats profile storage as an injected
//! dependency rather than something the engine owns outright.

use agentcore_agent::{AgentStatus, ConcurrencyGuard, HierarchyService, RunContext};
use agentcore_core::{AgentId, AutonomyLevel, SelfPromptId, UserId};
use agentcore_tools::ToolCategory;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::config::TriggerConfig;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    IdleDetection,
    GoalCheck,
    ReflectionSchedule,
    ContextChange,
    HealthCheck,
    FollowUp,
    ProactiveContact,
    PendingTaskReminder,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::IdleDetection => "idle_detection",
            TriggerKind::GoalCheck => "goal_check",
            TriggerKind::ReflectionSchedule => "reflection_schedule",
            TriggerKind::ContextChange => "context_change",
            TriggerKind::HealthCheck => "health_check",
            TriggerKind::FollowUp => "follow_up",
            TriggerKind::ProactiveContact => "proactive_contact",
            TriggerKind::PendingTaskReminder => "pending_task_reminder",
        }
    }

    /// The tool-permission category a prompt from this trigger maps to, for
    /// checking against an agent's `require_approval_for` set (§3's
    /// Self-Prompt `approval_required` definition, §4.13).
    pub fn action_category(self) -> ToolCategory {
        match self {
            TriggerKind::IdleDetection | TriggerKind::GoalCheck | TriggerKind::ContextChange => {
                ToolCategory::Observation
            }
            TriggerKind::ReflectionSchedule => ToolCategory::SelfImprovement,
            TriggerKind::HealthCheck => ToolCategory::SelfManagement,
            TriggerKind::FollowUp | TriggerKind::PendingTaskReminder | TriggerKind::ProactiveContact => {
                ToolCategory::CommunicationOutbound
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelfPromptStatus {
    Pending,
    Approved,
    Executing,
    Executed,
    Rejected,
    Expired,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelfPrompt {
    pub id: SelfPromptId,
    pub agent_id: AgentId,
    pub user_id: UserId,
    pub trigger: TriggerKind,
    pub context: Value,
    pub suggested_action: String,
    pub confidence: f64,
    pub status: SelfPromptStatus,
    pub approval_required: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

const SELF_PROMPT_TTL: Duration = Duration::hours(24);
const SELF_PROMPT_DEADLINE: StdDuration = StdDuration::from_secs(180);

/// Per-agent bookkeeping the engine needs to decide what fires. Callers feed
/// this as activity happens elsewhere in the system; the engine never infers
/// it from message content.
#[derive(Clone, Debug)]
struct TriggerState {
    last_activity_at: DateTime<Utc>,
    last_reflection_at: DateTime<Utc>,
    goals: Vec<GoalState>,
    pending_follow_ups: Vec<String>,
    pending_tasks: Vec<String>,
    context_changed: bool,
    health_degraded: bool,
    recent_prompts: VecDeque<DateTime<Utc>>,
}

impl Default for TriggerState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            last_activity_at: now,
            last_reflection_at: now,
            goals: Vec::new(),
            pending_follow_ups: Vec::new(),
            pending_tasks: Vec::new(),
            context_changed: false,
            health_degraded: false,
            recent_prompts: VecDeque::new(),
        }
    }
}

struct Candidate {
    kind: TriggerKind,
    confidence: f64,
    suggested_action: String,
    context: Value,
}

/// A single standing goal an agent is tracking, as fed in by
/// `register_goal` (§4.13's `goal_check` trigger reads these, it never
/// infers progress/deadlines from message content).
#[derive(Clone, Debug)]
struct GoalState {
    id: String,
    deadline: Option<DateTime<Utc>>,
    progress: f64,
}

/// Drives self-initiated agent activity (§4.13).
pub struct TriggerEngine {
    hierarchy: Arc<HierarchyService>,
    runtime: Arc<agentcore_agent::AgentRuntime>,
    concurrency: Arc<ConcurrencyGuard>,
    config: TriggerConfig,
    state: DashMap<AgentId, TriggerState>,
    prompts: DashMap<SelfPromptId, SelfPrompt>,
}

impl TriggerEngine {
    pub fn new(
        hierarchy: Arc<HierarchyService>,
        runtime: Arc<agentcore_agent::AgentRuntime>,
        concurrency: Arc<ConcurrencyGuard>,
        config: TriggerConfig,
    ) -> Self {
        Self {
            hierarchy,
            runtime,
            concurrency,
            config,
            state: DashMap::new(),
            prompts: DashMap::new(),
        }
    }

    pub fn record_activity(&self, agent_id: AgentId) {
        self.state.entry(agent_id).or_default().last_activity_at = Utc::now();
    }

    pub fn register_follow_up(&self, agent_id: AgentId, note: impl Into<String>) {
        self.state.entry(agent_id).or_default().pending_follow_ups.push(note.into());
    }

    pub fn register_pending_task(&self, agent_id: AgentId, task: impl Into<String>) {
        self.state.entry(agent_id).or_default().pending_tasks.push(task.into());
    }

    /// Upserts a standing goal's deadline/progress for the `goal_check`
    /// trigger (§4.13). `progress` is in `[0, 1]`.
    pub fn register_goal(
        &self,
        agent_id: AgentId,
        id: impl Into<String>,
        deadline: Option<DateTime<Utc>>,
        progress: f64,
    ) {
        let id = id.into();
        let mut state = self.state.entry(agent_id).or_default();
        match state.goals.iter_mut().find(|g| g.id == id) {
            Some(g) => {
                g.deadline = deadline;
                g.progress = progress;
            }
            None => state.goals.push(GoalState { id, deadline, progress }),
        }
    }

    pub fn mark_context_changed(&self, agent_id: AgentId) {
        self.state.entry(agent_id).or_default().context_changed = true;
    }

    pub fn mark_health_degraded(&self, agent_id: AgentId, degraded: bool) {
        self.state.entry(agent_id).or_default().health_degraded = degraded;
    }

    pub fn pending_prompts(&self, agent_id: AgentId) -> Vec<SelfPrompt> {
        self.prompts
            .iter()
            .filter(|e| e.agent_id == agent_id && e.status == SelfPromptStatus::Pending)
            .map(|e| e.clone())
            .collect()
    }

    pub fn approve_prompt(&self, id: SelfPromptId) -> Option<SelfPrompt> {
        self.prompts.get_mut(&id).map(|mut p| {
            p.status = SelfPromptStatus::Approved;
            p.clone()
        })
    }

    pub fn reject_prompt(&self, id: SelfPromptId) {
        if let Some(mut p) = self.prompts.get_mut(&id) {
            p.status = SelfPromptStatus::Rejected;
        }
    }

    /// One scan across every active agent. Returns the prompts created this
    /// scan (fired but not necessarily auto-executed).
    pub async fn scan_once(&self) -> Vec<SelfPrompt> {
        let mut created = Vec::new();
        for profile in self.hierarchy.list_all_profiles() {
            // Eligibility (§4.13): only active agents at semi-autonomous or
            // autonomous autonomy are scanned. `supervised` agents and any
            // non-active lifecycle status (inactive/paused/deleted) never
            // receive self-prompts.
            let eligible = profile.status == AgentStatus::Active
                && matches!(profile.autonomy_level, AutonomyLevel::SemiAutonomous | AutonomyLevel::Autonomous);
            if !eligible {
                continue;
            }

            let candidates = self.evaluate(profile.id);
            if candidates.is_empty() {
                continue;
            }
            if !self.under_rate_limit(profile.id, profile.max_prompts_per_hour) {
                tracing::debug!(agent = %profile.id, "trigger engine: hourly prompt budget exhausted");
                continue;
            }

            // Fire at most one trigger per agent per scan: highest confidence wins.
            let best = candidates.into_iter().max_by(|a, b| a.confidence.total_cmp(&b.confidence)).unwrap();
            let auto_approve = best.confidence >= profile.auto_approve_threshold
                && !profile.require_approval_for.contains(&best.kind.action_category());

            let now = Utc::now();
            let prompt = SelfPrompt {
                id: SelfPromptId::new(),
                agent_id: profile.id,
                user_id: profile.user_id,
                trigger: best.kind,
                context: best.context.clone(),
                suggested_action: best.suggested_action.clone(),
                confidence: best.confidence,
                status: if auto_approve { SelfPromptStatus::Approved } else { SelfPromptStatus::Pending },
                approval_required: !auto_approve,
                created_at: now,
                expires_at: now + SELF_PROMPT_TTL,
            };
            self.prompts.insert(prompt.id, prompt.clone());
            self.record_prompt_fired(profile.id);
            self.reset_trigger_clock(profile.id, best.kind);

            // Only autonomous agents execute an approved prompt immediately;
            // semi-autonomous agents get an `approved` record but wait.
            if auto_approve && profile.autonomy_level == AutonomyLevel::Autonomous {
                self.execute(&prompt).await;
            }
            created.push(prompt);
        }
        created
    }

    /// Execute an approved prompt through a supervised concurrency-guarded
    /// run. Skips (leaves `Approved`, retried next scan) if the guard is
    /// saturated rather than blocking the scan loop (§4.13, §5).
    pub async fn execute(&self, prompt: &SelfPrompt) {
        let Some(_permit) = self.concurrency.try_acquire() else {
            return;
        };
        if let Some(mut p) = self.prompts.get_mut(&prompt.id) {
            p.status = SelfPromptStatus::Executing;
        }

        let mut ctx = RunContext::new(prompt.agent_id, prompt.user_id, prompt.trigger.as_str(), prompt.context.clone());
        ctx.deadline = Some(SELF_PROMPT_DEADLINE);
        let result = self.runtime.run(ctx).await;
        tracing::debug!(
            agent = %prompt.agent_id,
            trigger = prompt.trigger.as_str(),
            iterations = result.iterations,
            silent = result.silent,
            "trigger engine: self-prompt run finished"
        );

        if let Some(mut p) = self.prompts.get_mut(&prompt.id) {
            p.status = SelfPromptStatus::Executed;
        }
    }

    /// Drop prompts past their 24h TTL. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.prompts.len();
        let now = Utc::now();
        self.prompts.retain(|_, p| p.expires_at > now || p.status != SelfPromptStatus::Pending);
        before - self.prompts.len()
    }

    fn evaluate(&self, agent_id: AgentId) -> Vec<Candidate> {
        let Some(state) = self.state.get(&agent_id) else {
            return Vec::new();
        };
        let now = Utc::now();
        let mut out = Vec::new();

        let idle_secs = (now - state.last_activity_at).num_seconds().max(0) as u64;
        if idle_secs >= self.config.idle_threshold_secs {
            out.push(Candidate {
                kind: TriggerKind::IdleDetection,
                confidence: 0.8,
                suggested_action: "check in after a period of inactivity".to_string(),
                context: json!({"idle_secs": idle_secs}),
            });
        }

        let reflection_due = (now - state.last_reflection_at).num_seconds().max(0) as u64
            >= self.config.reflection_interval_secs;
        if reflection_due {
            out.push(Candidate {
                kind: TriggerKind::ReflectionSchedule,
                confidence: 0.85,
                suggested_action: "reflect on recent runs and consolidate memory".to_string(),
                context: json!({}),
            });
        }

        if state.context_changed {
            out.push(Candidate {
                kind: TriggerKind::ContextChange,
                confidence: 0.8,
                suggested_action: "re-evaluate plans in light of a changed context".to_string(),
                context: json!({}),
            });
        }

        if state.health_degraded {
            out.push(Candidate {
                kind: TriggerKind::HealthCheck,
                confidence: 0.85,
                suggested_action: "run a self-diagnostic after degraded health signals".to_string(),
                context: json!({}),
            });
        }

        if !state.pending_follow_ups.is_empty() {
            out.push(Candidate {
                kind: TriggerKind::FollowUp,
                confidence: 0.85,
                suggested_action: format!("follow up on: {}", state.pending_follow_ups.join("; ")),
                context: json!({"follow_ups": state.pending_follow_ups}),
            });
        }

        if !state.pending_tasks.is_empty() {
            out.push(Candidate {
                kind: TriggerKind::PendingTaskReminder,
                confidence: 0.8,
                suggested_action: format!("remind about pending tasks: {}", state.pending_tasks.join("; ")),
                context: json!({"pending_tasks": state.pending_tasks}),
            });
        }

        // goal_check (§4.13): any active goal with deadline <= 3 days away
        // and progress < 80%, or a goal with no deadline and progress < 20%.
        // A deadline-driven hit is more urgent than a stalled-with-no-deadline
        // one, so it gets the higher end of the spec's 0.75-0.95 range.
        let deadline_cutoff = now + Duration::days(3);
        let urgent_goals: Vec<&GoalState> = state
            .goals
            .iter()
            .filter(|g| match g.deadline {
                Some(deadline) => deadline <= deadline_cutoff && g.progress < 0.8,
                None => g.progress < 0.2,
            })
            .collect();
        if let Some(worst) = urgent_goals
            .iter()
            .min_by(|a, b| a.progress.total_cmp(&b.progress))
        {
            let confidence = if worst.deadline.is_some() { 0.95 } else { 0.75 };
            out.push(Candidate {
                kind: TriggerKind::GoalCheck,
                confidence,
                suggested_action: "check progress against standing goals".to_string(),
                context: json!({
                    "urgent_goal_ids": urgent_goals.iter().map(|g| g.id.clone()).collect::<Vec<_>>(),
                }),
            });
        }

        if idle_secs >= self.config.idle_threshold_secs * 4 {
            out.push(Candidate {
                kind: TriggerKind::ProactiveContact,
                confidence: 0.9,
                suggested_action: "reach out proactively after an extended silence".to_string(),
                context: json!({"idle_secs": idle_secs}),
            });
        }

        out
    }

    fn reset_trigger_clock(&self, agent_id: AgentId, kind: TriggerKind) {
        if let Some(mut state) = self.state.get_mut(&agent_id) {
            let now = Utc::now();
            match kind {
                TriggerKind::IdleDetection | TriggerKind::ProactiveContact => state.last_activity_at = now,
                TriggerKind::ReflectionSchedule => state.last_reflection_at = now,
                // Goal urgency is caller-fed state (`register_goal`), not a
                // clock; it keeps firing each scan until progress/deadline
                // is updated, bounded by the per-agent hourly rate limit.
                TriggerKind::GoalCheck => {}
                TriggerKind::ContextChange => state.context_changed = false,
                TriggerKind::HealthCheck => state.health_degraded = false,
                TriggerKind::FollowUp => state.pending_follow_ups.clear(),
                TriggerKind::PendingTaskReminder => state.pending_tasks.clear(),
            }
        }
    }

    fn under_rate_limit(&self, agent_id: AgentId, max_per_hour: u32) -> bool {
        let mut state = self.state.entry(agent_id).or_default();
        let cutoff = Utc::now() - Duration::hours(1);
        while state.recent_prompts.front().is_some_and(|t| *t < cutoff) {
            state.recent_prompts.pop_front();
        }
        (state.recent_prompts.len() as u32) < max_per_hour
    }

    fn record_prompt_fired(&self, agent_id: AgentId) {
        self.state.entry(agent_id).or_default().recent_prompts.push_back(Utc::now());
    }

    /// Run `scan_once` on a fixed interval until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: tokio_util::sync::CancellationToken) {
        let mut interval = tokio::time::interval(StdDuration::from_secs(self.config.scan_interval_secs));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    self.scan_once().await;
                    self.cleanup_expired();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentcore_agent::{
        AgentProfile, AgentStatus, AgentType, Budgets, ChildCreationPolicy, CheckpointStore, ConcurrencyGuard as Guard,
        CreatedByType, HeartbeatConfig, HierarchyService, HookRegistry, IdempotencyCache, InMemoryAgentStore,
        InheritanceFlags, ModelRoutingConfig, PermissionMatrix,
    };
    use agentcore_core::AutonomyLevel;
    use agentcore_llm::{LlmError, LlmProvider, LlmRequest, LlmResult, LlmStream, StreamDelta};
    use futures::stream;
    use std::collections::HashSet;
    use tempfile::TempDir;

    struct SilentProvider;
    #[async_trait::async_trait]
    impl LlmProvider for SilentProvider {
        fn name(&self) -> &str {
            "silent"
        }
        fn models(&self) -> &[&str] {
            &["scripted-model"]
        }
        async fn complete_stream(
            &self,
            _request: LlmRequest,
            _cancel: Option<tokio_util::sync::CancellationToken>,
        ) -> LlmResult<LlmStream> {
            let items: Vec<Result<StreamDelta, LlmError>> = vec![Ok(StreamDelta::ToolCallStart {
                id: "t1".into(),
                name: "silent".into(),
            }), Ok(StreamDelta::ToolCallEnd { id: "t1".into() }), Ok(StreamDelta::Done { stop_reason: None, usage: None })];
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn profile(user_id: agentcore_core::UserId, auto_approve_threshold: f64) -> AgentProfile {
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
            max_prompts_per_hour: 10,
            auto_approve_threshold,
        }
    }

    fn build_engine(config: TriggerConfig) -> (Arc<TriggerEngine>, Arc<HierarchyService>, TempDir) {
        let workspace = TempDir::new().unwrap();
        let hierarchy = Arc::new(HierarchyService::new(Arc::new(InMemoryAgentStore::new())));
        let runtime = Arc::new(agentcore_agent::AgentRuntime::new(
            Arc::new(SilentProvider),
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
            Arc::new(agentcore_core::audit::InMemoryAuditLog::new()),
        ));
        let engine = Arc::new(TriggerEngine::new(hierarchy.clone(), runtime, Arc::new(Guard::new(4)), config));
        (engine, hierarchy, workspace)
    }

    #[tokio::test]
    async fn idle_detection_fires_after_threshold_and_auto_executes_above_confidence() {
        let mut cfg = TriggerConfig::default();
        cfg.idle_threshold_secs = 0;
        cfg.reflection_interval_secs = 999_999;
        let (engine, hierarchy, _workspace) = build_engine(cfg);
        let user_id = UserId::new();
        let p = profile(user_id, 0.5);
        hierarchy.create_profile(p.clone()).unwrap();
        engine.state.entry(p.id).or_default().last_activity_at = Utc::now() - Duration::hours(1);

        let created = engine.scan_once().await;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].trigger, TriggerKind::IdleDetection);
        assert_eq!(created[0].status, SelfPromptStatus::Executed);
    }

    #[tokio::test]
    async fn low_confidence_trigger_is_queued_not_executed() {
        let mut cfg = TriggerConfig::default();
        cfg.idle_threshold_secs = 999_999;
        cfg.reflection_interval_secs = 999_999;
        let (engine, hierarchy, _workspace) = build_engine(cfg);
        let user_id = UserId::new();
        let p = profile(user_id, 0.99);
        hierarchy.create_profile(p.clone()).unwrap();
        engine.register_pending_task(p.id, "file the report");

        let created = engine.scan_once().await;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].status, SelfPromptStatus::Pending);
        assert_eq!(engine.pending_prompts(p.id).len(), 1);
    }

    #[tokio::test]
    async fn rate_limit_blocks_further_prompts_within_the_hour() {
        let mut cfg = TriggerConfig::default();
        cfg.idle_threshold_secs = 999_999;
        cfg.reflection_interval_secs = 999_999;
        let (engine, hierarchy, _workspace) = build_engine(cfg);
        let user_id = UserId::new();
        let mut p = profile(user_id, 0.99);
        p.max_prompts_per_hour = 1;
        hierarchy.create_profile(p.clone()).unwrap();

        engine.register_pending_task(p.id, "task a");
        assert_eq!(engine.scan_once().await.len(), 1);
        engine.register_pending_task(p.id, "task b");
        assert_eq!(engine.scan_once().await.len(), 0);
    }

    #[tokio::test]
    async fn supervised_and_inactive_agents_are_never_scanned() {
        let cfg = TriggerConfig::default();
        let (engine, hierarchy, _workspace) = build_engine(cfg);
        let user_id = UserId::new();

        let mut supervised = profile(user_id, 0.1);
        supervised.autonomy_level = AutonomyLevel::Supervised;
        hierarchy.create_profile(supervised.clone()).unwrap();
        engine.register_pending_task(supervised.id, "task");

        let mut paused = profile(user_id, 0.1);
        paused.status = AgentStatus::Paused;
        hierarchy.create_profile(paused.clone()).unwrap();
        engine.register_pending_task(paused.id, "task");

        assert!(engine.scan_once().await.is_empty());
    }

    #[tokio::test]
    async fn require_approval_for_action_blocks_auto_approval() {
        let cfg = TriggerConfig::default();
        let (engine, hierarchy, _workspace) = build_engine(cfg);
        let user_id = UserId::new();
        let mut p = profile(user_id, 0.1);
        p.require_approval_for.insert(TriggerKind::PendingTaskReminder.action_category());
        hierarchy.create_profile(p.clone()).unwrap();
        engine.register_pending_task(p.id, "file the report");

        let created = engine.scan_once().await;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].status, SelfPromptStatus::Pending);
        assert!(created[0].approval_required);
    }

    #[tokio::test]
    async fn semi_autonomous_agent_approves_without_auto_executing() {
        let cfg = TriggerConfig::default();
        let (engine, hierarchy, _workspace) = build_engine(cfg);
        let user_id = UserId::new();
        let mut p = profile(user_id, 0.1);
        p.autonomy_level = AutonomyLevel::SemiAutonomous;
        hierarchy.create_profile(p.clone()).unwrap();
        engine.register_pending_task(p.id, "file the report");

        let created = engine.scan_once().await;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].status, SelfPromptStatus::Approved);
    }

    #[tokio::test]
    async fn goal_check_fires_for_near_deadline_low_progress_goal() {
        let cfg = TriggerConfig::default();
        let (engine, hierarchy, _workspace) = build_engine(cfg);
        let user_id = UserId::new();
        let p = profile(user_id, 0.99);
        hierarchy.create_profile(p.clone()).unwrap();
        engine.register_goal(p.id, "launch", Some(Utc::now() + Duration::days(1)), 0.3);

        let created = engine.scan_once().await;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].trigger, TriggerKind::GoalCheck);
        assert!(created[0].confidence >= 0.75 && created[0].confidence <= 0.95);
    }
}
