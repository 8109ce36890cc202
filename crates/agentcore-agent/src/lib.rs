//! Agenticlaw Agent — the reasoning runtime, orchestration, and hierarchy
//! services that sit above the tool layer.

pub mod approval;
pub mod checkpoint;
pub mod concurrency;
pub mod context;
pub mod error_analyzer;
pub mod execution_history;
pub mod hierarchy;
pub mod hooks;
pub mod idempotency;
pub mod orchestrator;
pub mod permission;
pub mod plan;
pub mod profile;
pub mod recovery;
pub mod runtime;
pub mod subagent;

pub use approval::{ApprovalRequest, ApprovalStatus, ApprovalStore, InMemoryApprovalStore};
pub use checkpoint::{Checkpoint, CheckpointStatus, CheckpointStore};
pub use concurrency::{ConcurrencyGuard, GuardPermit};
pub use context::ContextManager;
pub use execution_history::{ExecutionHistory, ExecutionRecord};
pub use hierarchy::{AgentStore, HierarchyService, InMemoryAgentStore, NewSubAgent};
pub use hooks::{HookContext, HookRegistry};
pub use idempotency::IdempotencyCache;
pub use orchestrator::Orchestrator;
pub use permission::{Decision, Override, PermissionMatrix};
pub use plan::{Plan, PlanExecutor, PlanStatus, PlanStep, PLAN_DEADLINE_MS};
pub use profile::{
    AgentProfile, AgentStatus, AgentType, Budgets, ChildCreationPolicy, CreatedByType,
    HeartbeatConfig, InheritanceFlags, ModelRoutingConfig,
};
pub use recovery::RecoveryStrategies;
pub use runtime::{AgentRuntime, RunContext, RunResult};
pub use subagent::{
    purpose_hash_name, SubagentEntry, SubagentInfo, SubagentRegistry, SubagentStatus,
};
