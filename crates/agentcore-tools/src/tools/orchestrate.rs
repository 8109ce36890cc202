//! Orchestrate tool — the manager-agent entry point into the Orchestrator.
//!
//! Same indirection as `spawn.rs`'s `SpawnableRuntime`: the Orchestrator
//! lives in `agentcore-agent`, which already depends on this crate, so the
//! tool cannot hold a direct reference without a cycle. Instead it holds a
//! handle to a trait object set after the orchestrator is constructed.

use crate::catalogue::ToolCategory;
use crate::registry::{Tool, ToolResult};
use agentcore_core::{AgentId, UserId};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared handle to the orchestrator, set after construction — breaks the
/// tools → agent circular dependency the same way `spawn::RuntimeHandle` does.
pub type OrchestratorHandle = Arc<RwLock<Option<Arc<dyn Orchestrable>>>>;

#[async_trait::async_trait]
pub trait Orchestrable: Send + Sync {
    /// Run an orchestrated decomposition on behalf of `agent_id`/`user_id`
    /// (the manager whose sub-agents are candidates for reuse). `depth` is
    /// the caller's current `_orchestrationDepth`; implementations must
    /// refuse (PolicyViolation) when `depth >= 1`. Returns the serialized
    /// `OrchestrationResult`.
    async fn orchestrate(
        &self,
        agent_id: AgentId,
        user_id: UserId,
        goal: &str,
        subtasks: Value,
        mode: &str,
        depth: u32,
    ) -> Result<Value, String>;
}

pub fn create_orchestrator_handle() -> OrchestratorHandle {
    Arc::new(RwLock::new(None))
}

pub struct OrchestrateTool {
    handle: OrchestratorHandle,
    agent_id: AgentId,
    user_id: UserId,
    /// Recursion-layer-1 depth carried from the invoking run's trigger
    /// context. Tool registries built for depth >= 1 runs simply omit this
    /// tool (§4.9 layer 2); this field backstops layer 1 for registries
    /// that do include it.
    depth: u32,
}

impl OrchestrateTool {
    pub fn new(handle: OrchestratorHandle, agent_id: AgentId, user_id: UserId, depth: u32) -> Self {
        Self { handle, agent_id, user_id, depth }
    }
}

#[async_trait::async_trait]
impl Tool for OrchestrateTool {
    fn name(&self) -> &str {
        "orchestrate"
    }

    fn description(&self) -> &str {
        "Decompose a goal into subtasks and delegate each to a specialist sub-agent, reusing \
         an existing specialist when one fits well or creating a new one otherwise."
    }

    fn prompt(&self) -> &str {
        "Use orchestrate to split a goal you cannot finish alone into independent subtasks. \
         Each subtask is handed to a specialist sub-agent (reused if a good match exists, \
         otherwise created). Sub-agents cannot themselves orchestrate further."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["goal", "subtasks"],
            "properties": {
                "goal": {"type": "string"},
                "subtasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["title", "description"],
                        "properties": {
                            "title": {"type": "string"},
                            "description": {"type": "string"},
                            "required_skills": {"type": "array", "items": {"type": "string"}}
                        }
                    }
                },
                "mode": {"type": "string", "enum": ["parallel", "sequential"], "default": "parallel"}
            }
        })
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::SubagentManage
    }

    fn is_side_effect(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> ToolResult {
        if self.depth >= 1 {
            return ToolResult::Json(json!({
                "success": false,
                "error": "Sub-agents cannot orchestrate further — recursion depth exceeded."
            }));
        }

        let goal = match args.get("goal").and_then(|v| v.as_str()) {
            Some(g) => g,
            None => return ToolResult::error("'goal' is required"),
        };
        let subtasks = match args.get("subtasks") {
            Some(s) if s.is_array() => s.clone(),
            _ => return ToolResult::error("'subtasks' must be an array"),
        };
        let mode = args.get("mode").and_then(|v| v.as_str()).unwrap_or("parallel");

        let guard = self.handle.read().await;
        let orchestrator = match guard.as_ref() {
            Some(o) => o.clone(),
            None => return ToolResult::error("Orchestrator not initialized"),
        };
        drop(guard);

        match orchestrator
            .orchestrate(self.agent_id, self.user_id, goal, subtasks, mode, self.depth)
            .await
        {
            Ok(result) => ToolResult::Json(result),
            Err(e) => ToolResult::Json(json!({"success": false, "error": e})),
        }
    }
}
