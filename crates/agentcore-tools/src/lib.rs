//! Agenticlaw Tools — modular tool implementations
//!
//! Each tool is a self-contained file in src/tools/.
//! To add a tool: create the file, implement Tool trait, register below.
//! To remove a tool: delete the file, remove from mod.rs and registry below.

pub mod catalogue;
pub mod registry;
pub mod tools;

pub use catalogue::{is_side_effect_tool, remap_params, ToolCategory, SIDE_EFFECT_TOOLS};
pub use registry::{Tool, ToolRegistry, ToolResult};
pub use tools::orchestrate::{create_orchestrator_handle, OrchestrateTool, Orchestrable, OrchestratorHandle};
pub use tools::spawn::{SpawnTool, SpawnableRuntime, RuntimeHandle};

use agentcore_core::{AgentId, UserId};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Create the default tool registry with all builtin tools.
///
/// Edit this function to add or remove tools from the agent.
/// Create a runtime handle for the spawn tool. Call this before creating the registry,
/// then set the runtime after constructing AgentRuntime.
pub fn create_runtime_handle() -> RuntimeHandle {
    Arc::new(RwLock::new(None))
}

pub fn create_default_registry(workspace_root: impl AsRef<Path>) -> ToolRegistry {
    create_default_registry_with_spawn(workspace_root, create_runtime_handle())
}

/// Create registry with a shared runtime handle for the spawn tool.
/// After constructing AgentRuntime, call `runtime_handle.write().await = Some(runtime)`.
pub fn create_default_registry_with_spawn(
    workspace_root: impl AsRef<Path>,
    runtime_handle: RuntimeHandle,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let root = workspace_root.as_ref();

    // --- Core tools (read-only) ---
    registry.register(tools::read::ReadTool::new(root));
    registry.register(tools::glob::GlobTool::new(root));
    registry.register(tools::grep::GrepTool::new(root));

    // --- Mutation tools ---
    registry.register(tools::write::WriteTool::new(root));
    registry.register(tools::edit::EditTool::new(root));
    registry.register(tools::bash::BashTool::new(root));

    // --- KG primitive: recursive sub-agent spawning ---
    registry.register(tools::spawn::SpawnTool::new(root, runtime_handle));

    registry
}

/// Build the tool list for a run at the given `_orchestrationDepth`. Depth
/// >= 1 runs never see `orchestrate` (§4.9 recursion layer 2).
#[allow(clippy::too_many_arguments)]
pub fn create_runtime_registry(
    workspace_root: impl AsRef<Path>,
    runtime_handle: RuntimeHandle,
    orchestrator_handle: OrchestratorHandle,
    agent_id: AgentId,
    user_id: UserId,
    orchestration_depth: u32,
) -> ToolRegistry {
    let mut registry = create_default_registry_with_spawn(&workspace_root, runtime_handle);
    if orchestration_depth == 0 {
        registry.register(tools::orchestrate::OrchestrateTool::new(
            orchestrator_handle,
            agent_id,
            user_id,
            orchestration_depth,
        ));
    }
    registry
}

/// Create a policy-scoped tool registry.
///
/// Only registers tools whose names appear in `allowed_tools`.
/// Used by operator containers to enforce policy at the tool registration level.
/// If a tool isn't registered, the LLM never sees it and can't call it.
pub fn create_policy_registry(workspace_root: impl AsRef<Path>, allowed_tools: &[&str]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let root = workspace_root.as_ref();

    for name in allowed_tools {
        match *name {
            "read" => registry.register(tools::read::ReadTool::new(root)),
            "glob" => registry.register(tools::glob::GlobTool::new(root)),
            "grep" => registry.register(tools::grep::GrepTool::new(root)),
            "write" => registry.register(tools::write::WriteTool::new(root)),
            "edit" => registry.register(tools::edit::EditTool::new(root)),
            "bash" => registry.register(tools::bash::BashTool::new(root)),
            _ => tracing::warn!("Unknown tool in policy: {}", name),
        }
    }

    registry
}
