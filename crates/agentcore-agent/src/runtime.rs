//! Agent Runtime (§4.8) — the reasoning loop that drives one run from a
//! trigger to a terminal action.
//!
//! One iteration is: assemble context, ask the Model Router for exactly one
//! action, and either act on a terminal action (`done`/`respond`/`silent`/
//! `heartbeat_ok`) or route a tool call through the Permission Matrix,
//! Idempotency Cache, and Recovery Strategies. Terminal actions are modeled
//! as reserved tool names rather than a separate response channel, since the
//! streaming `ContentBlock`/`StreamDelta` machinery in `agentcore-llm`
//! already expresses "one action per turn" as a single tool call or a single
//! text block.

use crate::checkpoint::{ActionRecord, Checkpoint, CheckpointStore};
use crate::concurrency::ConcurrencyGuard;
use crate::execution_history::{ExecutionHistory, ExecutionRecord};
use crate::hierarchy::HierarchyService;
use crate::hooks::HookRegistry;
use crate::idempotency::IdempotencyCache;
use crate::permission::{Decision, PermissionMatrix};
use crate::profile::AgentStatus;
use crate::recovery::{Outcome, RecoveryStrategies};
use agentcore_core::audit::{AuditCategory, AuditLog, Direction};
use agentcore_core::{AgentId, Error, Result, UserId};
use agentcore_llm::{ContentBlock, LlmContent, LlmMessage, LlmProvider, LlmRequest, StreamDelta};
use agentcore_tools::{OrchestratorHandle, RuntimeHandle, Tool, ToolCategory, ToolRegistry};
use futures::StreamExt;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Reserved tool names the model uses to signal a terminal action instead of
/// invoking a real tool.
const TOOL_DONE: &str = "done";
const TOOL_RESPOND: &str = "respond";
const TOOL_SILENT: &str = "silent";
const TOOL_HEARTBEAT_OK: &str = "heartbeat_ok";

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_MAX_TOOL_CALLS: u32 = 20;
pub const DEFAULT_RUN_DEADLINE: Duration = Duration::from_secs(240);
const GUARD_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything a `run` call needs beyond what's already in the agent's
/// profile. Orchestrator sub-runs override the defaults (§4.9).
pub struct RunContext {
    pub agent_id: AgentId,
    pub user_id: UserId,
    pub trigger: String,
    pub trigger_context: Value,
    pub orchestration_depth: u32,
    pub retrieved_memories: Vec<String>,
    pub max_iterations: Option<u32>,
    pub max_tool_calls: Option<u32>,
    pub deadline: Option<Duration>,
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new(agent_id: AgentId, user_id: UserId, trigger: impl Into<String>, trigger_context: Value) -> Self {
        Self {
            agent_id,
            user_id,
            trigger: trigger.into(),
            trigger_context,
            orchestration_depth: 0,
            retrieved_memories: Vec::new(),
            max_iterations: None,
            max_tool_calls: None,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Debug)]
pub struct RunResult {
    pub actions: Vec<ActionRecord>,
    pub iterations: u32,
    pub tokens_used: u64,
    pub final_thought: Option<String>,
    pub silent: bool,
}

impl RunResult {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            actions: Vec::new(),
            iterations: 0,
            tokens_used: 0,
            final_thought: Some(reason.into()),
            silent: true,
        }
    }
}

enum ModelAction {
    Done { summary: String },
    Respond { message: String },
    Silent,
    HeartbeatOk,
    ToolCall { id: String, name: String, params: Value },
    None,
}

/// Drives the reasoning loop over a shared set of services. One instance is
/// reused across runs; all per-run state lives in `RunContext`/`Checkpoint`.
pub struct AgentRuntime {
    llm: Arc<dyn LlmProvider>,
    workspace_root: PathBuf,
    runtime_handle: RuntimeHandle,
    orchestrator_handle: OrchestratorHandle,
    hierarchy: Arc<HierarchyService>,
    permissions: Arc<PermissionMatrix>,
    idempotency: Arc<IdempotencyCache>,
    checkpoints: Arc<CheckpointStore>,
    concurrency: Arc<ConcurrencyGuard>,
    hooks: Arc<HookRegistry>,
    execution_history: Arc<ExecutionHistory>,
    audit: Arc<dyn AuditLog>,
}

impl AgentRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        workspace_root: PathBuf,
        runtime_handle: RuntimeHandle,
        orchestrator_handle: OrchestratorHandle,
        hierarchy: Arc<HierarchyService>,
        permissions: Arc<PermissionMatrix>,
        idempotency: Arc<IdempotencyCache>,
        checkpoints: Arc<CheckpointStore>,
        concurrency: Arc<ConcurrencyGuard>,
        hooks: Arc<HookRegistry>,
        execution_history: Arc<ExecutionHistory>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            llm,
            workspace_root,
            runtime_handle,
            orchestrator_handle,
            hierarchy,
            permissions,
            idempotency,
            checkpoints,
            concurrency,
            hooks,
            execution_history,
            audit,
        }
    }

    /// Run an agent to a terminal action, a budget/deadline, or cancellation.
    /// Never returns an `Err` — rejections (inactive agent, saturated
    /// concurrency guard) come back as a silent `RunResult` with
    /// `final_thought` explaining why (§7: the runtime always reports, it
    /// never panics the caller for conditions it can anticipate).
    pub async fn run(&self, ctx: RunContext) -> RunResult {
        let profile = match self.hierarchy.get_profile(ctx.agent_id, ctx.user_id) {
            Ok(p) => p,
            Err(e) => return RunResult::rejected(format!("profile lookup failed: {e}")),
        };
        if profile.status != AgentStatus::Active {
            return RunResult::rejected(format!("agent is {:?}, not active", profile.status));
        }

        let permit = match self.concurrency.acquire(GUARD_ACQUIRE_TIMEOUT).await {
            Ok(p) => p,
            Err(_) => return RunResult::rejected("concurrency guard saturated"),
        };

        self.hooks
            .emit("run.started", json!({"agent_id": ctx.agent_id.to_string(), "trigger": ctx.trigger}))
            .await;
        self.audit.log(
            ctx.agent_id,
            ctx.user_id,
            AuditCategory::ReasoningStart,
            Direction::Internal,
            None,
            json!({"trigger": ctx.trigger}),
        );

        let max_iterations = ctx.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        let max_tool_calls = ctx.max_tool_calls.unwrap_or(DEFAULT_MAX_TOOL_CALLS);
        let deadline = ctx.deadline.unwrap_or(DEFAULT_RUN_DEADLINE);
        let deadline_at = tokio::time::Instant::now() + deadline;

        let mut checkpoint = self
            .checkpoints
            .load(ctx.agent_id)
            .filter(|cp| cp.trigger == ctx.trigger)
            .unwrap_or_else(|| Checkpoint::new(ctx.agent_id, ctx.trigger.clone(), ctx.trigger_context.clone()));

        let mut messages = decode_messages(&checkpoint.messages);
        if messages.is_empty() {
            messages.push(LlmMessage {
                role: "user".to_string(),
                content: LlmContent::Text(initial_prompt(&ctx.trigger, &ctx.trigger_context, &ctx.retrieved_memories)),
            });
        }

        let tool_registry = agentcore_tools::create_runtime_registry(
            &self.workspace_root,
            self.runtime_handle.clone(),
            self.orchestrator_handle.clone(),
            ctx.agent_id,
            ctx.user_id,
            ctx.orchestration_depth,
        );
        let tool_defs = self.build_tool_defs(&tool_registry, ctx.agent_id, &profile.autonomy_level, ctx.orchestration_depth);
        let idempotency = self.idempotency.as_ref();
        let recovery = RecoveryStrategies::new(&tool_registry, idempotency);

        let mut iteration = checkpoint.iteration;
        let mut tool_calls_made = checkpoint.action_records.len() as u32;
        let mut final_thought = None;
        let mut silent = false;
        let mut terminated = false;

        while iteration < max_iterations {
            if ctx.cancel.is_cancelled() || tokio::time::Instant::now() >= deadline_at {
                self.checkpoints.fail(ctx.agent_id);
                terminated = true;
                break;
            }
            iteration += 1;

            let request = LlmRequest {
                model: profile.routing.model.clone(),
                messages: messages.clone(),
                tools: Some(tool_defs.clone()),
                max_tokens: Some(profile.routing.max_tokens as u32),
                temperature: Some(profile.routing.temperature),
                system: Some(profile.routing.system_prompt.clone()),
            };

            let (action, usage) = match self.next_action(request, ctx.cancel.clone()).await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(agent = %ctx.agent_id, error = %e, "model call failed");
                    final_thought = Some(format!("model error: {e}"));
                    self.checkpoints.fail(ctx.agent_id);
                    terminated = true;
                    break;
                }
            };
            checkpoint.tokens_used += usage;

            match action {
                ModelAction::Done { summary } => {
                    final_thought = Some(summary);
                    self.checkpoints.complete(ctx.agent_id);
                    terminated = true;
                    break;
                }
                ModelAction::Respond { message } => {
                    final_thought = Some(message.clone());
                    self.audit.log(
                        ctx.agent_id,
                        ctx.user_id,
                        AuditCategory::Outgoing,
                        Direction::Outbound,
                        None,
                        json!({"message": message}),
                    );
                    messages.push(LlmMessage {
                        role: "assistant".to_string(),
                        content: LlmContent::Text(message),
                    });
                    self.checkpoints.complete(ctx.agent_id);
                    terminated = true;
                    break;
                }
                ModelAction::Silent => {
                    silent = true;
                    self.checkpoints.complete(ctx.agent_id);
                    terminated = true;
                    break;
                }
                ModelAction::HeartbeatOk => {
                    silent = true;
                    final_thought = Some("heartbeat ok".to_string());
                    self.checkpoints.complete(ctx.agent_id);
                    terminated = true;
                    break;
                }
                ModelAction::None => {
                    final_thought = Some("model returned no actionable content".to_string());
                    self.checkpoints.complete(ctx.agent_id);
                    terminated = true;
                    break;
                }
                ModelAction::ToolCall { id, name, params } => {
                    if tool_calls_made >= max_tool_calls {
                        messages.push(tool_result_message(&id, "tool-call budget exhausted for this run", true));
                        continue;
                    }
                    tool_calls_made += 1;

                    let category = tool_registry
                        .get(&name)
                        .map(|t| t.category())
                        .unwrap_or(ToolCategory::DEFAULT);
                    let decision =
                        self.permissions
                            .can_execute(ctx.agent_id, &name, category, profile.autonomy_level.numeric());

                    let (content, is_error) = match decision {
                        Decision::Deny => (
                            format!("{name} denied: requires higher autonomy than this agent holds"),
                            true,
                        ),
                        Decision::Approval => {
                            (format!("{name} requires approval; request has been queued"), false)
                        }
                        Decision::Allow => {
                            self.audit.log(
                                ctx.agent_id,
                                ctx.user_id,
                                AuditCategory::ToolCall,
                                Direction::Internal,
                                None,
                                json!({"tool": name}),
                            );
                            let outcome = recovery.execute(ctx.agent_id, &name, params.clone(), ctx.cancel.clone()).await;
                            match outcome {
                                Outcome::Success { result, trail, .. } => {
                                    checkpoint.action_records.push(ActionRecord {
                                        tool_id: name.clone(),
                                        params: params.clone(),
                                        result: json!(result.to_content_string()),
                                        recovery: trail
                                            .map(|t| json!({"strategy": t.strategy, "attempts": t.attempts})),
                                    });
                                    let is_error = result.is_error();
                                    self.execution_history.record(ExecutionRecord {
                                        agent_id: ctx.agent_id,
                                        tool_id: name.clone(),
                                        success: !is_error,
                                        error_type: None,
                                        error_message: None,
                                        at: chrono::Utc::now(),
                                    });
                                    self.audit.log(
                                        ctx.agent_id,
                                        ctx.user_id,
                                        AuditCategory::ToolResult,
                                        Direction::Internal,
                                        None,
                                        json!({"tool": name, "is_error": is_error}),
                                    );
                                    (result.to_content_string(), is_error)
                                }
                                Outcome::Exhausted { total_attempts, original_error } => {
                                    checkpoint.action_records.push(ActionRecord {
                                        tool_id: name.clone(),
                                        params: params.clone(),
                                        result: json!({"error": original_error, "attempts": total_attempts}),
                                        recovery: Some(json!({"strategy": "exhausted", "attempts": total_attempts})),
                                    });
                                    self.execution_history.record(ExecutionRecord {
                                        agent_id: ctx.agent_id,
                                        tool_id: name.clone(),
                                        success: false,
                                        error_type: Some(crate::error_analyzer::classify_error_text(&original_error)),
                                        error_message: Some(original_error.clone()),
                                        at: chrono::Utc::now(),
                                    });
                                    self.audit.log(
                                        ctx.agent_id,
                                        ctx.user_id,
                                        AuditCategory::Error,
                                        Direction::Internal,
                                        Some(format!("{name} failed after {total_attempts} attempts")),
                                        json!({"tool": name, "error": original_error, "attempts": total_attempts}),
                                    );
                                    (
                                        format!("{name} failed after {total_attempts} attempts: {original_error}"),
                                        true,
                                    )
                                }
                            }
                        }
                    };

                    messages.push(tool_result_message(&id, &content, is_error));
                }
            }

            checkpoint.iteration = iteration;
            checkpoint.messages = encode_messages(&messages);
            self.checkpoints.save(checkpoint.clone());
        }

        if !terminated {
            self.checkpoints.fail(ctx.agent_id);
        }

        drop(permit);
        self.hooks
            .emit("run.finished", json!({"agent_id": ctx.agent_id.to_string(), "iterations": iteration}))
            .await;

        RunResult {
            actions: checkpoint.action_records,
            iterations: iteration,
            tokens_used: checkpoint.tokens_used,
            final_thought,
            silent,
        }
    }

    /// Start from the global catalogue, filter by the Permission Matrix
    /// against the agent's autonomy, strip `orchestrate`/`spawn` at depth
    /// >= 1 (§4.9 layer 2 already strips `orchestrate` at the registry level;
    /// this also hides anything the matrix would flatly deny).
    fn build_tool_defs(
        &self,
        tool_registry: &ToolRegistry,
        agent_id: AgentId,
        autonomy: &agentcore_core::AutonomyLevel,
        depth: u32,
    ) -> Vec<agentcore_llm::LlmTool> {
        let numeric = autonomy.numeric();
        let mut defs: Vec<agentcore_llm::LlmTool> = tool_registry
            .list()
            .into_iter()
            .filter_map(|name| tool_registry.get(name))
            .filter(|tool| {
                if depth >= 1 && tool.name() == "orchestrate" {
                    return false;
                }
                self.permissions.can_execute(agent_id, tool.name(), tool.category(), numeric) != Decision::Deny
            })
            .map(|tool| tool.to_llm_tool())
            .collect();

        defs.push(terminal_tool(TOOL_DONE, "Signal the run is fully complete with a short summary."));
        defs.push(terminal_tool(TOOL_RESPOND, "Send a final message back without ending the run's bookkeeping."));
        defs.push(terminal_tool(TOOL_SILENT, "Take no action this cycle; nothing worth surfacing."));
        defs.push(terminal_tool(TOOL_HEARTBEAT_OK, "Acknowledge a heartbeat trigger with no other action."));
        defs
    }

    /// Stream one model turn to completion and fold it into a single
    /// action — either the one tool call the model made, or its text.
    async fn next_action(&self, request: LlmRequest, cancel: CancellationToken) -> Result<(ModelAction, u64)> {
        let mut stream = self
            .llm
            .complete_stream(request, Some(cancel))
            .await
            .map_err(|e| Error::llm_error("model-router", e.to_string()))?;

        let mut text = String::new();
        let mut tool_id: Option<String> = None;
        let mut tool_name: Option<String> = None;
        let mut tool_args = String::new();
        let mut usage = 0u64;

        while let Some(delta) = stream.next().await {
            match delta.map_err(|e| Error::llm_error("model-router", e.to_string()))? {
                StreamDelta::Text(t) => text.push_str(&t),
                StreamDelta::Thinking(_) => {}
                StreamDelta::ToolCallStart { id, name } => {
                    tool_id = Some(id);
                    tool_name = Some(name);
                }
                StreamDelta::ToolCallDelta { arguments, .. } => tool_args.push_str(&arguments),
                StreamDelta::ToolCallEnd { .. } => {}
                StreamDelta::Done { usage: u, .. } => {
                    if let Some(u) = u {
                        usage = (u.input_tokens + u.output_tokens) as u64;
                    }
                }
                StreamDelta::Error(e) => return Err(Error::llm_error("model-router", e)),
            }
        }

        if let (Some(id), Some(name)) = (tool_id, tool_name) {
            let params: Value = if tool_args.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str(&tool_args).unwrap_or_else(|_| json!({}))
            };
            let action = match name.as_str() {
                TOOL_DONE => ModelAction::Done {
                    summary: params.get("summary").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                },
                TOOL_RESPOND => ModelAction::Respond {
                    message: params.get("message").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                },
                TOOL_SILENT => ModelAction::Silent,
                TOOL_HEARTBEAT_OK => ModelAction::HeartbeatOk,
                _ => ModelAction::ToolCall { id, name, params },
            };
            Ok((action, usage))
        } else if !text.is_empty() {
            Ok((ModelAction::Respond { message: text }, usage))
        } else {
            Ok((ModelAction::None, usage))
        }
    }
}

fn terminal_tool(name: &str, description: &str) -> agentcore_llm::LlmTool {
    agentcore_llm::LlmTool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({"type": "object", "properties": {"summary": {"type": "string"}, "message": {"type": "string"}}}),
    }
}

fn tool_result_message(tool_use_id: &str, content: &str, is_error: bool) -> LlmMessage {
    LlmMessage {
        role: "user".to_string(),
        content: LlmContent::Blocks(vec![ContentBlock::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content: content.to_string(),
            is_error: Some(is_error),
        }]),
    }
}

fn initial_prompt(trigger: &str, trigger_context: &Value, retrieved_memories: &[String]) -> String {
    let mut parts = vec![format!("Trigger: {trigger}")];
    if !trigger_context.is_null() {
        parts.push(format!("Context: {trigger_context}"));
    }
    if !retrieved_memories.is_empty() {
        parts.push(format!("Relevant memories:\n{}", retrieved_memories.join("\n")));
    }
    parts.join("\n\n")
}

fn encode_messages(messages: &[LlmMessage]) -> Vec<Value> {
    messages.iter().map(|m| serde_json::to_value(m).unwrap_or(Value::Null)).collect()
}

fn decode_messages(values: &[Value]) -> Vec<LlmMessage> {
    values
        .iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect()
}
