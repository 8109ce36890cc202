//! Composition root: wires the Agent Runtime, Hierarchy Service, Sentinel
//! services and Memory Service together behind `Platform`, a plain struct
//! exposing §6's operations as async methods, plus a small `clap` CLI for
//! manually driving `run`, `diagnose-self` and `get-pending-prompts` during
//! local development (transport/HTTP/UI are out of scope).

use std::path::PathBuf;
use std::sync::Arc;

use agentcore_agent::{
    AgentRuntime, AgentStatus, AgentType, Budgets, ChildCreationPolicy, CheckpointStore,
    ConcurrencyGuard, CreatedByType, ExecutionHistory, HeartbeatConfig, HierarchyService,
    HookRegistry, IdempotencyCache, InMemoryAgentStore, InMemoryApprovalStore, InheritanceFlags,
    ModelRoutingConfig, PermissionMatrix, RunContext,
};
use agentcore_core::audit::InMemoryAuditLog;
use agentcore_core::{AgentId, AutonomyLevel, UserId};
use agentcore_llm::{AnthropicProvider, LlmProvider};
use agentcore_memory::{InMemoryKeywordIndex, InMemoryVectorIndex, MemoryService};
use agentcore_sentinel::{HeartbeatMonitor, SelfHealingEngine, SentinelConfig, TriggerEngine};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agentcore", about = "Agentic AI platform runtime core")]
struct Cli {
    /// Workspace root the agent's file tools operate under.
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Path to a sentinel.toml config file (trigger/heartbeat/healing tunables).
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single reasoning cycle for a freshly-created master agent.
    Run {
        /// Trigger name recorded on the run (e.g. "user_message").
        #[arg(long, default_value = "user_message")]
        trigger: String,
        /// Prompt text passed to the agent as trigger context.
        prompt: String,
    },
    /// Diagnose a freshly-created agent's (empty) execution history.
    DiagnoseSelf,
    /// List pending self-prompts awaiting approval.
    GetPendingPrompts,
    /// Print version.
    Version,
}

/// Everything the composition root constructs once at startup. Named
/// `Platform` rather than `RuntimeHandle` to avoid colliding with
/// `agentcore_tools::RuntimeHandle`, an unrelated per-run spawn handle.
#[allow(dead_code)]
struct Platform {
    hierarchy: Arc<HierarchyService>,
    runtime: Arc<AgentRuntime>,
    permissions: Arc<PermissionMatrix>,
    execution_history: Arc<ExecutionHistory>,
    trigger: Arc<TriggerEngine>,
    heartbeat: Arc<HeartbeatMonitor>,
    healing: Arc<SelfHealingEngine>,
    memory: Arc<MemoryService>,
}

impl Platform {
    fn new(workspace_root: PathBuf, config: SentinelConfig) -> Self {
        let llm: Arc<dyn LlmProvider> = match std::env::var("ANTHROPIC_API_KEY") {
            Ok(key) => Arc::new(AnthropicProvider::new(key)),
            Err(_) => Arc::new(AnthropicProvider::new("")),
        };

        let hierarchy = Arc::new(HierarchyService::new(Arc::new(InMemoryAgentStore::new())));
        let permissions = Arc::new(PermissionMatrix::with_defaults());
        let idempotency = Arc::new(IdempotencyCache::new());
        let checkpoints = Arc::new(CheckpointStore::new());
        let concurrency = Arc::new(ConcurrencyGuard::new(4));
        let hooks = Arc::new(HookRegistry::new());
        let execution_history = Arc::new(ExecutionHistory::new());
        let audit = Arc::new(InMemoryAuditLog::new());

        let runtime_handle = agentcore_tools::create_runtime_handle();
        let orchestrator_handle = agentcore_tools::create_orchestrator_handle();

        let runtime = Arc::new(AgentRuntime::new(
            llm,
            workspace_root,
            runtime_handle,
            orchestrator_handle,
            hierarchy.clone(),
            permissions.clone(),
            idempotency,
            checkpoints,
            concurrency.clone(),
            hooks,
            execution_history.clone(),
            audit.clone(),
        ));

        let trigger = Arc::new(TriggerEngine::new(
            hierarchy.clone(),
            runtime.clone(),
            concurrency.clone(),
            config.trigger,
        ));
        let heartbeat = Arc::new(HeartbeatMonitor::new(
            hierarchy.clone(),
            runtime.clone(),
            concurrency.clone(),
            audit.clone(),
            config.heartbeat,
        ));
        let healing = Arc::new(SelfHealingEngine::new(
            hierarchy.clone(),
            permissions.clone(),
            execution_history.clone(),
            Arc::new(InMemoryApprovalStore::new()),
            audit.clone(),
            config.healing,
        ));

        let vector_index = Arc::new(InMemoryVectorIndex::new());
        let keyword_index = Arc::new(InMemoryKeywordIndex::new());
        let memory = Arc::new(MemoryService::new(vector_index, keyword_index));

        Self { hierarchy, runtime, permissions, execution_history, trigger, heartbeat, healing, memory }
    }

    /// Creates a throwaway master agent for the CLI's single-shot commands.
    /// A real deployment persists profiles across invocations; this binary
    /// exists to demonstrate the library surface, not to be a daemon.
    fn demo_master(&self, user_id: UserId) -> AgentId {
        let id = AgentId::new();
        let profile = agentcore_agent::AgentProfile {
            id,
            user_id,
            name: "cli-agent".into(),
            role: "assistant".into(),
            agent_type: AgentType::Master,
            parent_id: None,
            hierarchy_level: 0,
            hierarchy_path: vec![id],
            created_by_type: CreatedByType::User,
            created_by_agentic_id: None,
            inheritance: InheritanceFlags::default(),
            routing: ModelRoutingConfig {
                provider: "anthropic".into(),
                model: "claude-sonnet-4-5".into(),
                temperature: 0.7,
                max_tokens: 4096,
                routing_preset: None,
                system_prompt: "You are a helpful assistant.".into(),
            },
            autonomy_level: AutonomyLevel::SemiAutonomous,
            require_approval_for: Default::default(),
            child_policy: ChildCreationPolicy::default(),
            budgets: Budgets::default(),
            status: AgentStatus::Active,
            heartbeat: HeartbeatConfig::default(),
            max_prompts_per_hour: 10,
            auto_approve_threshold: 0.9,
        };
        self.hierarchy.create_profile(profile).expect("freshly-built profile is hierarchy-consistent");
        id
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Version) {
        println!("agentcore {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "agentcore=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let workspace_root = cli
        .workspace
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    let sentinel_config = match &cli.config {
        Some(path) => SentinelConfig::load(path),
        None => SentinelConfig::default(),
    };

    let platform = Platform::new(workspace_root, sentinel_config);
    let user_id = UserId::new();
    let agent_id = platform.demo_master(user_id);

    match cli.command {
        Commands::Run { trigger, prompt } => {
            let ctx = RunContext::new(agent_id, user_id, trigger, serde_json::json!({"prompt": prompt}));
            let result = platform.runtime.run(ctx).await;
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({
                "iterations": result.iterations,
                "silent": result.silent,
                "tokens_used": result.tokens_used,
                "final_thought": result.final_thought,
            }))?);
        }
        Commands::DiagnoseSelf => {
            let diagnosis = platform.healing.diagnose_self(agent_id);
            println!("{}", serde_json::to_string_pretty(&diagnosis)?);
        }
        Commands::GetPendingPrompts => {
            let pending = platform.trigger.pending_prompts(agent_id);
            println!("{}", serde_json::to_string_pretty(&serde_json::json!({"pending": pending.len()}))?);
        }
        Commands::Version => unreachable!(),
    }

    Ok(())
}
