//! Agent Profile — the persistent identity of one agent (§3).

use agentcore_core::{AgentId, AutonomyLevel, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Master,
    Sub,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CreatedByType {
    User,
    Agentic,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Inactive,
    Active,
    Paused,
    Deleted,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InheritanceFlags {
    pub team: bool,
    pub knowledge: bool,
    pub monitoring: bool,
    pub routing: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelRoutingConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub routing_preset: Option<String>,
    pub system_prompt: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChildCreationPolicy {
    pub can_create_children: bool,
    pub max_children: usize,
    pub max_hierarchy_depth: u32,
    pub children_autonomy_cap: AutonomyLevel,
}

impl Default for ChildCreationPolicy {
    fn default() -> Self {
        Self {
            can_create_children: true,
            max_children: 5,
            max_hierarchy_depth: 3,
            children_autonomy_cap: AutonomyLevel::SemiAutonomous,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Budgets {
    pub daily_budget: Option<f64>,
    pub rate_limit_per_minute: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub escalate_after_misses: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 5 * 60 * 1000,
            escalate_after_misses: 3,
        }
    }
}

/// Permission category a tool belongs to. Mirrors
/// `agentcore_tools::ToolCategory` without creating a dependency from this
/// crate's data model onto the tool crate's trait machinery.
pub type ToolCategory = agentcore_tools::ToolCategory;

#[derive(Clone, Debug)]
pub struct AgentProfile {
    pub id: AgentId,
    pub user_id: UserId,
    pub name: String,
    pub role: String,
    pub agent_type: AgentType,
    pub parent_id: Option<AgentId>,
    pub hierarchy_level: u32,
    /// Ancestor id chain, rooted at the master. `path[0]` is always the
    /// root master id.
    pub hierarchy_path: Vec<AgentId>,
    pub created_by_type: CreatedByType,
    pub created_by_agentic_id: Option<AgentId>,
    pub inheritance: InheritanceFlags,
    pub routing: ModelRoutingConfig,
    pub autonomy_level: AutonomyLevel,
    pub require_approval_for: HashSet<ToolCategory>,
    pub child_policy: ChildCreationPolicy,
    pub budgets: Budgets,
    pub status: AgentStatus,
    pub heartbeat: HeartbeatConfig,
    pub max_prompts_per_hour: u32,
    pub auto_approve_threshold: f64,
}

impl AgentProfile {
    /// Root master id, derived from the hierarchy path rather than stored
    /// redundantly (§9 "reconstruct by adjacency").
    pub fn root_master_id(&self) -> AgentId {
        self.hierarchy_path.first().copied().unwrap_or(self.id)
    }

    pub fn is_master(&self) -> bool {
        self.agent_type == AgentType::Master
    }

    pub fn hierarchy_path_string(&self) -> String {
        let mut s = String::new();
        for id in &self.hierarchy_path {
            s.push('/');
            s.push_str(&id.to_string());
        }
        s
    }

    /// Invariant check for testable property #1.
    pub fn is_hierarchy_consistent(&self) -> bool {
        match self.agent_type {
            AgentType::Master => {
                self.parent_id.is_none()
                    && self.hierarchy_level == 0
                    && self.hierarchy_path == vec![self.id]
            }
            AgentType::Sub => {
                self.parent_id.is_some()
                    && self.hierarchy_level >= 1
                    && self.hierarchy_path.first() == Some(&self.root_master_id())
                    && self.hierarchy_path.len() as u32 == self.hierarchy_level + 1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_master() -> AgentProfile {
        let id = AgentId::new();
        AgentProfile {
            id,
            user_id: UserId::new(),
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
                model: "claude".into(),
                temperature: 0.7,
                max_tokens: 4096,
                routing_preset: None,
                system_prompt: String::new(),
            },
            autonomy_level: AutonomyLevel::Autonomous,
            require_approval_for: HashSet::new(),
            child_policy: ChildCreationPolicy::default(),
            budgets: Budgets::default(),
            status: AgentStatus::Active,
            heartbeat: HeartbeatConfig::default(),
            max_prompts_per_hour: 10,
            auto_approve_threshold: 0.9,
        }
    }

    #[test]
    fn master_is_hierarchy_consistent() {
        let m = base_master();
        assert!(m.is_hierarchy_consistent());
        assert_eq!(m.root_master_id(), m.id);
    }

    #[test]
    fn sub_agent_must_chain_to_root() {
        let master = base_master();
        let sub_id = AgentId::new();
        let sub = AgentProfile {
            id: sub_id,
            parent_id: Some(master.id),
            agent_type: AgentType::Sub,
            hierarchy_level: 1,
            hierarchy_path: vec![master.id, sub_id],
            ..base_master()
        };
        assert!(sub.is_hierarchy_consistent());
        assert_eq!(sub.root_master_id(), master.id);
    }
}
