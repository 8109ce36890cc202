//! Tool-Permission Matrix (§4.7) — autonomy-gated tool filtering with
//! per-agent overrides.
//!
//! Decision order per `canExecute`: per-agent override > matrix entry >
//! default-permit for unknown tools. The override cache has a 60s TTL,
//! invalidated on write; briefly-stale reads are acceptable (§5 "in-memory
//! override cache is per-process").

use agentcore_core::AgentId;
use agentcore_tools::ToolCategory;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Approval,
    Deny,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Override {
    Enable,
    Disable,
    RequireApproval,
}

#[derive(Clone, Copy, Debug)]
pub struct MatrixEntry {
    pub min_level: u8,
    pub approval_level: Option<u8>,
}

const OVERRIDE_TTL: Duration = Duration::seconds(60);

struct CachedOverride {
    value: Override,
    cached_at: DateTime<Utc>,
}

/// Gates tools by autonomy level and per-agent overrides (§4.7).
pub struct PermissionMatrix {
    matrix: HashMap<ToolCategory, MatrixEntry>,
    overrides: DashMap<(AgentId, String), CachedOverride>,
}

impl Default for PermissionMatrix {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PermissionMatrix {
    /// Default gates, conservative for mutating/outbound categories and
    /// permissive for read-only observation/memory-read.
    pub fn with_defaults() -> Self {
        use ToolCategory::*;
        let mut matrix = HashMap::new();
        matrix.insert(Observation, MatrixEntry { min_level: 1, approval_level: None });
        matrix.insert(MemoryRead, MatrixEntry { min_level: 1, approval_level: None });
        matrix.insert(KnowledgeRead, MatrixEntry { min_level: 1, approval_level: None });
        matrix.insert(MemoryWrite, MatrixEntry { min_level: 3, approval_level: Some(1) });
        matrix.insert(KnowledgeIngest, MatrixEntry { min_level: 3, approval_level: Some(1) });
        matrix.insert(CommunicationRespond, MatrixEntry { min_level: 1, approval_level: None });
        matrix.insert(SelfManagement, MatrixEntry { min_level: 3, approval_level: Some(1) });
        matrix.insert(SubagentManage, MatrixEntry { min_level: 3, approval_level: Some(1) });
        matrix.insert(MemoryDelete, MatrixEntry { min_level: 5, approval_level: Some(3) });
        matrix.insert(CommunicationOutbound, MatrixEntry { min_level: 5, approval_level: Some(3) });
        matrix.insert(SelfImprovement, MatrixEntry { min_level: 5, approval_level: Some(3) });
        matrix.insert(SelfModification, MatrixEntry { min_level: 5, approval_level: Some(3) });
        Self {
            matrix,
            overrides: DashMap::new(),
        }
    }

    pub fn set_override(&self, agent_id: AgentId, tool_id: impl Into<String>, value: Override) {
        self.overrides.insert(
            (agent_id, tool_id.into()),
            CachedOverride {
                value,
                cached_at: Utc::now(),
            },
        );
    }

    pub fn remove_override(&self, agent_id: AgentId, tool_id: &str) {
        self.overrides.remove(&(agent_id, tool_id.to_string()));
    }

    fn override_for(&self, agent_id: AgentId, tool_id: &str) -> Option<Override> {
        self.overrides
            .get(&(agent_id, tool_id.to_string()))
            .filter(|c| Utc::now() - c.cached_at < OVERRIDE_TTL)
            .map(|c| c.value)
    }

    /// `canExecute(agent_id, tool_id, autonomy)` (§4.7).
    pub fn can_execute(
        &self,
        agent_id: AgentId,
        tool_id: &str,
        category: ToolCategory,
        autonomy_numeric: u8,
    ) -> Decision {
        if let Some(over) = self.override_for(agent_id, tool_id) {
            return match over {
                Override::Enable => Decision::Allow,
                Override::Disable => Decision::Deny,
                Override::RequireApproval => Decision::Approval,
            };
        }

        let Some(entry) = self.matrix.get(&category) else {
            return Decision::Allow;
        };

        if autonomy_numeric >= entry.min_level {
            return Decision::Allow;
        }
        if let Some(approval_level) = entry.approval_level {
            if autonomy_numeric >= approval_level {
                return Decision::Approval;
            }
        }
        Decision::Deny
    }
}
