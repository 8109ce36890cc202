//! Memory Entry (§3) — the unit the Memory Service stores, indexes, and
//! recalls.

use agentcore_core::{AgentId, MemoryId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Conversation,
    Transaction,
    Decision,
    Learning,
    Context,
    Preference,
    Relationship,
    Event,
    Reflection,
}

/// A reference into the external vector store. Every entry with a non-null
/// reference must have an actual point there — the Memory Service is
/// responsible for keeping that true across create/update/delete
/// (§3 invariant, testable property #8).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VectorRef {
    pub collection: String,
    pub vector_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: MemoryId,
    pub agent_id: AgentId,
    pub user_id: UserId,
    pub memory_type: MemoryType,
    pub content: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub importance_score: f64,
    pub recall_count: u32,
    pub last_recalled_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub vector_ref: Option<VectorRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a caller may set on creation; everything else (id, recall
/// bookkeeping, timestamps) is owned by the service.
#[derive(Clone, Debug)]
pub struct NewMemory {
    pub agent_id: AgentId,
    pub user_id: UserId,
    pub memory_type: MemoryType,
    pub content: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub importance_score: f64,
    pub occurred_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub vector_ref: Option<VectorRef>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryFilter {
    pub agent_id: Option<AgentId>,
    pub memory_type: Option<MemoryType>,
    pub tags: Vec<String>,
    pub min_importance: Option<f64>,
}

impl MemoryFilter {
    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        if let Some(agent_id) = self.agent_id {
            if entry.agent_id != agent_id {
                return false;
            }
        }
        if let Some(memory_type) = self.memory_type {
            if entry.memory_type != memory_type {
                return false;
            }
        }
        if let Some(min) = self.min_importance {
            if entry.importance_score < min {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| entry.tags.contains(t)) {
            return false;
        }
        true
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchMode {
    Vector,
    Keyword,
    Hybrid,
}

#[derive(Clone, Debug)]
pub struct SearchQuery {
    pub text: String,
    pub mode: SearchMode,
    pub limit: usize,
    pub min_score: f64,
    pub types: Vec<MemoryType>,
    pub min_importance: Option<f64>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            text: String::new(),
            mode: SearchMode::Hybrid,
            limit: 10,
            min_score: 0.0,
            types: Vec::new(),
            min_importance: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ScoredMemory {
    pub entry: MemoryEntry,
    pub score: f64,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStats {
    pub total: usize,
    pub by_type: std::collections::HashMap<String, usize>,
    pub avg_importance: f64,
    pub with_vectors: usize,
}
