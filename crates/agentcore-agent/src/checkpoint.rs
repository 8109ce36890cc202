//! Checkpoint Service (§4.6) — save/load/resume a reasoning run's state.
//!
//! "At most one active checkpoint per agent" is maintained by replacing the
//! single map entry for that agent (DashMap's `insert` is the
//! delete-then-insert the spec calls for — there is no window where two rows
//! for the same agent are both visible).

use agentcore_core::{AgentId, CheckpointId};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Active,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionRecord {
    pub tool_id: String,
    pub params: Value,
    pub result: Value,
    pub recovery: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub agent_id: AgentId,
    pub trigger: String,
    pub trigger_context: Value,
    pub iteration: u32,
    pub messages: Vec<Value>,
    pub action_records: Vec<ActionRecord>,
    pub tokens_used: u64,
    pub tier: Option<String>,
    pub plan_id: Option<String>,
    pub status: CheckpointStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

const CHECKPOINT_TTL: Duration = Duration::hours(1);

impl Checkpoint {
    pub fn new(agent_id: AgentId, trigger: impl Into<String>, trigger_context: Value) -> Self {
        let now = Utc::now();
        Self {
            id: CheckpointId::new(),
            agent_id,
            trigger: trigger.into(),
            trigger_context,
            iteration: 0,
            messages: Vec::new(),
            action_records: Vec::new(),
            tokens_used: 0,
            tier: None,
            plan_id: None,
            status: CheckpointStatus::Active,
            created_at: now,
            updated_at: now,
            expires_at: now + CHECKPOINT_TTL,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.status == CheckpointStatus::Active && self.expires_at > Utc::now()
    }
}

/// One active row per agent (§4.6, testable property #5).
#[derive(Default)]
pub struct CheckpointStore {
    active: DashMap<AgentId, Checkpoint>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save replaces any existing active row for this agent atomically.
    pub fn save(&self, mut checkpoint: Checkpoint) -> CheckpointId {
        checkpoint.updated_at = Utc::now();
        let id = checkpoint.id;
        self.active.insert(checkpoint.agent_id, checkpoint);
        id
    }

    /// The most recently updated active, unexpired row, if any.
    pub fn load(&self, agent_id: AgentId) -> Option<Checkpoint> {
        self.active
            .get(&agent_id)
            .filter(|cp| cp.is_usable())
            .map(|cp| cp.clone())
    }

    pub fn complete(&self, agent_id: AgentId) {
        if let Some(mut cp) = self.active.get_mut(&agent_id) {
            cp.status = CheckpointStatus::Completed;
            cp.updated_at = Utc::now();
        }
    }

    pub fn fail(&self, agent_id: AgentId) {
        if let Some(mut cp) = self.active.get_mut(&agent_id) {
            cp.status = CheckpointStatus::Failed;
            cp.updated_at = Utc::now();
        }
    }

    /// Periodic sweeper: remove all rows whose `expires_at < now`.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.active.len();
        self.active.retain(|_, cp| cp.expires_at >= Utc::now());
        before - self.active.len()
    }

    pub fn count_active(&self) -> usize {
        self.active
            .iter()
            .filter(|e| e.status == CheckpointStatus::Active)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saving_a_new_checkpoint_replaces_the_previous_active_row() {
        let store = CheckpointStore::new();
        let agent = AgentId::new();
        let mut first = Checkpoint::new(agent, "event", Value::Null);
        first.iteration = 1;
        store.save(first);
        let mut second = Checkpoint::new(agent, "event", Value::Null);
        second.iteration = 2;
        store.save(second);
        assert_eq!(store.count_active(), 1);
        assert_eq!(store.load(agent).unwrap().iteration, 2);
    }

    #[test]
    fn expired_checkpoint_is_unusable() {
        let store = CheckpointStore::new();
        let agent = AgentId::new();
        let mut cp = Checkpoint::new(agent, "event", Value::Null);
        cp.expires_at = Utc::now() - Duration::minutes(1);
        store.save(cp);
        assert!(store.load(agent).is_none());
    }

    #[test]
    fn completed_checkpoint_is_not_loadable_for_resume() {
        let store = CheckpointStore::new();
        let agent = AgentId::new();
        store.save(Checkpoint::new(agent, "event", Value::Null));
        store.complete(agent);
        assert!(store.load(agent).is_none());
    }

    #[test]
    fn cleanup_sweeps_only_expired_rows() {
        let store = CheckpointStore::new();
        let fresh = AgentId::new();
        let stale = AgentId::new();
        store.save(Checkpoint::new(fresh, "event", Value::Null));
        let mut stale_cp = Checkpoint::new(stale, "event", Value::Null);
        stale_cp.expires_at = Utc::now() - Duration::minutes(1);
        store.save(stale_cp);
        assert_eq!(store.cleanup_expired(), 1);
        assert!(store.load(fresh).is_some());
    }
}
