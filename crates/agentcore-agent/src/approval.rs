//! Approval Store (§9 open question) — treated as an opaque external
//! service: `create(request) -> approval_id`, eventually-consistent
//! `status`. The core only needs enough of a contract to enqueue and poll;
//! the resolution protocol (who approves, over what transport) is outside
//! the core per §1/§6.

use agentcore_core::{ApprovalId, AgentId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: ApprovalId,
    pub agent_id: AgentId,
    pub description: String,
    pub payload: Value,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
}

pub trait ApprovalStore: Send + Sync {
    fn create(&self, agent_id: AgentId, description: String, payload: Value) -> ApprovalId;
    fn status(&self, id: ApprovalId) -> ApprovalStatus;
    fn approve(&self, id: ApprovalId);
    fn reject(&self, id: ApprovalId);
}

#[derive(Default)]
pub struct InMemoryApprovalStore {
    requests: DashMap<ApprovalId, ApprovalRequest>,
}

impl InMemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ApprovalStore for InMemoryApprovalStore {
    fn create(&self, agent_id: AgentId, description: String, payload: Value) -> ApprovalId {
        let id = ApprovalId::new();
        self.requests.insert(
            id,
            ApprovalRequest {
                id,
                agent_id,
                description,
                payload,
                status: ApprovalStatus::Pending,
                created_at: Utc::now(),
            },
        );
        id
    }

    fn status(&self, id: ApprovalId) -> ApprovalStatus {
        self.requests
            .get(&id)
            .map(|r| r.status)
            .unwrap_or(ApprovalStatus::Expired)
    }

    fn approve(&self, id: ApprovalId) {
        if let Some(mut r) = self.requests.get_mut(&id) {
            r.status = ApprovalStatus::Approved;
        }
    }

    fn reject(&self, id: ApprovalId) {
        if let Some(mut r) = self.requests.get_mut(&id) {
            r.status = ApprovalStatus::Rejected;
        }
    }
}
