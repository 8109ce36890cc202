//! Audit Log — append-only typed events with a 48-hour TTL.
//!
//! Lives in `agentcore-core` rather than its own crate: every other
//! component writes to it, so giving it a crate of its own would just move
//! the dependency-cycle problem one level down.

use crate::ids::{AgentId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Inbound,
    Internal,
    Outbound,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Incoming,
    Classification,
    ReasoningStart,
    ReasoningThink,
    ToolCall,
    ToolResult,
    AiRequest,
    AiResponse,
    LocalAgentIn,
    LocalAgentOut,
    Outgoing,
    Error,
}

impl AuditCategory {
    /// Standard human-readable template; callers may still pass a richer
    /// `description` — this is only the fallback.
    pub fn default_description(self) -> &'static str {
        match self {
            AuditCategory::Incoming => "received inbound message",
            AuditCategory::Classification => "classified incoming stimulus",
            AuditCategory::ReasoningStart => "reasoning run started",
            AuditCategory::ToolCall => "invoked tool",
            AuditCategory::ToolResult => "received tool result",
            AuditCategory::ReasoningThink => "reasoning iteration",
            AuditCategory::AiRequest => "sent request to model router",
            AuditCategory::AiResponse => "received model router response",
            AuditCategory::LocalAgentIn => "received local agent-to-agent message",
            AuditCategory::LocalAgentOut => "sent local agent-to-agent message",
            AuditCategory::Outgoing => "sent outbound message",
            AuditCategory::Error => "run-level error",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: uuid::Uuid,
    pub agent_id: AgentId,
    pub user_id: UserId,
    pub category: AuditCategory,
    pub description: String,
    pub direction: Direction,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Append-only typed event sink. Logging never raises: failures are
/// swallowed and only traced at debug level (§7 propagation policy).
pub trait AuditLog: Send + Sync {
    fn log(
        &self,
        agent_id: AgentId,
        user_id: UserId,
        category: AuditCategory,
        direction: Direction,
        description: Option<String>,
        metadata: serde_json::Value,
    );

    /// Delete all rows older than 48 hours. Returns the number removed.
    fn purge_expired(&self) -> usize;

    fn recent(&self, agent_id: AgentId, limit: usize) -> Vec<AuditEvent>;
}

const AUDIT_TTL: Duration = Duration::hours(48);

#[derive(Default)]
pub struct InMemoryAuditLog {
    events: RwLock<Vec<AuditEvent>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditLog for InMemoryAuditLog {
    fn log(
        &self,
        agent_id: AgentId,
        user_id: UserId,
        category: AuditCategory,
        direction: Direction,
        description: Option<String>,
        metadata: serde_json::Value,
    ) {
        let event = AuditEvent {
            id: uuid::Uuid::new_v4(),
            agent_id,
            user_id,
            category,
            description: description.unwrap_or_else(|| category.default_description().to_string()),
            direction,
            metadata,
            created_at: Utc::now(),
        };
        match self.events.write() {
            Ok(mut guard) => guard.push(event),
            Err(_) => tracing::debug!("audit log write lock poisoned, dropping event"),
        }
    }

    fn purge_expired(&self) -> usize {
        let cutoff = Utc::now() - AUDIT_TTL;
        let Ok(mut guard) = self.events.write() else {
            return 0;
        };
        let before = guard.len();
        guard.retain(|e| e.created_at >= cutoff);
        before - guard.len()
    }

    fn recent(&self, agent_id: AgentId, limit: usize) -> Vec<AuditEvent> {
        let Ok(guard) = self.events.read() else {
            return Vec::new();
        };
        guard
            .iter()
            .rev()
            .filter(|e| e.agent_id == agent_id)
            .take(limit)
            .cloned()
            .collect()
    }
}
