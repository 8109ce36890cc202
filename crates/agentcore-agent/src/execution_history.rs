//! Execution History — a rolling per-agent record of tool executions.
//!
//! Neither the Checkpoint (one active row, 1h TTL) nor the Audit Log (a
//! human-facing narrative) is the right shape for the Self-Healing Engine's
//! 72h diagnosis window (§4.15) or the `get_error_history` operation (§6):
//! both need a structured, queryable feed of "did this tool call succeed"
//! with enough detail to bucket by tool and error type. This lives next to
//! the Idempotency Cache and Checkpoint Store for the same reason they do —
//! `agentcore-sentinel` depends on `agentcore-agent` already, so this is the
//! natural place for a feed that crate consumes.

use agentcore_core::{AgentId, ToolErrorKind};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub agent_id: AgentId,
    pub tool_id: String,
    pub success: bool,
    pub error_type: Option<ToolErrorKind>,
    pub error_message: Option<String>,
    pub at: DateTime<Utc>,
}

// Retained a week rather than the 72h the Self-Healing Engine's primary
// diagnosis window covers, since its regression check compares a 24h recent
// window against a 7-day baseline (§4.15).
const HISTORY_TTL: Duration = Duration::days(7);
const MAX_RECORDS_PER_AGENT: usize = 2000;

/// Per-agent tool execution feed (§4.15, §6 `get_error_history`).
#[derive(Default)]
pub struct ExecutionHistory {
    records: DashMap<AgentId, Vec<ExecutionRecord>>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: ExecutionRecord) {
        let mut entry = self.records.entry(record.agent_id).or_default();
        entry.push(record);
        if entry.len() > MAX_RECORDS_PER_AGENT {
            let overflow = entry.len() - MAX_RECORDS_PER_AGENT;
            entry.drain(0..overflow);
        }
    }

    /// `get_error_history(agent, {hours, limit, tool_id})` (§6) — failed
    /// executions only, newest first.
    pub fn error_history(
        &self,
        agent_id: AgentId,
        hours: i64,
        limit: usize,
        tool_id: Option<&str>,
    ) -> Vec<ExecutionRecord> {
        let cutoff = Utc::now() - Duration::hours(hours);
        let Some(entry) = self.records.get(&agent_id) else {
            return Vec::new();
        };
        entry
            .iter()
            .rev()
            .filter(|r| !r.success && r.at >= cutoff)
            .filter(|r| tool_id.map_or(true, |t| r.tool_id == t))
            .take(limit)
            .cloned()
            .collect()
    }

    /// All executions (success and failure) at or after `since` — the
    /// denominator for error-rate calculations.
    pub fn recent(&self, agent_id: AgentId, since: DateTime<Utc>) -> Vec<ExecutionRecord> {
        let Some(entry) = self.records.get(&agent_id) else {
            return Vec::new();
        };
        entry.iter().filter(|r| r.at >= since).cloned().collect()
    }

    /// Drop rows older than the 72h retention window. Returns the number
    /// removed.
    pub fn cleanup_expired(&self) -> usize {
        let cutoff = Utc::now() - HISTORY_TTL;
        let mut removed = 0;
        for mut entry in self.records.iter_mut() {
            let before = entry.len();
            entry.retain(|r| r.at >= cutoff);
            removed += before - entry.len();
        }
        removed
    }
}
