//! Idempotency Cache (§4.5) — dedups side-effect tool calls by
//! `(agent, tool, params)` hash.
//!
//! Key canonicalization matters (§9 open question): `serde_json::Value`'s
//! `Map` is a `BTreeMap` under the default `serde_json` feature set used
//! here, so `to_string()` already emits sorted keys — canonical by
//! construction, not by convention.

use agentcore_core::AgentId;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};

const TTL: Duration = Duration::minutes(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdempotencyStatus {
    Pending,
    Completed,
}

#[derive(Clone, Debug)]
struct Record {
    status: IdempotencyStatus,
    result: Option<String>,
    created_at: DateTime<Utc>,
}

impl Record {
    fn expired(&self) -> bool {
        Utc::now() - self.created_at > TTL
    }
}

pub enum DuplicateCheck {
    /// No in-flight or completed call for this key.
    None,
    /// A prior call already completed; replay its result.
    Completed(String),
    /// A prior call is still running; return a stub, do not replay.
    Pending,
}

/// Canonical key = `sha256(agent_id ∥ tool_id ∥ canonical(params))[0..32]`.
pub fn canonical_key(agent_id: AgentId, tool_id: &str, params: &serde_json::Value) -> String {
    let canonical_params = canonicalize(params);
    let mut hasher = Sha256::new();
    hasher.update(agent_id.to_string().as_bytes());
    hasher.update(tool_id.as_bytes());
    hasher.update(canonical_params.as_bytes());
    let digest = hasher.finalize();
    format!("{digest:x}")[..32].to_string()
}

/// Recursively sort object keys before serializing, so key-ordering
/// instability in the caller's JSON never splits an otherwise-identical
/// call into two cache entries.
fn canonicalize(value: &serde_json::Value) -> String {
    fn sorted(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut sorted_map = serde_json::Map::new();
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for k in keys {
                    sorted_map.insert(k.clone(), sorted(&map[k]));
                }
                serde_json::Value::Object(sorted_map)
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(sorted).collect())
            }
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

/// Side-effect-tool-call dedup cache (§4.5).
#[derive(Default)]
pub struct IdempotencyCache {
    records: DashMap<String, Record>,
}

impl IdempotencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key without mutating state.
    pub fn check_duplicate(&self, key: &str) -> DuplicateCheck {
        match self.records.get(key) {
            Some(entry) if entry.expired() => DuplicateCheck::None,
            Some(entry) => match &entry.status {
                IdempotencyStatus::Completed => {
                    DuplicateCheck::Completed(entry.result.clone().unwrap_or_default())
                }
                IdempotencyStatus::Pending => DuplicateCheck::Pending,
            },
            None => DuplicateCheck::None,
        }
    }

    pub fn record_pending(&self, key: &str) {
        self.records.insert(
            key.to_string(),
            Record {
                status: IdempotencyStatus::Pending,
                result: None,
                created_at: Utc::now(),
            },
        );
    }

    /// Atomic `check_duplicate` + `record_pending`: callers must use this
    /// (not the two steps separately) to decide whether to execute a
    /// side-effect tool. `DashMap::entry` holds the shard lock for the
    /// whole match, so two concurrent callers racing on the same key can
    /// never both observe `DuplicateCheck::None` (testable property #6).
    pub fn check_duplicate_and_reserve(&self, key: &str) -> DuplicateCheck {
        use dashmap::mapref::entry::Entry;
        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().expired() {
                    entry.insert(Record {
                        status: IdempotencyStatus::Pending,
                        result: None,
                        created_at: Utc::now(),
                    });
                    DuplicateCheck::None
                } else {
                    match &entry.get().status {
                        IdempotencyStatus::Completed => {
                            DuplicateCheck::Completed(entry.get().result.clone().unwrap_or_default())
                        }
                        IdempotencyStatus::Pending => DuplicateCheck::Pending,
                    }
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Record {
                    status: IdempotencyStatus::Pending,
                    result: None,
                    created_at: Utc::now(),
                });
                DuplicateCheck::None
            }
        }
    }

    pub fn record_complete(&self, key: &str, result: impl Into<String>) {
        self.records.insert(
            key.to_string(),
            Record {
                status: IdempotencyStatus::Completed,
                result: Some(result.into()),
                created_at: Utc::now(),
            },
        );
    }

    /// Remove expired rows. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, v| !v.expired());
        before - self.records.len()
    }
}
