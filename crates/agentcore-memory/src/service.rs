//! Memory Service (§4.11) — hybrid (vector + keyword, RRF-fused) memory
//! index with recall bookkeeping, consolidation, and expiry cleanup.

use crate::index::{KeywordIndex, VectorIndex};
use crate::types::{
    MemoryEntry, MemoryFilter, MemoryStats, MemoryType, NewMemory, ScoredMemory, SearchMode,
    SearchQuery,
};
use agentcore_core::{AgentId, Error, MemoryId, Result, UserId};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Reciprocal rank fusion constant (§4.11, testable property #10).
const RRF_K: f64 = 60.0;
const VECTOR_COLLECTION: &str = "memories";

#[derive(Clone, Copy, Debug)]
pub struct ConsolidationConfig {
    /// Entries older than this are eligible for consolidation.
    pub age_threshold_days: i64,
    /// Recall count below which importance is downgraded and, combined with
    /// low importance, the entry is scheduled for archival.
    pub min_recalls_for_keep: u32,
    /// Importance floor below which a low-recall entry is archived.
    pub archive_importance_floor: f64,
    /// How far out an archived entry's `expires_at` is set.
    pub archive_ttl_days: i64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            age_threshold_days: 30,
            min_recalls_for_keep: 3,
            archive_importance_floor: 0.2,
            archive_ttl_days: 7,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConsolidationReport {
    pub examined: usize,
    pub promoted: usize,
    pub demoted: usize,
    pub scheduled_for_archival: usize,
}

fn search_text(entry: &MemoryEntry) -> String {
    let mut parts = vec![entry.content.clone()];
    if let Some(title) = &entry.title {
        parts.push(title.clone());
    }
    if let Some(summary) = &entry.summary {
        parts.push(summary.clone());
    }
    parts.push(entry.tags.join(" "));
    parts.join(" ")
}

pub struct MemoryService {
    entries: DashMap<MemoryId, MemoryEntry>,
    vector_index: Arc<dyn VectorIndex>,
    keyword_index: Arc<dyn KeywordIndex>,
    consolidation: ConsolidationConfig,
}

impl MemoryService {
    pub fn new(vector_index: Arc<dyn VectorIndex>, keyword_index: Arc<dyn KeywordIndex>) -> Self {
        Self {
            entries: DashMap::new(),
            vector_index,
            keyword_index,
            consolidation: ConsolidationConfig::default(),
        }
    }

    pub fn with_consolidation_config(mut self, config: ConsolidationConfig) -> Self {
        self.consolidation = config;
        self
    }

    pub async fn create_memory(&self, new: NewMemory) -> MemoryEntry {
        let now = Utc::now();
        let id = MemoryId::new();
        let vector_ref = new.vector_ref.or_else(|| {
            Some(crate::types::VectorRef { collection: VECTOR_COLLECTION.to_string(), vector_id: id.to_string() })
        });
        let entry = MemoryEntry {
            id,
            agent_id: new.agent_id,
            user_id: new.user_id,
            memory_type: new.memory_type,
            content: new.content,
            title: new.title,
            summary: new.summary,
            tags: new.tags,
            importance_score: new.importance_score.clamp(0.0, 1.0),
            recall_count: 0,
            last_recalled_at: None,
            occurred_at: new.occurred_at,
            expires_at: new.expires_at,
            vector_ref,
            created_at: now,
            updated_at: now,
        };

        let text = search_text(&entry);
        self.keyword_index.index(&entry.id.to_string(), &text).await;
        if let Some(vref) = &entry.vector_ref {
            self.vector_index.upsert(&vref.collection, &vref.vector_id, &text).await;
        }
        self.entries.insert(entry.id, entry.clone());
        entry
    }

    pub fn get_memory(&self, id: MemoryId, user_id: UserId) -> Result<MemoryEntry> {
        self.entries
            .get(&id)
            .filter(|e| e.user_id == user_id)
            .map(|e| e.clone())
            .ok_or_else(|| Error::not_found(format!("memory {id}")))
    }

    pub async fn update_memory(
        &self,
        id: MemoryId,
        user_id: UserId,
        mutate: impl FnOnce(&mut MemoryEntry),
    ) -> Result<MemoryEntry> {
        let mut entry = self.get_memory(id, user_id)?;
        mutate(&mut entry);
        entry.updated_at = Utc::now();

        let text = search_text(&entry);
        self.keyword_index.index(&entry.id.to_string(), &text).await;
        if let Some(vref) = &entry.vector_ref {
            self.vector_index.upsert(&vref.collection, &vref.vector_id, &text).await;
        }
        self.entries.insert(id, entry.clone());
        Ok(entry)
    }

    /// Deletes both the row and the vector point, in that order reversed
    /// from the write path: vector delete happens first so a crash between
    /// the two never leaves a dangling point with no owning row (§5 "deletes
    /// must order row-delete-after-vector-delete").
    pub async fn delete_memory(&self, id: MemoryId, user_id: UserId) -> Result<()> {
        let entry = self.get_memory(id, user_id)?;
        if let Some(vref) = &entry.vector_ref {
            self.vector_index.delete(&vref.collection, &vref.vector_id).await;
        }
        self.keyword_index.remove(&id.to_string()).await;
        self.entries.remove(&id);
        Ok(())
    }

    pub fn list_memories(&self, user_id: UserId, filter: &MemoryFilter) -> Vec<MemoryEntry> {
        self.entries
            .iter()
            .filter(|e| e.user_id == user_id && filter.matches(&e))
            .map(|e| e.clone())
            .collect()
    }

    /// Hybrid search per §4.11: run vector and keyword search with limit
    /// `2L`, fuse ranked lists by reciprocal rank fusion (k=60), return the
    /// top `L`. On the single-index path (only one mode requested), return
    /// that list directly without fusing.
    pub async fn search_memories(&self, agent_id: AgentId, user_id: UserId, query: &SearchQuery) -> Vec<ScoredMemory> {
        let fetch_limit = query.limit * 2;

        let keyword_ranked = match query.mode {
            SearchMode::Vector => Vec::new(),
            _ => self.keyword_index.search(&query.text, fetch_limit).await,
        };
        let vector_ranked = match query.mode {
            SearchMode::Keyword => Vec::new(),
            _ => self.vector_index.search(VECTOR_COLLECTION, &query.text, fetch_limit).await,
        };

        let fused: Vec<(String, f64)> = match query.mode {
            SearchMode::Keyword => keyword_ranked,
            SearchMode::Vector => vector_ranked,
            SearchMode::Hybrid => {
                if vector_ranked.is_empty() {
                    keyword_ranked
                } else if keyword_ranked.is_empty() {
                    vector_ranked
                } else {
                    reciprocal_rank_fusion(&[&keyword_ranked, &vector_ranked])
                }
            }
        };

        let mut results: Vec<ScoredMemory> = Vec::with_capacity(query.limit);
        for (id_str, score) in fused {
            if score < query.min_score {
                continue;
            }
            let Ok(uuid) = id_str.parse() else { continue };
            let id = MemoryId::from(uuid);
            let Some(entry) = self.entries.get(&id) else { continue };
            if entry.agent_id != agent_id || entry.user_id != user_id {
                continue;
            }
            if !query.types.is_empty() && !query.types.contains(&entry.memory_type) {
                continue;
            }
            if let Some(min_importance) = query.min_importance {
                if entry.importance_score < min_importance {
                    continue;
                }
            }
            results.push(ScoredMemory { entry: entry.clone(), score });
            if results.len() >= query.limit {
                break;
            }
        }

        for r in &results {
            self.record_recall(r.entry.id, user_id);
        }
        results
    }

    fn record_recall(&self, id: MemoryId, user_id: UserId) {
        if let Some(mut entry) = self.entries.get_mut(&id) {
            if entry.user_id == user_id {
                entry.recall_count += 1;
                entry.last_recalled_at = Some(Utc::now());
            }
        }
    }

    /// Consolidation (§4.11): entries older than `age_threshold_days` get
    /// their importance nudged by recall frequency; stale, unimportant,
    /// rarely-recalled entries are scheduled for archival rather than
    /// deleted outright.
    pub fn consolidate(&self, agent_id: AgentId, user_id: UserId) -> ConsolidationReport {
        let cutoff = Utc::now() - Duration::days(self.consolidation.age_threshold_days);
        let mut report = ConsolidationReport::default();

        for mut entry in self.entries.iter_mut() {
            if entry.agent_id != agent_id || entry.user_id != user_id || entry.occurred_at > cutoff {
                continue;
            }
            report.examined += 1;

            if entry.recall_count >= 2 * self.consolidation.min_recalls_for_keep {
                entry.importance_score = (entry.importance_score + 0.1).min(1.0);
                report.promoted += 1;
            } else if entry.recall_count < self.consolidation.min_recalls_for_keep {
                entry.importance_score = (entry.importance_score - 0.1).max(0.0);
                report.demoted += 1;
            }

            if entry.importance_score < self.consolidation.archive_importance_floor
                && entry.recall_count < self.consolidation.min_recalls_for_keep
                && entry.expires_at.is_none()
            {
                entry.expires_at = Some(Utc::now() + Duration::days(self.consolidation.archive_ttl_days));
                report.scheduled_for_archival += 1;
            }
            entry.updated_at = Utc::now();
        }
        report
    }

    /// Atomically sweeps expired entries from both the row map and the
    /// indexes (§4.11, §3 invariant #8). `agent_id = None` sweeps every
    /// agent's expired entries.
    pub async fn cleanup_expired(&self, agent_id: Option<AgentId>) -> usize {
        let now = Utc::now();
        let expired: Vec<MemoryId> = self
            .entries
            .iter()
            .filter(|e| agent_id.map(|a| a == e.agent_id).unwrap_or(true))
            .filter(|e| e.expires_at.map(|exp| exp <= now).unwrap_or(false))
            .map(|e| e.id)
            .collect();

        for id in &expired {
            if let Some((_, entry)) = self.entries.remove(id) {
                if let Some(vref) = &entry.vector_ref {
                    self.vector_index.delete(&vref.collection, &vref.vector_id).await;
                }
                self.keyword_index.remove(&id.to_string()).await;
            }
        }
        expired.len()
    }

    pub fn get_stats(&self, agent_id: AgentId, user_id: UserId) -> MemoryStats {
        let mut stats = MemoryStats::default();
        let mut importance_sum = 0.0;
        for entry in self.entries.iter() {
            if entry.agent_id != agent_id || entry.user_id != user_id {
                continue;
            }
            stats.total += 1;
            importance_sum += entry.importance_score;
            if entry.vector_ref.is_some() {
                stats.with_vectors += 1;
            }
            let key = format!("{:?}", entry.memory_type);
            *stats.by_type.entry(key).or_insert(0) += 1;
        }
        stats.avg_importance = if stats.total > 0 { importance_sum / stats.total as f64 } else { 0.0 };
        stats
    }
}

/// Unweighted reciprocal rank fusion, k=60: `score(m) = sum(1 / (k + rank_i(m)))`
/// across every ranked list `m` appears in, 1-indexed rank. Deterministic
/// given unchanged inputs (§8 testable property #10).
fn reciprocal_rank_fusion(ranked_lists: &[&Vec<(String, f64)>]) -> Vec<(String, f64)> {
    use std::collections::HashMap;
    let mut scores: HashMap<String, f64> = HashMap::new();
    for list in ranked_lists {
        for (rank, (id, _)) in list.iter().enumerate() {
            *scores.entry(id.clone()).or_default() += 1.0 / (RRF_K + (rank + 1) as f64);
        }
    }
    let mut fused: Vec<(String, f64)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{InMemoryKeywordIndex, InMemoryVectorIndex};
    use crate::types::MemoryType;

    fn service() -> MemoryService {
        MemoryService::new(Arc::new(InMemoryVectorIndex::new()), Arc::new(InMemoryKeywordIndex::new()))
    }

    fn new_memory(agent_id: AgentId, user_id: UserId, content: &str) -> NewMemory {
        NewMemory {
            agent_id,
            user_id,
            memory_type: MemoryType::Learning,
            content: content.to_string(),
            title: None,
            summary: None,
            tags: vec![],
            importance_score: 0.5,
            occurred_at: Utc::now(),
            expires_at: None,
            vector_ref: None,
        }
    }

    #[tokio::test]
    async fn create_then_delete_removes_vector_and_row() {
        let svc = service();
        let agent_id = AgentId::new();
        let user_id = UserId::new();
        let entry = svc.create_memory(new_memory(agent_id, user_id, "likes dark roast coffee")).await;

        svc.delete_memory(entry.id, user_id).await.unwrap();
        assert!(svc.get_memory(entry.id, user_id).is_err());

        let results = svc
            .search_memories(agent_id, user_id, &SearchQuery { text: "coffee".into(), ..Default::default() })
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn hybrid_search_fuses_vector_and_keyword_hits() {
        let svc = service();
        let agent_id = AgentId::new();
        let user_id = UserId::new();
        svc.create_memory(new_memory(agent_id, user_id, "the user prefers terse code review comments")).await;
        svc.create_memory(new_memory(agent_id, user_id, "the user's favorite lunch spot is the corner deli")).await;

        let results = svc
            .search_memories(
                agent_id,
                user_id,
                &SearchQuery { text: "terse code review".into(), limit: 5, ..Default::default() },
            )
            .await;
        assert_eq!(results[0].entry.content, "the user prefers terse code review comments");
    }

    #[tokio::test]
    async fn hybrid_search_is_idempotent_on_unchanged_indexes() {
        let svc = service();
        let agent_id = AgentId::new();
        let user_id = UserId::new();
        svc.create_memory(new_memory(agent_id, user_id, "prefers dark mode editor themes")).await;
        svc.create_memory(new_memory(agent_id, user_id, "dislikes notification sounds")).await;

        let query = SearchQuery { text: "dark mode".into(), limit: 5, ..Default::default() };
        let first: Vec<MemoryId> = svc.search_memories(agent_id, user_id, &query).await.iter().map(|r| r.entry.id).collect();
        let second: Vec<MemoryId> = svc.search_memories(agent_id, user_id, &query).await.iter().map(|r| r.entry.id).collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn consolidation_schedules_archival_for_stale_low_recall_entries() {
        let svc = service();
        let agent_id = AgentId::new();
        let user_id = UserId::new();
        let mut memory = new_memory(agent_id, user_id, "one-off trivia fact");
        memory.importance_score = 0.1;
        memory.occurred_at = Utc::now() - Duration::days(60);
        let entry = svc.create_memory(memory).await;

        let report = svc.consolidate(agent_id, user_id);
        assert_eq!(report.scheduled_for_archival, 1);
        let updated = svc.get_memory(entry.id, user_id).unwrap();
        assert!(updated.expires_at.is_some());
    }

    #[tokio::test]
    async fn cleanup_expired_removes_row_and_index_entries() {
        let svc = service();
        let agent_id = AgentId::new();
        let user_id = UserId::new();
        let mut memory = new_memory(agent_id, user_id, "transient note");
        memory.expires_at = Some(Utc::now() - Duration::seconds(1));
        let entry = svc.create_memory(memory).await;

        let removed = svc.cleanup_expired(None).await;
        assert_eq!(removed, 1);
        assert!(svc.get_memory(entry.id, user_id).is_err());
    }
}
