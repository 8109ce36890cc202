//! Vector and keyword index interfaces (§1 — concrete embedding/vector
//! store and FTS engines are external collaborators; the core only needs
//! narrow `upsert/delete/search` contracts). Each trait ships one in-memory
//! test-double implementation so the Memory Service is exercisable without a
//! real backend, mirroring how `agentcore-agent::hierarchy` treats storage as
//! swappable behind `AgentStore`.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, collection: &str, vector_id: &str, text: &str);
    async fn delete(&self, collection: &str, vector_id: &str);
    /// Ranked `(vector_id, score)` pairs, best first.
    async fn search(&self, collection: &str, query: &str, limit: usize) -> Vec<(String, f64)>;
}

#[async_trait]
pub trait KeywordIndex: Send + Sync {
    async fn index(&self, id: &str, text: &str);
    async fn remove(&self, id: &str);
    /// Ranked `(id, score)` pairs, best first.
    async fn search(&self, query: &str, limit: usize) -> Vec<(String, f64)>;
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// Test-double vector index: no real embeddings, scores by token-set overlap
/// (Jaccard) between query and indexed text. Good enough to exercise ranking
/// and fusion logic; a real deployment swaps this for the external Vector
/// Store behind the same trait.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    points: DashMap<(String, String), HashSet<String>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, collection: &str, vector_id: &str, text: &str) {
        self.points.insert((collection.to_string(), vector_id.to_string()), tokenize(text));
    }

    async fn delete(&self, collection: &str, vector_id: &str) {
        self.points.remove(&(collection.to_string(), vector_id.to_string()));
    }

    async fn search(&self, collection: &str, query: &str, limit: usize) -> Vec<(String, f64)> {
        let query_tokens = tokenize(query);
        let mut scored: Vec<(String, f64)> = self
            .points
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .map(|entry| (entry.key().1.clone(), jaccard(&query_tokens, entry.value())))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

/// Test-double keyword index: term-frequency scoring over a flat document
/// store, standing in for an FTS engine.
#[derive(Default)]
pub struct InMemoryKeywordIndex {
    documents: DashMap<String, String>,
}

impl InMemoryKeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeywordIndex for InMemoryKeywordIndex {
    async fn index(&self, id: &str, text: &str) {
        self.documents.insert(id.to_string(), text.to_lowercase());
    }

    async fn remove(&self, id: &str) {
        self.documents.remove(id);
    }

    async fn search(&self, query: &str, limit: usize) -> Vec<(String, f64)> {
        let terms: Vec<String> = tokenize(query).into_iter().collect();
        if terms.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(String, f64)> = self
            .documents
            .iter()
            .filter_map(|entry| {
                let hits = terms.iter().filter(|t| entry.value().contains(t.as_str())).count();
                if hits == 0 {
                    None
                } else {
                    Some((entry.key().clone(), hits as f64 / terms.len() as f64))
                }
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keyword_index_ranks_by_term_overlap() {
        let idx = InMemoryKeywordIndex::new();
        idx.index("a", "the user prefers dark mode in the editor").await;
        idx.index("b", "the user's favorite color is blue").await;

        let results = idx.search("dark mode editor", 10).await;
        assert_eq!(results[0].0, "a");
    }

    #[tokio::test]
    async fn vector_index_delete_removes_from_search() {
        let idx = InMemoryVectorIndex::new();
        idx.upsert("mem", "v1", "likes hiking in the mountains").await;
        assert!(!idx.search("mem", "hiking mountains", 10).await.is_empty());
        idx.delete("mem", "v1").await;
        assert!(idx.search("mem", "hiking mountains", 10).await.is_empty());
    }
}
