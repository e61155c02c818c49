//! Multi-signal recall: the fusion of BM25, vector, and entity-graph
//! signals into one ranked, deduplicated, budget-trimmed result list (spec
//! §4.4). This is the algorithmic core of the engine — the step order below
//! is load-bearing and must not be reshuffled.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use crate::config::RecallConfig;
use crate::embeddings::{cosine_similarity, EmbeddingProvider};
use crate::error::{Result as EngineResult, SouvenirError};
use crate::memory::StoredMemory;
use crate::store::MemoryStore;

/// One recall result, preserving every raw signal score alongside the
/// fused final score — observability is a first-class feature (spec §4.4
/// step 10, §8 scenario 8).
#[derive(Debug, Clone)]
pub struct RecalledMemory {
    pub memory: StoredMemory,
    pub fts_score: f64,
    pub vector_score: f64,
    pub entity_score: f64,
    pub final_score: f64,
}

struct Candidate {
    memory: StoredMemory,
    fts_score: f64,
    vector_score: f64,
    entity_score: f64,
}

pub(crate) fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

pub struct UnifiedRecall {
    store: Arc<MemoryStore>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    config: RecallConfig,
    component_weights: Vec<(String, f64)>,
    query_embedding_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl UnifiedRecall {
    pub fn new(
        store: Arc<MemoryStore>,
        embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
        config: RecallConfig,
        component_weights: Vec<(String, f64)>,
    ) -> Self {
        Self {
            store,
            embedding_provider,
            config,
            component_weights,
            query_embedding_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(100).expect("100 is non-zero"),
            )),
        }
    }

    fn component_weight(&self, component: &str) -> f64 {
        self.component_weights
            .iter()
            .find(|(name, _)| name == component)
            .map(|(_, w)| *w)
            .unwrap_or(1.0)
    }

    async fn embed_query(&self, provider: &Arc<dyn EmbeddingProvider>, query: &str) -> Option<Vec<f32>> {
        if let Some(cached) = self
            .query_embedding_cache
            .lock()
            .expect("recall cache mutex poisoned")
            .get(query)
        {
            return Some(cached.clone());
        }
        match provider.embed(query).await {
            Ok(vector) => {
                self.query_embedding_cache
                    .lock()
                    .expect("recall cache mutex poisoned")
                    .put(query.to_string(), vector.clone());
                Some(vector)
            }
            Err(error) => {
                tracing::warn!(%error, "query embedding failed; vector signal degraded");
                None
            }
        }
    }

    /// Step 1(a): BM25 full text, normalized into `[0,1]` by dividing by the
    /// max score in the result set (`0` if empty).
    fn fts_candidates(&self, query: &str) -> Vec<(StoredMemory, f64)> {
        match self.store.search_fts(query, self.config.fts_candidate_limit) {
            Ok(results) => {
                let max = results.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
                if max <= 0.0 {
                    results.into_iter().map(|(m, _)| (m, 0.0)).collect()
                } else {
                    results.into_iter().map(|(m, s)| (m, s / max)).collect()
                }
            }
            Err(error) => {
                tracing::warn!(%error, "fts signal degraded");
                Vec::new()
            }
        }
    }

    /// Step 1(b): embed the query once, prefetch the top
    /// `vector_candidate_limit` active-with-embedding memories by
    /// importance, keep only strictly-positive cosine similarities.
    async fn vector_candidates(&self, query: &str) -> Vec<(StoredMemory, f64)> {
        let Some(provider) = &self.embedding_provider else {
            return Vec::new();
        };
        let Some(query_vector) = self.embed_query(provider, query).await else {
            return Vec::new();
        };

        let mut pool = match self.store.load_active_with_embeddings() {
            Ok(pool) => pool,
            Err(error) => {
                tracing::warn!(%error, "vector signal degraded");
                return Vec::new();
            }
        };
        pool.sort_by(|a, b| b.importance.partial_cmp(&a.importance).unwrap_or(std::cmp::Ordering::Equal));
        pool.truncate(self.config.vector_candidate_limit);

        pool.into_iter()
            .filter_map(|memory| {
                let embedding = memory.embedding.as_deref()?;
                let similarity = cosine_similarity(&query_vector, embedding) as f64;
                (similarity > 0.0).then_some((memory, similarity))
            })
            .collect()
    }

    /// Step 1(c): direct entity matches score 1.0; one-hop neighbours score
    /// `max(existing, relationship.confidence)`; a memory's entity signal is
    /// the max entity-score among the entities it references.
    fn entity_candidates(&self, query: &str) -> Vec<(StoredMemory, f64)> {
        let entities = match self.store.find_entities_by_name(query) {
            Ok(entities) => entities,
            Err(error) => {
                tracing::warn!(%error, "entity signal degraded");
                return Vec::new();
            }
        };
        if entities.is_empty() {
            return Vec::new();
        }

        let mut entity_scores: HashMap<String, f64> =
            entities.iter().map(|e| (e.id.clone(), 1.0)).collect();

        for entity in &entities {
            let relationships = self.store.find_relationships_for_entity(&entity.id).unwrap_or_default();
            for rel in relationships {
                let neighbor = if rel.from_entity_id == entity.id {
                    &rel.to_entity_id
                } else {
                    &rel.from_entity_id
                };
                let existing = entity_scores.get(neighbor).copied().unwrap_or(0.0);
                entity_scores.insert(neighbor.clone(), existing.max(rel.confidence));
            }
        }

        let all_ids: Vec<String> = entity_scores.keys().cloned().collect();
        let memories = self.store.find_memories_by_entity_ids(&all_ids).unwrap_or_default();

        memories
            .into_iter()
            .map(|memory| {
                let score = memory
                    .entity_ids
                    .iter()
                    .filter_map(|id| entity_scores.get(id).copied())
                    .fold(0.0_f64, f64::max);
                (memory, score)
            })
            .collect()
    }

    /// The full ten-step pipeline of spec §4.4.
    pub async fn recall(&self, query: &str, budget: Option<usize>) -> EngineResult<Vec<RecalledMemory>> {
        let budget = budget.unwrap_or(self.config.default_token_budget);

        // Step 1: gather the three signals independently.
        let fts = self.fts_candidates(query);
        let vector = self.vector_candidates(query).await;
        let entity = self.entity_candidates(query);

        if fts.is_empty() && vector.is_empty() && entity.is_empty() {
            return Ok(Vec::new());
        }

        // Step 2: union keyed by memory id.
        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        for (memory, score) in fts {
            candidates.insert(
                memory.id.clone(),
                Candidate { memory, fts_score: score, vector_score: 0.0, entity_score: 0.0 },
            );
        }
        for (memory, score) in vector {
            candidates
                .entry(memory.id.clone())
                .and_modify(|c| c.vector_score = score)
                .or_insert(Candidate { memory, fts_score: 0.0, vector_score: score, entity_score: 0.0 });
        }
        for (memory, score) in entity {
            candidates
                .entry(memory.id.clone())
                .and_modify(|c| c.entity_score = score)
                .or_insert(Candidate { memory, fts_score: 0.0, vector_score: 0.0, entity_score: score });
        }

        let now = Utc::now();
        let mut scored: Vec<RecalledMemory> = candidates
            .into_values()
            .map(|c| {
                // Step 3: weighted linear fusion (RRF is explicitly rejected
                // — it destroys magnitude this pipeline depends on).
                let mut raw = self.config.fts_weight * c.fts_score
                    + self.config.vector_weight * c.vector_score
                    + self.config.entity_weight * c.entity_score;

                // Step 4: multiplicative adjustments, in order.
                raw *= self.component_weight(&c.memory.component);
                raw *= c.memory.importance;

                let age_days = (now - c.memory.updated_at).num_seconds().max(0) as f64 / 86_400.0;
                raw *= (-self.config.temporal_decay_lambda * age_days).exp();

                raw *= 1.0 + (1.0 + c.memory.access_count as f64).ln() * 0.1;

                RecalledMemory {
                    memory: c.memory,
                    fts_score: c.fts_score,
                    vector_score: c.vector_score,
                    entity_score: c.entity_score,
                    final_score: raw,
                }
            })
            // Step 5: relevance threshold. Silence is a valid result.
            .filter(|r| r.final_score >= self.config.relevance_threshold)
            .collect();

        // Step 6: sort descending, then dedup by content.
        scored.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal));
        let mut seen_content = std::collections::HashSet::new();
        scored.retain(|r| seen_content.insert(r.memory.content.clone()));

        // Step 7: top-K cap.
        scored.truncate(self.config.top_k);

        // Step 8: budget trim. Always include at least the first item.
        let mut trimmed = Vec::with_capacity(scored.len());
        let mut used = 0usize;
        for (i, item) in scored.into_iter().enumerate() {
            let cost = estimate_tokens(&item.memory.content);
            if i > 0 && used + cost > budget {
                break;
            }
            used += cost;
            trimmed.push(item);
        }

        // Step 9: access-stat update for every returned memory.
        let ids: Vec<String> = trimmed.iter().map(|r| r.memory.id.clone()).collect();
        if let Err(error) = self.store.update_access_stats(&ids) {
            return Err(SouvenirError::Store(error));
        }

        Ok(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
