//! The LLM-free pruning and deduplication pass (spec §4.6).
//!
//! Runs on demand via [`crate::engine::Engine::compact`]. Every step is
//! independently idempotent: a second immediate call returns an all-zero
//! report (spec §8 scenario 7).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::config::RetentionConfig;
use crate::embeddings::cosine_similarity;
use crate::error::StoreResult;
use crate::memory::{MemoryStatus, MemoryUpdate};
use crate::store::{EpisodeStore, MemoryStore};

/// Counts from one `compact()` call, one field per step.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CompactionReport {
    pub expired_pruned: usize,
    pub superseded_pruned: usize,
    pub decayed_pruned: usize,
    pub episodes_pruned: usize,
    pub duplicates_merged: usize,
    pub entities_pruned: usize,
    pub relationships_pruned: usize,
}

pub struct Compaction {
    store: Arc<MemoryStore>,
    episodes: Arc<EpisodeStore>,
    retention: RetentionConfig,
    /// Near-duplicate merging (step 3) only runs when the engine has an
    /// embedding provider configured — without one, no memory ever carries
    /// an embedding and the step is a costly no-op anyway (spec §4.6 step 3
    /// "skipped if no embedding provider...").
    embeddings_enabled: bool,
}

/// `importance · (1 + log(1 + access_count) · 0.1)` (spec §4.6 step 3) —
/// deliberately the single simple formula the spec defines, not the
/// teacher's multi-signal competition scoring (see DESIGN.md).
fn survival_score(importance: f64, access_count: i64) -> f64 {
    importance * (1.0 + (1.0 + access_count as f64).ln() * 0.1)
}

impl Compaction {
    pub fn new(store: Arc<MemoryStore>, episodes: Arc<EpisodeStore>, retention: RetentionConfig, embeddings_enabled: bool) -> Self {
        Self { store, episodes, retention, embeddings_enabled }
    }

    fn prune_tombstones(&self, report: &mut CompactionReport) -> StoreResult<()> {
        let now = Utc::now();

        report.expired_pruned = self
            .store
            .delete_tombstoned(MemoryStatus::Expired, now - self.retention.expired_retention)?;
        report.superseded_pruned = self
            .store
            .delete_tombstoned(MemoryStatus::Superseded, now - self.retention.superseded_retention)?;
        report.decayed_pruned = self
            .store
            .delete_tombstoned(MemoryStatus::Decayed, now - self.retention.decayed_retention)?;

        Ok(())
    }

    fn prune_episodes(&self, report: &mut CompactionReport) -> StoreResult<()> {
        let cutoff = Utc::now() - self.retention.episode_retention;
        report.episodes_pruned = self.episodes.delete_consolidated_before(cutoff)?;
        Ok(())
    }

    /// Sorts active-with-embedding memories by survival score descending,
    /// then for each, scans the remainder for cosine similarity at or above
    /// the threshold and supersedes the lower-scoring one into the higher.
    /// A memory already merged away this pass is skipped as both scanner
    /// and target — merges do not cascade transitively (spec §4.6 step 3).
    fn merge_near_duplicates(&self, report: &mut CompactionReport) -> StoreResult<()> {
        let Some(threshold) = self.retention.deduplication_threshold else {
            return Ok(());
        };
        if !self.embeddings_enabled {
            return Ok(());
        }

        let mut memories = self.store.load_active_with_embeddings()?;
        memories.sort_by(|a, b| {
            let sa = survival_score(a.importance, a.access_count);
            let sb = survival_score(b.importance, b.access_count);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut merged: HashSet<String> = HashSet::new();

        for i in 0..memories.len() {
            if merged.contains(&memories[i].id) {
                continue;
            }
            for j in (i + 1)..memories.len() {
                if merged.contains(&memories[j].id) {
                    continue;
                }
                let (Some(a), Some(b)) = (memories[i].embedding.as_deref(), memories[j].embedding.as_deref()) else {
                    continue;
                };
                if (cosine_similarity(a, b) as f64) < threshold {
                    continue;
                }

                let higher = &memories[i];
                let lower = &memories[j];

                self.store.supersede(&lower.id, &higher.id)?;

                let mut entity_ids = higher.entity_ids.clone();
                for id in &lower.entity_ids {
                    if !entity_ids.contains(id) {
                        entity_ids.push(id.clone());
                    }
                }
                let mut source_ids = higher.source_episode_ids.clone();
                for id in &lower.source_episode_ids {
                    if !source_ids.contains(id) {
                        source_ids.push(id.clone());
                    }
                }
                self.store.update(
                    &higher.id,
                    MemoryUpdate {
                        entity_ids: Some(entity_ids),
                        source_episode_ids: Some(source_ids),
                        ..Default::default()
                    },
                )?;

                merged.insert(lower.id.clone());
                report.duplicates_merged += 1;
            }
        }

        Ok(())
    }

    /// Entities before relationships: removing an entity can orphan a
    /// relationship that referenced it, so pruning relationships first
    /// would leave entities alive for one extra pass (spec §4.6 step 4
    /// "order matters").
    fn prune_graph(&self, report: &mut CompactionReport) -> StoreResult<()> {
        report.entities_pruned = self.store.delete_orphaned_entities()?;
        report.relationships_pruned = self.store.delete_orphaned_relationships()?;
        Ok(())
    }

    pub fn compact(&self) -> StoreResult<CompactionReport> {
        let mut report = CompactionReport::default();
        self.prune_tombstones(&mut report)?;
        self.prune_episodes(&mut report)?;
        self.merge_near_duplicates(&mut report)?;
        self.prune_graph(&mut report)?;
        tracing::info!(?report, "compaction complete");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survival_score_rewards_importance_and_access() {
        let base = survival_score(0.5, 0);
        let accessed = survival_score(0.5, 10);
        assert!(accessed > base);
        assert!(survival_score(0.9, 0) > survival_score(0.1, 0));
    }
}
