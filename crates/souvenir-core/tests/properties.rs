//! Property-based tests for the universal invariants of recall and its
//! scoring function.

use std::sync::Arc;

use proptest::prelude::*;
use souvenir_core::config::RecallConfig;
use souvenir_core::memory::NewMemory;
use souvenir_core::recall::UnifiedRecall;
use souvenir_core::store::{self, MemoryStore};

fn new_store() -> Arc<MemoryStore> {
    let db = store::open_in_memory("").unwrap();
    let (memory, _episodes) = store::stores_from(db, "", None);
    Arc::new(memory)
}

/// Mirrors the `exp(-lambda * age_days)` term in `UnifiedRecall::recall`
/// step 4 — the pure, deterministic piece of the scoring formula that
/// temporal-decay monotonicity depends on.
fn temporal_decay(lambda: f64, age_days: f64) -> f64 {
    (-lambda * age_days).exp()
}

proptest! {
    /// Recall results are always sorted by descending score with no two
    /// results sharing identical content, regardless of how many candidate
    /// memories (with varying importance) share a common search term.
    #[test]
    fn recall_results_are_sorted_and_deduplicated(importances in prop::collection::vec(0.05_f64..1.0, 1..12)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let store = new_store();

        for (i, importance) in importances.iter().enumerate() {
            store
                .insert(NewMemory {
                    content: format!("widget report number {i}"),
                    component: "durable".to_string(),
                    category: "note".to_string(),
                    importance: *importance,
                    session_id: None,
                    source_episode_ids: Vec::new(),
                    entity_ids: Vec::new(),
                    valid_at: None,
                    invalid_at: None,
                })
                .unwrap();
        }

        let recall = UnifiedRecall::new(store, None, RecallConfig::default(), Vec::new());
        let results = rt.block_on(recall.recall("widget report", None)).unwrap();

        for window in results.windows(2) {
            prop_assert!(window[0].final_score >= window[1].final_score);
        }
        let mut seen = std::collections::HashSet::new();
        for r in &results {
            prop_assert!(seen.insert(r.memory.content.clone()));
        }
    }

    /// Temporal decay is monotone in age: an older memory (all else equal)
    /// never scores higher than a younger one.
    #[test]
    fn temporal_decay_is_monotone_in_age(
        lambda in 0.0001_f64..0.1,
        younger in 0.0_f64..1000.0,
        delta in 0.0_f64..1000.0,
    ) {
        let older = younger + delta;
        prop_assert!(temporal_decay(lambda, younger) >= temporal_decay(lambda, older));
    }
}
