//! End-to-end scenarios and cross-cutting invariants exercised against the
//! store, the recall pipeline, components, and compaction together.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use souvenir_core::compaction::Compaction;
use souvenir_core::components::{Component, TaskMemory};
use souvenir_core::config::{RecallConfig, RetentionConfig, TASK_COMPONENT};
use souvenir_core::embeddings::EmbeddingProvider;
use souvenir_core::episode::{Episode, EpisodeType, NewEpisode};
use souvenir_core::llm::LlmCallback;
use souvenir_core::memory::{MemoryStatus, MemoryUpdate, NewMemory, Relationship};
use souvenir_core::recall::UnifiedRecall;
use souvenir_core::store::{self, EpisodeStore, MemoryStore};
use souvenir_core::{Engine, SouvenirConfig};

fn new_store() -> (Arc<MemoryStore>, Arc<EpisodeStore>) {
    let db = store::open_in_memory("").unwrap();
    let (memory, episodes) = store::stores_from(db, "", None);
    (Arc::new(memory), Arc::new(episodes))
}

fn set_embedding(store: &MemoryStore, id: &str, vector: Vec<f32>) {
    store
        .update(id, MemoryUpdate { embedding: Some(Some(vector)), ..Default::default() })
        .unwrap();
}

/// Assigns every text containing "rabbit"/"animal" vector `[1, 0]`, every
/// text containing "dart" vector `[0, 1]` (orthogonal to the first), and
/// everything else the zero vector (no vector signal).
struct FakeEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for FakeEmbeddingProvider {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let lower = text.to_lowercase();
        if lower.contains("rabbit") || lower.contains("animal") {
            Ok(vec![1.0, 0.0])
        } else if lower.contains("dart") {
            Ok(vec![0.0, 1.0])
        } else {
            Ok(vec![0.0, 0.0])
        }
    }

    fn dimensions(&self) -> usize {
        2
    }
}

fn recall_with_fake_embeddings(store: Arc<MemoryStore>) -> UnifiedRecall {
    UnifiedRecall::new(store, Some(Arc::new(FakeEmbeddingProvider)), RecallConfig::default(), Vec::new())
}

fn recall_without_embeddings(store: Arc<MemoryStore>) -> UnifiedRecall {
    UnifiedRecall::new(store, None, RecallConfig::default(), Vec::new())
}

fn insert(store: &MemoryStore, content: &str, component: &str, importance: f64) -> souvenir_core::StoredMemory {
    store
        .insert(NewMemory {
            content: content.to_string(),
            component: component.to_string(),
            category: "note".to_string(),
            importance,
            session_id: None,
            source_episode_ids: Vec::new(),
            entity_ids: Vec::new(),
            valid_at: None,
            invalid_at: None,
        })
        .unwrap()
}

fn stub_llm(body: &'static str) -> LlmCallback {
    Arc::new(move |_system: &str, _user: &str| {
        Box::pin(async move { Ok(body.to_string()) })
            as Pin<Box<dyn std::future::Future<Output = anyhow::Result<String>> + Send>>
    })
}

fn episode(session_id: &str, content: &str) -> Episode {
    Episode::from_new(
        NewEpisode {
            session_id: session_id.to_string(),
            episode_type: EpisodeType::Conversation,
            content: content.to_string(),
            importance: None,
        },
        Utc::now(),
    )
}

#[tokio::test]
async fn scenario_1_semantic_bridging() {
    let (store, _episodes) = new_store();
    let rabbit = insert(&store, "User thinks rabbits are the most adorable creatures", "durable", 0.7);
    set_embedding(&store, &rabbit.id, vec![1.0, 0.0]);
    let dart = insert(&store, "Dart null-safety requires sound type promotion", "task", 0.7);
    set_embedding(&store, &dart.id, vec![0.0, 1.0]);

    let recall = recall_with_fake_embeddings(store);
    let results = recall.recall("favourite animal", None).await.unwrap();

    assert_eq!(results[0].memory.id, rabbit.id);
    assert!(results.iter().all(|r| r.memory.id != dart.id || r.final_score < results[0].final_score));
}

#[tokio::test]
async fn scenario_2_pure_fts() {
    let (store, _episodes) = new_store();
    insert(&store, "User thinks rabbits are the most adorable creatures", "durable", 0.7);
    let rest = insert(&store, "Implemented the REST API endpoints for the billing service", "task", 0.7);

    let recall = recall_with_fake_embeddings(store);
    let results = recall.recall("REST API", None).await.unwrap();

    assert_eq!(results[0].memory.id, rest.id);
}

#[tokio::test]
async fn scenario_3_entity_expansion() {
    let (store, _episodes) = new_store();
    let alice = store.upsert_entity("Alice", "person").unwrap();
    let memory = insert(&store, "Discussed the quarterly roadmap", "durable", 0.5);
    store
        .update(&memory.id, MemoryUpdate { entity_ids: Some(vec![alice.id.clone()]), ..Default::default() })
        .unwrap();

    let recall = recall_without_embeddings(store);
    let results = recall.recall("Alice", None).await.unwrap();

    assert_eq!(results[0].memory.id, memory.id);
    assert!(results[0].entity_score > 0.0);
}

#[tokio::test]
async fn scenario_4_relevance_silence() {
    let (store, _episodes) = new_store();
    insert(&store, "User thinks rabbits are the most adorable creatures", "durable", 0.7);
    insert(&store, "Implemented the REST API endpoints for the billing service", "task", 0.7);
    store.upsert_entity("Alice", "person").unwrap();

    let recall = recall_with_fake_embeddings(store);
    let results = recall.recall("quantum entanglement", None).await.unwrap();

    assert!(results.is_empty());
}

#[tokio::test]
async fn scenario_5_session_expiry() {
    let (store, _episodes) = new_store();
    let task = TaskMemory::new(store.clone());

    let batch_1 = vec![episode("S1", "decided to use postgres for the new service")];
    let llm = stub_llm(r#"{"items":[{"content":"use postgres","category":"decision","importance":0.7,"action":"new"}]}"#);
    task.consolidate(batch_1, llm).await;

    let s1_items = store.active_items_for_session("S1", TASK_COMPONENT).unwrap();
    assert_eq!(s1_items.len(), 1);

    let batch_2 = vec![episode("S2", "decided to use redis for caching")];
    let llm = stub_llm(r#"{"items":[{"content":"use redis","category":"decision","importance":0.7,"action":"new"}]}"#);
    task.consolidate(batch_2, llm).await;

    let s1_after = store.active_items_for_session("S1", TASK_COMPONENT).unwrap();
    assert!(s1_after.is_empty());

    let s2_items = store.active_items_for_session("S2", TASK_COMPONENT).unwrap();
    assert_eq!(s2_items.len(), 1);

    // The old S1 memory transitioned to expired with a closed validity window.
    let expired = store
        .find_similar("postgres", TASK_COMPONENT, None, Some("S1"), 5)
        .unwrap();
    assert!(expired.is_empty(), "expired items must not satisfy the active predicate");
}

#[tokio::test]
async fn scenario_6_duplicate_merge() {
    let (store, episodes) = new_store();
    let high = insert(&store, "prefers dark mode in every editor", "durable", 0.8);
    set_embedding(&store, &high.id, vec![1.0, 0.0, 0.0]);
    let low = insert(&store, "prefers dark mode in every editor", "durable", 0.6);
    set_embedding(&store, &low.id, vec![1.0, 0.0, 0.0]);
    store
        .update(
            &high.id,
            MemoryUpdate { entity_ids: Some(vec!["e1".to_string()]), ..Default::default() },
        )
        .unwrap();
    store
        .update(&low.id, MemoryUpdate { entity_ids: Some(vec!["e2".to_string()]), ..Default::default() })
        .unwrap();

    let mut retention = RetentionConfig::default();
    retention.deduplication_threshold = Some(0.99);
    let compaction = Compaction::new(store.clone(), episodes, retention, true);

    let report = compaction.compact().unwrap();
    assert_eq!(report.duplicates_merged, 1);

    let survivor = store.find_similar("dark mode editor", "durable", None, None, 5).unwrap();
    assert_eq!(survivor.len(), 1);
    assert_eq!(survivor[0].id, high.id);
    assert!(survivor[0].entity_ids.contains(&"e1".to_string()));
    assert!(survivor[0].entity_ids.contains(&"e2".to_string()));
}

#[tokio::test]
async fn scenario_7_idempotent_compact() {
    let (store, episodes) = new_store();
    insert(&store, "note one", "durable", 0.5);
    insert(&store, "note two", "durable", 0.5);

    let compaction = Compaction::new(store, episodes, RetentionConfig::default(), false);
    compaction.compact().unwrap();
    let second = compaction.compact().unwrap();

    assert_eq!(second.expired_pruned, 0);
    assert_eq!(second.superseded_pruned, 0);
    assert_eq!(second.decayed_pruned, 0);
    assert_eq!(second.episodes_pruned, 0);
    assert_eq!(second.duplicates_merged, 0);
    assert_eq!(second.entities_pruned, 0);
    assert_eq!(second.relationships_pruned, 0);
}

#[tokio::test]
async fn scenario_8_signal_breakdown_observability() {
    let (store, _episodes) = new_store();
    insert(&store, "Implemented the REST API endpoints for the billing service", "task", 0.7);

    let recall = recall_with_fake_embeddings(store);
    let results = recall.recall("REST API", None).await.unwrap();

    assert!(!results.is_empty());
    let top = &results[0];
    assert!(top.fts_score > 0.0);
    assert!(top.vector_score >= 0.0);
    assert!(top.entity_score >= 0.0);
    assert!(top.final_score > 0.0);
}

#[tokio::test]
async fn supersede_invariant_holds() {
    let (store, _episodes) = new_store();
    let old = insert(&store, "old fact", "durable", 0.5);
    let new = insert(&store, "new fact", "durable", 0.5);

    store.supersede(&old.id, &new.id).unwrap();

    let all = store.find_similar("old fact", "durable", None, None, 5).unwrap();
    assert!(all.is_empty());

    let recall = recall_without_embeddings(store.clone());
    let results = recall.recall("new fact", None).await.unwrap();
    assert_eq!(results[0].memory.id, new.id);
    assert_eq!(results[0].memory.status, MemoryStatus::Active);
}

#[tokio::test]
async fn consolidate_marks_every_processed_episode() {
    let (_store, episodes) = new_store();
    let batch = vec![episode("S1", "hello"), episode("S1", "world")];
    episodes.insert(&batch).unwrap();

    let pending = episodes.fetch_unconsolidated().unwrap();
    assert_eq!(pending.len(), 2);

    episodes.mark_consolidated(&pending).unwrap();
    let remaining = episodes.fetch_unconsolidated().unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn memories_survive_reopening_the_same_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("souvenir.db");

    {
        let engine = Engine::open(&path, SouvenirConfig::default(), None).unwrap();
        engine.initialize().await.unwrap();
        engine
            .record(NewEpisode {
                session_id: "S1".to_string(),
                episode_type: EpisodeType::Decision,
                content: "chose sqlite for the embedded store".to_string(),
                importance: None,
            })
            .unwrap();
        let llm = stub_llm(r#"{"items":[{"content":"chose sqlite","category":"decision","importance":0.6,"action":"new"}]}"#);
        engine.consolidate(llm).await.unwrap();
        engine.close().await.unwrap();
    }

    let reopened = Engine::open(&path, SouvenirConfig::default(), None).unwrap();
    reopened.initialize().await.unwrap();
    let results = reopened.recall("sqlite", None).await.unwrap();
    assert!(!results.is_empty());
    assert!(results[0].memory.content.contains("sqlite"));
}

#[tokio::test]
async fn graph_prune_keeps_entities_still_referenced_by_a_relationship() {
    let (store, episodes) = new_store();
    let a = store.upsert_entity("A", "entity").unwrap();
    let b = store.upsert_entity("B", "entity").unwrap();
    store
        .upsert_relationship(&Relationship {
            from_entity_id: a.id.clone(),
            to_entity_id: b.id.clone(),
            relation: "relates_to".to_string(),
            confidence: 0.9,
            updated_at: Utc::now(),
        })
        .unwrap();

    // Neither entity is referenced by any memory, so both become orphaned
    // once the relationship referencing them is also gone.
    let compaction = Compaction::new(store.clone(), episodes, RetentionConfig::default(), false);
    let report = compaction.compact().unwrap();

    // The relationship keeps both entities alive on this first pass.
    assert_eq!(report.entities_pruned, 0);
    let stats = store.stats().unwrap();
    assert_eq!(stats.entity_count, 2);
    assert_eq!(stats.relationship_count, 1);
}
