//! The engine coordinator (spec §4.3): owns the component list, episode
//! buffer, embedding provider handle, and default budget; orchestrates
//! consolidation fan-out, embedding backfill, and compaction.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::compaction::{Compaction, CompactionReport};
use crate::components::{Component, ConsolidationReport, DurableMemory, EnvironmentalMemory, TaskMemory};
use crate::config::SouvenirConfig;
use crate::embeddings::EmbeddingProvider;
use crate::episode::{Episode, NewEpisode};
use crate::error::{Result, SouvenirError, StoreResult};
use crate::llm::LlmCallback;
use crate::memory::{MemoryUpdate, StoreStats};
use crate::recall::{RecalledMemory, UnifiedRecall};
use crate::store::{self, EpisodeStore, MemoryStore};

/// Cognitive memory engine for autonomous agents: the single entry point
/// wiring together the unified store, the three reference components, the
/// recall pipeline, and compaction.
pub struct Engine {
    store: Arc<MemoryStore>,
    episode_store: Arc<EpisodeStore>,
    components: Vec<Arc<dyn Component>>,
    buffer: Mutex<Vec<Episode>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    recall: UnifiedRecall,
    compaction: Compaction,
    config: SouvenirConfig,
    initialized: AtomicBool,
}

impl Engine {
    fn build(db: store::Db, config: SouvenirConfig, embedding_provider: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        let (memory_store, episode_store) =
            store::stores_from(db, &config.table_prefix, config.embedding_dimensions);
        let store = Arc::new(memory_store);
        let episode_store = Arc::new(episode_store);

        let components: Vec<Arc<dyn Component>> = vec![
            Arc::new(TaskMemory::new(store.clone())),
            Arc::new(DurableMemory::new(store.clone())),
            Arc::new(EnvironmentalMemory::new(store.clone())),
        ];

        let recall = UnifiedRecall::new(
            store.clone(),
            embedding_provider.clone(),
            config.recall.clone(),
            config.component_weights.clone(),
        );
        let compaction = Compaction::new(
            store.clone(),
            episode_store.clone(),
            config.retention.clone(),
            embedding_provider.is_some(),
        );

        Self {
            store,
            episode_store,
            components,
            buffer: Mutex::new(Vec::new()),
            embedding_provider,
            recall,
            compaction,
            config,
            initialized: AtomicBool::new(false),
        }
    }

    /// Opens (creating if absent) a file-backed engine.
    pub fn open(
        path: &Path,
        config: SouvenirConfig,
        embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    ) -> StoreResult<Self> {
        let db = store::open_file(path, &config.table_prefix, config.require_encryption)?;
        Ok(Self::build(db, config, embedding_provider))
    }

    /// Opens an ephemeral in-memory engine (tests, short-lived callers).
    pub fn open_in_memory(
        config: SouvenirConfig,
        embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    ) -> StoreResult<Self> {
        let db = store::open_in_memory(&config.table_prefix)?;
        Ok(Self::build(db, config, embedding_provider))
    }

    /// Initializes every component in parallel. Must be called once before
    /// any other public method — those fail with [`SouvenirError::NotInitialized`]
    /// until this completes (spec §4.3 "Initialization order": store first,
    /// already open by the time `Engine` exists, then components).
    pub async fn initialize(&self) -> Result<()> {
        let inits = self.components.iter().map(|c| c.initialize());
        for result in futures::future::join_all(inits).await {
            result?;
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SouvenirError::NotInitialized)
        }
    }

    /// Appends to the buffer; flushes automatically once the buffer reaches
    /// `config.flush_threshold` (spec §4.3 `record`).
    pub fn record(&self, episode: NewEpisode) -> Result<()> {
        self.ensure_initialized()?;
        let should_flush = {
            let mut buffer = self.buffer.lock().expect("episode buffer mutex poisoned");
            buffer.push(Episode::from_new(episode, chrono::Utc::now()));
            buffer.len() >= self.config.flush_threshold
        };
        if should_flush {
            self.flush()?;
        }
        Ok(())
    }

    /// Snapshots and clears the buffer before handing it to the episode
    /// store, so a record arriving while the insert suspends cannot be
    /// double-counted (spec §4.3 `flush`, §5 "A flush atomically transfers a
    /// contiguous prefix of the buffer").
    pub fn flush(&self) -> Result<()> {
        self.ensure_initialized()?;
        let snapshot = {
            let mut buffer = self.buffer.lock().expect("episode buffer mutex poisoned");
            if buffer.is_empty() {
                return Ok(());
            }
            std::mem::take(&mut *buffer)
        };
        self.episode_store.insert(&snapshot)?;
        Ok(())
    }

    /// Flushes, fetches every unconsolidated episode, fans out to every
    /// component concurrently via `tokio::spawn` (so one component panicking
    /// cannot block another's write from committing), marks the batch
    /// consolidated only after every component has returned, then backfills
    /// embeddings for anything still missing one (spec §4.3 `consolidate`).
    pub async fn consolidate(&self, llm: LlmCallback) -> Result<Vec<ConsolidationReport>> {
        self.ensure_initialized()?;
        self.flush()?;

        let episodes = self.episode_store.fetch_unconsolidated()?;
        if episodes.is_empty() {
            return Ok(Vec::new());
        }

        let handles: Vec<_> = self
            .components
            .iter()
            .cloned()
            .map(|component| {
                let episodes = episodes.clone();
                let llm = llm.clone();
                tokio::spawn(async move { component.consolidate(episodes, llm).await })
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        for (component, handle) in self.components.iter().zip(handles) {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(join_error) => {
                    tracing::error!(%join_error, component = component.name(), "component consolidation panicked");
                    reports.push(ConsolidationReport::empty(component.name()));
                }
            }
        }

        // Episodes are marked consolidated only now — after every component
        // has returned, regardless of individual success (spec §4.3 step 5).
        self.episode_store.mark_consolidated(&episodes)?;

        if let Some(provider) = &self.embedding_provider {
            self.backfill_embeddings(provider).await;
        }

        Ok(reports)
    }

    async fn backfill_embeddings(&self, provider: &Arc<dyn EmbeddingProvider>) {
        loop {
            let batch = match self.store.find_unembedded_memories(self.config.embedding_backfill_batch_size) {
                Ok(batch) => batch,
                Err(error) => {
                    tracing::warn!(%error, "failed to list unembedded memories");
                    return;
                }
            };
            if batch.is_empty() {
                return;
            }

            for memory in &batch {
                match provider.embed(&memory.content).await {
                    Ok(vector) => {
                        if let Err(error) = self.store.update(
                            &memory.id,
                            MemoryUpdate { embedding: Some(Some(vector)), ..Default::default() },
                        ) {
                            tracing::warn!(%error, id = %memory.id, "failed to persist backfilled embedding");
                        }
                    }
                    Err(error) => {
                        // Embedding failure is non-fatal — the memory stays
                        // searchable via FTS and the entity graph (spec §7
                        // `EmbeddingError`).
                        tracing::warn!(%error, id = %memory.id, "embedding backfill failed");
                    }
                }
            }

            if batch.len() < self.config.embedding_backfill_batch_size {
                return;
            }
        }
    }

    pub async fn recall(&self, query: &str, budget: Option<usize>) -> Result<Vec<RecalledMemory>> {
        self.ensure_initialized()?;
        self.recall.recall(query, budget).await
    }

    pub fn compact(&self) -> Result<CompactionReport> {
        self.ensure_initialized()?;
        Ok(self.compaction.compact()?)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.ensure_initialized()?;
        Ok(self.store.stats()?)
    }

    /// Flushes the buffer, closes every component in parallel, then the
    /// store handles drop when `self` does (spec §4.3 `close`).
    pub async fn close(&self) -> Result<()> {
        self.flush()?;
        let closes = self.components.iter().map(|c| c.close());
        futures::future::join_all(closes).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_llm() -> LlmCallback {
        Arc::new(|_system: &str, _user: &str| {
            Box::pin(async { Ok("{}".to_string()) }) as std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<String>> + Send>>
        })
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let engine = Engine::open_in_memory(SouvenirConfig::default(), None).unwrap();
        let result = engine.recall("anything", None).await;
        assert!(matches!(result, Err(SouvenirError::NotInitialized)));
    }

    #[tokio::test]
    async fn consolidate_on_empty_buffer_returns_no_reports() {
        let engine = Engine::open_in_memory(SouvenirConfig::default(), None).unwrap();
        engine.initialize().await.unwrap();
        let reports = engine.consolidate(noop_llm()).await.unwrap();
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn record_flushes_at_threshold() {
        let mut config = SouvenirConfig::default();
        config.flush_threshold = 2;
        let engine = Engine::open_in_memory(config, None).unwrap();
        engine.initialize().await.unwrap();

        for _ in 0..2 {
            engine
                .record(NewEpisode {
                    session_id: "s1".to_string(),
                    episode_type: crate::episode::EpisodeType::Observation,
                    content: "hi".to_string(),
                    importance: None,
                })
                .unwrap();
        }

        let unconsolidated = engine.episode_store.fetch_unconsolidated().unwrap();
        assert_eq!(unconsolidated.len(), 2);
    }
}
