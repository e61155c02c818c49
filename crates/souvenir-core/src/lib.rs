//! # Souvenir Core
//!
//! A persistent, multi-signal memory engine for autonomous agents.
//!
//! The hosting agent loop records [`episode::NewEpisode`]s as they happen —
//! conversation turns, tool results, decisions — through [`engine::Engine`].
//! Periodically it calls [`engine::Engine::consolidate`] with an
//! LLM callback, which fans the buffered episodes out to three reference
//! [`components`]: task-scoped working memory, cross-session durable
//! knowledge, and environmental context. Each component distills raw
//! episodes into curated [`memory::StoredMemory`] records. Retrieval goes
//! through [`recall::UnifiedRecall`], which fuses full-text (BM25/FTS5),
//! vector, and entity-graph signals into one ranked, budget-trimmed list.
//! [`compaction`] periodically prunes tombstones, merges near-duplicate
//! memories, and garbage-collects the orphaned entity graph.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use souvenir_core::{Engine, SouvenirConfig};
//! use souvenir_core::episode::{EpisodeType, NewEpisode};
//!
//! let engine = Engine::open_in_memory(SouvenirConfig::default(), None)?;
//! engine.initialize().await?;
//!
//! engine.record(NewEpisode {
//!     session_id: "session-1".to_string(),
//!     episode_type: EpisodeType::UserDirective,
//!     content: "Always use tabs, not spaces.".to_string(),
//!     importance: None,
//! })?;
//!
//! engine.consolidate(llm_callback).await?;
//! let recalled = engine.recall("indentation preferences", None).await?;
//! ```
//!
//! ## Feature flags
//!
//! - `embeddings` (default): brings in [`embeddings::local::LocalEmbeddingProvider`],
//!   a ready-made local ONNX (`fastembed`) implementation of
//!   [`embeddings::EmbeddingProvider`]. The trait itself, `cosine_similarity`,
//!   and the vector signal in recall/compaction are always available —
//!   callers may supply their own provider with this feature off. Without any
//!   provider configured, recall still works on FTS and entity signals.
//! - `bundled-sqlite` (default): statically link SQLite via `rusqlite`'s
//!   `bundled` feature instead of requiring a system library.
//! - `encryption`: enforce that the backing SQLite file is encrypted
//!   (`SouvenirConfig::require_encryption`).

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod compaction;
pub mod components;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod episode;
pub mod error;
pub mod llm;
pub mod memory;
pub mod recall;
pub mod store;

pub use components::{Component, ConsolidationReport, DurableMemory, EnvironmentalMemory, TaskMemory};
pub use config::{DecayConfig, RecallConfig, RetentionConfig, SouvenirConfig};
pub use embeddings::{cosine_similarity, EmbeddingProvider};
pub use engine::Engine;
pub use episode::{Episode, EpisodeType, NewEpisode};
pub use error::{Result, SouvenirError, StoreError, StoreResult};
pub use llm::LlmCallback;
pub use memory::{Entity, MemoryStatus, MemoryUpdate, NewMemory, Relationship, StoreStats, StoredMemory};
pub use recall::RecalledMemory;
pub use store::{EpisodeStore, MemoryStore};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        Component, ConsolidationReport, DurableMemory, EmbeddingProvider, Engine, Entity, Episode,
        EpisodeType, EnvironmentalMemory, MemoryStatus, MemoryUpdate, NewEpisode, NewMemory,
        RecalledMemory, Relationship, Result, SouvenirConfig, SouvenirError, StoredMemory,
        TaskMemory,
    };
}
