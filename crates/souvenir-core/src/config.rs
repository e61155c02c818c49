//! Engine-wide configuration
//!
//! A single struct rather than the teacher's scattered per-feature `*Config`
//! types (`HybridSearchConfig`, `ImportanceDecayConfig`, ...) — Souvenir has
//! one retrieval pipeline and one compaction pass, so one config surface is
//! enough.

use chrono::Duration;

/// Weights and thresholds for [`crate::recall::UnifiedRecall`]'s score
/// fusion (spec §4.4).
#[derive(Debug, Clone)]
pub struct RecallConfig {
    pub fts_weight: f64,
    pub vector_weight: f64,
    pub entity_weight: f64,
    pub temporal_decay_lambda: f64,
    pub relevance_threshold: f64,
    pub top_k: usize,
    pub fts_candidate_limit: usize,
    pub vector_candidate_limit: usize,
    pub default_token_budget: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            fts_weight: 1.0,
            vector_weight: 1.5,
            entity_weight: 0.8,
            temporal_decay_lambda: 0.005,
            relevance_threshold: 0.05,
            top_k: 20,
            fts_candidate_limit: 50,
            vector_candidate_limit: 20,
            default_token_budget: 2000,
        }
    }
}

/// Tombstone and episode retention windows for [`crate::compaction`] (spec
/// §4.6 step 1-2).
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub expired_retention: Duration,
    pub superseded_retention: Duration,
    pub decayed_retention: Duration,
    pub episode_retention: Duration,
    /// Cosine-similarity threshold above which two memories are merged as
    /// near-duplicates. `None` disables dedup entirely.
    pub deduplication_threshold: Option<f64>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            expired_retention: Duration::days(7),
            superseded_retention: Duration::days(30),
            decayed_retention: Duration::days(14),
            episode_retention: Duration::days(90),
            deduplication_threshold: Some(0.99),
        }
    }
}

/// Per-component decay parameters (spec §4.5).
#[derive(Debug, Clone, Copy)]
pub struct DecayConfig {
    pub inactive_period: Duration,
    pub decay_rate: f64,
    pub floor: Option<f64>,
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct SouvenirConfig {
    /// Number of buffered episodes that triggers an automatic flush.
    pub flush_threshold: usize,
    /// Embedding dimensionality the store expects. `Some(n)` pins it up
    /// front, so a misconfigured provider fails on its first write instead
    /// of after one has already set the dimensionality implicitly; `None`
    /// leaves it to be learned from the first embedding written and
    /// enforced thereafter (spec §3 "Invariants").
    pub embedding_dimensions: Option<usize>,
    pub recall: RecallConfig,
    pub retention: RetentionConfig,
    /// Per-component weighting applied during recall fusion
    /// (`componentWeights[memory.component]`, spec §4.4 step 4).
    pub component_weights: Vec<(String, f64)>,
    /// Table/virtual-table name prefix for multi-agent isolation (spec §6).
    pub table_prefix: String,
    /// Fail store construction fast if the backing file is not encrypted.
    pub require_encryption: bool,
    /// How many unembedded memories the post-consolidation backfill pass
    /// fetches per round trip to the store (spec §4.3 step 6).
    pub embedding_backfill_batch_size: usize,
}

impl Default for SouvenirConfig {
    fn default() -> Self {
        Self {
            flush_threshold: 20,
            embedding_dimensions: None,
            recall: RecallConfig::default(),
            retention: RetentionConfig::default(),
            component_weights: Vec::new(),
            table_prefix: String::new(),
            require_encryption: false,
            embedding_backfill_batch_size: 100,
        }
    }
}

impl SouvenirConfig {
    pub fn component_weight(&self, component: &str) -> f64 {
        self.component_weights
            .iter()
            .find(|(name, _)| name == component)
            .map(|(_, w)| *w)
            .unwrap_or(1.0)
    }
}

pub const TASK_COMPONENT: &str = "task";
pub const DURABLE_COMPONENT: &str = "durable";
pub const ENVIRONMENTAL_COMPONENT: &str = "environmental";

pub const TASK_MAX_ITEMS_PER_SESSION: usize = 50;

pub const DURABLE_DECAY: DecayConfig = DecayConfig {
    inactive_period: Duration::days(90),
    decay_rate: 0.97,
    floor: Some(0.05),
};

pub const ENVIRONMENTAL_DECAY: DecayConfig = DecayConfig {
    inactive_period: Duration::days(14),
    decay_rate: 0.95,
    floor: Some(0.1),
};
