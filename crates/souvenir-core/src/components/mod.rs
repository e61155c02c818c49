//! The component contract (spec §4.5) and the three reference components:
//! [`task::TaskMemory`], [`durable::DurableMemory`], [`environmental::EnvironmentalMemory`].
//!
//! A component is a named extractor+lifecycle strategy that writes into the
//! shared [`crate::store::MemoryStore`] and holds no persistent state of its
//! own — see DESIGN NOTES "Polymorphic memory variants" for why this is a
//! loosely-coupled trait rather than a class hierarchy keyed on an enum.

pub mod durable;
pub mod environmental;
pub mod task;

pub use durable::DurableMemory;
pub use environmental::EnvironmentalMemory;
pub use task::TaskMemory;

use async_trait::async_trait;

use crate::episode::Episode;
use crate::llm::LlmCallback;

/// A per-consolidation-call summary, always returned even when the LLM
/// callback fails or returns unparseable JSON (spec §4.5 step 5, §7
/// `LlmExtractionError`: absorbed, surfaced only as a decay-only report).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConsolidationReport {
    pub component_name: &'static str,
    pub items_created: usize,
    pub items_merged: usize,
    pub items_decayed: usize,
    pub episodes_consumed: usize,
}

impl ConsolidationReport {
    pub fn empty(component_name: &'static str) -> Self {
        Self { component_name, ..Default::default() }
    }
}

/// `initialize`/`consolidate`/`close` (spec §4.5). None of the three
/// reference components implements recall — that stays the engine's job via
/// [`crate::recall::UnifiedRecall`].
///
/// Methods take `&self`: the coordinator fans `consolidate` out across every
/// component concurrently (spec §4.3 step 4), so any mutable state a
/// component keeps (e.g. `TaskMemory`'s last-seen session id) is behind its
/// own interior-mutability, not a `&mut self` borrow the fan-out can't share.
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &'static str;

    async fn initialize(&self) -> crate::error::StoreResult<()> {
        Ok(())
    }

    async fn consolidate(&self, episodes: Vec<Episode>, llm: LlmCallback) -> ConsolidationReport;

    async fn close(&self) {}
}

/// Renders episodes as `[type] content` lines, one per line, in the order
/// given — the transcript handed to the LLM callback (spec §4.5 step 3).
pub(crate) fn build_transcript(episodes: &[Episode]) -> String {
    episodes
        .iter()
        .map(|e| format!("[{}] {}", e.episode_type, e.content))
        .collect::<Vec<_>>()
        .join("\n")
}
