//! Cross-session operating-environment memory: capabilities, constraints,
//! environment details, and recurring patterns (spec §4.5
//! "EnvironmentalMemory").

use std::sync::Arc;

use async_trait::async_trait;

use super::{build_transcript, Component, ConsolidationReport};
use crate::config::{DecayConfig, ENVIRONMENTAL_COMPONENT, ENVIRONMENTAL_DECAY};
use crate::episode::Episode;
use crate::llm::{prompts, strip_code_fence, ExtractedItem, ExtractionAction, ItemExtraction, LlmCallback};
use crate::memory::{MemoryUpdate, NewMemory};
use crate::store::MemoryStore;

pub struct EnvironmentalMemory {
    store: Arc<MemoryStore>,
    decay: DecayConfig,
}

impl EnvironmentalMemory {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store, decay: ENVIRONMENTAL_DECAY }
    }

    fn decay(&self) -> usize {
        match self.store.apply_importance_decay(
            ENVIRONMENTAL_COMPONENT,
            self.decay.inactive_period,
            self.decay.decay_rate,
            self.decay.floor,
        ) {
            Ok(crossed) => crossed,
            Err(error) => {
                tracing::warn!(%error, "environmental importance decay failed");
                0
            }
        }
    }

    fn apply_item(&self, episode_ids: &[String], item: ExtractedItem, report: &mut ConsolidationReport) {
        let action = item.action.unwrap_or(ExtractionAction::New);
        let existing = self
            .store
            .find_similar(&item.content, ENVIRONMENTAL_COMPONENT, Some(&item.category), None, 5)
            .unwrap_or_default();

        if matches!(action, ExtractionAction::Merge | ExtractionAction::Update) {
            if let Some(existing) = existing.into_iter().next() {
                let importance = existing.importance.max(item.importance);
                let mut source_ids = existing.source_episode_ids.clone();
                for id in episode_ids {
                    if !source_ids.contains(id) {
                        source_ids.push(id.clone());
                    }
                }
                match self.store.update(
                    &existing.id,
                    MemoryUpdate {
                        content: Some(item.content),
                        importance: Some(importance),
                        source_episode_ids: Some(source_ids),
                        ..Default::default()
                    },
                ) {
                    Ok(()) => report.items_merged += 1,
                    Err(error) => tracing::warn!(%error, "failed to merge environmental memory"),
                }
                return;
            }
        }

        let new_memory = NewMemory {
            content: item.content,
            component: ENVIRONMENTAL_COMPONENT.to_string(),
            category: item.category,
            importance: item.importance,
            session_id: None,
            source_episode_ids: episode_ids.to_vec(),
            entity_ids: Vec::new(),
            valid_at: None,
            invalid_at: None,
        };
        match self.store.insert(new_memory) {
            Ok(_) => report.items_created += 1,
            Err(error) => tracing::warn!(%error, "failed to insert environmental memory"),
        }
    }
}

#[async_trait]
impl Component for EnvironmentalMemory {
    fn name(&self) -> &'static str {
        ENVIRONMENTAL_COMPONENT
    }

    async fn consolidate(&self, episodes: Vec<Episode>, llm: LlmCallback) -> ConsolidationReport {
        let mut report = ConsolidationReport::empty(ENVIRONMENTAL_COMPONENT);

        if episodes.is_empty() {
            report.items_decayed = self.decay();
            return report;
        }
        report.episodes_consumed = episodes.len();

        let episode_ids: Vec<String> = episodes.iter().map(|e| e.id.clone()).collect();
        let transcript = build_transcript(&episodes);

        let response = match llm(prompts::ENVIRONMENTAL_SYSTEM_PROMPT, &transcript).await {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(%error, "environmental extraction llm call failed");
                report.items_decayed = self.decay();
                return report;
            }
        };
        let parsed: ItemExtraction = match serde_json::from_str(strip_code_fence(&response)) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(%error, "environmental extraction response was not valid json; skipping batch");
                report.items_decayed = self.decay();
                return report;
            }
        };

        for item in parsed.items {
            self.apply_item(&episode_ids, item, &mut report);
        }

        report.items_decayed = self.decay();
        report
    }
}
