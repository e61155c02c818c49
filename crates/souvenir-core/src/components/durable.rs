//! Cross-session durable knowledge: stable facts, preferences, and learned
//! knowledge about the user and the world, plus the entity/relationship
//! graph that grounds them (spec §4.5 "DurableMemory").

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::{build_transcript, Component, ConsolidationReport};
use crate::config::{DecayConfig, DURABLE_COMPONENT, DURABLE_DECAY};
use crate::episode::Episode;
use crate::llm::{prompts, strip_code_fence, DurableExtraction, ExtractedFact, ExtractionAction, LlmCallback};
use crate::memory::{MemoryUpdate, NewMemory, Relationship};
use crate::store::MemoryStore;

pub struct DurableMemory {
    store: Arc<MemoryStore>,
    decay: DecayConfig,
}

impl DurableMemory {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store, decay: DURABLE_DECAY }
    }

    fn decay(&self) -> usize {
        match self.store.apply_importance_decay(
            DURABLE_COMPONENT,
            self.decay.inactive_period,
            self.decay.decay_rate,
            self.decay.floor,
        ) {
            Ok(crossed) => crossed,
            Err(error) => {
                tracing::warn!(%error, "durable importance decay failed");
                0
            }
        }
    }

    fn apply_fact(&self, episode_ids: &[String], fact: ExtractedFact, report: &mut ConsolidationReport) {
        let category = fact.category.as_deref().unwrap_or("fact");
        let entity_ids: Vec<String> = fact
            .entities
            .iter()
            .filter_map(|e| match self.store.upsert_entity(&e.name, &e.entity_type) {
                Ok(entity) => Some(entity.id),
                Err(error) => {
                    tracing::warn!(%error, entity = %e.name, "failed to upsert durable entity");
                    None
                }
            })
            .collect();

        let existing = self
            .store
            .find_similar(&fact.content, DURABLE_COMPONENT, Some(category), None, 5)
            .unwrap_or_default();

        match fact.conflict {
            Some(ExtractionAction::Contradiction) => {
                let new_memory = NewMemory {
                    content: fact.content,
                    component: DURABLE_COMPONENT.to_string(),
                    category: category.to_string(),
                    importance: fact.importance,
                    session_id: None,
                    source_episode_ids: episode_ids.to_vec(),
                    entity_ids,
                    valid_at: None,
                    invalid_at: None,
                };
                match self.store.insert(new_memory) {
                    Ok(inserted) => {
                        report.items_created += 1;
                        if let Some(old) = existing.into_iter().next() {
                            if let Err(error) = self.store.supersede(&old.id, &inserted.id) {
                                tracing::warn!(%error, "failed to supersede contradicted durable memory");
                            }
                        }
                    }
                    Err(error) => tracing::warn!(%error, "failed to insert contradicting durable memory"),
                }
            }
            Some(ExtractionAction::Duplicate) => {
                if let Some(existing) = existing.into_iter().next() {
                    if existing.importance >= fact.importance {
                        return;
                    }
                    self.merge_into(existing, episode_ids, entity_ids, fact.content, fact.importance, report);
                } else {
                    self.insert_new(episode_ids, entity_ids, category, fact.content, fact.importance, report);
                }
            }
            Some(ExtractionAction::Update) | Some(ExtractionAction::Merge) => {
                if let Some(existing) = existing.into_iter().next() {
                    self.merge_into(existing, episode_ids, entity_ids, fact.content, fact.importance, report);
                } else {
                    self.insert_new(episode_ids, entity_ids, category, fact.content, fact.importance, report);
                }
            }
            None | Some(ExtractionAction::New) => {
                self.insert_new(episode_ids, entity_ids, category, fact.content, fact.importance, report);
            }
        }
    }

    fn insert_new(
        &self,
        episode_ids: &[String],
        entity_ids: Vec<String>,
        category: &str,
        content: String,
        importance: f64,
        report: &mut ConsolidationReport,
    ) {
        let new_memory = NewMemory {
            content,
            component: DURABLE_COMPONENT.to_string(),
            category: category.to_string(),
            importance,
            session_id: None,
            source_episode_ids: episode_ids.to_vec(),
            entity_ids,
            valid_at: None,
            invalid_at: None,
        };
        match self.store.insert(new_memory) {
            Ok(_) => report.items_created += 1,
            Err(error) => tracing::warn!(%error, "failed to insert durable memory"),
        }
    }

    fn merge_into(
        &self,
        existing: crate::memory::StoredMemory,
        episode_ids: &[String],
        new_entity_ids: Vec<String>,
        content: String,
        importance: f64,
        report: &mut ConsolidationReport,
    ) {
        let importance = existing.importance.max(importance);
        let mut entity_ids = existing.entity_ids.clone();
        for id in new_entity_ids {
            if !entity_ids.contains(&id) {
                entity_ids.push(id);
            }
        }
        let mut source_ids = existing.source_episode_ids.clone();
        for id in episode_ids {
            if !source_ids.contains(id) {
                source_ids.push(id.clone());
            }
        }
        match self.store.update(
            &existing.id,
            MemoryUpdate {
                content: Some(content),
                importance: Some(importance),
                entity_ids: Some(entity_ids),
                source_episode_ids: Some(source_ids),
                ..Default::default()
            },
        ) {
            Ok(()) => report.items_merged += 1,
            Err(error) => tracing::warn!(%error, "failed to merge durable memory"),
        }
    }

    fn apply_relationships(&self, extraction: &DurableExtraction) {
        for rel in &extraction.relationships {
            let from = match self.store.upsert_entity(&rel.from, "entity") {
                Ok(entity) => entity.id,
                Err(error) => {
                    tracing::warn!(%error, entity = %rel.from, "failed to upsert relationship endpoint");
                    continue;
                }
            };
            let to = match self.store.upsert_entity(&rel.to, "entity") {
                Ok(entity) => entity.id,
                Err(error) => {
                    tracing::warn!(%error, entity = %rel.to, "failed to upsert relationship endpoint");
                    continue;
                }
            };
            let relationship = Relationship {
                from_entity_id: from,
                to_entity_id: to,
                relation: rel.relation.clone(),
                confidence: rel.confidence,
                updated_at: Utc::now(),
            };
            if let Err(error) = self.store.upsert_relationship(&relationship) {
                tracing::warn!(%error, "failed to upsert durable relationship");
            }
        }
    }
}

#[async_trait]
impl Component for DurableMemory {
    fn name(&self) -> &'static str {
        DURABLE_COMPONENT
    }

    async fn consolidate(&self, episodes: Vec<Episode>, llm: LlmCallback) -> ConsolidationReport {
        let mut report = ConsolidationReport::empty(DURABLE_COMPONENT);

        if episodes.is_empty() {
            report.items_decayed = self.decay();
            return report;
        }
        report.episodes_consumed = episodes.len();

        let episode_ids: Vec<String> = episodes.iter().map(|e| e.id.clone()).collect();
        let transcript = build_transcript(&episodes);

        let response = match llm(prompts::DURABLE_SYSTEM_PROMPT, &transcript).await {
            Ok(text) => text,
            Err(error) => {
                tracing::warn!(%error, "durable extraction llm call failed");
                report.items_decayed = self.decay();
                return report;
            }
        };
        let parsed: DurableExtraction = match serde_json::from_str(strip_code_fence(&response)) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(%error, "durable extraction response was not valid json; skipping batch");
                report.items_decayed = self.decay();
                return report;
            }
        };

        self.apply_relationships(&parsed);
        for fact in parsed.facts {
            self.apply_fact(&episode_ids, fact, &mut report);
        }

        report.items_decayed = self.decay();
        report
    }
}
