//! Session-scoped working memory: goals, decisions, results, and context
//! needed to resume a task later (spec §4.5 "TaskMemory").

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{build_transcript, Component, ConsolidationReport};
use crate::config::{TASK_COMPONENT, TASK_MAX_ITEMS_PER_SESSION};
use crate::episode::Episode;
use crate::llm::{prompts, strip_code_fence, ExtractedItem, ExtractionAction, ItemExtraction, LlmCallback};
use crate::memory::{MemoryUpdate, NewMemory};
use crate::store::MemoryStore;

/// Groups episodes by session id, preserving the order each session id
/// first appears in `episodes` — `fetchUnconsolidated` hands episodes in
/// timestamp order, so this is also temporal order. Deterministic grouping
/// resolves the open question in spec §9 about iteration order when a
/// single consolidation call spans more than one session boundary.
fn group_by_session(episodes: Vec<Episode>) -> Vec<(String, Vec<Episode>)> {
    let mut order = Vec::new();
    let mut groups: HashMap<String, Vec<Episode>> = HashMap::new();
    for episode in episodes {
        if !groups.contains_key(&episode.session_id) {
            order.push(episode.session_id.clone());
        }
        groups.entry(episode.session_id.clone()).or_default().push(episode);
    }
    order
        .into_iter()
        .map(|session_id| {
            let group = groups.remove(&session_id).expect("session id pushed to order was inserted into groups");
            (session_id, group)
        })
        .collect()
}

pub struct TaskMemory {
    store: Arc<MemoryStore>,
    /// Transient tracker of the last session id consolidation has seen —
    /// the component's only persistent-feeling state, and it lives only in
    /// process memory (spec §3 "Ownership").
    last_session: Mutex<Option<String>>,
    max_items_per_session: usize,
}

impl TaskMemory {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            last_session: Mutex::new(None),
            max_items_per_session: TASK_MAX_ITEMS_PER_SESSION,
        }
    }

    /// Calls `expireSession` on the previously-tracked session id when the
    /// current group's id differs from it (spec §4.5 step 2).
    fn note_session_boundary(&self, session_id: &str) {
        let mut last = self.last_session.lock().expect("task last_session mutex poisoned");
        if let Some(prev) = last.as_deref() {
            if prev != session_id {
                if let Err(error) = self.store.expire_session(prev, TASK_COMPONENT) {
                    tracing::warn!(%error, session_id = prev, "failed to expire previous task session");
                }
            }
        }
        *last = Some(session_id.to_string());
    }

    fn apply_item(
        &self,
        session_id: &str,
        episode_ids: &[String],
        item: ExtractedItem,
        report: &mut ConsolidationReport,
    ) {
        let action = item.action.unwrap_or(ExtractionAction::New);
        let existing = self
            .store
            .find_similar(&item.content, TASK_COMPONENT, Some(&item.category), Some(session_id), 5)
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
                    Err(error) => tracing::warn!(%error, "failed to merge task memory"),
                }
                return;
            }
        }

        self.insert_new(session_id, episode_ids, item, report);
    }

    fn insert_new(
        &self,
        session_id: &str,
        episode_ids: &[String],
        item: ExtractedItem,
        report: &mut ConsolidationReport,
    ) {
        let new_memory = NewMemory {
            content: item.content,
            component: TASK_COMPONENT.to_string(),
            category: item.category,
            importance: item.importance,
            session_id: Some(session_id.to_string()),
            source_episode_ids: episode_ids.to_vec(),
            entity_ids: Vec::new(),
            valid_at: None,
            invalid_at: None,
        };
        match self.store.insert(new_memory) {
            Ok(_) => report.items_created += 1,
            Err(error) => tracing::warn!(%error, "failed to insert task memory"),
        }
    }

    /// Evicts the lowest-importance active item in the session until the
    /// cap is satisfied (spec §4.5 step 9 "TaskMemory's maxItemsPerSession").
    fn enforce_cap(&self, session_id: &str) {
        loop {
            let count = match self.store.active_item_count(TASK_COMPONENT, Some(session_id)) {
                Ok(count) => count as usize,
                Err(error) => {
                    tracing::warn!(%error, "failed to count active task items");
                    return;
                }
            };
            if count <= self.max_items_per_session {
                return;
            }
            let mut items = match self.store.active_items_for_session(session_id, TASK_COMPONENT) {
                Ok(items) => items,
                Err(error) => {
                    tracing::warn!(%error, "failed to list active task items");
                    return;
                }
            };
            items.sort_by(|a, b| a.importance.partial_cmp(&b.importance).unwrap_or(Ordering::Equal));
            let Some(lowest) = items.first() else { return };
            if let Err(error) = self.store.expire_item(&lowest.id) {
                tracing::warn!(%error, "failed to expire lowest-importance task item");
                return;
            }
        }
    }
}

#[async_trait]
impl Component for TaskMemory {
    fn name(&self) -> &'static str {
        TASK_COMPONENT
    }

    async fn consolidate(&self, episodes: Vec<Episode>, llm: LlmCallback) -> ConsolidationReport {
        let mut report = ConsolidationReport::empty(TASK_COMPONENT);
        if episodes.is_empty() {
            return report;
        }
        report.episodes_consumed = episodes.len();

        for (session_id, group) in group_by_session(episodes) {
            self.note_session_boundary(&session_id);

            let episode_ids: Vec<String> = group.iter().map(|e| e.id.clone()).collect();
            let transcript = build_transcript(&group);

            let response = match llm(prompts::TASK_SYSTEM_PROMPT, &transcript).await {
                Ok(text) => text,
                Err(error) => {
                    tracing::warn!(%error, session_id = %session_id, "task extraction llm call failed");
                    continue;
                }
            };
            let parsed: ItemExtraction = match serde_json::from_str(strip_code_fence(&response)) {
                Ok(parsed) => parsed,
                Err(error) => {
                    tracing::warn!(%error, "task extraction response was not valid json; skipping batch");
                    continue;
                }
            };

            for item in parsed.items {
                self.apply_item(&session_id, &episode_ids, item, &mut report);
            }

            self.enforce_cap(&session_id);
        }

        report
    }
}
