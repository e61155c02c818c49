//! The LLM callback contract (spec §6 "LLM callback contract") and the
//! per-component extraction schemas/prompts built on top of it.
//!
//! Per DESIGN NOTES "Callbacks": modeled as a plain function-typed field,
//! never a plugin-loading system. The engine never inspects which model or
//! provider sits behind it.

use std::pin::Pin;

use futures::future::Future;

/// `(system_prompt, user_transcript) -> response text`.
pub type LlmCallback =
    std::sync::Arc<dyn Fn(&str, &str) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send>> + Send + Sync>;

/// Strips a leading/trailing markdown code fence (```` ```json ... ``` ````
/// or plain ```` ``` ```` ) if present, then nothing else — callers still
/// hand the result to `serde_json::from_str`, which performs the actual
/// parse (spec §4.5 step 5 "strip markdown code fences if present;
/// JSON.decode").
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an optional language tag on the opening fence line (e.g. `json`).
    let after_open = after_open
        .find('\n')
        .map(|i| &after_open[i + 1..])
        .unwrap_or(after_open);
    after_open.strip_suffix("```").unwrap_or(after_open).trim()
}

/// `conflict`/`action` metadata the LLM attaches to each extracted item,
/// driving conflict resolution in spec §4.5 step 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionAction {
    New,
    Merge,
    Update,
    Contradiction,
    Duplicate,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExtractedFact {
    pub content: String,
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    pub importance: f64,
    #[serde(default)]
    pub conflict: Option<ExtractionAction>,
    /// Not part of the wire schema in spec §6 (which omits a durable
    /// category field entirely); added here so `DurableMemory` has
    /// somewhere to put one of {fact, preference, knowledge} per spec §3.
    /// Defaults to `"fact"` when the LLM omits it. See DESIGN.md.
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExtractedRelationship {
    pub from: String,
    pub to: String,
    pub relation: String,
    pub confidence: f64,
}

/// Durable's extraction schema (spec §6).
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct DurableExtraction {
    #[serde(default)]
    pub facts: Vec<ExtractedFact>,
    #[serde(default)]
    pub relationships: Vec<ExtractedRelationship>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExtractedItem {
    pub content: String,
    pub category: String,
    pub importance: f64,
    #[serde(default)]
    pub action: Option<ExtractionAction>,
}

/// Task/Environmental's extraction schema (spec §6).
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ItemExtraction {
    #[serde(default)]
    pub items: Vec<ExtractedItem>,
}

pub mod prompts {
    pub const TASK_SYSTEM_PROMPT: &str = r#"You track the working state of the current task: goals, decisions, \
results, and the context needed to resume later. Extract aggressively — \
err toward keeping detail rather than discarding it. For each item, set \
"category" to one of "goal", "decision", "result", "context" and "action" \
to "new" unless it clearly updates something already tracked in this \
session, in which case use "merge". Respond with a single JSON object: \
{"items": [{"content": "...", "category": "...", "importance": 0.0-1.0, "action": "new"|"merge"}]}"#;

    pub const DURABLE_SYSTEM_PROMPT: &str = r#"You maintain durable, cross-session knowledge about the user and the \
world: stable facts, preferences, and learned knowledge. Extract \
selectively — only facts that remain true beyond this conversation. Set \
"category" to one of "fact", "preference", "knowledge". Name every entity \
involved and its type. When a new fact conflicts with something already \
known, set "conflict" to "contradiction"; when it restates something \
already known, set it to "duplicate"; when it refines something already \
known, set it to "update"; otherwise omit it. Respond with a single JSON \
object: {"facts": [{"content": "...", "category": "...", "entities": \
[{"name": "...", "type": "..."}], "importance": 0.0-1.0, "conflict": \
null|"duplicate"|"update"|"contradiction"}], "relationships": [{"from": \
"...", "to": "...", "relation": "...", "confidence": 0.0-1.0}]}"#;

    pub const ENVIRONMENTAL_SYSTEM_PROMPT: &str = r#"You track the agent's operating environment: capabilities \
available, constraints in force, environment details, and recurring \
patterns. For each item, set "category" to one of "capability", \
"constraint", "environment", "pattern". Respond with a single JSON \
object: {"items": [{"content": "...", "category": "...", "importance": \
0.0-1.0, "action": "new"|"merge"}]}"#;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fenced_json() {
        let raw = "```json\n{\"items\": []}\n```";
        assert_eq!(strip_code_fence(raw), "{\"items\": []}");
    }

    #[test]
    fn passes_through_unfenced_json() {
        let raw = "{\"items\": []}";
        assert_eq!(strip_code_fence(raw), "{\"items\": []}");
    }

    #[test]
    fn parses_durable_schema() {
        let json = r#"{"facts":[{"content":"likes rust","category":"preference","entities":[{"name":"user","type":"person"}],"importance":0.8,"conflict":null}],"relationships":[{"from":"user","to":"rust","relation":"likes","confidence":0.9}]}"#;
        let parsed: DurableExtraction = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.facts.len(), 1);
        assert_eq!(parsed.facts[0].category.as_deref(), Some("preference"));
        assert_eq!(parsed.relationships.len(), 1);
    }
}
