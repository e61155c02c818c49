//! StoredMemory, Entity, and Relationship — the unit of knowledge the engine
//! indexes and serves, and the graph annotations that sit alongside it
//! (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed lifecycle-state variant a [`StoredMemory`] moves through.
///
/// Implemented as a plain enumeration rather than a class hierarchy — see
/// DESIGN.md "Polymorphic memory variants".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    Active,
    Expired,
    Superseded,
    Decayed,
}

impl MemoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryStatus::Active => "active",
            MemoryStatus::Expired => "expired",
            MemoryStatus::Superseded => "superseded",
            MemoryStatus::Decayed => "decayed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "active" => MemoryStatus::Active,
            "expired" => MemoryStatus::Expired,
            "superseded" => MemoryStatus::Superseded,
            "decayed" => MemoryStatus::Decayed,
            _ => return None,
        })
    }
}

impl std::fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A curated, standalone unit of knowledge produced by a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoredMemory {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: Option<DateTime<Utc>>,
    pub access_count: i64,

    pub content: String,

    /// Which component produced this memory (`"task"`, `"durable"`,
    /// `"environmental"`, or a future component's own tag).
    pub component: String,
    /// Component-defined free-form category (e.g. `"goal"`, `"fact"`).
    pub category: String,

    pub importance: f64,

    /// Non-null for session-scoped memories; null for cross-session ones.
    /// Immutable once set (spec §3 "Invariants").
    pub session_id: Option<String>,

    pub source_episode_ids: Vec<String>,
    pub entity_ids: Vec<String>,

    /// Absent until backfilled by the coordinator's post-consolidation pass.
    pub embedding: Option<Vec<f32>>,

    pub status: MemoryStatus,
    pub superseded_by: Option<String>,
    pub valid_at: Option<DateTime<Utc>>,
    pub invalid_at: Option<DateTime<Utc>>,
}

impl StoredMemory {
    /// Eligibility for recall per spec §3: active status and within its
    /// temporal validity window as of `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == MemoryStatus::Active
            && self.valid_at.is_none_or(|v| v <= now)
            && self.invalid_at.is_none_or(|v| v > now)
    }

    /// Most recent activity timestamp, used by importance decay (spec
    /// §4.1 `applyImportanceDecay`).
    pub fn last_activity(&self) -> DateTime<Utc> {
        match self.last_accessed {
            Some(accessed) if accessed > self.updated_at => accessed,
            _ => self.updated_at,
        }
    }
}

/// Fields a component may set when updating an existing memory. Every field
/// is optional; only `Some` values are applied. `updated_at` is always
/// bumped by the store regardless of which fields are set.
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    pub content: Option<String>,
    pub importance: Option<f64>,
    pub entity_ids: Option<Vec<String>>,
    pub source_episode_ids: Option<Vec<String>>,
    pub embedding: Option<Option<Vec<f32>>>,
    pub status: Option<MemoryStatus>,
    pub superseded_by: Option<Option<String>>,
    pub valid_at: Option<Option<DateTime<Utc>>>,
    pub invalid_at: Option<Option<DateTime<Utc>>>,
}

/// A draft memory handed to [`crate::store::MemoryStore::insert`] by a
/// component; the store fills in `id`/`created_at`/`updated_at`/etc.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: String,
    pub component: String,
    pub category: String,
    pub importance: f64,
    pub session_id: Option<String>,
    pub source_episode_ids: Vec<String>,
    pub entity_ids: Vec<String>,
    pub valid_at: Option<DateTime<Utc>>,
    pub invalid_at: Option<DateTime<Utc>>,
}

impl NewMemory {
    pub fn into_stored(self, now: DateTime<Utc>) -> StoredMemory {
        StoredMemory {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            last_accessed: None,
            access_count: 0,
            content: self.content,
            component: self.component,
            category: self.category,
            importance: self.importance,
            session_id: self.session_id,
            source_episode_ids: self.source_episode_ids,
            entity_ids: self.entity_ids,
            embedding: None,
            status: MemoryStatus::Active,
            superseded_by: None,
            valid_at: self.valid_at,
            invalid_at: self.invalid_at,
        }
    }
}

/// A named node in the knowledge graph. Upsert is by name (case-insensitive).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub entity_type: String,
}

/// A directed, typed edge between two entities. Composite primary key is
/// `(from_entity_id, to_entity_id, relation)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Relationship {
    pub from_entity_id: String,
    pub to_entity_id: String,
    pub relation: String,
    pub confidence: f64,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate counts returned by [`crate::store::MemoryStore::stats`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub by_status: std::collections::BTreeMap<String, i64>,
    pub by_component: std::collections::BTreeMap<String, i64>,
    pub entity_count: i64,
    pub relationship_count: i64,
}
