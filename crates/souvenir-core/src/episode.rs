//! Episodes — immutable raw events recorded by the caller (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The caller-assigned category of an episode, with a type-specific default
/// importance used when the caller does not supply one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeType {
    Conversation,
    Observation,
    ToolResult,
    Error,
    Decision,
    UserDirective,
}

impl EpisodeType {
    /// Type-specific default importance (spec §3).
    pub fn default_importance(self) -> f64 {
        match self {
            EpisodeType::UserDirective => 0.95,
            EpisodeType::ToolResult | EpisodeType::Error => 0.80,
            EpisodeType::Decision => 0.75,
            EpisodeType::Conversation => 0.40,
            EpisodeType::Observation => 0.30,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EpisodeType::Conversation => "conversation",
            EpisodeType::Observation => "observation",
            EpisodeType::ToolResult => "tool_result",
            EpisodeType::Error => "error",
            EpisodeType::Decision => "decision",
            EpisodeType::UserDirective => "user_directive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "conversation" => EpisodeType::Conversation,
            "observation" => EpisodeType::Observation,
            "tool_result" => EpisodeType::ToolResult,
            "error" => EpisodeType::Error,
            "decision" => EpisodeType::Decision,
            "user_directive" => EpisodeType::UserDirective,
            _ => return None,
        })
    }
}

impl std::fmt::Display for EpisodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Caller-provided fields when recording a new episode. The engine fills in
/// `id`, `timestamp`, `access_count`, and `consolidated`.
#[derive(Debug, Clone)]
pub struct NewEpisode {
    pub session_id: String,
    pub episode_type: EpisodeType,
    pub content: String,
    /// Overrides `episode_type.default_importance()` when present.
    pub importance: Option<f64>,
}

/// An immutable raw event recorded by the hosting agent loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Episode {
    pub id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub episode_type: EpisodeType,
    pub content: String,
    pub importance: f64,
    pub access_count: i64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub consolidated: bool,
}

impl Episode {
    pub fn from_new(new: NewEpisode, now: DateTime<Utc>) -> Self {
        let importance = new
            .importance
            .unwrap_or_else(|| new.episode_type.default_importance());
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: new.session_id,
            timestamp: now,
            episode_type: new.episode_type,
            content: new.content,
            importance,
            access_count: 0,
            last_accessed: None,
            consolidated: false,
        }
    }
}
