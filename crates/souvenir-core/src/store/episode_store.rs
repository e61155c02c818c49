//! Append-only persistence for raw episodes (spec §4.2).
//!
//! Episodes are immutable once inserted except for flipping `consolidated`
//! from `false` to `true` — this module never writes `consolidated = 0` over
//! an existing row, and never deletes an unconsolidated episode regardless
//! of age.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::Db;
use crate::episode::{Episode, EpisodeType};
use crate::error::{StoreError, StoreResult};

pub struct EpisodeStore {
    db: Db,
    table_prefix: String,
}

impl EpisodeStore {
    pub(crate) fn new(db: Db, table_prefix: String) -> Self {
        Self { db, table_prefix }
    }

    fn t(&self, name: &str) -> String {
        format!("{}{name}", self.table_prefix)
    }

    fn row_to_episode(row: &Row<'_>) -> rusqlite::Result<Episode> {
        let episode_type: String = row.get("episode_type")?;
        Ok(Episode {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            timestamp: row.get("timestamp")?,
            episode_type: EpisodeType::parse(&episode_type).unwrap_or(EpisodeType::Observation),
            content: row.get("content")?,
            importance: row.get("importance")?,
            access_count: row.get("access_count")?,
            last_accessed: row.get("last_accessed")?,
            consolidated: row.get::<_, i64>("consolidated")? != 0,
        })
    }

    /// Idempotent on an empty batch.
    pub fn insert(&self, batch: &[Episode]) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let conn = self.db.lock().expect("store mutex poisoned");
        let sql = format!(
            "INSERT INTO {} (id, session_id, timestamp, episode_type, content, importance,
                access_count, last_accessed, consolidated)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            self.t("episodes")
        );
        let mut stmt = conn.prepare(&sql)?;
        for episode in batch {
            stmt.execute(params![
                episode.id,
                episode.session_id,
                episode.timestamp,
                episode.episode_type.as_str(),
                episode.content,
                episode.importance,
                episode.access_count,
                episode.last_accessed,
                episode.consolidated as i64,
            ])?;
        }
        Ok(())
    }

    /// Ordered by timestamp.
    pub fn fetch_unconsolidated(&self) -> StoreResult<Vec<Episode>> {
        let conn = self.db.lock().expect("store mutex poisoned");
        let sql = format!(
            "SELECT * FROM {} WHERE consolidated = 0 ORDER BY timestamp ASC",
            self.t("episodes")
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::row_to_episode)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    pub fn mark_consolidated(&self, batch: &[Episode]) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let conn = self.db.lock().expect("store mutex poisoned");
        let sql = format!("UPDATE {} SET consolidated = 1 WHERE id = ?1", self.t("episodes"));
        let mut stmt = conn.prepare(&sql)?;
        for episode in batch {
            stmt.execute(params![episode.id])?;
        }
        Ok(())
    }

    pub fn delete_consolidated_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.db.lock().expect("store mutex poisoned");
        let n = conn.execute(
            &format!(
                "DELETE FROM {} WHERE consolidated = 1 AND timestamp < ?1",
                self.t("episodes")
            ),
            params![cutoff],
        )?;
        Ok(n)
    }
}
