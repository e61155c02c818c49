//! The unified persistent corpus (spec §4.1).
//!
//! All selection of "active" memories enforces
//! `status = active AND (invalid_at IS NULL OR invalid_at > now)` as a single
//! inseparable predicate — every query in this file that means "currently
//! recallable" repeats that exact WHERE clause rather than filtering in two
//! passes, so there is no window where a half-filtered result could be
//! observed.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::{pack_embedding, unpack_embedding, sanitize_fts_query, Db};
use crate::error::{StoreError, StoreResult};
use crate::memory::{Entity, MemoryStatus, MemoryUpdate, NewMemory, Relationship, StoreStats, StoredMemory};

const ACTIVE_PREDICATE: &str = "status = 'active' AND (invalid_at IS NULL OR invalid_at > ?1)";

/// The unified memory store: active memories, the entity graph, the FTS
/// index, and the vector BLOBs backing them.
pub struct MemoryStore {
    db: Db,
    table_prefix: String,
    /// Dimensionality of the first embedding ever written to this store
    /// instance; `0` means none has been written yet. Every later embedding
    /// write is checked against it — mixing embedding providers within one
    /// store's lifetime is a configuration error (spec §3 "Invariants",
    /// §7 `StoreInvariantViolation`), not an absorbed `EmbeddingError`.
    embedding_dims: AtomicUsize,
}

impl MemoryStore {
    /// `embedding_dimensions` pins the store's expected embedding length up
    /// front (`SouvenirConfig::embedding_dimensions`) instead of waiting for
    /// the first embedding write to set it — lets a caller fail fast on a
    /// misconfigured provider rather than after the first successful write.
    pub(crate) fn new(db: Db, table_prefix: String, embedding_dimensions: Option<usize>) -> Self {
        Self {
            db,
            table_prefix,
            embedding_dims: AtomicUsize::new(embedding_dimensions.unwrap_or(0)),
        }
    }

    /// Checks `vector`'s length against the dimensionality recorded for this
    /// store, recording it if this is the first embedding seen.
    fn check_embedding_dims(&self, vector: &[f32]) -> StoreResult<()> {
        let got = vector.len();
        match self.embedding_dims.compare_exchange(0, got, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => Ok(()),
            Err(expected) if expected == got => Ok(()),
            Err(expected) => Err(StoreError::DimensionMismatch { expected, got }),
        }
    }

    fn t(&self, name: &str) -> String {
        format!("{}{name}", self.table_prefix)
    }

    fn row_to_memory(row: &Row<'_>) -> rusqlite::Result<StoredMemory> {
        let source_ids: Option<String> = row.get("source_ids")?;
        let entity_ids: Option<String> = row.get("entity_ids")?;
        let embedding: Option<Vec<u8>> = row.get("embedding")?;
        let status: String = row.get("status")?;

        Ok(StoredMemory {
            id: row.get("id")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            last_accessed: row.get("last_accessed")?,
            access_count: row.get("access_count")?,
            content: row.get("content")?,
            component: row.get("component")?,
            category: row.get("category")?,
            importance: row.get("importance")?,
            session_id: row.get("session_id")?,
            source_episode_ids: source_ids
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            entity_ids: entity_ids
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            embedding: embedding.map(|b| unpack_embedding(&b)),
            status: MemoryStatus::parse(&status).unwrap_or(MemoryStatus::Active),
            superseded_by: row.get("superseded_by")?,
            valid_at: row.get("valid_at")?,
            invalid_at: row.get("invalid_at")?,
        })
    }

    // ----------------------------------------------------------------
    // Insert / update
    // ----------------------------------------------------------------

    pub fn insert(&self, memory: NewMemory) -> StoreResult<StoredMemory> {
        let now = Utc::now();
        let stored = memory.into_stored(now);
        if let Some(embedding) = &stored.embedding {
            self.check_embedding_dims(embedding)?;
        }
        let conn = self.db.lock().expect("store mutex poisoned");

        let existing: Option<i64> = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE id = ?1", self.t("memories")),
                [&stored.id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(StoreError::InvariantViolation(format!(
                "memory id collision: {}",
                stored.id
            )));
        }

        conn.execute(
            &format!(
                "INSERT INTO {} (id, content, component, category, importance, session_id,
                    source_ids, entity_ids, embedding, created_at, updated_at, last_accessed,
                    access_count, status, superseded_by, valid_at, invalid_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
                self.t("memories")
            ),
            params![
                stored.id,
                stored.content,
                stored.component,
                stored.category,
                stored.importance,
                stored.session_id,
                serde_json::to_string(&stored.source_episode_ids).ok(),
                serde_json::to_string(&stored.entity_ids).ok(),
                stored.embedding.as_deref().map(pack_embedding),
                stored.created_at,
                stored.updated_at,
                stored.last_accessed,
                stored.access_count,
                stored.status.as_str(),
                stored.superseded_by,
                stored.valid_at,
                stored.invalid_at,
            ],
        )?;

        Ok(stored)
    }

    pub fn update(&self, id: &str, update: MemoryUpdate) -> StoreResult<()> {
        if let Some(Some(embedding)) = &update.embedding {
            self.check_embedding_dims(embedding)?;
        }
        let now = Utc::now();
        let conn = self.db.lock().expect("store mutex poisoned");

        let mut sets: Vec<String> = vec!["updated_at = ?1".to_string()];
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now)];

        macro_rules! push {
            ($col:literal, $val:expr) => {{
                sets.push(format!("{} = ?{}", $col, values.len() + 1));
                values.push(Box::new($val));
            }};
        }

        if let Some(content) = update.content {
            push!("content", content);
        }
        if let Some(importance) = update.importance {
            push!("importance", importance);
        }
        if let Some(entity_ids) = update.entity_ids {
            push!("entity_ids", serde_json::to_string(&entity_ids).unwrap_or_default());
        }
        if let Some(source_episode_ids) = update.source_episode_ids {
            push!(
                "source_ids",
                serde_json::to_string(&source_episode_ids).unwrap_or_default()
            );
        }
        if let Some(embedding) = update.embedding {
            push!("embedding", embedding.as_deref().map(pack_embedding));
        }
        if let Some(status) = update.status {
            push!("status", status.as_str().to_string());
        }
        if let Some(superseded_by) = update.superseded_by {
            push!("superseded_by", superseded_by);
        }
        if let Some(valid_at) = update.valid_at {
            push!("valid_at", valid_at);
        }
        if let Some(invalid_at) = update.invalid_at {
            push!("invalid_at", invalid_at);
        }

        let id_placeholder = values.len() + 1;
        values.push(Box::new(id.to_string()));

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            self.t("memories"),
            sets.join(", "),
            id_placeholder
        );
        let params_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        conn.execute(&sql, params_refs.as_slice())?;
        Ok(())
    }

    // ----------------------------------------------------------------
    // Search signals
    // ----------------------------------------------------------------

    /// Candidates in the same component (optionally category/session),
    /// ranked by textual similarity — used exclusively for merge detection
    /// during consolidation (spec §4.1 `findSimilar`).
    pub fn find_similar(
        &self,
        content: &str,
        component: &str,
        category: Option<&str>,
        session_id: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<StoredMemory>> {
        let Some(fts_query) = sanitize_fts_query(content) else {
            return Ok(Vec::new());
        };
        let now = Utc::now();
        let conn = self.db.lock().expect("store mutex poisoned");

        let mut sql = format!(
            "SELECT m.* FROM {memories} m
             JOIN {fts} f ON f.id = m.id
             WHERE m.{active} AND m.component = ?2 AND f.{fts} MATCH ?3",
            memories = self.t("memories"),
            fts = self.t("memories_fts"),
            active = ACTIVE_PREDICATE,
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(now), Box::new(component.to_string()), Box::new(fts_query)];

        if let Some(category) = category {
            sql.push_str(&format!(" AND m.category = ?{}", args.len() + 1));
            args.push(Box::new(category.to_string()));
        }
        if let Some(session_id) = session_id {
            sql.push_str(&format!(" AND m.session_id = ?{}", args.len() + 1));
            args.push(Box::new(session_id.to_string()));
        }
        sql.push_str(&format!(" ORDER BY bm25(f.{}) LIMIT ?{}", self.t("memories_fts"), args.len() + 1));
        args.push(Box::new(limit as i64));

        let mut stmt = conn.prepare(&sql)?;
        let args_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|v| v.as_ref()).collect();
        let rows = stmt.query_map(args_refs.as_slice(), Self::row_to_memory)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    /// `(memory, bm25_score)` across all components, higher-is-better (the
    /// store negates SQLite's native "more negative = better" BM25) — spec
    /// §4.1 "BM25 score normalization". Normalization into `[0,1]` happens
    /// in [`crate::recall::UnifiedRecall`], not here.
    pub fn search_fts(&self, query: &str, limit: usize) -> StoreResult<Vec<(StoredMemory, f64)>> {
        let Some(fts_query) = sanitize_fts_query(query) else {
            return Ok(Vec::new());
        };
        let now = Utc::now();
        let conn = self.db.lock().expect("store mutex poisoned");

        let sql = format!(
            "SELECT m.*, bm25(f.{fts}) AS raw_score FROM {memories} m
             JOIN {fts} f ON f.id = m.id
             WHERE m.{active} AND f.{fts} MATCH ?2
             ORDER BY raw_score LIMIT ?3",
            memories = self.t("memories"),
            fts = self.t("memories_fts"),
            active = ACTIVE_PREDICATE,
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![now, fts_query, limit as i64], |row| {
            let memory = Self::row_to_memory(row)?;
            let raw_score: f64 = row.get("raw_score")?;
            Ok((memory, -raw_score))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    pub fn load_active_with_embeddings(&self) -> StoreResult<Vec<StoredMemory>> {
        let now = Utc::now();
        let conn = self.db.lock().expect("store mutex poisoned");
        let sql = format!(
            "SELECT * FROM {} WHERE {} AND embedding IS NOT NULL",
            self.t("memories"),
            ACTIVE_PREDICATE
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([now], Self::row_to_memory)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    pub fn find_unembedded_memories(&self, limit: usize) -> StoreResult<Vec<StoredMemory>> {
        let now = Utc::now();
        let conn = self.db.lock().expect("store mutex poisoned");
        let sql = format!(
            "SELECT * FROM {} WHERE {} AND embedding IS NULL LIMIT ?2",
            self.t("memories"),
            ACTIVE_PREDICATE
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![now, limit as i64], Self::row_to_memory)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    // ----------------------------------------------------------------
    // Entity graph
    // ----------------------------------------------------------------

    pub fn upsert_entity(&self, name: &str, entity_type: &str) -> StoreResult<Entity> {
        let conn = self.db.lock().expect("store mutex poisoned");
        let existing: Option<String> = conn
            .query_row(
                &format!(
                    "SELECT id FROM {} WHERE name = ?1 COLLATE NOCASE",
                    self.t("entities")
                ),
                [name],
                |row| row.get(0),
            )
            .optional()?;

        let id = if let Some(id) = existing {
            conn.execute(
                &format!("UPDATE {} SET entity_type = ?1 WHERE id = ?2", self.t("entities")),
                params![entity_type, id],
            )?;
            id
        } else {
            let id = Uuid::new_v4().to_string();
            conn.execute(
                &format!(
                    "INSERT INTO {} (id, name, entity_type) VALUES (?1, ?2, ?3)",
                    self.t("entities")
                ),
                params![id, name, entity_type],
            )?;
            id
        };

        Ok(Entity {
            id,
            name: name.to_string(),
            entity_type: entity_type.to_string(),
        })
    }

    pub fn upsert_relationship(&self, rel: &Relationship) -> StoreResult<()> {
        let conn = self.db.lock().expect("store mutex poisoned");
        conn.execute(
            &format!(
                "INSERT INTO {t} (from_entity, to_entity, relation, confidence, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(from_entity, to_entity, relation)
                 DO UPDATE SET confidence = excluded.confidence, updated_at = excluded.updated_at",
                t = self.t("relationships")
            ),
            params![
                rel.from_entity_id,
                rel.to_entity_id,
                rel.relation,
                rel.confidence,
                rel.updated_at
            ],
        )?;
        Ok(())
    }

    /// Case-insensitive; splits `query` into tokens of length > 2 and
    /// returns entities whose name contains any token (spec §4.1).
    pub fn find_entities_by_name(&self, query: &str) -> StoreResult<Vec<Entity>> {
        let tokens: Vec<String> = query
            .split_whitespace()
            .filter(|t| t.len() > 2)
            .map(|t| t.to_lowercase())
            .collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.db.lock().expect("store mutex poisoned");
        let clause = tokens
            .iter()
            .enumerate()
            .map(|(i, _)| format!("LOWER(name) LIKE ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!(
            "SELECT id, name, entity_type FROM {} WHERE {}",
            self.t("entities"),
            clause
        );
        let patterns: Vec<String> = tokens.iter().map(|t| format!("%{t}%")).collect();
        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            patterns.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            Ok(Entity {
                id: row.get(0)?,
                name: row.get(1)?,
                entity_type: row.get(2)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    pub fn find_relationships_for_entity(&self, id: &str) -> StoreResult<Vec<Relationship>> {
        let conn = self.db.lock().expect("store mutex poisoned");
        let sql = format!(
            "SELECT from_entity, to_entity, relation, confidence, updated_at FROM {}
             WHERE from_entity = ?1 OR to_entity = ?1",
            self.t("relationships")
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([id], |row| {
            Ok(Relationship {
                from_entity_id: row.get(0)?,
                to_entity_id: row.get(1)?,
                relation: row.get(2)?,
                confidence: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    pub fn find_memories_by_entity_ids(&self, ids: &[String]) -> StoreResult<Vec<StoredMemory>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let conn = self.db.lock().expect("store mutex poisoned");
        let sql = format!(
            "SELECT * FROM {} WHERE {}",
            self.t("memories"),
            ACTIVE_PREDICATE
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([now], Self::row_to_memory)?;
        let all = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(all
            .into_iter()
            .filter(|m| m.entity_ids.iter().any(|e| ids.contains(e)))
            .collect())
    }

    // ----------------------------------------------------------------
    // Lifecycle
    // ----------------------------------------------------------------

    pub fn update_access_stats(&self, ids: &[String]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        let conn = self.db.lock().expect("store mutex poisoned");
        let sql = format!(
            "UPDATE {} SET access_count = access_count + 1, last_accessed = ?1 WHERE id = ?2",
            self.t("memories")
        );
        let mut stmt = conn.prepare(&sql)?;
        for id in ids {
            stmt.execute(params![now, id])?;
        }
        Ok(())
    }

    /// Multiplies importance by `decay_rate` for active memories in
    /// `component` whose last activity predates `now - inactive_period`; if
    /// `floor` is set and the new importance falls below it, transitions the
    /// memory to `decayed`. Returns the count that crossed the floor (spec
    /// §4.1 `applyImportanceDecay`).
    pub fn apply_importance_decay(
        &self,
        component: &str,
        inactive_period: Duration,
        decay_rate: f64,
        floor: Option<f64>,
    ) -> StoreResult<usize> {
        let now = Utc::now();
        let cutoff = now - inactive_period;
        let conn = self.db.lock().expect("store mutex poisoned");

        let sql = format!(
            "SELECT * FROM {} WHERE {} AND component = ?2",
            self.t("memories"),
            ACTIVE_PREDICATE
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![now, component], Self::row_to_memory)?;
        let candidates = rows
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            // Last activity is `max(last_accessed, updated_at)` (spec §4.1),
            // not `COALESCE` — a recent `updated_at` with a stale
            // `last_accessed` must count as recently active.
            .filter(|memory| memory.last_activity() < cutoff);

        let mut crossed = 0usize;
        for memory in candidates {
            let new_importance = memory.importance * decay_rate;
            if let Some(floor) = floor {
                if new_importance < floor {
                    conn.execute(
                        &format!(
                            "UPDATE {} SET importance = ?1, status = 'decayed', updated_at = ?2 WHERE id = ?3",
                            self.t("memories")
                        ),
                        params![new_importance, now, memory.id],
                    )?;
                    crossed += 1;
                    continue;
                }
            }
            conn.execute(
                &format!(
                    "UPDATE {} SET importance = ?1, updated_at = ?2 WHERE id = ?3",
                    self.t("memories")
                ),
                params![new_importance, now, memory.id],
            )?;
        }
        Ok(crossed)
    }

    pub fn expire_session(&self, session_id: &str, component: &str) -> StoreResult<usize> {
        let now = Utc::now();
        let conn = self.db.lock().expect("store mutex poisoned");
        let sql = format!(
            "UPDATE {} SET status = 'expired', invalid_at = ?1, updated_at = ?1
             WHERE {} AND session_id = ?2 AND component = ?3",
            self.t("memories"),
            ACTIVE_PREDICATE
        );
        let n = conn.execute(&sql, params![now, session_id, component])?;
        Ok(n)
    }

    pub fn expire_item(&self, id: &str) -> StoreResult<()> {
        let now = Utc::now();
        let conn = self.db.lock().expect("store mutex poisoned");
        conn.execute(
            &format!(
                "UPDATE {} SET status = 'expired', invalid_at = ?1, updated_at = ?1 WHERE id = ?2",
                self.t("memories")
            ),
            params![now, id],
        )?;
        Ok(())
    }

    /// Transitions `old_id` to `superseded` and records the link to
    /// `new_id`. Fails silently (no-op) if `old_id` does not exist (spec
    /// §4.1 `supersede`).
    pub fn supersede(&self, old_id: &str, new_id: &str) -> StoreResult<()> {
        let now = Utc::now();
        let conn = self.db.lock().expect("store mutex poisoned");
        conn.execute(
            &format!(
                "UPDATE {} SET status = 'superseded', superseded_by = ?1, invalid_at = ?2, updated_at = ?2
                 WHERE id = ?3",
                self.t("memories")
            ),
            params![new_id, now, old_id],
        )?;
        Ok(())
    }

    pub fn active_item_count(&self, component: &str, session_id: Option<&str>) -> StoreResult<i64> {
        let now = Utc::now();
        let conn = self.db.lock().expect("store mutex poisoned");
        let mut sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} AND component = ?2",
            self.t("memories"),
            ACTIVE_PREDICATE
        );
        if session_id.is_some() {
            sql.push_str(" AND session_id = ?3");
        }
        let count: i64 = if let Some(session_id) = session_id {
            conn.query_row(&sql, params![now, component, session_id], |row| row.get(0))?
        } else {
            conn.query_row(&sql, params![now, component], |row| row.get(0))?
        };
        Ok(count)
    }

    pub fn active_items_for_session(
        &self,
        session_id: &str,
        component: &str,
    ) -> StoreResult<Vec<StoredMemory>> {
        let now = Utc::now();
        let conn = self.db.lock().expect("store mutex poisoned");
        let sql = format!(
            "SELECT * FROM {} WHERE {} AND session_id = ?2 AND component = ?3",
            self.t("memories"),
            ACTIVE_PREDICATE
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![now, session_id, component], Self::row_to_memory)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(StoreError::from)
    }

    // ----------------------------------------------------------------
    // Compaction helpers
    // ----------------------------------------------------------------

    pub fn delete_tombstoned(&self, status: MemoryStatus, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.db.lock().expect("store mutex poisoned");
        let n = conn.execute(
            &format!(
                "DELETE FROM {} WHERE status = ?1 AND updated_at < ?2",
                self.t("memories")
            ),
            params![status.as_str(), cutoff],
        )?;
        Ok(n)
    }

    pub fn delete_orphaned_entities(&self) -> StoreResult<usize> {
        let conn = self.db.lock().expect("store mutex poisoned");
        let sql = format!(
            "DELETE FROM {entities} WHERE id NOT IN (
                SELECT value FROM {memories}, json_each({memories}.entity_ids)
                WHERE {memories}.status = 'active' AND {memories}.entity_ids IS NOT NULL
            ) AND id NOT IN (
                SELECT from_entity FROM {relationships}
                UNION
                SELECT to_entity FROM {relationships}
            )",
            entities = self.t("entities"),
            memories = self.t("memories"),
            relationships = self.t("relationships"),
        );
        let n = conn.execute(&sql, [])?;
        Ok(n)
    }

    pub fn delete_orphaned_relationships(&self) -> StoreResult<usize> {
        let conn = self.db.lock().expect("store mutex poisoned");
        let sql = format!(
            "DELETE FROM {relationships} WHERE from_entity NOT IN (SELECT id FROM {entities})
                OR to_entity NOT IN (SELECT id FROM {entities})",
            relationships = self.t("relationships"),
            entities = self.t("entities"),
        );
        let n = conn.execute(&sql, [])?;
        Ok(n)
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let conn = self.db.lock().expect("store mutex poisoned");
        let mut stats = StoreStats::default();

        let mut stmt = conn.prepare(&format!(
            "SELECT status, COUNT(*) FROM {} GROUP BY status",
            self.t("memories")
        ))?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (status, count) = row?;
            stats.by_status.insert(status, count);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT component, COUNT(*) FROM {} WHERE status = 'active' GROUP BY component",
            self.t("memories")
        ))?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (component, count) = row?;
            stats.by_component.insert(component, count);
        }

        stats.entity_count = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.t("entities")),
            [],
            |row| row.get(0),
        )?;
        stats.relationship_count = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.t("relationships")),
            [],
            |row| row.get(0),
        )?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryUpdate;

    fn new_store() -> MemoryStore {
        let db = crate::store::open_in_memory("").expect("open in-memory store");
        MemoryStore::new(db, String::new(), None)
    }

    fn sample_memory(content: &str) -> NewMemory {
        NewMemory {
            content: content.to_string(),
            component: "durable".to_string(),
            category: "fact".to_string(),
            importance: 0.5,
            session_id: None,
            source_episode_ids: Vec::new(),
            entity_ids: Vec::new(),
            valid_at: None,
            invalid_at: None,
        }
    }

    #[test]
    fn insert_assigns_distinct_ids() {
        let store = new_store();
        let first = store.insert(sample_memory("a")).unwrap();
        let second = store.insert(sample_memory("b")).unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn first_embedding_sets_dimensionality_then_enforces_it() {
        let store = new_store();
        let memory = store.insert(sample_memory("likes rust")).unwrap();

        store
            .update(&memory.id, MemoryUpdate { embedding: Some(Some(vec![0.1, 0.2, 0.3])), ..Default::default() })
            .expect("first embedding write sets dimensionality");

        let other = store.insert(sample_memory("likes dart")).unwrap();
        let result = store.update(
            &other.id,
            MemoryUpdate { embedding: Some(Some(vec![0.1, 0.2])), ..Default::default() },
        );
        assert!(matches!(result, Err(StoreError::DimensionMismatch { expected: 3, got: 2 })));
    }

    #[test]
    fn pinned_dimensionality_rejects_first_write() {
        let db = crate::store::open_in_memory("").expect("open in-memory store");
        let store = MemoryStore::new(db, String::new(), Some(3));
        let memory = store.insert(sample_memory("likes rust")).unwrap();

        let result = store.update(
            &memory.id,
            MemoryUpdate { embedding: Some(Some(vec![0.1, 0.2])), ..Default::default() },
        );
        assert!(matches!(result, Err(StoreError::DimensionMismatch { expected: 3, got: 2 })));
    }

    #[test]
    fn active_predicate_excludes_expired_memories() {
        let store = new_store();
        let memory = store.insert(sample_memory("temp fact")).unwrap();
        store.expire_item(&memory.id).unwrap();
        let results = store.search_fts("temp", 10).unwrap();
        assert!(results.is_empty());
    }
}
