//! Schema migrations
//!
//! One SQLite file backs `memories` / `memories_fts` / `entities` /
//! `relationships` / `episodes`, each optionally carrying a multi-agent table
//! prefix (spec §6 "Multi-agent isolation"). Table names are only known at
//! runtime (the prefix is a constructor argument), so migrations are built as
//! owned SQL strings rather than the `&'static str` constants a
//! single-tenant store could use.

use rusqlite::Connection;

use crate::error::StoreResult;

pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: String,
}

fn migrations(prefix: &str) -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "memories, entities, relationships, episodes + FTS5",
            up: format!(
                r#"
CREATE TABLE IF NOT EXISTS {p}memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    component TEXT NOT NULL,
    category TEXT NOT NULL,
    importance REAL NOT NULL DEFAULT 0.5,
    session_id TEXT,
    source_ids TEXT,
    entity_ids TEXT,
    embedding BLOB,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_accessed TEXT,
    access_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active',
    superseded_by TEXT,
    valid_at TEXT,
    invalid_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_{p}memories_component ON {p}memories(component);
CREATE INDEX IF NOT EXISTS idx_{p}memories_session ON {p}memories(session_id);
CREATE INDEX IF NOT EXISTS idx_{p}memories_status ON {p}memories(status);
CREATE INDEX IF NOT EXISTS idx_{p}memories_updated_at ON {p}memories(updated_at);

CREATE VIRTUAL TABLE IF NOT EXISTS {p}memories_fts USING fts5(
    id UNINDEXED,
    content,
    tokenize = 'porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS {p}memories_ai AFTER INSERT ON {p}memories BEGIN
    INSERT INTO {p}memories_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS {p}memories_ad AFTER DELETE ON {p}memories BEGIN
    INSERT INTO {p}memories_fts({p}memories_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
END;

CREATE TRIGGER IF NOT EXISTS {p}memories_au AFTER UPDATE ON {p}memories BEGIN
    INSERT INTO {p}memories_fts({p}memories_fts, rowid, id, content)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.content);
    INSERT INTO {p}memories_fts(rowid, id, content)
    VALUES (NEW.rowid, NEW.id, NEW.content);
END;

CREATE TABLE IF NOT EXISTS {p}entities (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    entity_type TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_{p}entities_name ON {p}entities(name COLLATE NOCASE);

CREATE TABLE IF NOT EXISTS {p}relationships (
    from_entity TEXT NOT NULL,
    to_entity TEXT NOT NULL,
    relation TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.5,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (from_entity, to_entity, relation)
);

CREATE INDEX IF NOT EXISTS idx_{p}relationships_from ON {p}relationships(from_entity);
CREATE INDEX IF NOT EXISTS idx_{p}relationships_to ON {p}relationships(to_entity);

CREATE TABLE IF NOT EXISTS {p}episodes (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    episode_type TEXT NOT NULL,
    content TEXT NOT NULL,
    importance REAL NOT NULL,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT,
    consolidated INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_{p}episodes_consolidated ON {p}episodes(consolidated);
CREATE INDEX IF NOT EXISTS idx_{p}episodes_timestamp ON {p}episodes(timestamp);

CREATE TABLE IF NOT EXISTS {p}schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#,
                p = prefix
            ),
        },
    ]
}

pub fn apply_migrations(conn: &Connection, prefix: &str) -> StoreResult<()> {
    let version_table = format!("{prefix}schema_version");
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [&version_table],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count > 0)
        .unwrap_or(false);

    let current_version: u32 = if table_exists {
        conn.query_row(
            &format!("SELECT COALESCE(MAX(version), 0) FROM {version_table}"),
            [],
            |row| row.get(0),
        )?
    } else {
        0
    };

    for migration in migrations(prefix) {
        if migration.version <= current_version {
            continue;
        }
        conn.execute_batch(&migration.up)?;
        conn.execute(
            &format!("INSERT INTO {version_table} (version, applied_at) VALUES (?1, ?2)"),
            rusqlite::params![migration.version, chrono::Utc::now().to_rfc3339()],
        )?;
        tracing::info!(version = migration.version, desc = migration.description, "applied migration");
    }

    Ok(())
}
