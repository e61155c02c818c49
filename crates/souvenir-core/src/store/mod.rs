//! The unified persistent corpus: [`MemoryStore`] and [`EpisodeStore`] share
//! one SQLite connection so that the "store serializes all mutations"
//! guarantee of spec §5 holds regardless of how many components or how much
//! concurrency sits above it.

mod episode_store;
mod fts;
mod memory_store;
mod migrations;

pub use episode_store::EpisodeStore;
pub use memory_store::MemoryStore;
pub(crate) use fts::sanitize_fts_query;

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::error::{StoreError, StoreResult};

/// The store's single shared mutable resource (spec §5 "Shared-resource
/// policy"). A plain `Mutex` stands in for the source's actor/transaction
/// discipline — every operation below runs to completion while holding the
/// lock, so concurrent component writes interleave at operation granularity
/// only, never mid-statement.
pub(crate) type Db = Arc<Mutex<Connection>>;

fn configure_connection(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA temp_store = MEMORY;",
    )?;
    Ok(())
}

fn check_encryption(conn: &Connection, label: &str) -> StoreResult<()> {
    let cipher_version: rusqlite::Result<Option<String>> =
        conn.query_row("PRAGMA cipher_version", [], |row| row.get(0));
    match cipher_version {
        Ok(Some(_)) => Ok(()),
        _ => Err(StoreError::EncryptionRequired(label.to_string())),
    }
}

/// Opens (creating if absent) a file-backed store at `path`, applying
/// migrations under the given multi-agent `table_prefix`.
pub fn open_file(path: &Path, table_prefix: &str, require_encryption: bool) -> StoreResult<Db> {
    let conn = Connection::open(path)?;
    configure_connection(&conn)?;
    if require_encryption {
        check_encryption(&conn, &path.display().to_string())?;
    }
    migrations::apply_migrations(&conn, table_prefix)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Opens an ephemeral in-memory store (used by tests and by callers who
/// don't need persistence across process restarts).
pub fn open_in_memory(table_prefix: &str) -> StoreResult<Db> {
    let conn = Connection::open_in_memory()?;
    configure_connection(&conn)?;
    migrations::apply_migrations(&conn, table_prefix)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Builds the [`MemoryStore`] and [`EpisodeStore`] handles that share a
/// single underlying connection (spec §6 "Persisted state": one SQLite file
/// backs both). `embedding_dimensions` seeds the store's expected embedding
/// length (`SouvenirConfig::embedding_dimensions`); `None` leaves it to be
/// learned from the first embedding written.
pub fn stores_from(db: Db, table_prefix: &str, embedding_dimensions: Option<usize>) -> (MemoryStore, EpisodeStore) {
    (
        MemoryStore::new(db.clone(), table_prefix.to_string(), embedding_dimensions),
        EpisodeStore::new(db, table_prefix.to_string()),
    )
}

pub(crate) fn pack_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub(crate) fn unpack_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_roundtrips_through_blob() {
        let vector = vec![0.1_f32, -0.5, 1.0, 3.25];
        let packed = pack_embedding(&vector);
        let unpacked = unpack_embedding(&packed);
        assert_eq!(vector, unpacked);
    }
}
