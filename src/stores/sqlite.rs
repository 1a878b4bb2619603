//! SQLite-backed vector store using the `sqlite-vec` extension.
//!
//! The index is a single SQLite file addressed by path: safely reopenable
//! across process restarts, single-writer. Vectors live in a sibling table
//! keyed by record id and are compared with `vec_distance_cosine`.

use std::collections::BTreeMap;
use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use tokio_rusqlite::{Connection, OptionalExtension, ffi};
use tracing::{debug, info};

use super::{IndexStats, SearchResult, VectorRecord, VectorStore, reconcile_dimension};
use crate::types::{MAX_DIMENSION, RagError};

/// Vector store persisting records and embeddings in SQLite.
///
/// Cloning is cheap; clones share the same underlying connection. Writes are
/// committed once per `upsert` batch inside a single transaction, so there
/// is no per-record durability and no multi-batch atomicity.
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Connection,
    dimension: usize,
    location: String,
}

impl SqliteVectorStore {
    /// Opens (or creates) the index at `path` with the given dimension.
    ///
    /// Fails with [`RagError::DimensionTooLarge`] above the hard cap, and
    /// with a storage error when reopening an index that was created with a
    /// different dimension.
    pub async fn open(path: impl AsRef<Path>, dimension: usize) -> Result<Self, RagError> {
        if dimension > MAX_DIMENSION {
            return Err(RagError::DimensionTooLarge {
                requested: dimension,
            });
        }

        Self::register_sqlite_vec()?;
        let location = path.as_ref().display().to_string();
        let conn = Connection::open(path)
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;

        let existing: Option<String> = conn
            .call(|conn| {
                // Confirms the extension actually loaded into this connection.
                conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS records (
                         id       TEXT PRIMARY KEY,
                         text     TEXT NOT NULL,
                         metadata TEXT NOT NULL
                     );
                     CREATE TABLE IF NOT EXISTS embeddings (
                         id        TEXT PRIMARY KEY,
                         embedding BLOB NOT NULL
                     );
                     CREATE TABLE IF NOT EXISTS index_meta (
                         key   TEXT PRIMARY KEY,
                         value TEXT NOT NULL
                     );",
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)?;

                conn.query_row(
                    "SELECT value FROM index_meta WHERE key = 'dimension'",
                    [],
                    |row| row.get(0),
                )
                .optional()
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;

        match existing {
            Some(value) if value.parse::<usize>() != Ok(dimension) => {
                return Err(RagError::Storage(format!(
                    "index at {location} was created with dimension {value}, requested {dimension}"
                )));
            }
            Some(_) => {}
            None => {
                conn.call(move |conn| {
                    conn.execute(
                        "INSERT INTO index_meta (key, value) VALUES ('dimension', ?)",
                        [dimension.to_string()],
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    Ok(())
                })
                .await
                .map_err(|err| RagError::Storage(err.to_string()))?;
            }
        }

        info!(location = %location, dimension, "opened vector store");
        Ok(Self {
            conn,
            dimension,
            location,
        })
    }

    /// Registers `sqlite-vec` as an auto-loaded extension, once per process.
    fn register_sqlite_vec() -> Result<(), RagError> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *const c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!(
                        "failed to register sqlite-vec extension (code {rc})"
                    ))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(RagError::Storage)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

fn vector_json(vector: &[f32]) -> Result<String, RagError> {
    serde_json::to_string(vector).map_err(|err| RagError::Storage(err.to_string()))
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), RagError> {
        if records.is_empty() {
            return Ok(());
        }

        let count = records.len();
        let mut rows = Vec::with_capacity(count);
        for record in records {
            let vector = reconcile_dimension(record.vector, self.dimension);
            let metadata = serde_json::to_string(&record.metadata)
                .map_err(|err| RagError::Storage(err.to_string()))?;
            rows.push((record.id, vector_json(&vector)?, record.text, metadata));
        }

        self.conn
            .call(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                for (id, vector, text, metadata) in rows {
                    tx.execute(
                        "INSERT OR REPLACE INTO records (id, text, metadata) VALUES (?, ?, ?)",
                        [&id, &text, &metadata],
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    tx.execute(
                        "INSERT OR REPLACE INTO embeddings (id, embedding) VALUES (?, vec_f32(?))",
                        [&id, &vector],
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;

        info!(count, "upserted vectors");
        Ok(())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>, RagError> {
        let query = reconcile_dimension(query.to_vec(), self.dimension);
        let query_json = vector_json(&query)?;

        let results = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT r.id, r.text, r.metadata, \
                         vec_distance_cosine(e.embedding, vec_f32(?)) AS distance \
                         FROM records r \
                         JOIN embeddings e ON r.id = e.id \
                         ORDER BY distance ASC \
                         LIMIT {top_k}"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let rows = stmt
                    .query_map([&query_json], |row| {
                        let metadata_raw: String = row.get(2)?;
                        let metadata: BTreeMap<String, String> =
                            serde_json::from_str(&metadata_raw).unwrap_or_default();
                        let distance: f32 = row.get(3)?;
                        Ok(SearchResult {
                            id: row.get(0)?,
                            text: row.get(1)?,
                            // Cosine distance to similarity.
                            score: 1.0 - distance,
                            metadata,
                        })
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut results = Vec::new();
                for row in rows {
                    results.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(results)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;

        debug!(hits = results.len(), "vector search complete");
        Ok(results)
    }

    async fn stats(&self) -> Result<IndexStats, RagError> {
        let document_count = self
            .conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;

        Ok(IndexStats {
            document_count,
            vector_dimension: self.dimension,
            index_location: self.location.clone(),
        })
    }

    async fn clear(&self) -> Result<(), RagError> {
        self.conn
            .call(|conn| {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.execute("DELETE FROM embeddings", [])
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.execute("DELETE FROM records", [])
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(())
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;

        info!("cleared vector store");
        Ok(())
    }

    async fn close(&self) -> Result<(), RagError> {
        self.conn
            .clone()
            .close()
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;
        info!(location = %self.location, "closed vector store");
        Ok(())
    }
}
