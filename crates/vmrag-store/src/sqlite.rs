//! SQLite-based [`VectorStore`] implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use vmrag_core::{ChunkRecord, Result, VectorStore, VmragError};

use crate::schema::SCHEMA;

/// SQLite-backed vector store adapter.
///
/// Uses a blocking `Mutex<Connection>` the way `rag-store`'s `SqliteStore`
/// did; every public method takes the lock, does its work synchronously, and
/// releases it before returning. There is no similarity search here -- that
/// is out of scope for this adapter -- only keyed storage and metadata
/// filtering of `(id, text, metadata, embedding)` records.
pub struct VectorStoreAdapter {
    conn: Arc<Mutex<Connection>>,
    embedding_model: String,
}

// Connection itself isn't Sync, but access is always serialized through the
// Mutex, so this is sound the same way it was for the teacher's SqliteStore.
unsafe impl Send for VectorStoreAdapter {}
unsafe impl Sync for VectorStoreAdapter {}

impl VectorStoreAdapter {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>, embedding_model: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| VmragError::database(format!("failed to open database: {e}")))?;

        Self::init(conn, embedding_model.into(), path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory(embedding_model: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| VmragError::database(format!("failed to open in-memory database: {e}")))?;

        Self::init(conn, embedding_model.into(), Path::new(":memory:"))
    }

    fn init(conn: Connection, embedding_model: String, path: &Path) -> Result<Self> {
        Self::configure_connection(&conn)?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| VmragError::database(format!("failed to initialize schema: {e}")))?;

        debug!("vector store opened at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embedding_model,
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA busy_timeout = 30000;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| VmragError::database(format!("failed to configure connection: {e}")))?;

        Ok(())
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| VmragError::database(e.to_string()))?;
        f(&conn)
    }

    fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkRecord> {
        let id: String = row.get(0)?;
        let text: String = row.get(1)?;
        let metadata_str: String = row.get(2)?;
        let embedding_bytes: Option<Vec<u8>> = row.get(3)?;

        Ok(ChunkRecord {
            id,
            text,
            metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
            embedding: embedding_bytes.as_deref().map(bytes_to_vec),
        })
    }
}

fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn bytes_to_vec(b: &[u8]) -> Vec<f32> {
    b.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Does `record`'s metadata satisfy every key/value pair in `filter`?
fn matches_filter(
    record_metadata: &HashMap<String, serde_json::Value>,
    filter: &HashMap<String, serde_json::Value>,
) -> bool {
    filter
        .iter()
        .all(|(k, v)| record_metadata.get(k) == Some(v))
}

#[async_trait]
impl VectorStore for VectorStoreAdapter {
    async fn create_collection(
        &self,
        name: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let name = name.to_string();
        let metadata_str = serde_json::to_string(&metadata)?;
        let embedding_model = self.embedding_model.clone();
        let now = crate::now_unix();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO collections (name, metadata, embedding_model, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![name, metadata_str, embedding_model, now],
            )
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint") {
                    VmragError::CollectionExists { name: name.clone() }
                } else {
                    VmragError::database(format!("failed to create collection: {e}"))
                }
            })?;

            debug!("created vector collection: {}", name);
            Ok(())
        })
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let name = name.to_string();
        self.with_conn(|conn| {
            let deleted = conn
                .execute("DELETE FROM collections WHERE name = ?1", params![name])
                .map_err(|e| VmragError::database(e.to_string()))?;

            if deleted == 0 {
                return Err(VmragError::CollectionNotFound { name });
            }

            conn.execute(
                "DELETE FROM dirty_chunks WHERE collection = ?1",
                params![name],
            )
            .map_err(|e| VmragError::database(e.to_string()))?;

            Ok(())
        })
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT name FROM collections ORDER BY name")
                .map_err(|e| VmragError::database(e.to_string()))?;

            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| VmragError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| VmragError::database(e.to_string()))?;

            Ok(names)
        })
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.with_conn(|conn| {
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM collections WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )
                .map_err(|e| VmragError::database(e.to_string()))?;
            Ok(exists)
        })
    }

    async fn update_collection_metadata(&self, name: &str, fields: HashMap<String, serde_json::Value>) -> Result<()> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT metadata FROM collections WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| VmragError::database(e.to_string()))?;

            let Some(existing) = existing else {
                return Err(VmragError::CollectionNotFound { name });
            };

            let mut metadata: HashMap<String, serde_json::Value> =
                serde_json::from_str(&existing).unwrap_or_default();
            metadata.extend(fields);
            let metadata_str = serde_json::to_string(&metadata)?;

            conn.execute(
                "UPDATE collections SET metadata = ?1 WHERE name = ?2",
                params![metadata_str, name],
            )
            .map_err(|e| VmragError::database(e.to_string()))?;
            Ok(())
        })
    }

    async fn collection_metadata(&self, name: &str) -> Result<HashMap<String, serde_json::Value>> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let metadata_str: Option<String> = conn
                .query_row(
                    "SELECT metadata FROM collections WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| VmragError::database(e.to_string()))?;

            let Some(metadata_str) = metadata_str else {
                return Err(VmragError::CollectionNotFound { name });
            };
            Ok(serde_json::from_str(&metadata_str).unwrap_or_default())
        })
    }

    async fn add(
        &self,
        collection: &str,
        ids: &[String],
        texts: &[String],
        embeddings: Option<Vec<Vec<f32>>>,
        metadatas: Vec<HashMap<String, serde_json::Value>>,
    ) -> Result<()> {
        if ids.len() != texts.len() || ids.len() != metadatas.len() {
            return Err(VmragError::invalid_argument(
                "ids, texts, and metadatas must have the same length",
            ));
        }
        if let Some(ref e) = embeddings {
            if e.len() != ids.len() {
                return Err(VmragError::invalid_argument(
                    "embeddings, when provided, must match ids in length",
                ));
            }
        }

        let collection = collection.to_string();
        let ids: Vec<String> = ids.to_vec();
        let texts: Vec<String> = texts.to_vec();
        let now = crate::now_unix();

        self.with_conn(move |conn| {
            if !collection_exists_sync(conn, &collection)? {
                return Err(VmragError::CollectionNotFound { name: collection });
            }

            let tx = conn
                .unchecked_transaction()
                .map_err(|e| VmragError::database(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO chunks (collection, id, text, metadata, embedding) VALUES (?1, ?2, ?3, ?4, ?5)",
                    )
                    .map_err(|e| VmragError::database(e.to_string()))?;

                let mut dirty_stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO dirty_chunks (collection, chunk_id, dirtied_at)
                        VALUES (?1, ?2, ?3)
                        ON CONFLICT(collection, chunk_id) DO UPDATE SET dirtied_at = excluded.dirtied_at
                        "#,
                    )
                    .map_err(|e| VmragError::database(e.to_string()))?;

                for (i, id) in ids.iter().enumerate() {
                    let metadata_str = serde_json::to_string(&metadatas[i])?;
                    let embedding_bytes = embeddings.as_ref().map(|e| vec_to_bytes(&e[i]));

                    stmt.execute(params![collection, id, texts[i], metadata_str, embedding_bytes])
                        .map_err(|e| {
                            if e.to_string().contains("UNIQUE constraint") {
                                VmragError::DuplicateId { id: id.clone() }
                            } else {
                                VmragError::database(format!("failed to insert chunk: {e}"))
                            }
                        })?;

                    dirty_stmt
                        .execute(params![collection, id, now])
                        .map_err(|e| VmragError::database(e.to_string()))?;
                }
            }

            tx.commit().map_err(|e| VmragError::database(e.to_string()))?;

            debug!("added {} chunk(s) to {}", ids.len(), collection);
            Ok(())
        })
    }

    async fn update_metadata(
        &self,
        collection: &str,
        id: &str,
        fields: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let collection = collection.to_string();
        let id = id.to_string();
        let now = crate::now_unix();

        self.with_conn(move |conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT metadata FROM chunks WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| VmragError::database(e.to_string()))?;

            let Some(existing) = existing else {
                return Err(VmragError::OperationFailed {
                    message: format!("chunk {id} not found in collection {collection}"),
                });
            };

            let mut metadata: HashMap<String, serde_json::Value> =
                serde_json::from_str(&existing).unwrap_or_default();
            metadata.extend(fields);
            let metadata_str = serde_json::to_string(&metadata)?;

            conn.execute(
                "UPDATE chunks SET metadata = ?1 WHERE collection = ?2 AND id = ?3",
                params![metadata_str, collection, id],
            )
            .map_err(|e| VmragError::database(e.to_string()))?;

            conn.execute(
                r#"
                INSERT INTO dirty_chunks (collection, chunk_id, dirtied_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(collection, chunk_id) DO UPDATE SET dirtied_at = excluded.dirtied_at
                "#,
                params![collection, id, now],
            )
            .map_err(|e| VmragError::database(e.to_string()))?;

            Ok(())
        })
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let collection = collection.to_string();
        let ids: Vec<String> = ids.to_vec();

        self.with_conn(move |conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| VmragError::database(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare("DELETE FROM chunks WHERE collection = ?1 AND id = ?2")
                    .map_err(|e| VmragError::database(e.to_string()))?;
                let mut dirty_stmt = tx
                    .prepare("DELETE FROM dirty_chunks WHERE collection = ?1 AND chunk_id = ?2")
                    .map_err(|e| VmragError::database(e.to_string()))?;

                for id in &ids {
                    stmt.execute(params![collection, id])
                        .map_err(|e| VmragError::database(e.to_string()))?;
                    dirty_stmt
                        .execute(params![collection, id])
                        .map_err(|e| VmragError::database(e.to_string()))?;
                }
            }

            tx.commit().map_err(|e| VmragError::database(e.to_string()))?;
            Ok(())
        })
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<ChunkRecord>> {
        let collection = collection.to_string();
        let id = id.to_string();

        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, text, metadata, embedding FROM chunks WHERE collection = ?1 AND id = ?2",
                )
                .map_err(|e| VmragError::database(e.to_string()))?;

            let result = stmt
                .query_row(params![collection, id], Self::row_to_chunk)
                .optional()
                .map_err(|e| VmragError::database(e.to_string()))?;

            Ok(result)
        })
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<ChunkRecord>> {
        let collection = collection.to_string();

        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT id, text, metadata, embedding FROM chunks WHERE collection = ?1 ORDER BY id")
                .map_err(|e| VmragError::database(e.to_string()))?;

            let records = stmt
                .query_map(params![collection], Self::row_to_chunk)
                .map_err(|e| VmragError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| VmragError::database(e.to_string()))?;

            Ok(records)
        })
    }

    async fn query_by_metadata(
        &self,
        collection: &str,
        filter: HashMap<String, serde_json::Value>,
    ) -> Result<Vec<ChunkRecord>> {
        let collection = collection.to_string();

        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT id, text, metadata, embedding FROM chunks WHERE collection = ?1 ORDER BY id")
                .map_err(|e| VmragError::database(e.to_string()))?;

            let records = stmt
                .query_map(params![collection], Self::row_to_chunk)
                .map_err(|e| VmragError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| VmragError::database(e.to_string()))?;

            Ok(records
                .into_iter()
                .filter(|r: &ChunkRecord| matches_filter(&r.metadata, &filter))
                .collect())
        })
    }

    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    async fn mark_dirty(&self, collection: &str, chunk_id: &str) -> Result<()> {
        let collection = collection.to_string();
        let chunk_id = chunk_id.to_string();
        let now = crate::now_unix();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO dirty_chunks (collection, chunk_id, dirtied_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(collection, chunk_id) DO UPDATE SET dirtied_at = excluded.dirtied_at
                "#,
                params![collection, chunk_id, now],
            )
            .map_err(|e| VmragError::database(e.to_string()))?;
            Ok(())
        })
    }

    async fn dirty_chunk_ids(&self, collection: &str) -> Result<Vec<String>> {
        let collection = collection.to_string();
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT chunk_id FROM dirty_chunks WHERE collection = ?1 ORDER BY chunk_id")
                .map_err(|e| VmragError::database(e.to_string()))?;

            let ids = stmt
                .query_map(params![collection], |row| row.get::<_, String>(0))
                .map_err(|e| VmragError::database(e.to_string()))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| VmragError::database(e.to_string()))?;

            Ok(ids)
        })
    }

    async fn clear_dirty(&self, collection: &str, chunk_id: &str) -> Result<()> {
        let collection = collection.to_string();
        let chunk_id = chunk_id.to_string();
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM dirty_chunks WHERE collection = ?1 AND chunk_id = ?2",
                params![collection, chunk_id],
            )
            .map_err(|e| VmragError::database(e.to_string()))?;
            Ok(())
        })
    }
}

fn collection_exists_sync(conn: &Connection, name: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM collections WHERE name = ?1)",
        params![name],
        |row| row.get(0),
    )
    .map_err(|e| VmragError::database(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_open_memory_and_collection_crud() {
        let store = VectorStoreAdapter::open_memory("test-model").unwrap();
        assert!(store.list_collections().await.unwrap().is_empty());

        store.create_collection("c1", HashMap::new()).await.unwrap();
        assert!(store.collection_exists("c1").await.unwrap());
        assert_eq!(store.list_collections().await.unwrap(), vec!["c1".to_string()]);

        let err = store.create_collection("c1", HashMap::new()).await.unwrap_err();
        assert_eq!(err.error_code(), "COLLECTION_EXISTS");

        store.delete_collection("c1").await.unwrap();
        assert!(!store.collection_exists("c1").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_get_and_query_by_metadata() {
        let store = VectorStoreAdapter::open_memory("m").unwrap();
        store.create_collection("c1", HashMap::new()).await.unwrap();

        store
            .add(
                "c1",
                &["a".to_string(), "b".to_string()],
                &["hello".to_string(), "world".to_string()],
                Some(vec![vec![1.0, 2.0], vec![3.0, 4.0]]),
                vec![
                    meta(&[("doc_id", serde_json::json!("D1"))]),
                    meta(&[("doc_id", serde_json::json!("D2"))]),
                ],
            )
            .await
            .unwrap();

        let a = store.get("c1", "a").await.unwrap().unwrap();
        assert_eq!(a.text, "hello");
        assert_eq!(a.embedding, Some(vec![1.0, 2.0]));

        let all = store.get_all("c1").await.unwrap();
        assert_eq!(all.len(), 2);

        let filtered = store
            .query_by_metadata("c1", meta(&[("doc_id", serde_json::json!("D2"))]))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "b");
    }

    #[tokio::test]
    async fn test_add_duplicate_id_fails() {
        let store = VectorStoreAdapter::open_memory("m").unwrap();
        store.create_collection("c1", HashMap::new()).await.unwrap();

        store
            .add("c1", &["a".to_string()], &["x".to_string()], None, vec![HashMap::new()])
            .await
            .unwrap();

        let err = store
            .add("c1", &["a".to_string()], &["y".to_string()], None, vec![HashMap::new()])
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_ID");
    }

    #[tokio::test]
    async fn test_dirty_chunks_marked_and_cleared() {
        let store = VectorStoreAdapter::open_memory("m").unwrap();
        store.create_collection("c1", HashMap::new()).await.unwrap();

        store
            .add("c1", &["a".to_string()], &["x".to_string()], None, vec![HashMap::new()])
            .await
            .unwrap();

        let dirty = store.dirty_chunk_ids("c1").await.unwrap();
        assert_eq!(dirty, vec!["a".to_string()]);

        store.clear_dirty("c1", "a").await.unwrap();
        assert!(store.dirty_chunk_ids("c1").await.unwrap().is_empty());

        store
            .update_metadata("c1", "a", meta(&[("tag", serde_json::json!("x"))]))
            .await
            .unwrap();
        assert_eq!(store.dirty_chunk_ids("c1").await.unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_update_collection_metadata_merges() {
        let store = VectorStoreAdapter::open_memory("m").unwrap();
        store
            .create_collection("c1", meta(&[("description", serde_json::json!("old"))]))
            .await
            .unwrap();

        store
            .update_collection_metadata("c1", meta(&[("description", serde_json::json!("new"))]))
            .await
            .unwrap();

        let err = store
            .update_collection_metadata("missing", HashMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "COLLECTION_NOT_FOUND");

        let metadata = store.collection_metadata("c1").await.unwrap();
        assert_eq!(metadata.get("description"), Some(&serde_json::json!("new")));
    }

    #[tokio::test]
    async fn test_delete_removes_chunk_and_dirty_entry() {
        let store = VectorStoreAdapter::open_memory("m").unwrap();
        store.create_collection("c1", HashMap::new()).await.unwrap();
        store
            .add("c1", &["a".to_string()], &["x".to_string()], None, vec![HashMap::new()])
            .await
            .unwrap();

        store.delete("c1", &["a".to_string()]).await.unwrap();
        assert!(store.get("c1", "a").await.unwrap().is_none());
        assert!(store.dirty_chunk_ids("c1").await.unwrap().is_empty());
    }
}
