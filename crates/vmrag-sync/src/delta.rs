//! Pure computation over the two store adapters: pending/modified/deleted/new
//! documents in either direction. Never issues a write.

use std::collections::{HashMap, HashSet};

use vmrag_core::{
    Chunker, DeletedDocument, DiffRow, DocumentDelta, DeltaType, LocalChanges, Result, VectorStore,
    VersionedStore,
};

use crate::converter::group_by_source;

/// Documents in the versioned store, for `collection`, not yet reflected in
/// the document-sync-log (new), or whose content-hash differs from the log
/// (modified). Ordered by `updated_at` descending.
pub async fn pending_versioned_to_vector(
    versioned: &dyn VersionedStore,
    collection: &str,
) -> Result<Vec<DocumentDelta>> {
    let sql = format!(
        r#"SELECT d.doc_id AS doc_id, d.content AS content, d.content_hash AS content_hash,
                  d.updated_at AS updated_at, s.content_hash AS synced_hash
           FROM documents d
           LEFT JOIN document_sync_log s
             ON s.doc_id = d.doc_id AND s.collection_name = d.collection_name
           WHERE d.collection_name = '{}'
           ORDER BY d.updated_at DESC"#,
        vmrag_versioned::escape_sql_literal(collection)
    );

    let rows = versioned.query_sql(&sql).await?;
    let mut deltas = Vec::new();

    for row in rows {
        let doc_id = match row.get("doc_id").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => continue,
        };
        let content = row.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let content_hash = row
            .get("content_hash")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let updated_at = row.get("updated_at").and_then(|v| v.as_i64()).unwrap_or(0);
        let synced_hash = row.get("synced_hash").and_then(|v| v.as_str());

        let delta_type = match synced_hash {
            None => DeltaType::New,
            Some(h) if h != content_hash => DeltaType::Modified,
            Some(_) => continue,
        };

        deltas.push(DocumentDelta {
            doc_id,
            collection_name: collection.to_string(),
            delta_type,
            content,
            content_hash,
            updated_at,
        });
    }

    Ok(deltas)
}

/// Document-sync-log rows for `collection` whose source document no longer
/// exists in the versioned store.
pub async fn deleted_in_versioned(
    versioned: &dyn VersionedStore,
    collection: &str,
) -> Result<Vec<DeletedDocument>> {
    let sql = format!(
        r#"SELECT s.doc_id AS doc_id, s.chunk_ids AS chunk_ids
           FROM document_sync_log s
           LEFT JOIN documents d
             ON d.doc_id = s.doc_id AND d.collection_name = s.collection_name
           WHERE s.collection_name = '{}' AND d.doc_id IS NULL"#,
        vmrag_versioned::escape_sql_literal(collection)
    );

    let rows = versioned.query_sql(&sql).await?;
    let mut deleted = Vec::new();

    for row in rows {
        let doc_id = match row.get("doc_id").and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => continue,
        };
        let chunk_ids: Vec<String> = row
            .get("chunk_ids")
            .and_then(|v| v.as_str())
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();

        deleted.push(DeletedDocument {
            doc_id,
            collection_name: collection.to_string(),
            chunk_ids,
        });
    }

    Ok(deleted)
}

/// Vector-side changes not yet reflected in the versioned store, computed by
/// the four-scan union spec.md §4.6 describes. Flag-scan #1 reads the
/// vector-store adapter's dirty-set side table (design notes §9) rather than
/// a per-chunk `is_local_change` metadata boolean.
pub async fn local_changes_in_vector(
    vector: &dyn VectorStore,
    versioned: &dyn VersionedStore,
    collection: &str,
    chunker: &dyn Chunker,
    chunk_overlap: usize,
) -> Result<LocalChanges> {
    let all_chunks = vector.get_all(collection).await?;
    let groups = group_by_source(&all_chunks);
    let dirty_ids: HashSet<String> = vector.dirty_chunk_ids(collection).await?.into_iter().collect();

    let sql = format!(
        "SELECT doc_id AS doc_id, content_hash AS content_hash FROM documents WHERE collection_name = '{}'",
        vmrag_versioned::escape_sql_literal(collection)
    );
    let versioned_hashes: HashMap<String, String> = versioned
        .query_sql(&sql)
        .await?
        .into_iter()
        .filter_map(|row| {
            let doc_id = row.get("doc_id")?.as_str()?.to_string();
            let hash = row.get("content_hash")?.as_str()?.to_string();
            Some((doc_id, hash))
        })
        .collect();

    let mut changes = LocalChanges::default();

    for (doc_id, chunks) in &groups {
        let is_dirty = chunks.iter().any(|c| dirty_ids.contains(&c.id));
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let reassembled_hash = vmrag_core::hash::sha256_hex(&chunker.reassemble(&texts, chunk_overlap));

        match versioned_hashes.get(doc_id) {
            None => changes.new.push(doc_id.clone()),
            Some(versioned_hash) if versioned_hash != &reassembled_hash || is_dirty => {
                changes.modified.push(doc_id.clone())
            }
            Some(_) => {}
        }
    }

    for doc_id in versioned_hashes.keys() {
        if !groups.contains_key(doc_id) {
            changes.deleted.push(doc_id.clone());
        }
    }

    changes.new.sort();
    changes.modified.sort();
    changes.deleted.sort();

    Ok(changes)
}

/// Rows of the generalized `documents` table diff between two commits,
/// filtered to `collection`.
pub async fn commit_range_diff(
    versioned: &dyn VersionedStore,
    from_commit: &str,
    to_commit: &str,
    collection: &str,
) -> Result<Vec<DiffRow>> {
    let rows = versioned.table_diff(from_commit, to_commit, "documents").await?;
    Ok(rows
        .into_iter()
        .filter(|r| r.metadata.get("collection_name").and_then(|v| v.as_str()) == Some(collection))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vmrag_chunk::WindowChunker;
    use vmrag_core::{
        ChunkRecord, ConflictRow, MergeOutcome, NativeResolutionStrategy, PullOutcome, StatusReport,
    };

    struct FakeVersionedStore {
        documents: Vec<(String, String, String)>, // doc_id, content, content_hash
        sync_log: Vec<(String, Vec<String>)>,      // doc_id, chunk_ids
    }

    #[async_trait]
    impl VersionedStore for FakeVersionedStore {
        async fn current_branch(&self) -> Result<String> {
            Ok("main".to_string())
        }
        async fn head_commit(&self) -> Result<String> {
            Ok("c1".to_string())
        }
        async fn status(&self) -> Result<StatusReport> {
            unimplemented!()
        }
        async fn create_branch(&self, _name: &str, _from: Option<&str>) -> Result<()> {
            unimplemented!()
        }
        async fn delete_branch(&self, _name: &str) -> Result<()> {
            unimplemented!()
        }
        async fn checkout(&self, _branch: &str, _create: bool) -> Result<()> {
            unimplemented!()
        }
        async fn add_all(&self) -> Result<()> {
            unimplemented!()
        }
        async fn commit(&self, _message: &str) -> Result<String> {
            unimplemented!()
        }
        async fn log(&self, _limit: u32) -> Result<Vec<String>> {
            unimplemented!()
        }
        async fn push(&self, _remote: &str, _branch: &str) -> Result<()> {
            unimplemented!()
        }
        async fn pull(&self, _remote: &str, _branch: &str) -> Result<PullOutcome> {
            unimplemented!()
        }
        async fn fetch(&self, _remote: &str) -> Result<()> {
            unimplemented!()
        }
        async fn clone_remote(&self, _remote: &str, _checkout: Option<&str>) -> Result<()> {
            unimplemented!()
        }
        async fn merge(&self, _source_branch: &str) -> Result<MergeOutcome> {
            unimplemented!()
        }
        async fn has_conflicts(&self) -> Result<bool> {
            unimplemented!()
        }
        async fn conflicts_for(&self, _table: &str) -> Result<Vec<ConflictRow>> {
            unimplemented!()
        }
        async fn resolve_conflicts(&self, _table: &str, _strategy: NativeResolutionStrategy) -> Result<()> {
            unimplemented!()
        }
        async fn table_diff(&self, _from: &str, _to: &str, _table: &str) -> Result<Vec<DiffRow>> {
            unimplemented!()
        }
        async fn exec_sql(&self, _statement: &str) -> Result<u64> {
            unimplemented!()
        }
        async fn query_sql(&self, statement: &str) -> Result<Vec<serde_json::Value>> {
            if statement.contains("document_sync_log s\n           WHERE s.collection_name")
                || statement.starts_with("SELECT s.doc_id")
            {
                return Ok(self
                    .sync_log
                    .iter()
                    .filter(|(doc_id, _)| !self.documents.iter().any(|(d, _, _)| d == doc_id))
                    .map(|(doc_id, chunk_ids)| {
                        serde_json::json!({"doc_id": doc_id, "chunk_ids": serde_json::to_string(chunk_ids).unwrap()})
                    })
                    .collect());
            }
            if statement.contains("LEFT JOIN document_sync_log") {
                return Ok(self
                    .documents
                    .iter()
                    .map(|(doc_id, content, content_hash)| {
                        let synced_hash = self
                            .sync_log
                            .iter()
                            .find(|(d, _)| d == doc_id)
                            .map(|_| content_hash.clone());
                        serde_json::json!({
                            "doc_id": doc_id,
                            "content": content,
                            "content_hash": content_hash,
                            "updated_at": 1000,
                            "synced_hash": synced_hash,
                        })
                    })
                    .collect());
            }
            // plain documents scan, used by local_changes_in_vector
            Ok(self
                .documents
                .iter()
                .map(|(doc_id, _, content_hash)| {
                    serde_json::json!({"doc_id": doc_id, "content_hash": content_hash})
                })
                .collect())
        }
        async fn exec_scalar(&self, _statement: &str) -> Result<Option<String>> {
            unimplemented!()
        }
    }

    struct FakeVectorStore {
        chunks: Mutex<Vec<ChunkRecord>>,
        dirty: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VectorStore for FakeVectorStore {
        async fn create_collection(&self, _name: &str, _metadata: HashMap<String, serde_json::Value>) -> Result<()> {
            unimplemented!()
        }
        async fn delete_collection(&self, _name: &str) -> Result<()> {
            unimplemented!()
        }
        async fn list_collections(&self) -> Result<Vec<String>> {
            unimplemented!()
        }
        async fn collection_exists(&self, _name: &str) -> Result<bool> {
            unimplemented!()
        }
        async fn update_collection_metadata(&self, _name: &str, _fields: HashMap<String, serde_json::Value>) -> Result<()> {
            unimplemented!()
        }
        async fn collection_metadata(&self, _name: &str) -> Result<HashMap<String, serde_json::Value>> {
            unimplemented!()
        }
        async fn add(
            &self,
            _collection: &str,
            _ids: &[String],
            _texts: &[String],
            _embeddings: Option<Vec<Vec<f32>>>,
            _metadatas: Vec<HashMap<String, serde_json::Value>>,
        ) -> Result<()> {
            unimplemented!()
        }
        async fn update_metadata(&self, _collection: &str, _id: &str, _fields: HashMap<String, serde_json::Value>) -> Result<()> {
            unimplemented!()
        }
        async fn delete(&self, _collection: &str, _ids: &[String]) -> Result<()> {
            unimplemented!()
        }
        async fn get(&self, _collection: &str, _id: &str) -> Result<Option<ChunkRecord>> {
            unimplemented!()
        }
        async fn get_all(&self, _collection: &str) -> Result<Vec<ChunkRecord>> {
            Ok(self.chunks.lock().unwrap().clone())
        }
        async fn query_by_metadata(&self, _collection: &str, _filter: HashMap<String, serde_json::Value>) -> Result<Vec<ChunkRecord>> {
            unimplemented!()
        }
        fn embedding_model(&self) -> &str {
            "m"
        }
        async fn mark_dirty(&self, _collection: &str, _chunk_id: &str) -> Result<()> {
            unimplemented!()
        }
        async fn dirty_chunk_ids(&self, _collection: &str) -> Result<Vec<String>> {
            Ok(self.dirty.lock().unwrap().clone())
        }
        async fn clear_dirty(&self, _collection: &str, _chunk_id: &str) -> Result<()> {
            unimplemented!()
        }
    }

    fn chunk(id: &str, source_id: &str, index: i64, text: &str) -> ChunkRecord {
        let mut metadata = HashMap::new();
        metadata.insert("source_id".to_string(), serde_json::json!(source_id));
        metadata.insert("chunk_index".to_string(), serde_json::json!(index));
        ChunkRecord { id: id.to_string(), text: text.to_string(), metadata, embedding: None }
    }

    #[tokio::test]
    async fn test_pending_versioned_to_vector_classifies_new_and_modified() {
        let versioned = FakeVersionedStore {
            documents: vec![
                ("D1".to_string(), "hello".to_string(), vmrag_core::hash::sha256_hex("hello")),
                ("D2".to_string(), "world".to_string(), vmrag_core::hash::sha256_hex("world")),
            ],
            sync_log: vec![("D1".to_string(), vec!["D1_chunk_0".to_string()])],
        };

        let deltas = pending_versioned_to_vector(&versioned, "c1").await.unwrap();
        // D1 synced at the same hash it currently has -> no delta; D2 has no log row -> new.
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].doc_id, "D2");
        assert_eq!(deltas[0].delta_type, DeltaType::New);
    }

    #[tokio::test]
    async fn test_deleted_in_versioned() {
        let versioned = FakeVersionedStore {
            documents: vec![("D1".to_string(), "hello".to_string(), "h".to_string())],
            sync_log: vec![
                ("D1".to_string(), vec!["D1_chunk_0".to_string()]),
                ("D2".to_string(), vec!["D2_chunk_0".to_string()]),
            ],
        };

        let deleted = deleted_in_versioned(&versioned, "c1").await.unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].doc_id, "D2");
        assert_eq!(deleted[0].chunk_ids, vec!["D2_chunk_0".to_string()]);
    }

    #[tokio::test]
    async fn test_local_changes_in_vector_buckets() {
        let versioned = FakeVersionedStore {
            documents: vec![
                ("D1".to_string(), "hello".to_string(), vmrag_core::hash::sha256_hex("hello")),
            ],
            sync_log: vec![],
        };

        let vector = FakeVectorStore {
            chunks: Mutex::new(vec![
                chunk("D1_chunk_0", "D1", 0, "hello"),
                chunk("D3_chunk_0", "D3", 0, "brand new"),
            ]),
            dirty: Mutex::new(vec!["D1_chunk_0".to_string()]),
        };

        let chunker = WindowChunker::new();
        let changes = local_changes_in_vector(&vector, &versioned, "c1", &chunker, 0).await.unwrap();

        assert_eq!(changes.new, vec!["D3".to_string()]);
        assert_eq!(changes.modified, vec!["D1".to_string()]);
        assert!(changes.deleted.is_empty());
    }
}
