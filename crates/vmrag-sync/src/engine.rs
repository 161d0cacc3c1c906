//! The sync engine (spec.md §4.7): the four primitive flows F1-F4 and the
//! composed top-level operations built on top of them.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};
use vmrag_core::{
    Chunker, DetailedConflict, DiffRow, DiffType, Embedder, MergeOutcome, OperationType, Result,
    ResolutionSpec, SyncState, SyncStatus, VectorStore, VersionedStore, VmragError,
};

use crate::conflict;
use crate::converter;
use crate::delta;
use crate::lock::CollectionLocks;
use crate::oplog;
use crate::schema;

const COLLECTION_PREFIX: &str = "vmrag_";
const MAX_COLLECTION_NAME_LEN: usize = 64;

/// Map a branch name to its collection name, deterministically.
pub fn sanitize_collection_name(branch: &str) -> String {
    let cleaned: String = branch.chars().map(|c| if c == '/' || c == '_' { '-' } else { c }).collect();
    let mut name = format!("{COLLECTION_PREFIX}{cleaned}");
    name.truncate(MAX_COLLECTION_NAME_LEN);
    name
}

/// `Some(collision name)` if `a` and `b` sanitize to the same collection
/// name despite being different branches.
pub fn naming_collision(a: &str, b: &str) -> Option<String> {
    if a == b {
        return None;
    }
    let sa = sanitize_collection_name(a);
    if sa == sanitize_collection_name(b) {
        Some(sa)
    } else {
        None
    }
}

/// Counts of staged/applied documents by delta kind, returned from several
/// composed operations.
pub type OpCounts = HashMap<String, u64>;

#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub commit_id: String,
    pub staged: OpCounts,
}

#[derive(Debug, Clone)]
pub struct PullSyncOutcome {
    pub fast_forward: bool,
    pub applied: usize,
}

#[derive(Debug, Clone)]
pub struct MergeSyncOutcome {
    pub conflicts: Vec<DetailedConflict>,
    pub merge_commit: Option<String>,
}

/// Owns the three adapters, the chunker, and the per-collection lock
/// registry. One engine instance serves every branch/collection.
pub struct SyncEngine {
    versioned: Arc<dyn VersionedStore>,
    vector: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunker: Arc<dyn Chunker>,
    locks: CollectionLocks,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl SyncEngine {
    pub fn new(
        versioned: Arc<dyn VersionedStore>,
        vector: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chunker: Arc<dyn Chunker>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            versioned,
            vector,
            embedder,
            chunker,
            locks: CollectionLocks::new(),
            chunk_size,
            chunk_overlap,
        }
    }

    // ---- F1: apply one versioned-side diff row to the vector store -----

    async fn apply_diff_row(&self, collection: &str, commit_id: &str, row: &DiffRow) -> Result<()> {
        match row.diff_type {
            DiffType::Added => self.apply_added(collection, commit_id, row).await,
            DiffType::Modified => {
                if let Some(log) = self.read_sync_log(collection, &row.source_id).await? {
                    self.vector.delete(collection, &log.1).await?;
                }
                self.apply_added(collection, commit_id, row).await
            }
            DiffType::Removed => {
                if let Some(log) = self.read_sync_log(collection, &row.source_id).await? {
                    self.vector.delete(collection, &log.1).await?;
                }
                self.delete_sync_log(collection, &row.source_id).await
            }
        }
    }

    async fn apply_added(&self, collection: &str, commit_id: &str, row: &DiffRow) -> Result<()> {
        let content = row.to_content.clone().unwrap_or_default();
        let texts = self.chunker.chunk(&content, self.chunk_size, self.chunk_overlap);
        let total_chunks = texts.len();
        let content_hash = row.to_hash.clone().unwrap_or_else(|| vmrag_core::hash::sha256_hex(&content));

        let ids: Vec<String> = (0..total_chunks).map(|i| format!("{}_chunk_{}", row.source_id, i)).collect();
        let metadatas: Vec<HashMap<String, serde_json::Value>> = (0..total_chunks)
            .map(|i| {
                let mut m = row.metadata.clone();
                m.insert("source_id".to_string(), serde_json::json!(row.source_id));
                m.insert("collection_name".to_string(), serde_json::json!(collection));
                m.insert("content_hash".to_string(), serde_json::json!(content_hash));
                m.insert("commit_id".to_string(), serde_json::json!(commit_id));
                m.insert("chunk_index".to_string(), serde_json::json!(i));
                m.insert("total_chunks".to_string(), serde_json::json!(total_chunks));
                m
            })
            .collect();

        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let embeddings = self.embedder.embed_documents(&refs).await?;
        self.vector.add(collection, &ids, &texts, Some(embeddings), metadatas).await?;
        self.upsert_sync_log(collection, &row.source_id, &content_hash, &ids).await?;

        // `add` unconditionally marks its chunks dirty (vmrag-core's
        // traits.rs); a versioned-to-vector resync is not a local edit, so
        // clear it once the sync log confirms the write landed.
        for id in &ids {
            self.vector.clear_dirty(collection, id).await?;
        }
        Ok(())
    }

    // ---- F2: stage a vector-side document into the versioned store -----

    async fn stage_document(&self, collection: &str, doc_id: &str, now: i64) -> Result<()> {
        let all_chunks = self.vector.get_all(collection).await?;
        let groups = converter::group_by_source(&all_chunks);
        let Some(chunks) = groups.get(doc_id) else {
            return self.stage_deletion(collection, doc_id).await;
        };

        let doc = converter::chunks_to_document(chunks, self.chunker.as_ref(), self.chunk_overlap, now)?;
        self.upsert_document_row(collection, &doc).await?;
        self.upsert_sync_log(collection, doc_id, &doc.content_hash, &chunks.iter().map(|c| c.id.clone()).collect::<Vec<_>>()).await?;

        for chunk in chunks {
            self.vector.clear_dirty(collection, &chunk.id).await?;
        }
        Ok(())
    }

    async fn stage_deletion(&self, collection: &str, doc_id: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM documents WHERE doc_id = '{}' AND collection_name = '{}'",
            vmrag_versioned::escape_sql_literal(doc_id),
            vmrag_versioned::escape_sql_literal(collection),
        );
        self.versioned.exec_sql(&sql).await?;
        self.delete_sync_log(collection, doc_id).await
    }

    async fn upsert_document_row(&self, collection: &str, doc: &vmrag_core::Document) -> Result<()> {
        let delete = format!(
            "DELETE FROM documents WHERE doc_id = '{}' AND collection_name = '{}'",
            vmrag_versioned::escape_sql_literal(&doc.doc_id),
            vmrag_versioned::escape_sql_literal(collection),
        );
        self.versioned.exec_sql(&delete).await?;

        let metadata_json = serde_json::to_string(&doc.metadata)?;
        let insert = format!(
            "INSERT INTO documents (doc_id, collection_name, content, content_hash, title, doc_type, metadata, created_at, updated_at) \
             VALUES ('{}', '{}', '{}', '{}', {}, {}, '{}', {}, {})",
            vmrag_versioned::escape_sql_literal(&doc.doc_id),
            vmrag_versioned::escape_sql_literal(collection),
            vmrag_versioned::escape_sql_literal(&doc.content),
            vmrag_versioned::escape_sql_literal(&doc.content_hash),
            sql_opt_string(doc.title.as_deref()),
            sql_opt_string(doc.doc_type.as_deref()),
            vmrag_versioned::escape_sql_literal(&metadata_json),
            doc.created_at,
            doc.updated_at,
        );
        self.versioned.exec_sql(&insert).await?;
        Ok(())
    }

    // ---- F3: full resync versioned -> vector -----

    async fn full_resync(&self, collection: &str, commit_id: &str) -> Result<u64> {
        if !self.vector.collection_exists(collection).await? {
            self.vector.create_collection(collection, HashMap::new()).await?;
        }

        let sql = format!(
            "SELECT doc_id, content, content_hash, metadata FROM documents WHERE collection_name = '{}'",
            vmrag_versioned::escape_sql_literal(collection)
        );
        let rows = self.versioned.query_sql(&sql).await?;
        let mut applied = 0u64;

        for row in &rows {
            let doc_id = row.get("doc_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let content = row.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let content_hash = row.get("content_hash").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let metadata: HashMap<String, serde_json::Value> = row
                .get("metadata")
                .and_then(|v| v.as_str())
                .and_then(|s| serde_json::from_str(s).ok())
                .unwrap_or_default();

            let diff_row = DiffRow {
                diff_type: DiffType::Added,
                source_id: doc_id,
                from_hash: None,
                to_hash: Some(content_hash),
                to_content: Some(content),
                metadata,
            };
            self.apply_diff_row(collection, commit_id, &diff_row).await?;
            applied += 1;
        }

        self.write_sync_state(collection, commit_id).await?;
        Ok(applied)
    }

    // ---- F4: commit-range sync versioned -> vector -----

    async fn commit_range_sync(&self, collection: &str, from_commit: &str, to_commit: &str) -> Result<u64> {
        let rows = delta::commit_range_diff(self.versioned.as_ref(), from_commit, to_commit, collection).await?;
        for row in &rows {
            self.apply_diff_row(collection, to_commit, row).await?;
        }
        self.write_sync_state(collection, to_commit).await?;
        Ok(rows.len() as u64)
    }

    // ---- document-sync-log bookkeeping -----

    /// Returns `(content_hash, chunk_ids)` for `doc_id` if a log row exists.
    async fn read_sync_log(&self, collection: &str, doc_id: &str) -> Result<Option<(String, Vec<String>)>> {
        let sql = format!(
            "SELECT content_hash, chunk_ids FROM document_sync_log WHERE doc_id = '{}' AND collection_name = '{}'",
            vmrag_versioned::escape_sql_literal(doc_id),
            vmrag_versioned::escape_sql_literal(collection),
        );
        let rows = self.versioned.query_sql(&sql).await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        let hash = row.get("content_hash").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let chunk_ids: Vec<String> = row
            .get("chunk_ids")
            .and_then(|v| v.as_str())
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();
        Ok(Some((hash, chunk_ids)))
    }

    async fn upsert_sync_log(&self, collection: &str, doc_id: &str, content_hash: &str, chunk_ids: &[String]) -> Result<()> {
        self.delete_sync_log(collection, doc_id).await?;
        let chunk_ids_json = serde_json::to_string(chunk_ids)?;
        let sql = format!(
            "INSERT INTO document_sync_log (doc_id, collection_name, content_hash, chunk_ids, chunk_count, synced_at) \
             VALUES ('{}', '{}', '{}', '{}', {}, {})",
            vmrag_versioned::escape_sql_literal(doc_id),
            vmrag_versioned::escape_sql_literal(collection),
            vmrag_versioned::escape_sql_literal(content_hash),
            vmrag_versioned::escape_sql_literal(&chunk_ids_json),
            chunk_ids.len(),
            crate::now_unix(),
        );
        self.versioned.exec_sql(&sql).await?;
        Ok(())
    }

    async fn delete_sync_log(&self, collection: &str, doc_id: &str) -> Result<()> {
        let sql = format!(
            "DELETE FROM document_sync_log WHERE doc_id = '{}' AND collection_name = '{}'",
            vmrag_versioned::escape_sql_literal(doc_id),
            vmrag_versioned::escape_sql_literal(collection),
        );
        self.versioned.exec_sql(&sql).await?;
        Ok(())
    }

    // ---- sync-state -----

    async fn read_sync_state(&self, collection: &str) -> Result<Option<SyncState>> {
        let sql = format!(
            "SELECT * FROM chroma_sync_state WHERE collection_name = '{}'",
            vmrag_versioned::escape_sql_literal(collection)
        );
        let rows = self.versioned.query_sql(&sql).await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };
        Ok(Some(SyncState {
            collection_name: collection.to_string(),
            last_sync_commit: row.get("last_sync_commit").and_then(|v| v.as_str()).map(String::from),
            last_sync_at: row.get("last_sync_at").and_then(|v| v.as_i64()),
            document_count: row.get("document_count").and_then(|v| v.as_u64()).unwrap_or(0),
            chunk_count: row.get("chunk_count").and_then(|v| v.as_u64()).unwrap_or(0),
            embedding_model: row.get("embedding_model").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            sync_status: match row.get("sync_status").and_then(|v| v.as_str()) {
                Some("synced") => SyncStatus::Synced,
                Some("in_progress") => SyncStatus::InProgress,
                Some("error") => SyncStatus::Error,
                _ => SyncStatus::Pending,
            },
            error_message: row.get("error_message").and_then(|v| v.as_str()).map(String::from),
        }))
    }

    async fn write_sync_state(&self, collection: &str, commit_id: &str) -> Result<()> {
        let now = crate::now_unix();
        let delete = format!(
            "DELETE FROM chroma_sync_state WHERE collection_name = '{}'",
            vmrag_versioned::escape_sql_literal(collection)
        );
        self.versioned.exec_sql(&delete).await?;

        let insert = format!(
            "INSERT INTO chroma_sync_state (collection_name, last_sync_commit, last_sync_at, embedding_model, sync_status) \
             VALUES ('{}', '{}', {}, '{}', 'synced')",
            vmrag_versioned::escape_sql_literal(collection),
            vmrag_versioned::escape_sql_literal(commit_id),
            now,
            vmrag_versioned::escape_sql_literal(self.vector.embedding_model()),
        );
        self.versioned.exec_sql(&insert).await?;
        Ok(())
    }

    // ---- composed operations -----

    /// Stage local vector-side changes into the versioned store and commit.
    pub async fn commit(&self, branch: &str, collection: &str, message: &str, auto_stage: bool, now: i64) -> Result<CommitOutcome> {
        let _guard = self.locks.acquire(collection).await;
        let commit_before = self.versioned.head_commit().await.ok();
        let op_id = oplog::start_operation(
            self.versioned.as_ref(),
            OperationType::Commit,
            branch,
            commit_before.as_deref(),
            &[collection.to_string()],
            now,
        )
        .await?;

        let result = self.commit_inner(branch, collection, message, auto_stage, now).await;
        match &result {
            Ok(outcome) => {
                oplog::complete_operation(self.versioned.as_ref(), op_id, Some(&outcome.commit_id), &outcome.staged, now).await?;
            }
            Err(e) => {
                oplog::fail_operation(self.versioned.as_ref(), op_id, &e.to_string(), now).await?;
            }
        }
        result
    }

    async fn commit_inner(&self, _branch: &str, collection: &str, message: &str, auto_stage: bool, now: i64) -> Result<CommitOutcome> {
        let mut staged = OpCounts::new();

        if auto_stage {
            let changes = delta::local_changes_in_vector(
                self.vector.as_ref(),
                self.versioned.as_ref(),
                collection,
                self.chunker.as_ref(),
                self.chunk_overlap,
            )
            .await?;

            for doc_id in changes.new.iter().chain(changes.modified.iter()).chain(changes.deleted.iter()) {
                self.stage_document(collection, doc_id, now).await?;
            }
            staged = changes.counts();
        }

        self.versioned.add_all().await?;
        let commit_id = match self.versioned.commit(message).await {
            Ok(id) => id,
            Err(VmragError::NoChanges) => return Err(VmragError::NoChanges),
            Err(e) => return Err(e),
        };

        self.write_sync_state(collection, &commit_id).await?;
        Ok(CommitOutcome { commit_id, staged })
    }

    /// Non-forced pull: refuses if local vector-side changes exist. Forced
    /// pull discards them (equivalent to a reset after pulling).
    pub async fn pull(&self, branch: &str, collection: &str, remote: &str, force: bool, now: i64) -> Result<PullSyncOutcome> {
        let _guard = self.locks.acquire(collection).await;

        if !force {
            let changes = delta::local_changes_in_vector(
                self.vector.as_ref(),
                self.versioned.as_ref(),
                collection,
                self.chunker.as_ref(),
                self.chunk_overlap,
            )
            .await?;
            if !changes.is_empty() {
                return Err(VmragError::UncommittedChanges {
                    new: changes.new.len() as u64,
                    modified: changes.modified.len() as u64,
                    deleted: changes.deleted.len() as u64,
                });
            }
        }

        let before = self.versioned.head_commit().await?;
        let outcome = self.versioned.pull(remote, branch).await?;
        let after = self.versioned.head_commit().await?;

        let applied = if force {
            self.full_resync(collection, &after).await?
        } else {
            self.commit_range_sync(collection, &before, &after).await?
        };

        Ok(PullSyncOutcome { fast_forward: outcome.fast_forward, applied: applied as usize })
    }

    /// Non-forced checkout: refuses if local vector-side changes exist.
    /// Creating a branch clones the current collection by name; switching to
    /// an existing branch resyncs only the commits it's missing, or does a
    /// full resync if there's no recorded sync-state.
    pub async fn checkout(&self, current_branch: &str, target_branch: &str, current_collection: &str, create: bool, now: i64) -> Result<()> {
        let _guard = self.locks.acquire(current_collection).await;

        let changes = delta::local_changes_in_vector(
            self.vector.as_ref(),
            self.versioned.as_ref(),
            current_collection,
            self.chunker.as_ref(),
            self.chunk_overlap,
        )
        .await?;
        if !changes.is_empty() {
            return Err(VmragError::UncommittedChanges {
                new: changes.new.len() as u64,
                modified: changes.modified.len() as u64,
                deleted: changes.deleted.len() as u64,
            });
        }

        if let Some(collision) = naming_collision(current_branch, target_branch) {
            return Err(VmragError::NamingCollision {
                a: current_branch.to_string(),
                b: target_branch.to_string(),
                collision,
            });
        }

        let target_collection = sanitize_collection_name(target_branch);

        if create {
            self.versioned.checkout(target_branch, true).await?;
            if !self.vector.collection_exists(&target_collection).await? {
                self.clone_collection(current_collection, &target_collection).await?;
            }
            let head = self.versioned.head_commit().await?;
            self.write_sync_state(&target_collection, &head).await
        } else {
            self.versioned.checkout(target_branch, false).await?;
            let head = self.versioned.head_commit().await?;
            let state = self.read_sync_state(&target_collection).await?;

            match state {
                Some(s) if s.last_sync_commit.as_deref() == Some(head.as_str()) && self.vector.collection_exists(&target_collection).await? => {
                    info!(branch = target_branch, "checkout: collection already at head, no-op");
                    Ok(())
                }
                Some(s) => {
                    let from = s.last_sync_commit.unwrap_or_default();
                    self.commit_range_sync(&target_collection, &from, &head).await?;
                    Ok(())
                }
                None => {
                    self.full_resync(&target_collection, &head).await?;
                    Ok(())
                }
            }
        }
    }

    async fn clone_collection(&self, from_collection: &str, to_collection: &str) -> Result<()> {
        self.vector.create_collection(to_collection, HashMap::new()).await?;
        let chunks = self.vector.get_all(from_collection).await?;
        if chunks.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let metadatas: Vec<HashMap<String, serde_json::Value>> = chunks.iter().map(|c| c.metadata.clone()).collect();
        let embeddings: Option<Vec<Vec<f32>>> = chunks.iter().map(|c| c.embedding.clone()).collect::<Option<Vec<_>>>();
        self.vector.add(to_collection, &ids, &texts, embeddings, metadatas).await
    }

    /// Merge `source_branch` into the currently checked-out branch. If the
    /// versioned-store merge reports conflicts, returns them without
    /// advancing sync-state.
    pub async fn merge(&self, collection: &str, source_branch: &str, now: i64) -> Result<MergeSyncOutcome> {
        let _guard = self.locks.acquire(collection).await;

        let changes = delta::local_changes_in_vector(
            self.vector.as_ref(),
            self.versioned.as_ref(),
            collection,
            self.chunker.as_ref(),
            self.chunk_overlap,
        )
        .await?;
        if !changes.is_empty() {
            return Err(VmragError::UncommittedChanges {
                new: changes.new.len() as u64,
                modified: changes.modified.len() as u64,
                deleted: changes.deleted.len() as u64,
            });
        }

        let before = self.versioned.head_commit().await?;
        let outcome: MergeOutcome = self.versioned.merge(source_branch).await?;

        if outcome.has_conflicts {
            let conflicts = conflict::preview(self.versioned.as_ref(), collection, true).await?;
            return Ok(MergeSyncOutcome { conflicts, merge_commit: None });
        }

        let after = self.versioned.head_commit().await?;
        self.commit_range_sync(collection, &before, &after).await?;
        let _ = now;
        Ok(MergeSyncOutcome { conflicts: Vec::new(), merge_commit: outcome.merge_commit })
    }

    /// Finish a merge whose preview surfaced conflicts: apply resolutions,
    /// then resync the vector store over the resulting commit range.
    pub async fn resolve_merge(
        &self,
        collection: &str,
        before_commit: &str,
        conflicts: &[DetailedConflict],
        resolutions: &HashMap<String, ResolutionSpec>,
        auto_resolve_remaining: bool,
        merge_message: &str,
    ) -> Result<vmrag_core::ConflictOutcome> {
        let _guard = self.locks.acquire(collection).await;
        let outcome =
            conflict::execute(self.versioned.as_ref(), conflicts, resolutions, auto_resolve_remaining, merge_message).await?;

        if matches!(outcome, vmrag_core::ConflictOutcome::Resolved { .. }) {
            let after = self.versioned.head_commit().await?;
            self.commit_range_sync(collection, before_commit, &after).await?;
        }

        Ok(outcome)
    }

    /// Discard uncommitted vector-side changes and regenerate the collection
    /// from the versioned store's current head.
    pub async fn reset(&self, collection: &str, confirm_discard: bool, now: i64) -> Result<()> {
        let _guard = self.locks.acquire(collection).await;

        let changes = delta::local_changes_in_vector(
            self.vector.as_ref(),
            self.versioned.as_ref(),
            collection,
            self.chunker.as_ref(),
            self.chunk_overlap,
        )
        .await?;
        if !changes.is_empty() && !confirm_discard {
            return Err(VmragError::ConfirmationRequired {
                message: format!(
                    "reset would discard {} new, {} modified, {} deleted document(s); pass confirm_discard=true",
                    changes.new.len(),
                    changes.modified.len(),
                    changes.deleted.len()
                ),
            });
        }

        if self.vector.collection_exists(collection).await? {
            self.vector.delete_collection(collection).await?;
        }
        let head = self.versioned.head_commit().await?;
        self.full_resync(collection, &head).await?;
        let _ = now;
        Ok(())
    }

    /// Initialize the versioned store from whatever the vector store
    /// currently holds: one F2 pass per document in every collection, then
    /// one commit.
    pub async fn init_from_vector(&self, message: &str, now: i64) -> Result<String> {
        schema::init_schema(self.versioned.as_ref()).await?;
        let collections = self.vector.list_collections().await?;
        for collection in &collections {
            let _guard = self.locks.acquire(collection).await;
            let all_chunks = self.vector.get_all(collection).await?;
            let groups = converter::group_by_source(&all_chunks);
            for doc_id in groups.keys() {
                self.stage_document(collection, doc_id, now).await?;
            }
        }

        self.versioned.add_all().await?;
        let commit_id = self.versioned.commit(message).await?;

        for collection in &collections {
            self.write_sync_state(collection, &commit_id).await?;
        }
        Ok(commit_id)
    }

    /// Clone the versioned store from `remote`, optionally checking out a
    /// branch, then fully resync the resulting branch's collection.
    pub async fn clone_from_remote(&self, remote: &str, checkout_branch: Option<&str>) -> Result<()> {
        self.versioned.clone_remote(remote, checkout_branch).await?;
        let branch = match checkout_branch {
            Some(b) => b.to_string(),
            None => self.versioned.current_branch().await?,
        };
        let collection = sanitize_collection_name(&branch);
        let head = self.versioned.head_commit().await?;

        let _guard = self.locks.acquire(&collection).await;
        self.full_resync(&collection, &head).await?;
        warn!(branch = %branch, "clone_from_remote: full resync complete");
        Ok(())
    }
}

fn sql_opt_string(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("'{}'", vmrag_versioned::escape_sql_literal(v)),
        None => "NULL".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vmrag_chunk::WindowChunker;
    use vmrag_core::{ChunkRecord, ConflictRow, NativeResolutionStrategy, PullOutcome, StatusReport};

    #[test]
    fn test_sanitize_collection_name() {
        assert_eq!(sanitize_collection_name("main"), "vmrag_main");
        assert_eq!(sanitize_collection_name("feature/my_branch"), "vmrag_feature-my-branch");
    }

    #[test]
    fn test_naming_collision_detected() {
        let collision = naming_collision("feature/x", "feature_x");
        assert_eq!(collision, Some("vmrag_feature-x".to_string()));
        assert!(naming_collision("main", "main").is_none());
        assert!(naming_collision("main", "dev").is_none());
    }

    struct StubVersionedStore;

    #[async_trait]
    impl VersionedStore for StubVersionedStore {
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
            Ok(1)
        }
        async fn query_sql(&self, _statement: &str) -> Result<Vec<serde_json::Value>> {
            Ok(Vec::new())
        }
        async fn exec_scalar(&self, _statement: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[derive(Default)]
    struct RecordingVectorStore {
        dirty: Mutex<std::collections::HashSet<String>>,
    }

    #[async_trait]
    impl VectorStore for RecordingVectorStore {
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
            ids: &[String],
            _texts: &[String],
            _embeddings: Option<Vec<Vec<f32>>>,
            _metadatas: Vec<HashMap<String, serde_json::Value>>,
        ) -> Result<()> {
            // Mirrors `VectorStoreAdapter::add` marking every inserted chunk dirty.
            let mut dirty = self.dirty.lock().unwrap();
            for id in ids {
                dirty.insert(id.clone());
            }
            Ok(())
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
            unimplemented!()
        }
        async fn query_by_metadata(&self, _collection: &str, _filter: HashMap<String, serde_json::Value>) -> Result<Vec<ChunkRecord>> {
            unimplemented!()
        }
        fn embedding_model(&self) -> &str {
            "mock-embedder"
        }
        async fn mark_dirty(&self, _collection: &str, chunk_id: &str) -> Result<()> {
            self.dirty.lock().unwrap().insert(chunk_id.to_string());
            Ok(())
        }
        async fn dirty_chunk_ids(&self, _collection: &str) -> Result<Vec<String>> {
            Ok(self.dirty.lock().unwrap().iter().cloned().collect())
        }
        async fn clear_dirty(&self, _collection: &str, chunk_id: &str) -> Result<()> {
            self.dirty.lock().unwrap().remove(chunk_id);
            Ok(())
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0f32; 4]).collect())
        }
        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0f32; 4])
        }
        fn dimension(&self) -> usize {
            4
        }
        fn model_tag(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn test_apply_added_clears_dirty_flag_after_resync() {
        let versioned: Arc<dyn VersionedStore> = Arc::new(StubVersionedStore);
        let vector = Arc::new(RecordingVectorStore::default());
        let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder);
        let chunker: Arc<dyn Chunker> = Arc::new(WindowChunker::new());

        let engine = SyncEngine::new(versioned, vector.clone() as Arc<dyn VectorStore>, embedder, chunker, 512, 50);

        let row = DiffRow {
            diff_type: DiffType::Added,
            source_id: "D1".to_string(),
            from_hash: None,
            to_hash: Some("hash1".to_string()),
            to_content: Some("short document body".to_string()),
            metadata: HashMap::new(),
        };

        engine.apply_added("vmrag_main", "c1", &row).await.unwrap();

        // F3/F4's versioned-to-vector resync must not leave synced-in
        // chunks permanently dirty, or `local_changes_in_vector` would
        // report every other document as locally modified forever after.
        assert!(vector.dirty_chunk_ids("vmrag_main").await.unwrap().is_empty());
    }
}
