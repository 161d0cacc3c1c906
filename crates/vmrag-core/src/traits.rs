//! Core traits defining the interfaces between components.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::types::{ChunkRecord, DiffRow};

/// Branch/working-tree status as reported by the versioned store.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StatusReport {
    pub branch: String,
    pub has_staged_changes: bool,
    pub has_unstaged_changes: bool,
    pub staged_tables: Vec<String>,
    pub modified_tables: Vec<String>,
}

/// Result of `merge`.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub has_conflicts: bool,
    pub merge_commit: Option<String>,
}

/// Result of `pull`.
#[derive(Debug, Clone)]
pub struct PullOutcome {
    pub fast_forward: bool,
    pub has_conflicts: bool,
}

/// A single conflicting row as the versioned store reports it, prior to
/// classification by `vmrag_sync::conflict`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConflictRow {
    pub doc_id: String,
    pub base: Option<HashMap<String, serde_json::Value>>,
    pub ours: HashMap<String, serde_json::Value>,
    pub theirs: HashMap<String, serde_json::Value>,
}

/// A strategy accepted by the versioned store's own bulk conflict resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeResolutionStrategy {
    Ours,
    Theirs,
}

/// Typed wrapper over the external version-control CLI: branches, commits,
/// diff, merge, conflicts, remote ops, and row-level SQL execute/query.
///
/// Implementations own the CLI subprocess and its working directory
/// exclusively; no other component may read the working directory's
/// internal files.
#[async_trait]
pub trait VersionedStore: Send + Sync {
    async fn current_branch(&self) -> Result<String>;
    async fn head_commit(&self) -> Result<String>;
    async fn status(&self) -> Result<StatusReport>;

    async fn create_branch(&self, name: &str, from: Option<&str>) -> Result<()>;
    async fn delete_branch(&self, name: &str) -> Result<()>;
    async fn checkout(&self, branch: &str, create: bool) -> Result<()>;

    async fn add_all(&self) -> Result<()>;
    async fn commit(&self, message: &str) -> Result<String>;
    async fn log(&self, limit: u32) -> Result<Vec<String>>;

    async fn push(&self, remote: &str, branch: &str) -> Result<()>;
    async fn pull(&self, remote: &str, branch: &str) -> Result<PullOutcome>;
    async fn fetch(&self, remote: &str) -> Result<()>;
    async fn clone_remote(&self, remote: &str, checkout: Option<&str>) -> Result<()>;

    async fn merge(&self, source_branch: &str) -> Result<MergeOutcome>;
    async fn has_conflicts(&self) -> Result<bool>;
    async fn conflicts_for(&self, table: &str) -> Result<Vec<ConflictRow>>;
    async fn resolve_conflicts(&self, table: &str, strategy: NativeResolutionStrategy) -> Result<()>;

    async fn table_diff(&self, from_commit: &str, to_commit: &str, table: &str) -> Result<Vec<DiffRow>>;

    async fn exec_sql(&self, statement: &str) -> Result<u64>;
    async fn query_sql(&self, statement: &str) -> Result<Vec<serde_json::Value>>;
    async fn exec_scalar(&self, statement: &str) -> Result<Option<String>>;
}

/// Typed wrapper over the external vector collection: create/delete
/// collection, add/update/delete by id, get by id/filter, enumerate-all.
///
/// Implementations own the embedding-model handle and collection handles
/// exclusively.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn create_collection(&self, name: &str, metadata: HashMap<String, serde_json::Value>) -> Result<()>;
    async fn delete_collection(&self, name: &str) -> Result<()>;
    async fn list_collections(&self) -> Result<Vec<String>>;
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Merge `fields` into a collection's own metadata (the façade's
    /// `modify_collection` tool; renaming a collection is not supported).
    async fn update_collection_metadata(&self, name: &str, fields: HashMap<String, serde_json::Value>) -> Result<()>;

    /// A collection's own metadata, as last set by `create_collection` or
    /// `update_collection_metadata`.
    async fn collection_metadata(&self, name: &str) -> Result<HashMap<String, serde_json::Value>>;

    /// Adds a batch atomically. If `embeddings` is `None` the adapter asks
    /// the embedding service for vectors before writing.
    async fn add(
        &self,
        collection: &str,
        ids: &[String],
        texts: &[String],
        embeddings: Option<Vec<Vec<f32>>>,
        metadatas: Vec<HashMap<String, serde_json::Value>>,
    ) -> Result<()>;

    async fn update_metadata(
        &self,
        collection: &str,
        id: &str,
        fields: HashMap<String, serde_json::Value>,
    ) -> Result<()>;

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<ChunkRecord>>;
    async fn get_all(&self, collection: &str) -> Result<Vec<ChunkRecord>>;

    /// Equality and boolean-conjunction metadata filter, e.g.
    /// `{"is_local_change": true}`.
    async fn query_by_metadata(
        &self,
        collection: &str,
        filter: HashMap<String, serde_json::Value>,
    ) -> Result<Vec<ChunkRecord>>;

    /// The embedding model identity string this adapter was configured with.
    fn embedding_model(&self) -> &str;

    /// Mark a chunk dirty in the adapter's own dirty-set side table, taken
    /// in place of the metadata-boolean scan the design notes (spec.md §9)
    /// replace. Implementations mark a chunk dirty on every `add`,
    /// `update_metadata`, and... (intentionally not `delete`: a deleted
    /// chunk cannot be flagged, it is detected by its absence instead).
    async fn mark_dirty(&self, collection: &str, chunk_id: &str) -> Result<()>;

    /// The ids of every chunk in `collection` dirtied since it was last
    /// cleared.
    async fn dirty_chunk_ids(&self, collection: &str) -> Result<Vec<String>>;

    /// Clear the dirty flag for a single chunk once its change has been
    /// folded into the versioned store.
    async fn clear_dirty(&self, collection: &str, chunk_id: &str) -> Result<()>;
}

/// Embedding model trait. Unchanged boundary: the embedding service is an
/// external collaborator treated as a function from text chunks to
/// fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of document texts.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// The model identity string this embedder reports.
    fn model_tag(&self) -> &str;
}

/// Deterministic sliding-window chunking and overlap-detection reassembly.
pub trait Chunker: Send + Sync {
    /// Slide a window of length `chunk_size` with stride
    /// `chunk_size - chunk_overlap` over `content`, starting at offset 0.
    fn chunk(&self, content: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String>;

    /// Reverse of `chunk`: stitch chunks back into the original content by
    /// detecting the overlap between each adjacent pair.
    fn reassemble(&self, chunks: &[String], chunk_overlap: usize) -> String;
}
