//! Tool façade over the sync engine: thin JSON-in/JSON-out wrappers that
//! validate, dispatch, and shape results into the success/error envelope an
//! external caller expects. Each public method on [`VmragServer`] is one
//! tool; none of them touch the versioned store's working directory or the
//! vector store's database directly, they only call through the three
//! adapter traits and [`vmrag_sync::SyncEngine`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use vmrag_core::{Chunker, Embedder, Result, VectorStore, VersionedStore, VmragError};
use vmrag_sync::SyncEngine;

/// Façade state: the three adapters plus the engine built from them.
pub struct VmragServer {
    versioned: Arc<dyn VersionedStore>,
    vector: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    engine: SyncEngine,
}

/// The envelope every tool call returns: `{ success, ..., message }` on
/// success, `{ success: false, error, message, details?, suggestions? }` on
/// failure.
#[derive(Debug, Serialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(flatten)]
    pub data: serde_json::Map<String, Value>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ToolResult {
    pub fn success(message: impl Into<String>, data: serde_json::Map<String, Value>) -> Self {
        Self {
            success: true,
            data,
            message: message.into(),
            error: None,
            details: None,
            suggestions: Vec::new(),
        }
    }

    pub fn from_error(err: VmragError) -> Self {
        let suggestions = suggestions_for(&err);
        Self {
            success: false,
            data: serde_json::Map::new(),
            message: err.to_string(),
            error: Some(err.error_code().to_string()),
            details: None,
            suggestions,
        }
    }
}

fn suggestions_for(err: &VmragError) -> Vec<String> {
    match err {
        VmragError::UncommittedChanges { .. } => vec![
            "commit the pending changes first".to_string(),
            "or retry with force=true to discard them".to_string(),
        ],
        VmragError::ConfirmationRequired { .. } => {
            vec!["retry with the required confirmation flag set to true".to_string()]
        }
        VmragError::CollectionNotFound { .. } => vec!["call create_collection first".to_string()],
        VmragError::CollectionExists { .. } => vec!["choose a different collection name, or delete the existing one first".to_string()],
        VmragError::NamingCollision { .. } => {
            vec!["choose a branch name that doesn't collide with an existing one after sanitization".to_string()]
        }
        VmragError::NotInitialized { .. } => vec!["call init or clone first".to_string()],
        _ => Vec::new(),
    }
}

fn obj(pairs: Vec<(&str, Value)>) -> serde_json::Map<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn chunk_to_json(chunk: vmrag_core::ChunkRecord) -> Value {
    json!({ "id": chunk.id, "document": chunk.text, "metadata": chunk.metadata })
}

// ---- Document tool parameters -----

#[derive(Debug, Deserialize)]
pub struct CollectionNameParams {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PeekParams {
    pub name: String,
    #[serde(default = "default_peek_limit")]
    pub limit: usize,
}
fn default_peek_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, Default)]
pub struct CreateCollectionParams {
    pub name: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ModifyCollectionParams {
    pub name: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteCollectionParams {
    pub name: String,
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddDocumentsParams {
    pub collection: String,
    pub documents: Vec<String>,
    #[serde(default)]
    pub ids: Option<Vec<String>>,
    #[serde(default)]
    pub metadatas: Option<Vec<HashMap<String, Value>>>,
}

#[derive(Debug, Deserialize)]
pub struct QueryDocumentsParams {
    pub collection: String,
    #[serde(default)]
    pub filter: HashMap<String, Value>,
    #[serde(default = "default_query_limit")]
    pub limit: usize,
}
fn default_query_limit() -> usize {
    10
}

#[derive(Debug, Deserialize)]
pub struct GetDocumentsParams {
    pub collection: String,
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDocumentsParams {
    pub collection: String,
    pub ids: Vec<String>,
    pub metadatas: Vec<HashMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteDocumentsParams {
    pub collection: String,
    pub ids: Vec<String>,
}

// ---- VC tool parameters -----

#[derive(Debug, Deserialize)]
pub struct CommitsParams {
    #[serde(default = "default_commits_limit")]
    pub limit: u32,
}
fn default_commits_limit() -> u32 {
    20
}

#[derive(Debug, Deserialize)]
pub struct InitParams {
    #[serde(default = "default_init_message")]
    pub message: String,
}
fn default_init_message() -> String {
    "initial sync from vector store".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CloneParams {
    pub remote: String,
    #[serde(default)]
    pub checkout_branch: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FetchParams {
    #[serde(default = "default_remote")]
    pub remote: String,
}

#[derive(Debug, Deserialize)]
pub struct PullParams {
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct PushParams {
    #[serde(default = "default_remote")]
    pub remote: String,
}
fn default_remote() -> String {
    "origin".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CommitParams {
    pub message: String,
    #[serde(default = "default_true")]
    pub auto_stage: bool,
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CheckoutParams {
    pub branch: String,
    #[serde(default)]
    pub create: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct ResetParams {
    #[serde(default)]
    pub confirm_discard: bool,
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl VmragServer {
    pub fn new(
        versioned: Arc<dyn VersionedStore>,
        vector: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chunker: Arc<dyn Chunker>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        let engine = SyncEngine::new(versioned.clone(), vector.clone(), embedder.clone(), chunker, chunk_size, chunk_overlap);
        Self { versioned, vector, embedder, engine }
    }

    pub fn info() -> crate::tools::ServerInfo {
        crate::tools::info()
    }

    pub fn tools() -> Vec<crate::tools::ToolInfo> {
        crate::tools::tool_catalog()
    }

    async fn require_collection(&self, name: &str) -> Result<()> {
        if self.vector.collection_exists(name).await? {
            Ok(())
        } else {
            Err(VmragError::CollectionNotFound { name: name.to_string() })
        }
    }

    // ---- Document tools (spec.md §6) -----

    pub async fn list_collections(&self) -> ToolResult {
        match self.vector.list_collections().await {
            Ok(collections) => {
                ToolResult::success(format!("{} collection(s)", collections.len()), obj(vec![("collections", json!(collections))]))
            }
            Err(e) => ToolResult::from_error(e),
        }
    }

    pub async fn get_collection_info(&self, params: CollectionNameParams) -> ToolResult {
        if let Err(e) = self.require_collection(&params.name).await {
            return ToolResult::from_error(e);
        }
        let metadata = match self.vector.collection_metadata(&params.name).await {
            Ok(m) => m,
            Err(e) => return ToolResult::from_error(e),
        };
        let chunks = match self.vector.get_all(&params.name).await {
            Ok(c) => c,
            Err(e) => return ToolResult::from_error(e),
        };
        let document_count = vmrag_sync::group_by_source(&chunks).len();

        ToolResult::success(
            format!("info for '{}'", params.name),
            obj(vec![
                ("name", json!(params.name)),
                ("embedding_model", json!(self.vector.embedding_model())),
                ("document_count", json!(document_count)),
                ("chunk_count", json!(chunks.len())),
                ("metadata", json!(metadata)),
            ]),
        )
    }

    pub async fn get_collection_count(&self, params: CollectionNameParams) -> ToolResult {
        if let Err(e) = self.require_collection(&params.name).await {
            return ToolResult::from_error(e);
        }
        match self.vector.get_all(&params.name).await {
            Ok(chunks) => ToolResult::success(
                format!("{} chunk(s) in '{}'", chunks.len(), params.name),
                obj(vec![("name", json!(params.name)), ("count", json!(chunks.len()))]),
            ),
            Err(e) => ToolResult::from_error(e),
        }
    }

    pub async fn peek_collection(&self, params: PeekParams) -> ToolResult {
        if let Err(e) = self.require_collection(&params.name).await {
            return ToolResult::from_error(e);
        }
        match self.vector.get_all(&params.name).await {
            Ok(chunks) => {
                let peeked: Vec<Value> = chunks.into_iter().take(params.limit).map(chunk_to_json).collect();
                ToolResult::success(
                    format!("peeked {} chunk(s) from '{}'", peeked.len(), params.name),
                    obj(vec![("name", json!(params.name)), ("documents", json!(peeked))]),
                )
            }
            Err(e) => ToolResult::from_error(e),
        }
    }

    pub async fn create_collection(&self, params: CreateCollectionParams) -> ToolResult {
        info!(name = %params.name, "create_collection");
        match self.vector.create_collection(&params.name, params.metadata).await {
            Ok(()) => ToolResult::success(format!("collection '{}' created", params.name), obj(vec![("name", json!(params.name))])),
            Err(e) => ToolResult::from_error(e),
        }
    }

    pub async fn modify_collection(&self, params: ModifyCollectionParams) -> ToolResult {
        match self.vector.update_collection_metadata(&params.name, params.metadata).await {
            Ok(()) => ToolResult::success(format!("collection '{}' updated", params.name), obj(vec![("name", json!(params.name))])),
            Err(e) => ToolResult::from_error(e),
        }
    }

    pub async fn delete_collection(&self, params: DeleteCollectionParams) -> ToolResult {
        if !params.confirm {
            return ToolResult::from_error(VmragError::ConfirmationRequired {
                message: format!("delete_collection('{}') requires confirm=true", params.name),
            });
        }
        match self.vector.delete_collection(&params.name).await {
            Ok(()) => ToolResult::success(format!("collection '{}' deleted", params.name), serde_json::Map::new()),
            Err(e) => ToolResult::from_error(e),
        }
    }

    /// Caller-supplied ids are used verbatim; omitted ids are generated with
    /// a ULID, the same scheme the document type's constructor used before
    /// this façade existed.
    ///
    /// Each entry in `documents` is treated as one whole logical document
    /// stored as a single chunk (`chunk_index` 0 of 1) — callers that need
    /// multi-chunk documents pre-chunk them before calling. The system
    /// metadata fields `stage_document`/`chunks_to_document` rely on
    /// (`source_id`, `collection_name`, `content_hash`, `chunk_index`,
    /// `total_chunks`) are filled in here so a document added this way can
    /// later be staged into the versioned store like any other.
    pub async fn add_documents(&self, params: AddDocumentsParams) -> ToolResult {
        let n = params.documents.len();

        let ids = match params.ids {
            Some(ids) if ids.len() == n => ids,
            Some(_) => return ToolResult::from_error(VmragError::invalid_argument("ids must have the same length as documents")),
            None => (0..n).map(|_| ulid::Ulid::new().to_string()).collect(),
        };
        let caller_metadatas = match params.metadatas {
            Some(m) if m.len() == n => m,
            Some(_) => return ToolResult::from_error(VmragError::invalid_argument("metadatas must have the same length as documents")),
            None => (0..n).map(|_| HashMap::new()).collect(),
        };

        let metadatas: Vec<HashMap<String, Value>> = ids
            .iter()
            .zip(params.documents.iter())
            .zip(caller_metadatas)
            .map(|((id, content), mut fields)| {
                fields.insert("source_id".to_string(), json!(id));
                fields.insert("collection_name".to_string(), json!(params.collection));
                fields.insert("content_hash".to_string(), json!(vmrag_core::hash::sha256_hex(content)));
                fields.insert("chunk_index".to_string(), json!(0));
                fields.insert("total_chunks".to_string(), json!(1));
                fields
            })
            .collect();

        let refs: Vec<&str> = params.documents.iter().map(String::as_str).collect();
        let embeddings = match self.embedder.embed_documents(&refs).await {
            Ok(e) => e,
            Err(e) => return ToolResult::from_error(e),
        };

        match self.vector.add(&params.collection, &ids, &params.documents, Some(embeddings), metadatas).await {
            Ok(()) => ToolResult::success(format!("added {n} document(s)"), obj(vec![("ids", json!(ids))])),
            Err(e) => ToolResult::from_error(e),
        }
    }

    /// Only the equality/boolean-conjunction subset of the filter language
    /// is supported; the adapter's `query_by_metadata` carries no richer
    /// operators (spec.md §4.5).
    pub async fn query_documents(&self, params: QueryDocumentsParams) -> ToolResult {
        match self.vector.query_by_metadata(&params.collection, params.filter).await {
            Ok(chunks) => {
                let results: Vec<Value> = chunks.into_iter().take(params.limit).map(chunk_to_json).collect();
                ToolResult::success(format!("{} result(s)", results.len()), obj(vec![("documents", json!(results))]))
            }
            Err(e) => ToolResult::from_error(e),
        }
    }

    pub async fn get_documents(&self, params: GetDocumentsParams) -> ToolResult {
        let mut found = Vec::with_capacity(params.ids.len());
        for id in &params.ids {
            match self.vector.get(&params.collection, id).await {
                Ok(Some(chunk)) => found.push(chunk_to_json(chunk)),
                Ok(None) => {}
                Err(e) => return ToolResult::from_error(e),
            }
        }
        ToolResult::success(
            format!("{} of {} requested id(s) found", found.len(), params.ids.len()),
            obj(vec![("documents", json!(found))]),
        )
    }

    pub async fn update_documents(&self, params: UpdateDocumentsParams) -> ToolResult {
        if params.ids.len() != params.metadatas.len() {
            return ToolResult::from_error(VmragError::invalid_argument("ids and metadatas must have the same length"));
        }
        for (id, fields) in params.ids.iter().zip(params.metadatas.into_iter()) {
            if let Err(e) = self.vector.update_metadata(&params.collection, id, fields).await {
                return ToolResult::from_error(e);
            }
        }
        ToolResult::success(format!("updated {} document(s)", params.ids.len()), serde_json::Map::new())
    }

    pub async fn delete_documents(&self, params: DeleteDocumentsParams) -> ToolResult {
        match self.vector.delete(&params.collection, &params.ids).await {
            Ok(()) => ToolResult::success(format!("deleted {} document(s)", params.ids.len()), serde_json::Map::new()),
            Err(e) => ToolResult::from_error(e),
        }
    }

    // ---- VC tools (spec.md §6, scoped subset - see DESIGN.md) -----

    pub async fn status(&self) -> ToolResult {
        match self.versioned.status().await {
            Ok(report) => ToolResult::success(
                "status ok",
                obj(vec![
                    ("branch", json!(report.branch)),
                    ("has_staged_changes", json!(report.has_staged_changes)),
                    ("has_unstaged_changes", json!(report.has_unstaged_changes)),
                    ("staged_tables", json!(report.staged_tables)),
                    ("modified_tables", json!(report.modified_tables)),
                ]),
            ),
            Err(e) => ToolResult::from_error(e),
        }
    }

    pub async fn commits(&self, params: CommitsParams) -> ToolResult {
        match self.versioned.log(params.limit).await {
            Ok(commits) => ToolResult::success(format!("{} commit(s)", commits.len()), obj(vec![("commits", json!(commits))])),
            Err(e) => ToolResult::from_error(e),
        }
    }

    pub async fn init(&self, params: InitParams) -> ToolResult {
        match self.engine.init_from_vector(&params.message, now_unix()).await {
            Ok(commit_id) => {
                ToolResult::success("initialized the versioned store from the vector store", obj(vec![("commit_id", json!(commit_id))]))
            }
            Err(e) => ToolResult::from_error(e),
        }
    }

    pub async fn clone(&self, params: CloneParams) -> ToolResult {
        match self.engine.clone_from_remote(&params.remote, params.checkout_branch.as_deref()).await {
            Ok(()) => ToolResult::success(format!("cloned from '{}'", params.remote), serde_json::Map::new()),
            Err(e) => ToolResult::from_error(e),
        }
    }

    pub async fn fetch(&self, params: FetchParams) -> ToolResult {
        match self.versioned.fetch(&params.remote).await {
            Ok(()) => ToolResult::success(format!("fetched from '{}'", params.remote), serde_json::Map::new()),
            Err(e) => ToolResult::from_error(e),
        }
    }

    pub async fn pull(&self, params: PullParams) -> ToolResult {
        let branch = match self.versioned.current_branch().await {
            Ok(b) => b,
            Err(e) => return ToolResult::from_error(e),
        };
        let collection = vmrag_sync::sanitize_collection_name(&branch);
        match self.engine.pull(&branch, &collection, &params.remote, params.force, now_unix()).await {
            Ok(outcome) => ToolResult::success(
                "pull complete",
                obj(vec![("fast_forward", json!(outcome.fast_forward)), ("applied", json!(outcome.applied))]),
            ),
            Err(e) => ToolResult::from_error(e),
        }
    }

    pub async fn push(&self, params: PushParams) -> ToolResult {
        let branch = match self.versioned.current_branch().await {
            Ok(b) => b,
            Err(e) => return ToolResult::from_error(e),
        };
        match self.versioned.push(&params.remote, &branch).await {
            Ok(()) => ToolResult::success(format!("pushed '{branch}' to '{}'", params.remote), serde_json::Map::new()),
            Err(e) => ToolResult::from_error(e),
        }
    }

    pub async fn commit(&self, params: CommitParams) -> ToolResult {
        let branch = match self.versioned.current_branch().await {
            Ok(b) => b,
            Err(e) => return ToolResult::from_error(e),
        };
        let collection = vmrag_sync::sanitize_collection_name(&branch);
        match self.engine.commit(&branch, &collection, &params.message, params.auto_stage, now_unix()).await {
            Ok(outcome) => ToolResult::success(
                "commit complete",
                obj(vec![("commit_id", json!(outcome.commit_id)), ("staged", json!(outcome.staged))]),
            ),
            Err(e) => ToolResult::from_error(e),
        }
    }

    pub async fn checkout(&self, params: CheckoutParams) -> ToolResult {
        let current_branch = match self.versioned.current_branch().await {
            Ok(b) => b,
            Err(e) => return ToolResult::from_error(e),
        };
        let current_collection = vmrag_sync::sanitize_collection_name(&current_branch);
        match self
            .engine
            .checkout(&current_branch, &params.branch, &current_collection, params.create, now_unix())
            .await
        {
            Ok(()) => ToolResult::success(format!("checked out '{}'", params.branch), obj(vec![("branch", json!(params.branch))])),
            Err(e) => ToolResult::from_error(e),
        }
    }

    pub async fn reset(&self, params: ResetParams) -> ToolResult {
        let branch = match self.versioned.current_branch().await {
            Ok(b) => b,
            Err(e) => return ToolResult::from_error(e),
        };
        let collection = vmrag_sync::sanitize_collection_name(&branch);
        match self.engine.reset(&collection, params.confirm_discard, now_unix()).await {
            Ok(()) => ToolResult::success(format!("reset '{branch}' to its head commit"), serde_json::Map::new()),
            Err(e) => ToolResult::from_error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use vmrag_chunk::WindowChunker;
    use vmrag_core::{ConflictRow, DiffRow, MergeOutcome, NativeResolutionStrategy, PullOutcome, StatusReport};
    use vmrag_embed::MockEmbedder;
    use vmrag_store::VectorStoreAdapter;

    /// An in-process stand-in for the versioned store's CLI subprocess:
    /// enough to exercise the façade's dispatch and the engine's F1-F4 flows
    /// without a real CLI on PATH. No branches, no remotes, no conflicts.
    struct InMemoryVersionedStore {
        branch: Mutex<String>,
        head: Mutex<u32>,
    }

    impl InMemoryVersionedStore {
        fn new() -> Self {
            Self { branch: Mutex::new("main".to_string()), head: Mutex::new(0) }
        }
    }

    #[async_trait]
    impl VersionedStore for InMemoryVersionedStore {
        async fn current_branch(&self) -> Result<String> {
            Ok(self.branch.lock().unwrap().clone())
        }
        async fn head_commit(&self) -> Result<String> {
            Ok(format!("c{}", *self.head.lock().unwrap()))
        }
        async fn status(&self) -> Result<StatusReport> {
            Ok(StatusReport {
                branch: self.branch.lock().unwrap().clone(),
                has_staged_changes: false,
                has_unstaged_changes: false,
                staged_tables: Vec::new(),
                modified_tables: Vec::new(),
            })
        }
        async fn create_branch(&self, _name: &str, _from: Option<&str>) -> Result<()> {
            Ok(())
        }
        async fn delete_branch(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn checkout(&self, branch: &str, _create: bool) -> Result<()> {
            *self.branch.lock().unwrap() = branch.to_string();
            Ok(())
        }
        async fn add_all(&self) -> Result<()> {
            Ok(())
        }
        async fn commit(&self, _message: &str) -> Result<String> {
            let mut head = self.head.lock().unwrap();
            *head += 1;
            Ok(format!("c{}", *head))
        }
        async fn log(&self, _limit: u32) -> Result<Vec<String>> {
            Ok(vec![format!("c{} initial", *self.head.lock().unwrap())])
        }
        async fn push(&self, _remote: &str, _branch: &str) -> Result<()> {
            Ok(())
        }
        async fn pull(&self, _remote: &str, _branch: &str) -> Result<PullOutcome> {
            Ok(PullOutcome { fast_forward: true, has_conflicts: false })
        }
        async fn fetch(&self, _remote: &str) -> Result<()> {
            Ok(())
        }
        async fn clone_remote(&self, _remote: &str, _checkout: Option<&str>) -> Result<()> {
            Ok(())
        }
        async fn merge(&self, _source_branch: &str) -> Result<MergeOutcome> {
            Ok(MergeOutcome { has_conflicts: false, merge_commit: Some("c1".to_string()) })
        }
        async fn has_conflicts(&self) -> Result<bool> {
            Ok(false)
        }
        async fn conflicts_for(&self, _table: &str) -> Result<Vec<ConflictRow>> {
            Ok(Vec::new())
        }
        async fn resolve_conflicts(&self, _table: &str, _strategy: NativeResolutionStrategy) -> Result<()> {
            Ok(())
        }
        async fn table_diff(&self, _from_commit: &str, _to_commit: &str, _table: &str) -> Result<Vec<DiffRow>> {
            Ok(Vec::new())
        }
        async fn exec_sql(&self, _statement: &str) -> Result<u64> {
            Ok(0)
        }
        async fn query_sql(&self, _statement: &str) -> Result<Vec<Value>> {
            Ok(Vec::new())
        }
        async fn exec_scalar(&self, _statement: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn server() -> VmragServer {
        VmragServer::new(
            Arc::new(InMemoryVersionedStore::new()),
            Arc::new(VectorStoreAdapter::open_memory("mock-embedder").unwrap()),
            Arc::new(MockEmbedder::new()),
            Arc::new(WindowChunker::new()),
            512,
            50,
        )
    }

    #[tokio::test]
    async fn test_list_collections_empty() {
        let server = server();
        let result = server.list_collections().await;
        assert!(result.success);
        assert_eq!(result.data["collections"], json!([]));
    }

    #[tokio::test]
    async fn test_create_then_list_collection() {
        let server = server();
        let result = server.create_collection(CreateCollectionParams { name: "notes".to_string(), metadata: HashMap::new() }).await;
        assert!(result.success);

        let result = server.list_collections().await;
        assert_eq!(result.data["collections"], json!(["notes"]));
    }

    #[tokio::test]
    async fn test_get_collection_info_missing_returns_not_found() {
        let server = server();
        let result = server.get_collection_info(CollectionNameParams { name: "ghost".to_string() }).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("COLLECTION_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_modify_collection_merges_metadata() {
        let server = server();
        server
            .create_collection(CreateCollectionParams {
                name: "notes".to_string(),
                metadata: HashMap::from([("owner".to_string(), json!("ada"))]),
            })
            .await;

        server
            .modify_collection(ModifyCollectionParams {
                name: "notes".to_string(),
                metadata: HashMap::from([("owner".to_string(), json!("grace"))]),
            })
            .await;

        let result = server.get_collection_info(CollectionNameParams { name: "notes".to_string() }).await;
        assert_eq!(result.data["metadata"]["owner"], json!("grace"));
    }

    #[tokio::test]
    async fn test_delete_collection_requires_confirm() {
        let server = server();
        server.create_collection(CreateCollectionParams { name: "notes".to_string(), metadata: HashMap::new() }).await;

        let result = server.delete_collection(DeleteCollectionParams { name: "notes".to_string(), confirm: false }).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("CONFIRMATION_REQUIRED"));

        let result = server.delete_collection(DeleteCollectionParams { name: "notes".to_string(), confirm: true }).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_add_and_get_documents_generates_ids() {
        let server = server();
        server.create_collection(CreateCollectionParams { name: "notes".to_string(), metadata: HashMap::new() }).await;

        let add = server
            .add_documents(AddDocumentsParams {
                collection: "notes".to_string(),
                documents: vec!["hello world".to_string(), "second note".to_string()],
                ids: None,
                metadatas: None,
            })
            .await;
        assert!(add.success);
        let ids: Vec<String> = serde_json::from_value(add.data["ids"].clone()).unwrap();
        assert_eq!(ids.len(), 2);

        let got = server.get_documents(GetDocumentsParams { collection: "notes".to_string(), ids: ids.clone() }).await;
        assert!(got.success);
        assert_eq!(got.data["documents"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_query_documents_by_metadata_equality() {
        let server = server();
        server.create_collection(CreateCollectionParams { name: "notes".to_string(), metadata: HashMap::new() }).await;
        server
            .add_documents(AddDocumentsParams {
                collection: "notes".to_string(),
                documents: vec!["a".to_string(), "b".to_string()],
                ids: Some(vec!["id1".to_string(), "id2".to_string()]),
                metadatas: Some(vec![
                    HashMap::from([("tag".to_string(), json!("keep"))]),
                    HashMap::from([("tag".to_string(), json!("drop"))]),
                ]),
            })
            .await;

        let result = server
            .query_documents(QueryDocumentsParams {
                collection: "notes".to_string(),
                filter: HashMap::from([("tag".to_string(), json!("keep"))]),
                limit: 10,
            })
            .await;
        let docs = result.data["documents"].as_array().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["id"], json!("id1"));
    }

    #[tokio::test]
    async fn test_update_and_delete_documents() {
        let server = server();
        server.create_collection(CreateCollectionParams { name: "notes".to_string(), metadata: HashMap::new() }).await;
        server
            .add_documents(AddDocumentsParams {
                collection: "notes".to_string(),
                documents: vec!["a".to_string()],
                ids: Some(vec!["id1".to_string()]),
                metadatas: None,
            })
            .await;

        let update = server
            .update_documents(UpdateDocumentsParams {
                collection: "notes".to_string(),
                ids: vec!["id1".to_string()],
                metadatas: vec![HashMap::from([("tag".to_string(), json!("updated"))])],
            })
            .await;
        assert!(update.success);

        let delete = server.delete_documents(DeleteDocumentsParams { collection: "notes".to_string(), ids: vec!["id1".to_string()] }).await;
        assert!(delete.success);

        let got = server.get_documents(GetDocumentsParams { collection: "notes".to_string(), ids: vec!["id1".to_string()] }).await;
        assert_eq!(got.data["documents"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_status_reports_current_branch() {
        let server = server();
        let result = server.status().await;
        assert!(result.success);
        assert_eq!(result.data["branch"], json!("main"));
    }

    #[tokio::test]
    async fn test_init_then_commit_roundtrip() {
        let server = server();
        server.create_collection(CreateCollectionParams { name: "vmrag_main".to_string(), metadata: HashMap::new() }).await;
        server
            .add_documents(AddDocumentsParams {
                collection: "vmrag_main".to_string(),
                documents: vec!["hello world, this is a long enough document to chunk".to_string()],
                ids: Some(vec!["doc1".to_string()]),
                metadatas: None,
            })
            .await;

        let init = server.init(InitParams { message: "initial import".to_string() }).await;
        assert!(init.success);

        let commits = server.commits(CommitsParams { limit: 5 }).await;
        assert!(commits.success);
    }

    #[tokio::test]
    async fn test_reset_without_changes_is_ok() {
        let server = server();
        server.create_collection(CreateCollectionParams { name: "vmrag_main".to_string(), metadata: HashMap::new() }).await;
        let result = server.reset(ResetParams { confirm_discard: false }).await;
        assert!(result.success);
    }
}
