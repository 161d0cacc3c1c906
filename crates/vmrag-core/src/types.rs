//! Core domain types shared by every vmrag crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A logical document as the versioned store sees it.
///
/// Composite key `(doc_id, collection_name)`. `content_hash` must equal
/// `sha256_hex(content)` at every transaction boundary; callers that mutate
/// `content` are responsible for recomputing the hash before it crosses one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub collection_name: String,
    pub content: String,
    pub content_hash: String,

    /// Extracted from `metadata["title"]` for indexed filtering, if present.
    pub title: Option<String>,

    /// Extracted from `metadata["doc_type"]` for indexed filtering, if present.
    pub doc_type: Option<String>,

    /// Every caller-provided metadata field, preserved verbatim.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Derived, not authoritative.
    pub created_at: i64,
    /// Derived, not authoritative.
    pub updated_at: i64,
}

impl Document {
    /// Build a document, deriving `content_hash`, `title`, and `doc_type`
    /// from `content` and `metadata`.
    pub fn new(
        doc_id: impl Into<String>,
        collection_name: impl Into<String>,
        content: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
        now: i64,
    ) -> Self {
        let content = content.into();
        let content_hash = crate::hash::sha256_hex(&content);
        let title = metadata
            .get("title")
            .and_then(|v| v.as_str())
            .map(String::from);
        let doc_type = metadata
            .get("doc_type")
            .and_then(|v| v.as_str())
            .map(String::from);

        Self {
            doc_id: doc_id.into(),
            collection_name: collection_name.into(),
            content,
            content_hash,
            title,
            doc_type,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `content_hash` is consistent with `content` right now.
    pub fn hash_is_consistent(&self) -> bool {
        self.content_hash == crate::hash::sha256_hex(&self.content)
    }
}

/// Collection registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionEntry {
    pub collection_name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,

    /// Opaque model tag; two collections with different tags are not
    /// interchangeable (see `SyncState::embedding_model`).
    pub embedding_model: String,

    pub chunk_size: u32,
    pub chunk_overlap: u32,

    #[serde(default)]
    pub document_count: u64,
    #[serde(default)]
    pub chunk_count: u64,
}

impl CollectionEntry {
    /// `chunk_overlap` must be strictly less than `chunk_size`.
    pub fn has_valid_chunking(&self) -> bool {
        self.chunk_size > 0 && self.chunk_overlap < self.chunk_size
    }
}

/// Status of a collection's sync-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    Pending,
    InProgress,
    Error,
}

/// Per-collection sync-state record: ties a vector-store collection to a
/// specific versioned-store commit and embedding model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub collection_name: String,
    pub last_sync_commit: Option<String>,
    pub last_sync_at: Option<i64>,
    pub document_count: u64,
    pub chunk_count: u64,
    pub embedding_model: String,
    pub sync_status: SyncStatus,
    pub error_message: Option<String>,
}

impl SyncState {
    pub fn new_unsynced(collection_name: impl Into<String>, embedding_model: impl Into<String>) -> Self {
        Self {
            collection_name: collection_name.into(),
            last_sync_commit: None,
            last_sync_at: None,
            document_count: 0,
            chunk_count: 0,
            embedding_model: embedding_model.into(),
            sync_status: SyncStatus::Pending,
            error_message: None,
        }
    }
}

/// Direction a document-sync-log row's last sync moved in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    VersionedToVector,
    VectorToVersioned,
}

/// Action recorded by a document-sync-log row's last sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Added,
    Modified,
    Deleted,
}

/// Authoritative mapping between a logical document and the chunk ids it
/// currently occupies in the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSyncLog {
    pub doc_id: String,
    pub collection_name: String,
    pub content_hash: String,
    pub chunk_ids: Vec<String>,
    pub chunk_count: u32,
    pub synced_at: i64,
    pub sync_direction: SyncDirection,
    pub sync_action: SyncAction,
}

/// A top-level version-control operation kind, as recorded in the operations log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Commit,
    Push,
    Pull,
    Merge,
    Checkout,
    Reset,
    Init,
    Clone,
}

/// Status of an in-flight or completed operation-log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Started,
    Completed,
    Failed,
}

/// Durable record of a single top-level operation, written synchronously so
/// that a crash leaves a `started` or `failed` row, never a silently missing
/// one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLog {
    pub id: i64,
    pub operation_type: OperationType,
    pub branch: String,
    pub commit_before: Option<String>,
    pub commit_after: Option<String>,
    #[serde(default)]
    pub collections: Vec<String>,
    #[serde(default)]
    pub counts: HashMap<String, u64>,
    pub status: OperationStatus,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub error: Option<String>,
}

/// The kind of change a `DiffRow` represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffType {
    Added,
    Modified,
    Removed,
}

/// A single row of a `table_diff` between two commits, as the versioned-store
/// adapter returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffRow {
    pub diff_type: DiffType,
    pub source_id: String,
    pub from_hash: Option<String>,
    pub to_hash: Option<String>,
    pub to_content: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// The kind of pending change a `DocumentDelta` represents (versioned-store
/// side, relative to the document-sync-log).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaType {
    New,
    Modified,
}

/// A document in the versioned store pending a versioned→vector sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDelta {
    pub doc_id: String,
    pub collection_name: String,
    pub delta_type: DeltaType,
    pub content: String,
    pub content_hash: String,
    pub updated_at: i64,
}

/// A document-sync-log entry whose source document no longer exists in the
/// versioned store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedDocument {
    pub doc_id: String,
    pub collection_name: String,
    pub chunk_ids: Vec<String>,
}

/// Local (vector-side) change buckets returned by `local_changes_in_vector`.
/// A document never appears in more than one bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalChanges {
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl LocalChanges {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn counts(&self) -> HashMap<String, u64> {
        let mut m = HashMap::new();
        m.insert("new".to_string(), self.new.len() as u64);
        m.insert("modified".to_string(), self.modified.len() as u64);
        m.insert("deleted".to_string(), self.deleted.len() as u64);
        m
    }
}

/// A chunk record as the vector store holds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub embedding: Option<Vec<f32>>,
}

/// Conflict classification (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    ContentModification,
    MetadataConflict,
    AddAdd,
    DeleteModify,
    Schema,
}

/// A resolution strategy a caller may choose for one conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    KeepOurs,
    KeepTheirs,
    FieldMerge,
    Custom,
}

/// A full conflict record produced by a merge preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedConflict {
    pub conflict_id: String,
    pub collection_name: String,
    pub doc_id: String,
    pub conflict_type: ConflictType,

    pub base: Option<HashMap<String, serde_json::Value>>,
    pub ours: HashMap<String, serde_json::Value>,
    pub theirs: HashMap<String, serde_json::Value>,

    /// Fields changed on `ours` relative to `base`, and on `theirs`
    /// relative to `base`, respectively.
    pub ours_changed_fields: Vec<String>,
    pub theirs_changed_fields: Vec<String>,

    pub auto_resolvable: bool,
    pub suggested_resolution: Option<ResolutionKind>,
    pub resolution_options: Vec<ResolutionKind>,
}

/// Caller-supplied resolution for a single conflict, keyed by `conflict_id`
/// at the call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionSpec {
    KeepOurs,
    KeepTheirs,
    FieldMerge {
        /// field name -> which side to take
        field_resolutions: HashMap<String, FieldSource>,
    },
    Custom {
        custom_values: HashMap<String, serde_json::Value>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Ours,
    Theirs,
}

/// Outcome of resolving one or more conflicts, per the unified tagged result
/// adopted in place of mixed exceptions/return values (design notes §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConflictOutcome {
    Resolved {
        resolved: u32,
    },
    Unresolved {
        resolved: u32,
        remaining: Vec<String>,
    },
    AdapterError {
        message: String,
    },
    InvariantViolation {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_new_derives_hash_title_type() {
        let mut meta = HashMap::new();
        meta.insert("title".to_string(), serde_json::json!("Hello"));
        meta.insert("doc_type".to_string(), serde_json::json!("note"));
        meta.insert("author".to_string(), serde_json::json!("Ada"));

        let doc = Document::new("D1", "c1", "hello world", meta, 1000);
        assert_eq!(doc.title.as_deref(), Some("Hello"));
        assert_eq!(doc.doc_type.as_deref(), Some("note"));
        assert_eq!(doc.content_hash, crate::hash::sha256_hex("hello world"));
        assert!(doc.hash_is_consistent());
        assert_eq!(doc.metadata.get("author").unwrap(), "Ada");
    }

    #[test]
    fn test_collection_entry_valid_chunking() {
        let entry = CollectionEntry {
            collection_name: "c".to_string(),
            display_name: None,
            description: None,
            embedding_model: "m1".to_string(),
            chunk_size: 512,
            chunk_overlap: 50,
            document_count: 0,
            chunk_count: 0,
        };
        assert!(entry.has_valid_chunking());

        let invalid = CollectionEntry {
            chunk_overlap: 512,
            ..entry
        };
        assert!(!invalid.has_valid_chunking());
    }

    #[test]
    fn test_local_changes_is_empty_and_counts() {
        let mut lc = LocalChanges::default();
        assert!(lc.is_empty());
        lc.new.push("D1".to_string());
        lc.modified.push("D2".to_string());
        assert!(!lc.is_empty());
        let counts = lc.counts();
        assert_eq!(counts["new"], 1);
        assert_eq!(counts["modified"], 1);
        assert_eq!(counts["deleted"], 0);
    }
}
