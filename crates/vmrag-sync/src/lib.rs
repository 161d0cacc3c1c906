//! vmrag-sync - the bidirectional sync engine between the versioned
//! document store and the vector index store.

mod conflict;
mod converter;
mod delta;
mod engine;
mod lock;
mod oplog;
mod schema;

pub use conflict::{execute as resolve_conflicts, preview as preview_conflicts};
pub use converter::{chunks_to_document, document_to_chunks, group_by_source};
pub use delta::{commit_range_diff, deleted_in_versioned, local_changes_in_vector, pending_versioned_to_vector};
pub use engine::{
    naming_collision, sanitize_collection_name, CommitOutcome, MergeSyncOutcome, OpCounts, PullSyncOutcome,
    SyncEngine,
};
pub use lock::CollectionLocks;
pub use oplog::{complete_operation, fail_operation, recent as recent_operations, start_operation};
pub use schema::init_schema;

pub(crate) fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
