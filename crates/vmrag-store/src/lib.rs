//! vmrag-store - SQLite-backed vector store adapter.
//!
//! Provides `VectorStoreAdapter`, the keyed `(id, text, metadata, embedding)`
//! store behind the vector side of the sync engine. Similarity search is out
//! of scope; this crate only needs to hold what an embedder produced and
//! answer metadata-equality lookups.

mod schema;
mod sqlite;

pub use sqlite::VectorStoreAdapter;

pub use schema::{SCHEMA, SCHEMA_VERSION};

pub(crate) fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
