//! Database schema definitions.

/// Main schema SQL for initializing the database.
///
/// Embedding vectors are stored as little-endian f32 blobs alongside their
/// chunk row. Similarity search over `embedding` is out of scope here; this
/// store only needs to round-trip whatever an [`Embedder`](vmrag_core::Embedder)
/// produced and answer metadata-equality queries.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding_model TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    id TEXT NOT NULL,
    text TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding BLOB,
    PRIMARY KEY (collection, id)
);

CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection);

-- Side table recording chunks mutated since the last sync stage. The delta
-- detector reads this set instead of scanning every chunk's metadata for an
-- `is_local_change` flag; the sync engine clears rows once a write has been
-- folded into the versioned store.
CREATE TABLE IF NOT EXISTS dirty_chunks (
    collection TEXT NOT NULL,
    chunk_id TEXT NOT NULL,
    dirtied_at INTEGER NOT NULL,
    PRIMARY KEY (collection, chunk_id)
);
"#;

/// Schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;
