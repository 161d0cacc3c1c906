//! DDL for the four tables the engine keeps in the versioned store (spec.md
//! §6): the generalized `documents` table, `chroma_sync_state`,
//! `document_sync_log`, and `sync_operations`. Issued once at `init`/
//! `init_from_vector` time via the versioned store's own SQL execution path,
//! the same way every other engine write goes through it.

use vmrag_core::{Result, VersionedStore};

const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS documents (
        doc_id VARCHAR(255) NOT NULL,
        collection_name VARCHAR(255) NOT NULL,
        content LONGTEXT NOT NULL,
        content_hash CHAR(64) NOT NULL,
        title VARCHAR(512),
        doc_type VARCHAR(128),
        metadata JSON NOT NULL,
        created_at BIGINT NOT NULL,
        updated_at BIGINT NOT NULL,
        PRIMARY KEY (doc_id, collection_name)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS chroma_sync_state (
        collection_name VARCHAR(255) NOT NULL PRIMARY KEY,
        last_sync_commit VARCHAR(255),
        last_sync_at BIGINT,
        document_count BIGINT NOT NULL DEFAULT 0,
        chunk_count BIGINT NOT NULL DEFAULT 0,
        embedding_model VARCHAR(255) NOT NULL DEFAULT '',
        sync_status VARCHAR(32) NOT NULL DEFAULT 'pending',
        error_message TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS document_sync_log (
        doc_id VARCHAR(255) NOT NULL,
        collection_name VARCHAR(255) NOT NULL,
        content_hash CHAR(64) NOT NULL,
        chunk_ids JSON NOT NULL,
        chunk_count INT NOT NULL,
        synced_at BIGINT NOT NULL,
        sync_direction VARCHAR(32) NOT NULL DEFAULT 'versioned_to_vector',
        sync_action VARCHAR(32) NOT NULL DEFAULT 'added',
        PRIMARY KEY (doc_id, collection_name)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS sync_operations (
        id BIGINT NOT NULL PRIMARY KEY,
        operation_type VARCHAR(32) NOT NULL,
        branch VARCHAR(255) NOT NULL,
        commit_before VARCHAR(255),
        commit_after VARCHAR(255),
        collections JSON NOT NULL,
        counts JSON NOT NULL,
        status VARCHAR(32) NOT NULL,
        started_at BIGINT NOT NULL,
        completed_at BIGINT,
        error TEXT
    )"#,
];

/// Create every engine-owned table that doesn't already exist.
pub async fn init_schema(versioned: &dyn VersionedStore) -> Result<()> {
    for statement in STATEMENTS {
        versioned.exec_sql(statement).await?;
    }
    Ok(())
}
