//! Translates between a logical [`Document`] and its chunk representation,
//! preserving user metadata verbatim.

use std::collections::HashMap;

use serde_json::Value;
use sha2::{Digest, Sha256};
use vmrag_core::{ChunkRecord, Chunker, Document, Result, VmragError};

const FIELD_SOURCE_ID: &str = "source_id";
const FIELD_COLLECTION_NAME: &str = "collection_name";
const FIELD_CONTENT_HASH: &str = "content_hash";
const FIELD_COMMIT_ID: &str = "commit_id";
const FIELD_CHUNK_INDEX: &str = "chunk_index";
const FIELD_TOTAL_CHUNKS: &str = "total_chunks";

/// Split a document into chunk ids, chunk texts, and per-chunk metadata.
///
/// The chunk id for position `i` is `"{doc_id}_chunk_{i}"`. Per-chunk
/// metadata is the document's own metadata plus the system fields
/// (`source_id`, `collection_name`, `content_hash`, `commit_id`,
/// `chunk_index`, `total_chunks`); `title`/`doc_type`, if present in the
/// document's metadata, ride along unchanged since they're already part of
/// it.
pub fn document_to_chunks(
    doc: &Document,
    current_commit_id: &str,
    chunker: &dyn Chunker,
    chunk_size: usize,
    chunk_overlap: usize,
) -> (Vec<String>, Vec<String>, Vec<HashMap<String, Value>>) {
    let texts = chunker.chunk(&doc.content, chunk_size, chunk_overlap);
    let total_chunks = texts.len();

    let mut ids = Vec::with_capacity(total_chunks);
    let mut metadatas = Vec::with_capacity(total_chunks);

    for (i, _) in texts.iter().enumerate() {
        ids.push(format!("{}_chunk_{}", doc.doc_id, i));

        let mut metadata = doc.metadata.clone();
        metadata.insert(FIELD_SOURCE_ID.to_string(), Value::String(doc.doc_id.clone()));
        metadata.insert(
            FIELD_COLLECTION_NAME.to_string(),
            Value::String(doc.collection_name.clone()),
        );
        metadata.insert(
            FIELD_CONTENT_HASH.to_string(),
            Value::String(doc.content_hash.clone()),
        );
        metadata.insert(
            FIELD_COMMIT_ID.to_string(),
            Value::String(current_commit_id.to_string()),
        );
        metadata.insert(FIELD_CHUNK_INDEX.to_string(), Value::from(i));
        metadata.insert(FIELD_TOTAL_CHUNKS.to_string(), Value::from(total_chunks));

        metadatas.push(metadata);
    }

    (ids, texts, metadatas)
}

/// Reassemble a document from its ordered chunks (by `chunk_index`).
///
/// System fields are stripped from the first chunk's metadata; what remains
/// is the document's user metadata. `content_hash` is recomputed from the
/// reassembled content, never trusted from the stored value.
pub fn chunks_to_document(
    chunks: &[ChunkRecord],
    chunker: &dyn Chunker,
    chunk_overlap: usize,
    now: i64,
) -> Result<Document> {
    if chunks.is_empty() {
        return Err(VmragError::invalid_argument("cannot build a document from an empty chunk list"));
    }

    let mut ordered = chunks.to_vec();
    ordered.sort_by_key(|c| chunk_index_of(c));

    for (expected, chunk) in ordered.iter().enumerate() {
        let actual = chunk_index_of(chunk);
        if actual != expected as i64 {
            return Err(VmragError::invalid_argument(format!(
                "chunk_index is not 0-based contiguous: expected {expected}, found {actual}"
            )));
        }
    }

    let texts: Vec<String> = ordered.iter().map(|c| c.text.clone()).collect();
    let content = chunker.reassemble(&texts, chunk_overlap);
    let content_hash = vmrag_core::hash::sha256_hex(&content);

    let mut metadata = ordered[0].metadata.clone();
    let doc_id = metadata
        .remove(FIELD_SOURCE_ID)
        .and_then(|v| v.as_str().map(String::from))
        .ok_or_else(|| VmragError::invalid_argument("first chunk is missing source_id"))?;
    let collection_name = metadata
        .remove(FIELD_COLLECTION_NAME)
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default();
    metadata.remove(FIELD_CONTENT_HASH);
    metadata.remove(FIELD_COMMIT_ID);
    metadata.remove(FIELD_CHUNK_INDEX);
    metadata.remove(FIELD_TOTAL_CHUNKS);

    let title = metadata.get("title").and_then(|v| v.as_str()).map(String::from);
    let doc_type = metadata.get("doc_type").and_then(|v| v.as_str()).map(String::from);

    Ok(Document {
        doc_id,
        collection_name,
        content,
        content_hash,
        title,
        doc_type,
        metadata,
        created_at: now,
        updated_at: now,
    })
}

/// Group chunks by their `source_id`, each group ordered by `chunk_index`.
///
/// Chunks missing `source_id` entirely are grouped together under one
/// synthetic, deterministic id rather than one id each.
pub fn group_by_source(chunks: &[ChunkRecord]) -> HashMap<String, Vec<ChunkRecord>> {
    let mut groups: HashMap<String, Vec<ChunkRecord>> = HashMap::new();
    let mut unsourced: Vec<ChunkRecord> = Vec::new();

    for chunk in chunks {
        match chunk.metadata.get(FIELD_SOURCE_ID).and_then(|v| v.as_str()) {
            Some(source_id) => groups.entry(source_id.to_string()).or_default().push(chunk.clone()),
            None => unsourced.push(chunk.clone()),
        }
    }

    if !unsourced.is_empty() {
        let synthetic_id = synthetic_source_id(&unsourced);
        groups.entry(synthetic_id).or_default().extend(unsourced);
    }

    for group in groups.values_mut() {
        group.sort_by_key(chunk_index_of);
    }

    groups
}

fn chunk_index_of(chunk: &ChunkRecord) -> i64 {
    chunk
        .metadata
        .get(FIELD_CHUNK_INDEX)
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
}

/// A single deterministic id for a batch of chunks with no `source_id`,
/// derived from their own ids so the same unsourced batch always groups the
/// same way.
fn synthetic_source_id(chunks: &[ChunkRecord]) -> String {
    let mut ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    ids.sort_unstable();
    let digest = Sha256::digest(ids.join(",").as_bytes());
    format!("unsourced_{}", hex::encode(&digest[..6]))
}
