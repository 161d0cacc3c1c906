//! vmrag-embed - ONNX embedding model wrapper
//!
//! Provides ONNX-based text embeddings using models like
//! nomic-embed-text-v1.5, behind the `Embedder` boundary the sync engine and
//! document converter call into.
//!
//! # Features
//!
//! - ONNX Runtime integration for fast inference
//! - Support for asymmetric retrieval with document/query prefixes
//! - Mean pooling with attention mask
//! - L2 normalization
//! - Batch embedding support

mod onnx;

pub use onnx::{MockEmbedder, OnnxEmbedder, EMBEDDING_DIM, MAX_TOKENS};

// Re-export the Embedder trait for convenience
pub use vmrag_core::Embedder;
