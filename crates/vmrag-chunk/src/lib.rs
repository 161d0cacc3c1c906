//! vmrag-chunk - Deterministic sliding-window chunking
//!
//! # Example
//!
//! ```rust
//! use vmrag_chunk::WindowChunker;
//! use vmrag_core::Chunker;
//!
//! let chunker = WindowChunker::new();
//! let chunks = chunker.chunk("hello world", 512, 50);
//! assert_eq!(chunker.reassemble(&chunks, 50), "hello world");
//! ```

mod window;

pub use window::WindowChunker;

pub use vmrag_core::Chunker;
