//! Deterministic sliding-window chunker with overlap-detection reassembly.

use vmrag_core::Chunker;

/// Tolerance added to `chunk_overlap` when searching for the overlap between
/// two adjacent chunks during reassembly.
const OVERLAP_TOLERANCE: usize = 10;

/// Slides a window of length `chunk_size` with stride `chunk_size -
/// chunk_overlap` over document content; reassembles by detecting the
/// overlap between each adjacent pair of chunks.
pub struct WindowChunker;

impl WindowChunker {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for WindowChunker {
    fn chunk(&self, content: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
        debug_assert!(chunk_overlap < chunk_size, "chunk_overlap must be < chunk_size");

        let chars: Vec<char> = content.chars().collect();
        if chars.is_empty() {
            return vec![String::new()];
        }
        if chars.len() <= chunk_size {
            return vec![content.to_string()];
        }

        let stride = chunk_size - chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0usize;
        loop {
            let end = (start + chunk_size).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += stride;
        }
        chunks
    }

    fn reassemble(&self, chunks: &[String], chunk_overlap: usize) -> String {
        match chunks.len() {
            0 => String::new(),
            1 => chunks[0].clone(),
            _ => {
                let mut result: Vec<char> = chunks[0].chars().collect();
                for pair in chunks.windows(2) {
                    let a: Vec<char> = pair[0].chars().collect();
                    let b: Vec<char> = pair[1].chars().collect();
                    let max_k = (chunk_overlap + OVERLAP_TOLERANCE).min(a.len()).min(b.len());

                    let mut k = max_k;
                    while k > 0 && a[a.len() - k..] != b[..k] {
                        k -= 1;
                    }
                    result.extend_from_slice(&b[k..]);
                }
                result.into_iter().collect()
            }
        }
    }
}
