//! ONNX-based embedding model implementation.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use vmrag_core::{Embedder, Result, VmragError};

/// nomic-embed-text-v1.5 configuration.
pub const EMBEDDING_DIM: usize = 768;
pub const MAX_TOKENS: usize = 8192;
const DEFAULT_NUM_THREADS: usize = 4;
const DEFAULT_BATCH_SIZE: usize = 32;

/// Document prefix for asymmetric retrieval.
const DOCUMENT_PREFIX: &str = "search_document: ";

/// Query prefix for asymmetric retrieval.
const QUERY_PREFIX: &str = "search_query: ";

/// ONNX-based embedder using nomic-embed-text-v1.5 or compatible model.
pub struct OnnxEmbedder {
    /// ONNX inference session (wrapped in Mutex for interior mutability).
    session: Mutex<Session>,

    /// Tokenizer for the model.
    tokenizer: Arc<Tokenizer>,

    /// Embedding dimension.
    dimension: usize,

    /// Maximum token count; inputs longer than this are truncated by the tokenizer.
    max_tokens: usize,

    /// Identity string reported by `model_tag`, used to detect embedding-model
    /// mismatches between a collection's sync-state and its current embedder.
    model_tag: String,

    /// Inputs to `embed_documents` are chunked to this many texts per
    /// inference call.
    batch_size: usize,
}

impl OnnxEmbedder {
    /// Create a new embedder from model and tokenizer paths.
    pub fn new(model_path: impl AsRef<Path>, tokenizer_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(
            model_path,
            tokenizer_path,
            EMBEDDING_DIM,
            MAX_TOKENS,
            "nomic-embed-text-v1.5",
            DEFAULT_NUM_THREADS,
            DEFAULT_BATCH_SIZE,
        )
    }

    /// Create an embedder with custom dimensions, model tag, thread count and
    /// batch size (for testing/other models, or driven by `EmbeddingConfig`).
    #[allow(clippy::too_many_arguments)]
    pub fn with_config(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        dimension: usize,
        max_tokens: usize,
        model_tag: impl Into<String>,
        num_threads: usize,
        batch_size: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let tokenizer_path = tokenizer_path.as_ref();

        info!("loading ONNX model from {:?}", model_path);

        let session = Session::builder()
            .map_err(|e| VmragError::embedding(format!("failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| VmragError::embedding(format!("failed to set optimization level: {e}")))?
            .with_intra_threads(num_threads)
            .map_err(|e| VmragError::embedding(format!("failed to set thread count: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| VmragError::embedding(format!("failed to load model: {e}")))?;

        info!("loading tokenizer from {:?}", tokenizer_path);

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| VmragError::embedding(format!("failed to load tokenizer: {e}")))?;

        let model_tag = model_tag.into();
        info!("embedder initialized: tag={} dim={} max_tokens={}", model_tag, dimension, max_tokens);

        Ok(Self {
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            dimension,
            max_tokens,
            model_tag,
            batch_size: batch_size.max(1),
        })
    }

    /// Embed a batch of texts with a given prefix.
    fn embed_batch(&self, texts: &[&str], prefix: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prefixed: Vec<String> = texts.iter().map(|t| format!("{prefix}{t}")).collect();
        let prefixed_refs: Vec<&str> = prefixed.iter().map(|s| s.as_str()).collect();

        let encodings = self
            .tokenizer
            .encode_batch(prefixed_refs, true)
            .map_err(|e| VmragError::embedding(format!("tokenization failed: {e}")))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_tokens);

        let batch_size = encodings.len();

        debug!("embedding batch: size={} max_len={}", batch_size, max_len);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let len = ids.len().min(max_len);

            for j in 0..len {
                input_ids[i * max_len + j] = ids[j] as i64;
                attention_mask[i * max_len + j] = mask[j] as i64;
            }
        }

        let input_ids_tensor = Tensor::from_array((vec![batch_size, max_len], input_ids))
            .map_err(|e| VmragError::embedding(format!("failed to create input tensor: {e}")))?;

        let attention_mask_tensor = Tensor::from_array((vec![batch_size, max_len], attention_mask))
            .map_err(|e| VmragError::embedding(format!("failed to create mask tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| VmragError::embedding(format!("failed to lock session: {e}")))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            ])
            .map_err(|e| VmragError::embedding(format!("inference failed: {e}")))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| VmragError::embedding("no output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| VmragError::embedding(format!("failed to extract tensor: {e}")))?;

        let shape_dims: Vec<usize> = view.shape().to_vec();
        debug!("output shape: {:?}", shape_dims);

        let embeddings = if shape_dims.len() == 3 {
            self.mean_pool_3d_ndarray(&view, &encodings, max_len)?
        } else if shape_dims.len() == 2 {
            let hidden_dim = shape_dims[1];
            (0..batch_size)
                .map(|i| {
                    let embedding: Vec<f32> = (0..hidden_dim).map(|j| view[[i, j]]).collect();
                    self.l2_normalize(embedding)
                })
                .collect()
        } else {
            return Err(VmragError::embedding(format!("unexpected output shape: {shape_dims:?}")));
        };

        Ok(embeddings)
    }

    /// Mean pooling over sequence dimension with attention mask.
    fn mean_pool_3d_ndarray(
        &self,
        tensor: &ArrayViewD<'_, f32>,
        encodings: &[tokenizers::Encoding],
        max_len: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let shape = tensor.shape();
        let batch_size = shape[0];
        let seq_len = shape[1];
        let hidden_dim = shape[2];

        let mut embeddings = Vec::with_capacity(batch_size);

        for (i, encoding) in encodings.iter().enumerate() {
            let attention_mask = encoding.get_attention_mask();
            let valid_len = attention_mask.iter().take(max_len).filter(|&&m| m == 1).count();

            if valid_len == 0 {
                embeddings.push(vec![0.0; hidden_dim]);
                continue;
            }

            let mut sum = vec![0.0f32; hidden_dim];
            for j in 0..valid_len.min(max_len).min(seq_len) {
                if j < attention_mask.len() && attention_mask[j] == 1 {
                    for (k, s) in sum.iter_mut().enumerate() {
                        *s += tensor[[i, j, k]];
                    }
                }
            }

            let embedding: Vec<f32> = sum.iter().map(|s| s / valid_len as f32).collect();
            embeddings.push(self.l2_normalize(embedding));
        }

        Ok(embeddings)
    }

    /// L2 normalize a vector.
    fn l2_normalize(&self, mut v: Vec<f32>) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            embeddings.extend(self.embed_batch(chunk, DOCUMENT_PREFIX)?);
        }
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text];
        let results = self.embed_batch(&texts, QUERY_PREFIX)?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| VmragError::embedding("no embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_tag(&self) -> &str {
        &self.model_tag
    }
}

/// A mock embedder for testing that doesn't require actual models.
pub struct MockEmbedder {
    dimension: usize,
    model_tag: String,
}

impl MockEmbedder {
    /// Create a new mock embedder with default settings.
    pub fn new() -> Self {
        Self {
            dimension: 768,
            model_tag: "mock-embedder".to_string(),
        }
    }

    /// Create a mock embedder with custom settings.
    pub fn with_config(dimension: usize, model_tag: impl Into<String>) -> Self {
        Self {
            dimension,
            model_tag: model_tag.into(),
        }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let hash = text.bytes().fold(0u64, |acc, b| acc.wrapping_add(b as u64));
                let mut embedding = vec![0.0f32; self.dimension];
                for (i, v) in embedding.iter_mut().enumerate() {
                    *v = ((hash.wrapping_mul(i as u64 + 1)) as f32 % 1000.0) / 1000.0 - 0.5;
                }
                let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for x in &mut embedding {
                        *x /= norm;
                    }
                }
                embedding
            })
            .collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_documents(&[text]).await?;
        Ok(results.into_iter().next().unwrap())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_tag(&self) -> &str {
        &self.model_tag
    }
}
