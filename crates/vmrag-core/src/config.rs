//! Configuration types for the vmrag sync engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmragConfig {
    /// Backing SQLite database for the vector-store adapter.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Embedding model configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Default chunking parameters for newly created collections.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// External versioned-store CLI configuration.
    #[serde(default)]
    pub versioned_store: VersionedStoreConfig,

    /// Vector-store-specific configuration.
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
}

impl Default for VmragConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            versioned_store: VersionedStoreConfig::default(),
            vector_store: VectorStoreConfig::default(),
        }
    }
}

/// SQLite connection configuration for the vector-store adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,

    /// Enable WAL mode (recommended).
    #[serde(default = "default_true")]
    pub wal_mode: bool,

    /// SQLite cache size in KB (negative = KB, positive = pages).
    #[serde(default = "default_cache_size")]
    pub cache_size: i32,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            wal_mode: true,
            cache_size: -64000, // 64MB
            busy_timeout_ms: 30000,
        }
    }
}

/// Embedding model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Path to ONNX model directory.
    pub model_path: PathBuf,

    /// Batch size for embedding.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Use GPU if available.
    #[serde(default)]
    pub use_gpu: bool,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            batch_size: 32,
            use_gpu: false,
            num_threads: 4,
        }
    }
}

/// Default chunking parameters (characters, not tokens — see
/// `vmrag_chunk::window`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between adjacent windows in characters. Must be strictly
    /// less than `chunk_size`.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

/// External version-control CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedStoreConfig {
    /// Name or path of the versioning binary, resolved on PATH if bare.
    #[serde(default = "default_cli_path")]
    pub cli_path: String,

    /// Working directory the CLI subprocess runs in.
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Remote name used when none is supplied to push/pull/fetch.
    #[serde(default = "default_remote")]
    pub default_remote: String,

    /// Per-call subprocess timeout.
    #[serde(default = "default_subprocess_timeout_secs")]
    pub subprocess_timeout_secs: u64,

    /// Hard kill deadline after the timeout fires.
    #[serde(default = "default_kill_deadline_secs")]
    pub kill_deadline_secs: u64,
}

impl Default for VersionedStoreConfig {
    fn default() -> Self {
        Self {
            cli_path: default_cli_path(),
            working_dir: default_working_dir(),
            default_remote: default_remote(),
            subprocess_timeout_secs: default_subprocess_timeout_secs(),
            kill_deadline_secs: default_kill_deadline_secs(),
        }
    }
}

/// Vector-store-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Directory the vector store persists its collections under.
    pub persistence_path: PathBuf,

    /// Embedding model tag assigned to newly created collections.
    #[serde(default = "default_embedding_model_tag")]
    pub default_embedding_model: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            persistence_path: default_vector_store_path(),
            default_embedding_model: default_embedding_model_tag(),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_cache_size() -> i32 {
    -64000
}

fn default_busy_timeout() -> u32 {
    30000
}

fn default_batch_size() -> usize {
    32
}

fn default_num_threads() -> usize {
    4
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_cli_path() -> String {
    "dolt".to_string()
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_subprocess_timeout_secs() -> u64 {
    60
}

fn default_kill_deadline_secs() -> u64 {
    5
}

fn default_embedding_model_tag() -> String {
    "nomic-embed-text-v1.5".to_string()
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vmrag")
        .join("vmrag.db")
}

fn default_model_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vmrag")
        .join("models")
        .join("nomic-embed-text-v1.5")
}

fn default_vector_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vmrag")
        .join("vectors")
}

impl VmragConfig {
    /// Load configuration from a specific file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::VmragError::config(format!("failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load configuration from the default search path: user config dir,
    /// then a local `vmrag.toml`, then built-in defaults.
    pub fn load_default() -> crate::error::Result<Self> {
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("vmrag").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        let local_config = PathBuf::from("vmrag.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }
}
