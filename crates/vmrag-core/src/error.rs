//! Error types for the vmrag sync engine.

use thiserror::Error;

/// Result type alias using VmragError.
pub type Result<T> = std::result::Result<T, VmragError>;

/// Errors surfaced by the sync engine and its adapters. Each variant maps to
/// one of the stable error codes a tool call returns, plus a handful of
/// ambient variants for failures with no caller-facing VC meaning.
#[derive(Error, Debug)]
pub enum VmragError {
    #[error("not initialized: {message}")]
    NotInitialized { message: String },

    #[error("already initialized: {message}")]
    AlreadyInitialized { message: String },

    #[error("uncommitted changes: {new} new, {modified} modified, {deleted} deleted")]
    UncommittedChanges {
        new: u64,
        modified: u64,
        deleted: u64,
    },

    #[error("remote unreachable: {remote}: {reason}")]
    RemoteUnreachable { remote: String, reason: String },

    #[error("authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("branch not found: {branch}")]
    BranchNotFound { branch: String },

    #[error("commit not found: {commit}")]
    CommitNotFound { commit: String },

    #[error("merge conflict: {count} conflicting row(s)")]
    MergeConflict { count: usize },

    #[error("unresolved conflicts: {resolved} resolved, {remaining:?} remaining")]
    UnresolvedConflicts {
        resolved: u32,
        remaining: Vec<String>,
    },

    #[error("no changes")]
    NoChanges,

    #[error("remote rejected: {reason}")]
    RemoteRejected { reason: String },

    #[error("invalid resolution json: {reason}")]
    InvalidResolutionJson { reason: String },

    #[error("confirmation required: {message}")]
    ConfirmationRequired { message: String },

    #[error("collection not found: {name}")]
    CollectionNotFound { name: String },

    #[error("collection already exists: {name}")]
    CollectionExists { name: String },

    #[error("duplicate id: {id}")]
    DuplicateId { id: String },

    #[error("operation failed: {message}")]
    OperationFailed { message: String },

    /// Two branches' sanitized collection names collide.
    #[error("naming collision: {a} and {b} both sanitize to {collision}")]
    NamingCollision {
        a: String,
        b: String,
        collision: String,
    },

    /// Invalid argument provided (e.g. chunk_overlap >= chunk_size).
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Adapter subprocess or RPC error with no more specific classification.
    #[error("adapter error: {message}")]
    Adapter { message: String },

    /// Database error (vector-store or sqlite backing).
    #[error("database error: {message}")]
    Database { message: String },

    /// Embedding model error.
    #[error("embedding error: {message}")]
    Embedding { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected, invariant violated).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl VmragError {
    pub fn adapter(message: impl Into<String>) -> Self {
        Self::Adapter {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::OperationFailed {
            message: message.into(),
        }
    }

    /// Stable error code matching the tool-surface contract.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotInitialized { .. } => "NOT_INITIALIZED",
            Self::AlreadyInitialized { .. } => "ALREADY_INITIALIZED",
            Self::UncommittedChanges { .. } => "UNCOMMITTED_CHANGES",
            Self::RemoteUnreachable { .. } => "REMOTE_UNREACHABLE",
            Self::AuthenticationFailed { .. } => "AUTHENTICATION_FAILED",
            Self::BranchNotFound { .. } => "BRANCH_NOT_FOUND",
            Self::CommitNotFound { .. } => "COMMIT_NOT_FOUND",
            Self::MergeConflict { .. } => "MERGE_CONFLICT",
            Self::UnresolvedConflicts { .. } => "UNRESOLVED_CONFLICTS",
            Self::NoChanges => "NO_CHANGES",
            Self::RemoteRejected { .. } => "REMOTE_REJECTED",
            Self::InvalidResolutionJson { .. } => "INVALID_RESOLUTION_JSON",
            Self::ConfirmationRequired { .. } => "CONFIRMATION_REQUIRED",
            Self::CollectionNotFound { .. } => "COLLECTION_NOT_FOUND",
            Self::CollectionExists { .. } => "COLLECTION_EXISTS",
            Self::DuplicateId { .. } => "DUPLICATE_ID",
            Self::OperationFailed { .. } => "OPERATION_FAILED",
            Self::NamingCollision { .. } => "NAMING_COLLISION",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Adapter { .. } => "ADAPTER_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
