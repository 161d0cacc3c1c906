//! vmrag-mcp - the tool façade over the sync engine.
//!
//! [`VmragServer`] exposes the document tools (`list_collections`,
//! `get_collection_info`, `get_collection_count`, `peek_collection`,
//! `create_collection`, `modify_collection`, `delete_collection`,
//! `add_documents`, `query_documents`, `get_documents`, `update_documents`,
//! `delete_documents`) and a scoped subset of the version-control tools
//! (`status`, `commits`, `init`, `clone`, `fetch`, `pull`, `push`, `commit`,
//! `checkout`, `reset`) as plain async Rust methods, each returning a
//! [`server::ToolResult`] envelope. It is a library, not a transport: wiring
//! it to a concrete RPC/CLI surface is left to callers such as `vmrag-cli`.

mod server;
mod tools;

pub use server::{
    AddDocumentsParams, CheckoutParams, CloneParams, CollectionNameParams, CommitParams, CommitsParams,
    CreateCollectionParams, DeleteCollectionParams, DeleteDocumentsParams, FetchParams, GetDocumentsParams, InitParams,
    ModifyCollectionParams, PeekParams, PullParams, PushParams, QueryDocumentsParams, ResetParams, ToolResult,
    UpdateDocumentsParams, VmragServer,
};
pub use tools::{ServerInfo, ToolInfo};
