//! The tool catalog: static metadata describing the façade's surface,
//! separate from `server`'s dispatch logic so a caller can enumerate what's
//! available without touching a live [`crate::VmragServer`].

use serde::Serialize;

/// Server info, returned by `VmragServer::info()` for a caller enumerating
/// the façade.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

/// One entry in the tool catalog returned by `VmragServer::tools()`.
#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

pub fn info() -> ServerInfo {
    ServerInfo {
        name: "vmrag-mcp".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "Bidirectional sync façade over a versioned document store and a vector index".to_string(),
    }
}

const NAMED: &[(&str, &str)] = &[
    ("list_collections", "List every collection in the vector store"),
    ("get_collection_info", "Get a collection's metadata and document/chunk counts"),
    ("get_collection_count", "Count the chunks stored in a collection"),
    ("peek_collection", "Preview a handful of chunks from a collection"),
    ("create_collection", "Create a new, empty collection"),
    ("modify_collection", "Merge fields into a collection's own metadata"),
    ("delete_collection", "Delete a collection (requires confirm)"),
    ("add_documents", "Add document chunks to a collection"),
    ("query_documents", "Query a collection by metadata filter"),
    ("get_documents", "Fetch chunks from a collection by id"),
    ("update_documents", "Merge metadata into existing chunks by id"),
    ("delete_documents", "Delete chunks from a collection by id"),
    ("status", "Report the versioned store's branch and working-tree status"),
    ("commits", "List recent commits on the current branch"),
    ("init", "Initialize the versioned store from the vector store's current contents"),
    ("clone", "Clone the versioned store from a remote"),
    ("fetch", "Fetch from a remote without merging"),
    ("pull", "Pull from a remote and resync the vector store"),
    ("push", "Push the current branch to a remote"),
    ("commit", "Stage vector-side changes and commit them"),
    ("checkout", "Switch branches, resyncing the vector store"),
    ("reset", "Discard uncommitted vector-side changes"),
];

pub fn tool_catalog() -> Vec<ToolInfo> {
    NAMED.iter().map(|(name, description)| ToolInfo { name: name.to_string(), description: description.to_string() }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_catalog_names_every_tool_once() {
        let catalog = tool_catalog();
        let mut names: Vec<&str> = catalog.iter().map(|t| t.name.as_str()).collect();
        let before = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), before, "duplicate tool name in catalog");
    }
}
