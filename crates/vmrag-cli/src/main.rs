//! vmrag CLI - command-line interface over the sync engine's tool façade.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use vmrag_chunk::WindowChunker;
use vmrag_core::{Chunker, Embedder, EmbeddingConfig, VectorStore, VersionedStore, VmragConfig};
use vmrag_embed::{MockEmbedder, OnnxEmbedder, EMBEDDING_DIM, MAX_TOKENS};
use vmrag_mcp::{
    AddDocumentsParams, CheckoutParams, CloneParams, CollectionNameParams, CommitParams, CommitsParams,
    CreateCollectionParams, DeleteCollectionParams, DeleteDocumentsParams, FetchParams, GetDocumentsParams, InitParams,
    ModifyCollectionParams, PeekParams, PullParams, PushParams, QueryDocumentsParams, ResetParams, ToolResult,
    UpdateDocumentsParams, VmragServer,
};
use vmrag_store::VectorStoreAdapter;
use vmrag_versioned::DoltAdapter;

/// vmrag - sync a versioned document store with a vector index
#[derive(Parser)]
#[command(name = "vmrag")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a vmrag.toml config file (defaults to the usual search path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the versioned store's working directory
    #[arg(long, global = true)]
    working_dir: Option<PathBuf>,

    /// Override the vector store's SQLite database path
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report the versioned store's branch and working-tree status
    Status,

    /// List recent commits on the current branch
    Log {
        #[arg(short = 'n', long, default_value = "20")]
        limit: u32,
    },

    /// Initialize the versioned store from the vector store's current contents
    Init {
        #[arg(short, long, default_value = "initial sync from vector store")]
        message: String,
    },

    /// Clone the versioned store from a remote
    Clone {
        remote: String,
        #[arg(long)]
        checkout_branch: Option<String>,
    },

    /// Fetch from a remote without merging
    Fetch {
        #[arg(default_value = "origin")]
        remote: String,
    },

    /// Pull from a remote and resync the vector store
    Pull {
        #[arg(default_value = "origin")]
        remote: String,
        /// Discard uncommitted vector-side changes instead of refusing
        #[arg(long)]
        force: bool,
    },

    /// Push the current branch to a remote
    Push {
        #[arg(default_value = "origin")]
        remote: String,
    },

    /// Stage vector-side changes and commit them
    Commit {
        #[arg(short, long)]
        message: String,
        /// Skip staging local vector-side changes before committing
        #[arg(long)]
        no_auto_stage: bool,
    },

    /// Switch branches, resyncing the vector store
    Checkout {
        branch: String,
        /// Create the branch if it doesn't exist
        #[arg(short, long)]
        create: bool,
    },

    /// Discard uncommitted vector-side changes and resync from head
    Reset {
        #[arg(long)]
        confirm: bool,
    },

    /// Manage collections
    Collection {
        #[command(subcommand)]
        action: CollectionAction,
    },

    /// Manage documents within a collection
    Document {
        #[command(subcommand)]
        action: DocumentAction,
    },
}

#[derive(Subcommand)]
enum CollectionAction {
    /// List every collection
    List,

    /// Show a collection's metadata and document/chunk counts
    Info { name: String },

    /// Count the chunks stored in a collection
    Count { name: String },

    /// Preview a handful of chunks from a collection
    Peek {
        name: String,
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Create a new, empty collection
    Create {
        name: String,
        /// Metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Merge fields into a collection's own metadata
    Modify {
        name: String,
        /// Metadata fields to merge, as a JSON object
        #[arg(long)]
        metadata: String,
    },

    /// Delete a collection
    Delete {
        name: String,
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand)]
enum DocumentAction {
    /// Add one document (read from a file, or inline with --text) to a collection
    Add {
        #[arg(short, long)]
        collection: String,
        /// File to read the document content from
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
        /// Inline document content
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        #[arg(long)]
        id: Option<String>,
    },

    /// Query a collection by an equality metadata filter
    Query {
        #[arg(short, long)]
        collection: String,
        /// Filter as a JSON object, e.g. '{"tag":"keep"}'
        #[arg(long)]
        filter: Option<String>,
        #[arg(short = 'k', long, default_value = "10")]
        limit: usize,
    },

    /// Fetch chunks from a collection by id
    Get {
        #[arg(short, long)]
        collection: String,
        ids: Vec<String>,
    },

    /// Merge metadata into an existing chunk by id
    Update {
        #[arg(short, long)]
        collection: String,
        id: String,
        /// Metadata fields to merge, as a JSON object
        #[arg(long)]
        metadata: String,
    },

    /// Delete chunks from a collection by id
    Delete {
        #[arg(short, long)]
        collection: String,
        ids: Vec<String>,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder().with_max_level(level).with_target(false).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn load_config(cli: &Cli) -> Result<VmragConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => VmragConfig::load(path)?,
        None => VmragConfig::load_default()?,
    };
    if let Some(dir) = &cli.working_dir {
        config.versioned_store.working_dir = dir.clone();
    }
    if let Some(db) = &cli.database {
        config.database.path = db.clone();
    }
    Ok(config)
}

/// A model directory is expected to hold `model.onnx` and `tokenizer.json`
/// (the layout ONNX-exported embedding models like nomic-embed-text-v1.5
/// ship in). Falls back to the mock embedder when no model is present there,
/// logging why.
fn build_embedder(config: &EmbeddingConfig, model_tag: &str) -> Result<Arc<dyn Embedder>, Box<dyn std::error::Error>> {
    let model_file = config.model_path.join("model.onnx");
    let tokenizer_file = config.model_path.join("tokenizer.json");

    if !model_file.exists() || !tokenizer_file.exists() {
        tracing::warn!(
            "no ONNX model at {:?}, falling back to the mock embedder (set embedding.model_path to enable it)",
            config.model_path
        );
        return Ok(Arc::new(MockEmbedder::new()));
    }

    if config.use_gpu {
        tracing::warn!("embedding.use_gpu is set but no GPU execution provider is wired up; running on CPU");
    }

    let onnx = OnnxEmbedder::with_config(
        model_file,
        tokenizer_file,
        EMBEDDING_DIM,
        MAX_TOKENS,
        model_tag,
        config.num_threads,
        config.batch_size,
    )?;
    Ok(Arc::new(onnx))
}

fn build_server(config: &VmragConfig) -> Result<VmragServer, Box<dyn std::error::Error>> {
    if let Some(parent) = config.database.path.parent() {
        fs::create_dir_all(parent)?;
    }

    let versioned: Arc<dyn VersionedStore> = Arc::new(DoltAdapter::new(
        config.versioned_store.cli_path.clone(),
        config.versioned_store.working_dir.clone(),
        config.versioned_store.default_remote.clone(),
        config.versioned_store.subprocess_timeout_secs,
    ));
    let vector: Arc<dyn VectorStore> =
        Arc::new(VectorStoreAdapter::open(&config.database.path, config.vector_store.default_embedding_model.clone())?);
    let embedder = build_embedder(&config.embedding, &config.vector_store.default_embedding_model)?;
    let chunker: Arc<dyn Chunker> = Arc::new(WindowChunker::new());

    Ok(VmragServer::new(versioned, vector, embedder, chunker, config.chunking.chunk_size, config.chunking.chunk_overlap))
}

fn print_result(result: &ToolResult) {
    if result.success {
        println!("{}", result.message);
        if !result.data.is_empty() {
            if let Ok(pretty) = serde_json::to_string_pretty(&result.data) {
                println!("{pretty}");
            }
        }
    } else {
        eprintln!("Error [{}]: {}", result.error.as_deref().unwrap_or("UNKNOWN"), result.message);
        for suggestion in &result.suggestions {
            eprintln!("  - {suggestion}");
        }
        std::process::exit(1);
    }
}

fn parse_metadata(raw: Option<&str>) -> Result<std::collections::HashMap<String, serde_json::Value>, Box<dyn std::error::Error>> {
    match raw {
        Some(s) => Ok(serde_json::from_str(s)?),
        None => Ok(std::collections::HashMap::new()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = load_config(&cli)?;
    let server = build_server(&config)?;

    match cli.command {
        Commands::Status => print_result(&server.status().await),
        Commands::Log { limit } => print_result(&server.commits(CommitsParams { limit }).await),
        Commands::Init { message } => print_result(&server.init(InitParams { message }).await),
        Commands::Clone { remote, checkout_branch } => print_result(&server.clone(CloneParams { remote, checkout_branch }).await),
        Commands::Fetch { remote } => print_result(&server.fetch(FetchParams { remote }).await),
        Commands::Pull { remote, force } => print_result(&server.pull(PullParams { remote, force }).await),
        Commands::Push { remote } => print_result(&server.push(PushParams { remote }).await),
        Commands::Commit { message, no_auto_stage } => {
            print_result(&server.commit(CommitParams { message, auto_stage: !no_auto_stage }).await)
        }
        Commands::Checkout { branch, create } => print_result(&server.checkout(CheckoutParams { branch, create }).await),
        Commands::Reset { confirm } => print_result(&server.reset(ResetParams { confirm_discard: confirm }).await),

        Commands::Collection { action } => match action {
            CollectionAction::List => print_result(&server.list_collections().await),
            CollectionAction::Info { name } => print_result(&server.get_collection_info(CollectionNameParams { name }).await),
            CollectionAction::Count { name } => print_result(&server.get_collection_count(CollectionNameParams { name }).await),
            CollectionAction::Peek { name, limit } => print_result(&server.peek_collection(PeekParams { name, limit }).await),
            CollectionAction::Create { name, metadata } => {
                let metadata = parse_metadata(metadata.as_deref())?;
                print_result(&server.create_collection(CreateCollectionParams { name, metadata }).await);
            }
            CollectionAction::Modify { name, metadata } => {
                let metadata = parse_metadata(Some(&metadata))?;
                print_result(&server.modify_collection(ModifyCollectionParams { name, metadata }).await);
            }
            CollectionAction::Delete { name, confirm } => {
                print_result(&server.delete_collection(DeleteCollectionParams { name, confirm }).await);
            }
        },

        Commands::Document { action } => match action {
            DocumentAction::Add { collection, file, text, id } => {
                let content = match (file, text) {
                    (Some(path), None) => fs::read_to_string(path)?,
                    (None, Some(text)) => text,
                    _ => {
                        eprintln!("exactly one of --file or --text is required");
                        std::process::exit(1);
                    }
                };
                let result = server
                    .add_documents(AddDocumentsParams {
                        collection,
                        documents: vec![content],
                        ids: id.map(|i| vec![i]),
                        metadatas: None,
                    })
                    .await;
                print_result(&result);
            }
            DocumentAction::Query { collection, filter, limit } => {
                let filter = parse_metadata(filter.as_deref())?;
                print_result(&server.query_documents(QueryDocumentsParams { collection, filter, limit }).await);
            }
            DocumentAction::Get { collection, ids } => print_result(&server.get_documents(GetDocumentsParams { collection, ids }).await),
            DocumentAction::Update { collection, id, metadata } => {
                let metadata = parse_metadata(Some(&metadata))?;
                print_result(&server.update_documents(UpdateDocumentsParams { collection, ids: vec![id], metadatas: vec![metadata] }).await);
            }
            DocumentAction::Delete { collection, ids } => {
                print_result(&server.delete_documents(DeleteDocumentsParams { collection, ids }).await);
            }
        },
    }

    Ok(())
}
