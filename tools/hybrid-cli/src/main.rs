//! `index`/`search` subcommands over a `HybridService` instance. Mirrors
//! the shape of the orchestrator demo tool, but via declarative `clap`
//! parsing instead of hand-rolled argv scanning.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser as ClapParser, Subcommand};
use embedding_provider::{Embedder, OnnxHttpConfig, OnnxHttpEmbedder, OnnxStdIoConfig, OnnxStdIoEmbedder};
use hybrid_config::HybridConfig;
use hybrid_service::{HybridService, IndexCodebaseRequest, IndexCodebaseResponse, LineWindowParser, SearchCodeRequest, ServiceConfig};
use index_manager::Parser as ChunkParser;
use provider_chain::Chain;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "hybrid-cli", about = "Index and search a codebase with hybrid lexical/semantic retrieval")]
struct Cli {
    /// Path to a TOML config file; defaults apply for anything not set.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index (or re-index) a directory tree.
    Index {
        path: String,
        #[arg(long)]
        force: bool,
        /// Return immediately with a task descriptor instead of waiting for completion.
        #[arg(long = "async")]
        async_mode: bool,
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long)]
        tokenizer: Option<PathBuf>,
        #[arg(long)]
        runtime: Option<PathBuf>,
        #[arg(long)]
        dim: Option<usize>,
        #[arg(long = "max-tokens")]
        max_tokens: Option<usize>,
        #[arg(long)]
        hnsw: Option<PathBuf>,
    },
    /// Run a hybrid search query against an already-indexed codebase.
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        path_filter: Option<String>,
        #[arg(long)]
        extensions: Vec<String>,
        #[arg(long)]
        expand: bool,
        #[arg(long)]
        synthesize: bool,
        #[arg(long)]
        hnsw: Option<PathBuf>,
    },
}

fn load_config(path: &Option<PathBuf>) -> HybridConfig {
    match path {
        Some(p) => hybrid_config::load(p).unwrap_or_else(|e| {
            eprintln!("warning: failed to load config {}: {e}; using defaults", p.display());
            HybridConfig::default()
        }),
        None => HybridConfig::default(),
    }
}

fn build_embedder_chain(config: &HybridConfig) -> Result<Arc<Chain<dyn Embedder>>, String> {
    let embedder: Arc<dyn Embedder> = if config.embedding.provider == "onnx_http" {
        let http_config = OnnxHttpConfig {
            endpoint: config.embedding.model.clone(),
            auth_token: std::env::var("HYBRID_EMBEDDING_API_KEY").ok(),
            dimension: config.embedding.dimension,
            max_input_length: 8192,
            embedding_model_id: config.embedding.model.clone(),
        };
        Arc::new(OnnxHttpEmbedder::new(http_config).map_err(|e| e.to_string())?)
    } else {
        let mut stdio_config = embedding_provider::default_stdio_config();
        stdio_config.dimension = config.embedding.dimension;
        Arc::new(OnnxStdIoEmbedder::new(stdio_config).map_err(|e| e.to_string())?)
    };
    Ok(Arc::new(Chain::new(vec![embedder])))
}

fn apply_embedder_overrides(
    config: &mut OnnxStdIoConfig,
    model: Option<PathBuf>,
    tokenizer: Option<PathBuf>,
    runtime: Option<PathBuf>,
    dim: Option<usize>,
    max_tokens: Option<usize>,
) {
    if let Some(model) = model {
        config.model_path = model;
    }
    if let Some(tokenizer) = tokenizer {
        config.tokenizer_path = tokenizer;
    }
    if let Some(runtime) = runtime {
        config.runtime_library_path = runtime;
    }
    if let Some(dim) = dim {
        config.dimension = dim;
    }
    if let Some(max_tokens) = max_tokens {
        config.max_input_length = max_tokens;
    }
}

fn service_config_with_hnsw(config: HybridConfig, hnsw: Option<PathBuf>) -> ServiceConfig {
    let mut service_config = ServiceConfig::from_config(config);
    if let Some(hnsw) = hnsw {
        service_config.hnsw_dir = hnsw;
    }
    service_config
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = load_config(&cli.config);

    let result = match cli.command {
        Command::Index { path, force, async_mode, model, tokenizer, runtime, dim, max_tokens, hnsw } => {
            run_index(config, path, force, async_mode, model, tokenizer, runtime, dim, max_tokens, hnsw).await
        }
        Command::Search { query, limit, path_filter, extensions, expand, synthesize, hnsw } => {
            run_search(config, query, limit, path_filter, extensions, expand, synthesize, hnsw).await
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_index(
    config: HybridConfig,
    path: String,
    force: bool,
    async_mode: bool,
    model: Option<PathBuf>,
    tokenizer: Option<PathBuf>,
    runtime: Option<PathBuf>,
    dim: Option<usize>,
    max_tokens: Option<usize>,
    hnsw: Option<PathBuf>,
) -> Result<(), String> {
    let mut stdio_config = embedding_provider::default_stdio_config();
    stdio_config.dimension = config.embedding.dimension;
    apply_embedder_overrides(&mut stdio_config, model, tokenizer, runtime, dim, max_tokens);
    let embedder: Arc<dyn Embedder> = Arc::new(OnnxStdIoEmbedder::new(stdio_config).map_err(|e| e.to_string())?);
    let chain: Arc<Chain<dyn Embedder>> = Arc::new(Chain::new(vec![embedder]));

    let service_config = service_config_with_hnsw(config, hnsw);
    let parser: Arc<dyn ChunkParser> = Arc::new(LineWindowParser::default());
    let service = Arc::new(HybridService::new(service_config, chain, None, parser).map_err(|e| e.to_string())?);

    let response = service
        .index_codebase(IndexCodebaseRequest { path, force, async_mode })
        .await
        .map_err(|e| e.to_string())?;

    match response {
        IndexCodebaseResponse::Result(result) => {
            println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());
        }
        IndexCodebaseResponse::Task(task) => {
            println!("{}", serde_json::to_string_pretty(&task).unwrap_or_default());
        }
    }
    Ok(())
}

async fn run_search(
    config: HybridConfig,
    query: String,
    limit: usize,
    path_filter: Option<String>,
    extensions: Vec<String>,
    expand: bool,
    synthesize: bool,
    hnsw: Option<PathBuf>,
) -> Result<(), String> {
    let chain = build_embedder_chain(&config)?;
    let service_config = service_config_with_hnsw(config, hnsw);
    let parser: Arc<dyn ChunkParser> = Arc::new(LineWindowParser::default());
    let service = Arc::new(HybridService::new(service_config, chain, None, parser).map_err(|e| e.to_string())?);

    let extensions = if extensions.is_empty() { None } else { Some(extensions) };
    let response = service
        .search_code(SearchCodeRequest { query, limit: Some(limit), path_filter, extensions, expand: Some(expand), synthesize: Some(synthesize) })
        .await
        .map_err(|e| e.to_string())?;

    println!("{}", serde_json::to_string_pretty(&response).unwrap_or_default());
    Ok(())
}
