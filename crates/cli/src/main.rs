use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use paper_retrieval::{RetrievalConfig, RetrievalService, DEFAULT_ASK_TOP_K};
use paper_vector_store::{EmbeddingMode, LoadPolicy};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "paper-retrieval")]
#[command(about = "Semantic passage retrieval over ingested papers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the index snapshot (overrides PAPER_STORAGE_DIR)
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    /// Override embedding backend in this process
    #[arg(long, global = true, value_enum)]
    embed_mode: Option<EmbedMode>,

    /// Model directory (overrides PAPER_MODEL_DIR)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Refuse to start from a corrupt snapshot instead of discarding it
    #[arg(long, global = true)]
    strict: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and index a document's extracted text
    Ingest(IngestArgs),

    /// Find the passages most similar to a query
    Search(QueryArgs),

    /// Retrieve context sections for a question
    Ask(AskArgs),

    /// Show index size and snapshot files
    Status,

    /// Remove a document and compact the index
    Remove(RemoveArgs),
}

#[derive(Args)]
struct IngestArgs {
    /// Identifier stored with every passage of the document
    #[arg(long)]
    document_id: String,

    /// Text file to ingest; form feeds are treated as page breaks
    #[arg(long, conflicts_with = "stdin", required_unless_present = "stdin")]
    file: Option<PathBuf>,

    /// Read the text from standard input
    #[arg(long)]
    stdin: bool,
}

#[derive(Args)]
struct QueryArgs {
    /// Free-text query
    #[arg(long)]
    query: String,

    /// Number of passages to return
    #[arg(long, short = 'k', default_value_t = 5)]
    top_k: usize,

    /// Only return passages of this document
    #[arg(long)]
    document_id: Option<String>,
}

#[derive(Args)]
struct AskArgs {
    /// Question to gather context for
    #[arg(long)]
    query: String,

    /// Number of sections to retrieve
    #[arg(long, short = 'k', default_value_t = DEFAULT_ASK_TOP_K)]
    top_k: usize,

    /// Only use sections of this document
    #[arg(long)]
    document_id: Option<String>,
}

#[derive(Args)]
struct RemoveArgs {
    #[arg(long)]
    document_id: String,
}

#[derive(Copy, Clone, ValueEnum)]
enum EmbedMode {
    Onnx,
    Stub,
}

impl EmbedMode {
    const fn as_domain(self) -> EmbeddingMode {
        match self {
            Self::Onnx => EmbeddingMode::Onnx,
            Self::Stub => EmbeddingMode::Stub,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    // ORT logs every session option at info level.
    if !cli.verbose {
        builder.filter_module("ort", log::LevelFilter::Off);
    }
    builder.target(env_logger::Target::Stderr).init();

    let config = resolve_config(&cli).await?;
    let service = RetrievalService::open(&config)
        .await
        .with_context(|| format!("Failed to open index in {}", config.storage_dir.display()))?;

    let output = match cli.command {
        Commands::Ingest(args) => {
            commands::ingest(&service, &args.document_id, args.file.as_deref()).await?
        }
        Commands::Search(args) => {
            commands::search(&service, &args.query, args.top_k, args.document_id.as_deref())
                .await?
        }
        Commands::Ask(args) => {
            commands::ask(&service, &args.query, args.top_k, args.document_id.as_deref()).await?
        }
        Commands::Status => commands::status(&service).await?,
        Commands::Remove(args) => commands::remove(&service, &args.document_id).await?,
    };

    service
        .shutdown()
        .await
        .context("Failed to save pending changes")?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// File, then environment, then flags.
async fn resolve_config(cli: &Cli) -> Result<RetrievalConfig> {
    let config = match &cli.config {
        Some(path) => RetrievalConfig::from_file(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RetrievalConfig::default(),
    };
    let mut config = config.with_env_overrides()?;

    if let Some(dir) = &cli.storage_dir {
        config.storage_dir = dir.clone();
    }
    if let Some(mode) = cli.embed_mode {
        config.embedder.mode = mode.as_domain();
    }
    if let Some(dir) = &cli.model_dir {
        config.embedder.model_dir = dir.clone();
    }
    if cli.strict {
        config.load_policy = LoadPolicy::Strict;
    }

    config.validate()?;
    log::debug!(
        "Storage {}, embedder {} ({}), load policy {:?}",
        config.storage_dir.display(),
        config.embedder.mode.as_str(),
        config.embedder.model_id,
        config.load_policy
    );
    Ok(config)
}
