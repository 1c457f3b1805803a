//! Index build binary entry point.
//!
//! This binary runs the offline build phase: it loads the deduplicated
//! corpus, embeds every abstract, builds the vector index with its
//! alignment table, and writes the full artifact set into one directory.
//! A build is always a full rebuild; on any failure no artifacts change.
//!
//! # Examples
//!
//! Build with the default local model:
//! ```bash
//! build-index --corpus corpus.jsonl --output index
//! ```
//!
//! Build with OpenAI embeddings:
//! ```bash
//! OPENAI_API_KEY=sk-... build-index --embedding-provider openai
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use abstract_search::corpus::Corpus;
use abstract_search::embedding::fastembed::FastEmbedProvider;
use abstract_search::embedding::openai::OpenAIEmbedding;
use abstract_search::embedding::EmbeddingProvider;
use abstract_search::index::{self, artifacts};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wrapper enum for embedding providers to allow dynamic dispatch
enum DynamicEmbeddingProvider {
    FastEmbed(FastEmbedProvider),
    OpenAI(OpenAIEmbedding),
}

#[async_trait::async_trait]
impl EmbeddingProvider for DynamicEmbeddingProvider {
    async fn embed(&self, text: &str) -> abstract_search::embedding::EmbeddingResult<Vec<f32>> {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed(text).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed(text).await,
        }
    }

    async fn embed_batch(
        &self,
        texts: &[&str],
    ) -> abstract_search::embedding::EmbeddingResult<Vec<Vec<f32>>> {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed_batch(texts).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed_batch(texts).await,
        }
    }

    fn dimension(&self) -> usize {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.dimension(),
            DynamicEmbeddingProvider::OpenAI(p) => p.dimension(),
        }
    }

    fn model_name(&self) -> &str {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.model_name(),
            DynamicEmbeddingProvider::OpenAI(p) => p.model_name(),
        }
    }
}

/// Embedding provider type
#[derive(Debug, Clone, ValueEnum)]
enum EmbeddingProviderType {
    /// FastEmbed local embedding provider (default, no API required)
    FastEmbed,
    /// OpenAI cloud-based embedding provider (requires OPENAI_API_KEY)
    #[value(name = "openai")]
    OpenAI,
}

/// Build CLI for turning the corpus into a searchable index
#[derive(Parser, Debug)]
#[command(
    name = "build-index",
    version,
    about = "Embed the corpus and write the searchable index artifacts",
    long_about = "Offline build phase for the abstract search pipeline. Embeds every abstract \
                  in the corpus, builds the vector index and alignment table, and writes the \
                  artifact set (manifest, index, raw embeddings, corpus copy) atomically.

EXAMPLES:
  Build with the default local model:
    build-index --corpus corpus.jsonl --output index

  Pick a specific local model:
    build-index --embedding-model multilingual-e5-base

  Use OpenAI embeddings:
    OPENAI_API_KEY=sk-... build-index --embedding-provider openai

  Custom batch size and logging:
    build-index --batch-size 64 --log-level debug"
)]
struct BuildArgs {
    /// Corpus file path
    #[arg(long, value_name = "PATH", default_value = "corpus.jsonl")]
    corpus: PathBuf,

    /// Output directory for the index artifact set
    #[arg(short, long, value_name = "DIR", default_value = "index")]
    output: PathBuf,

    /// Embedding provider to use
    #[arg(long, value_enum, default_value = "fast-embed")]
    embedding_provider: EmbeddingProviderType,

    /// Specific embedding model name (provider-dependent, optional)
    #[arg(long, value_name = "MODEL")]
    embedding_model: Option<String>,

    /// Number of abstracts to embed per provider batch
    #[arg(long, value_name = "N", default_value_t = abstract_search::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Logging verbosity level
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    /// FastEmbed model cache directory
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}

/// Create an embedding provider based on CLI arguments
fn create_embedding_provider(args: &BuildArgs) -> Result<DynamicEmbeddingProvider> {
    match args.embedding_provider {
        EmbeddingProviderType::FastEmbed => {
            info!("Initializing FastEmbed provider");

            let model_name = args
                .embedding_model
                .as_deref()
                .unwrap_or(abstract_search::DEFAULT_EMBEDDING_MODEL);

            let provider = FastEmbedProvider::from_model_name(model_name, args.cache_dir.clone())
                .with_context(|| format!("Failed to initialize FastEmbed model '{}'", model_name))?;

            info!(
                "FastEmbed provider initialized: model={}, dimension={}",
                provider.model_name(),
                provider.dimension()
            );

            Ok(DynamicEmbeddingProvider::FastEmbed(provider))
        }
        EmbeddingProviderType::OpenAI => {
            info!("Initializing OpenAI embedding provider");

            let api_key = std::env::var("OPENAI_API_KEY").context(
                "OPENAI_API_KEY environment variable must be set when using OpenAI provider",
            )?;

            let provider = OpenAIEmbedding::new(api_key, args.embedding_model.clone())
                .context("Failed to initialize OpenAI provider")?;

            info!(
                "OpenAI provider initialized: model={}, dimension={}",
                provider.model_name(),
                provider.dimension()
            );

            Ok(DynamicEmbeddingProvider::OpenAI(provider))
        }
    }
}

/// Create a spinner for the embedding phase
fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
            .expect("Invalid spinner template"),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = BuildArgs::parse();

    init_logging(&args.log_level).context("Failed to initialize logging")?;

    info!("Starting index build");
    debug!("CLI arguments: {:?}", args);

    let start_time = Instant::now();

    if !args.corpus.exists() {
        anyhow::bail!(
            "Corpus file not found: {}\n\
             Run the ingest binary first to create the corpus.",
            args.corpus.display()
        );
    }

    let corpus = Corpus::load(&args.corpus)
        .with_context(|| format!("Failed to load corpus from {}", args.corpus.display()))?;
    info!(
        "Loaded corpus with {} records from {}",
        corpus.len(),
        args.corpus.display()
    );

    if corpus.is_empty() {
        warn!("Corpus is empty; the build will produce an index with no entries");
    }

    let provider = create_embedding_provider(&args)?;

    let spinner = create_spinner(format!(
        "Embedding {} abstracts with {}...",
        corpus.len(),
        provider.model_name()
    ));

    let record_count = corpus.len();
    let build = index::build(corpus, &provider, args.batch_size)
        .await
        .context("Index build failed; existing artifacts are untouched")?;

    spinner.finish_and_clear();

    artifacts::save(&build, &args.output)
        .with_context(|| format!("Failed to write artifacts to {}", args.output.display()))?;

    let elapsed = start_time.elapsed();
    println!("\n╔════════════════════════════════════════╗");
    println!("║      Index Build Completed             ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Records embedded:     {:>16} ║", record_count);
    println!("║ Index entries:        {:>16} ║", build.snapshot.index.len());
    println!("║ Dimension:            {:>16} ║", build.snapshot.config.dimension);
    println!("║ Elapsed time:         {:>13.2?} ║", elapsed);
    println!("╚════════════════════════════════════════╝");
    println!(
        "Model: {}\nArtifacts written to: {}",
        build.snapshot.config.model_name,
        args.output.display()
    );

    info!("Index build completed successfully");

    Ok(())
}
