//! Search binary entry point.
//!
//! This binary provides a command-line interface for querying a pre-built
//! index artifact set. It supports both single-query and interactive REPL
//! modes, with flexible output formatting (table or JSON) and structured
//! metadata filters.
//!
//! # Examples
//!
//! Single query with default settings:
//! ```bash
//! search --index index --query "neural retrieval"
//! ```
//!
//! JSON output with filters:
//! ```bash
//! search --index index --query "transformers" --format json --lang en --year-from 2020
//! ```
//!
//! Interactive mode:
//! ```bash
//! search --index index --interactive
//! ```

use std::path::PathBuf;
use std::time::Instant;

use abstract_search::embedding::fastembed::FastEmbedProvider;
use abstract_search::embedding::openai::OpenAIEmbedding;
use abstract_search::embedding::EmbeddingProvider;
use abstract_search::index::{artifacts, SnapshotHandle};
use abstract_search::models::SearchHit;
use abstract_search::query::{
    RecordFilter, SearchEngine, SearchQuery, SnapshotSearchEngine, YearRange,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, ContentArrangement, Table};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, error, info};
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

/// Output format for search results
#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Search CLI for querying the index with semantic similarity
#[derive(Parser, Debug)]
#[command(
    name = "search",
    version,
    about = "Search the abstract index using semantic similarity",
    long_about = "Query a pre-built index artifact set using semantic search. Supports both \
                  single-query and interactive modes, structured metadata filters, and \
                  flexible output formatting.

EXAMPLES:
  Single query:
    search --index index --query \"neural retrieval\"

  JSON output with filters:
    search --index index --query \"transformers\" --format json --lang en --year-from 2020

  Filter by author and category:
    search --index index --query \"question answering\" --author \"Alice Doe\" --category cs.CL

  Interactive mode:
    search --index index --interactive"
)]
struct Args {
    /// Index artifact directory
    #[arg(long, value_name = "DIR", default_value = "index")]
    index: PathBuf,

    /// Search query (required for single-query mode, omitted in interactive mode)
    #[arg(short, long, value_name = "TEXT", conflicts_with = "interactive")]
    query: Option<String>,

    /// Number of results to return
    #[arg(short = 'k', long, value_name = "N", default_value_t = abstract_search::DEFAULT_TOP_K)]
    top_k: usize,

    /// Keep only records with this author (repeatable; any listed author matches)
    #[arg(long, value_name = "NAME")]
    author: Vec<String>,

    /// Keep only records with this category (repeatable)
    #[arg(long, value_name = "CATEGORY")]
    category: Vec<String>,

    /// Keep only records with this affiliation (repeatable)
    #[arg(long, value_name = "NAME")]
    affiliation: Vec<String>,

    /// Keep only records in this language (exact code, e.g. "en")
    #[arg(long, value_name = "LANG")]
    lang: Option<String>,

    /// Keep only records from this year onwards (inclusive)
    #[arg(long, value_name = "YEAR")]
    year_from: Option<i32>,

    /// Keep only records up to this year (inclusive)
    #[arg(long, value_name = "YEAR")]
    year_to: Option<i32>,

    /// Minimum similarity score (pass -1 to disable the floor)
    #[arg(long, value_name = "SCORE", default_value_t = 0.4)]
    min_score: f32,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,

    /// FastEmbed model cache directory (only used with FastEmbed provider)
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

/// Reconstruct the embedding provider recorded in the index manifest
fn create_embedding_provider(
    model_name: &str,
    dimension: usize,
    cache_dir: Option<PathBuf>,
) -> Result<DynamicEmbeddingProvider> {
    info!("Reconstructing embedding provider for model: {}", model_name);

    let provider = if model_name.contains("text-embedding") {
        info!("Detected OpenAI embedding model");
        let api_key = std::env::var("OPENAI_API_KEY").with_context(|| {
            "OPENAI_API_KEY environment variable required for OpenAI embeddings.\n\
             Set it with: export OPENAI_API_KEY=your-api-key"
        })?;

        DynamicEmbeddingProvider::OpenAI(
            OpenAIEmbedding::new(api_key, Some(model_name.to_string()))
                .context("Failed to initialize OpenAI provider")?,
        )
    } else {
        info!("Detected FastEmbed model");
        DynamicEmbeddingProvider::FastEmbed(
            FastEmbedProvider::from_model_name(model_name, cache_dir).with_context(|| {
                format!("Failed to initialize FastEmbed model '{}' from manifest", model_name)
            })?,
        )
    };

    // The index was built with this exact width; a provider that disagrees
    // would produce unanswerable queries.
    if provider.dimension() != dimension {
        anyhow::bail!(
            "Dimension mismatch: manifest records {}, but provider returns {}",
            dimension,
            provider.dimension()
        );
    }

    Ok(provider)
}

/// Execute a search query and return results
async fn execute_search<E: EmbeddingProvider>(
    engine: &SnapshotSearchEngine<E>,
    query_text: &str,
    top_k: usize,
    filter: &RecordFilter,
    min_score: Option<f32>,
) -> Result<Vec<SearchHit>> {
    debug!("Executing search for query: {}", query_text);

    let mut request = SearchQuery::new(query_text)
        .with_k(top_k)
        .with_filter(filter.clone());
    if let Some(floor) = min_score {
        request = request.with_min_score(floor);
    }

    let results = engine
        .search(&request)
        .await
        .with_context(|| format!("Failed to execute search for query: '{}'", query_text))?;

    Ok(results)
}

/// Truncate a display string to at most `max` characters
fn truncate_display(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format results as a pretty table
fn format_results_table(results: &[SearchHit]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Lang").add_attribute(Attribute::Bold),
        Cell::new("Year").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
    ]);

    for (idx, hit) in results.iter().enumerate() {
        let authors = hit.record.authors.join(", ");
        let year = hit
            .record
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(format!("{}", idx + 1)),
            Cell::new(truncate_display(&hit.record.title, 60)),
            Cell::new(truncate_display(&authors, 40)),
            Cell::new(&hit.record.language),
            Cell::new(year),
            Cell::new(format!("{:.4}", hit.score)),
        ]);
    }

    table.to_string()
}

/// Format results as JSON
fn format_results_json(results: &[SearchHit]) -> Result<String> {
    serde_json::to_string_pretty(results).with_context(|| "Failed to serialize results to JSON")
}

/// Display detailed view of a single result
fn display_result_detail(hit: &SearchHit, rank: usize) {
    println!("\n{}", "═".repeat(80));
    println!("Rank: {}", rank);
    println!("Id: {}", hit.record.id);
    println!("Title: {}", hit.record.title);
    println!("Authors: {}", hit.record.authors.join(", "));
    if !hit.record.affiliations.is_empty() {
        let affiliations: Vec<&str> =
            hit.record.affiliations.iter().map(String::as_str).collect();
        println!("Affiliations: {}", affiliations.join(", "));
    }
    if !hit.record.categories.is_empty() {
        let categories: Vec<&str> = hit.record.categories.iter().map(String::as_str).collect();
        println!("Categories: {}", categories.join(", "));
    }
    println!("Language: {}", hit.record.language);
    match hit.record.year {
        Some(year) => println!("Year: {}", year),
        None => println!("Year: unknown"),
    }
    println!("Score: {:.4}", hit.score);
    if let Some(summary) = &hit.record.summary {
        println!("\nSummary:\n{}", summary);
    }
    println!("\nAbstract:\n{}", hit.record.abstract_text);
    if !hit.record.pdf_url.is_empty() {
        println!("\nPDF: {}", hit.record.pdf_url);
    }
    println!("{}", "═".repeat(80));
}

/// Print the REPL command reference
fn print_repl_help() {
    println!("Commands:");
    println!("  <query>         - Search the index");
    println!("  /top N          - Set number of results to N");
    println!("  /year START END - Filter by year range");
    println!("  /year clear     - Clear year filter");
    println!("  /lang CODE      - Filter by language (exact code)");
    println!("  /lang clear     - Clear language filter");
    println!("  /format table   - Use table output format");
    println!("  /format json    - Use JSON output format");
    println!("  /detail N       - Show full details for result rank N");
    println!("  /help           - Show this help");
    println!("  /quit           - Exit");
    println!("  Ctrl+D or Ctrl+C - Exit");
}

/// Print results in the selected format with a timing footer
fn print_results(results: &[SearchHit], format: &OutputFormat, elapsed_secs: f64) {
    match format {
        OutputFormat::Table => {
            println!("{}", format_results_table(results));
            println!("\nFound {} results in {:.2}s", results.len(), elapsed_secs);
        }
        OutputFormat::Json => match format_results_json(results) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error formatting JSON: {}", e),
        },
    }
}

/// Run interactive REPL mode
async fn run_interactive<E: EmbeddingProvider>(
    engine: SnapshotSearchEngine<E>,
    mut top_k: usize,
    mut filter: RecordFilter,
    min_score: Option<f32>,
    mut format: OutputFormat,
) -> Result<()> {
    println!("Interactive Abstract Search");
    print_repl_help();
    println!();

    let mut rl = DefaultEditor::new().with_context(|| "Failed to create readline editor")?;

    let mut last_results: Vec<SearchHit> = Vec::new();

    loop {
        let readline = rl.readline("Search> ");
        match readline {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line).ok();

                if line.starts_with('/') {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    match parts[0] {
                        "/help" => print_repl_help(),
                        "/quit" | "/exit" => {
                            println!("Goodbye!");
                            break;
                        }
                        "/top" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /top N");
                                continue;
                            }
                            match parts[1].parse::<usize>() {
                                Ok(n) if n > 0 => {
                                    top_k = n;
                                    println!("Set top-k to {}", top_k);
                                }
                                _ => eprintln!("Invalid number: must be a positive integer"),
                            }
                        }
                        "/year" => {
                            if parts.len() == 2 && parts[1] == "clear" {
                                filter.years = None;
                                println!("Cleared year filter");
                            } else if parts.len() == 3 {
                                match (parts[1].parse::<i32>(), parts[2].parse::<i32>()) {
                                    (Ok(start), Ok(end)) if start <= end => {
                                        filter.years = Some(YearRange::new(start, end));
                                        println!("Set year filter: {} - {}", start, end);
                                    }
                                    _ => eprintln!("Invalid year range: START must be <= END"),
                                }
                            } else {
                                eprintln!("Usage: /year START END  or  /year clear");
                            }
                        }
                        "/lang" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /lang CODE  or  /lang clear");
                                continue;
                            }
                            if parts[1] == "clear" {
                                filter.language = None;
                                println!("Cleared language filter");
                            } else {
                                filter.language = Some(parts[1].to_string());
                                println!("Set language filter: {}", parts[1]);
                            }
                        }
                        "/format" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /format [table|json]");
                                continue;
                            }
                            match parts[1] {
                                "table" => {
                                    format = OutputFormat::Table;
                                    println!("Set output format to table");
                                }
                                "json" => {
                                    format = OutputFormat::Json;
                                    println!("Set output format to JSON");
                                }
                                _ => eprintln!("Invalid format: must be 'table' or 'json'"),
                            }
                        }
                        "/detail" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /detail N");
                                continue;
                            }
                            match parts[1].parse::<usize>() {
                                Ok(rank) if rank > 0 && rank <= last_results.len() => {
                                    display_result_detail(&last_results[rank - 1], rank);
                                }
                                Ok(rank) if rank > last_results.len() => {
                                    eprintln!(
                                        "Rank {} out of range (last search had {} results)",
                                        rank,
                                        last_results.len()
                                    );
                                }
                                _ => eprintln!("Invalid rank: must be a positive integer"),
                            }
                        }
                        _ => eprintln!(
                            "Unknown command: {}. Type /help for available commands.",
                            parts[0]
                        ),
                    }
                } else {
                    let start = Instant::now();
                    match execute_search(&engine, line, top_k, &filter, min_score).await {
                        Ok(results) => {
                            last_results = results.clone();
                            print_results(&results, &format, start.elapsed().as_secs_f64());
                        }
                        Err(e) => {
                            eprintln!("Search failed: {}", e);
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

/// Run single-query mode
async fn run_single_query<E: EmbeddingProvider>(
    engine: SnapshotSearchEngine<E>,
    query: &str,
    top_k: usize,
    filter: &RecordFilter,
    min_score: Option<f32>,
    format: OutputFormat,
) -> Result<()> {
    let start = Instant::now();
    let results = execute_search(&engine, query, top_k, filter, min_score).await?;
    print_results(&results, &format, start.elapsed().as_secs_f64());

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level);

    // Validate arguments
    if !args.interactive && args.query.is_none() {
        anyhow::bail!(
            "Either --query or --interactive must be specified.\n\
             Use --help for usage information."
        );
    }

    if let (Some(start), Some(end)) = (args.year_from, args.year_to) {
        if start > end {
            anyhow::bail!(
                "Invalid year range: start year ({}) cannot be greater than end year ({})",
                start,
                end
            );
        }
    }

    if !args.index.exists() {
        anyhow::bail!(
            "Index directory not found: {}\n\
             Run the build-index binary first to create the artifacts.",
            args.index.display()
        );
    }

    info!("Loading index artifacts from: {}", args.index.display());

    let snapshot = artifacts::load(&args.index)
        .with_context(|| format!("Failed to load index artifacts from {}", args.index.display()))?;

    info!(
        "Loaded snapshot: {} records, model {} (dimension {})",
        snapshot.corpus.len(),
        snapshot.config.model_name,
        snapshot.config.dimension
    );

    if snapshot.index.is_empty() {
        info!("Index is empty; every query will return no results");
    }

    let provider = create_embedding_provider(
        &snapshot.config.model_name,
        snapshot.config.dimension,
        args.cache_dir.clone(),
    )?;

    info!("Embedding provider initialized successfully");

    let engine = SnapshotSearchEngine::new(provider, SnapshotHandle::with_snapshot(snapshot));

    let years = match (args.year_from, args.year_to) {
        (Some(start), Some(end)) => Some(YearRange::new(start, end)),
        (Some(start), None) => Some(YearRange::new(start, i32::MAX)),
        (None, Some(end)) => Some(YearRange::new(i32::MIN, end)),
        (None, None) => None,
    };
    let filter = RecordFilter {
        authors: args.author,
        categories: args.category,
        affiliations: args.affiliation,
        language: args.lang,
        years,
    };

    // A floor at or below -1 admits every cosine score; treat it as "no floor".
    let min_score = (args.min_score > -1.0).then_some(args.min_score);

    if args.interactive {
        run_interactive(engine, args.top_k, filter, min_score, args.format).await?;
    } else {
        let query = args.query.as_deref().unwrap_or_default();
        run_single_query(engine, query, args.top_k, &filter, min_score, args.format).await?;
    }

    Ok(())
}
