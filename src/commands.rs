use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::embeddings::{Embedder, OllamaClient};
use crate::extraction::FileExtractor;
use crate::index::{VectorIndex, list_collections};
use crate::indexer::{IngestionReport, Indexer};
use crate::query::{Answer, PromptStyle, QueryPipeline, QuerySettings};
use crate::retriever::{Retriever, SearchMode};

const ANSWER_PREVIEW_CHARS: usize = 150;
const INSPECT_PREVIEW_CHARS: usize = 200;
const INSPECT_SEARCH_K: usize = 3;
pub const DEFAULT_INSPECT_QUERY: &str = "What is this document about?";

/// Command-line overrides for a single question
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub collection: Option<String>,
    pub mode: Option<SearchMode>,
    pub k: Option<usize>,
    pub style: Option<PromptStyle>,
    /// Sources to ingest first when the collection is empty
    pub docs: Vec<PathBuf>,
}

/// Ingest documents into a collection
#[inline]
pub async fn ingest_documents(
    config: &Config,
    sources: &[PathBuf],
    collection: Option<&str>,
    rebuild: bool,
) -> Result<IngestionReport> {
    let collection = collection.unwrap_or(&config.storage.collection);
    info!("Ingesting {} sources into '{}'", sources.len(), collection);

    let client = ollama_client(config)?;
    let mut index = if rebuild {
        println!("Rebuilding collection '{}' from scratch", collection);
        with_configured_dimension(config, VectorIndex::new(config.collections_dir(), collection)?)?
    } else {
        open_index(config, collection)?
    };

    let report = build_indexer(config, client)?
        .ingest(&mut index, sources)
        .await
        .with_context(|| format!("Failed to ingest into collection '{}'", collection))?;

    print_ingestion_report(collection, &report);
    Ok(report)
}

/// Answer one question and print the retrieved context and the answer
#[inline]
pub async fn ask_question(config: &Config, question: &str, options: &AskOptions) -> Result<()> {
    let config = apply_overrides(config, options)?;
    let collection = config.storage.collection.as_str();

    let client = ollama_client(&config)?;
    let mut index = open_index(&config, collection)?;

    if !options.docs.is_empty() {
        let report = build_indexer(&config, Arc::clone(&client))?
            .ingest(&mut index, &options.docs)
            .await
            .context("Failed to ingest documents")?;
        print_ingestion_report(collection, &report);
    }

    if index.is_empty() {
        warn!("Collection '{}' is empty", collection);
    }

    let answer = query_pipeline(&config, client)
        .ask(&index, question)
        .await
        .context("Failed to answer question")?;

    print_answer(&answer);
    Ok(())
}

/// Interactive question loop until `quit` or `exit`
#[inline]
pub async fn run_chat(config: &Config, options: &AskOptions) -> Result<()> {
    let config = apply_overrides(config, options)?;
    let collection = config.storage.collection.as_str();
    let client = ollama_client(&config)?;
    let mut index = open_index(&config, collection)?;

    if !options.docs.is_empty() {
        let report = build_indexer(&config, Arc::clone(&client))?
            .ingest(&mut index, &options.docs)
            .await
            .context("Failed to ingest documents")?;
        print_ingestion_report(collection, &report);
    }

    if index.is_empty() {
        println!(
            "Collection '{}' is empty. Use 'docs-rag ingest <PATH>' to add documents.",
            collection
        );
        return Ok(());
    }

    let pipeline = query_pipeline(&config, client);
    println!(
        "{} Chatting with '{}' ({} segments). Type 'quit' or 'exit' to leave.",
        style("💬").bold(),
        style(collection).cyan(),
        index.count()
    );

    loop {
        let question: String = Input::new()
            .with_prompt("Question")
            .interact_text()
            .context("Failed to read question")?;

        if is_exit_command(&question) {
            break;
        }

        match pipeline.ask(&index, &question).await {
            Ok(answer) => {
                println!();
                print_answer(&answer);
                println!();
            }
            Err(e) => {
                error!("Question failed: {}", e);
                println!("{} {}", style("Error:").red(), e);
            }
        }
    }

    Ok(())
}

/// Print a collection's size, a sample of its records and a test search
#[inline]
pub async fn inspect_collection(
    config: &Config,
    collection: Option<&str>,
    query: Option<&str>,
    limit: usize,
) -> Result<()> {
    let collection = collection.unwrap_or(&config.storage.collection);
    let index = open_index(config, collection)?;

    println!("📚 Collection: {}", collection);
    println!("   Location: {}", index.location().display());
    println!("   Segments: {}", index.count());
    match index.dimension() {
        Some(dimension) => println!("   Dimensions: {}", dimension),
        None => println!("   Dimensions: (not set)"),
    }

    if index.is_empty() {
        println!();
        println!("Collection is empty. Use 'docs-rag ingest <PATH>' to add documents.");
        return Ok(());
    }

    println!();
    println!("First {} segments:", limit.min(index.count()));
    for record in index.sample(limit) {
        println!(
            "  #{} [{} @ {}] {}",
            record.id,
            record.segment.source_id,
            record.segment.offset,
            preview(&record.segment.text, INSPECT_PREVIEW_CHARS)
        );
    }

    let query = query.unwrap_or(DEFAULT_INSPECT_QUERY);
    let client = ollama_client(config)?;
    let query_embedding = client
        .embed(query)
        .await
        .context("Failed to embed test query")?;
    let hits = Retriever::new(&index).retrieve_scored(
        &query_embedding,
        INSPECT_SEARCH_K,
        config.retrieval.retrieval_mode(),
    )?;

    println!();
    println!("Test search: \"{}\"", query);
    for hit in &hits {
        println!(
            "  {:.3} [{}] {}",
            hit.score,
            hit.segment.source_id,
            preview(&hit.segment.text, INSPECT_PREVIEW_CHARS)
        );
    }

    Ok(())
}

/// Show Ollama health and stored collections
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 Docs RAG Status");
    println!();
    println!("Base directory: {}", config.get_base_dir().display());
    println!("Config file: {}", config.config_file_path().display());
    println!();

    println!("🤖 Ollama:");
    let client = OllamaClient::new(&config.ollama)?;
    let health = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .context("Health check task failed")?;
    match health {
        Ok(()) => println!(
            "   ✅ Connected at {}:{} (embedding: {}, generation: {})",
            config.ollama.host,
            config.ollama.port,
            config.ollama.embedding_model,
            config.ollama.generation_model
        ),
        Err(e) => {
            println!("   ❌ {}", e);
            println!("   Use 'docs-rag config' to update connection settings.");
        }
    }

    println!();
    println!("🗂  Collections:");
    let names = list_collections(config.collections_dir())?;
    if names.is_empty() {
        println!("   (none)");
    }
    for name in names {
        match VectorIndex::load(config.collections_dir(), &name) {
            Ok(index) => {
                let marker = if name == config.storage.collection {
                    " (default)"
                } else {
                    ""
                };
                println!("   • {}{}: {} segments", name, marker, index.count());
            }
            Err(e) => println!("   • {}: ❌ {}", name, e),
        }
    }

    println!();
    println!("💡 Next Steps:");
    println!("   • Use 'docs-rag ingest <PATH>' to index documents");
    println!("   • Use 'docs-rag ask <QUESTION>' to ask a single question");
    println!("   • Use 'docs-rag chat' to ask questions interactively");

    Ok(())
}

fn apply_overrides(config: &Config, options: &AskOptions) -> Result<Config> {
    let mut config = config.clone();
    if let Some(mode) = options.mode {
        config.retrieval.mode = mode;
    }
    if let Some(k) = options.k {
        config.retrieval.k = k;
        config.retrieval.fetch_k = config.retrieval.fetch_k.max(k);
    }
    if let Some(style) = options.style {
        config.prompt.style = style;
    }
    if let Some(collection) = &options.collection {
        config.storage.collection.clone_from(collection);
    }
    config.validate().context("Invalid command line options")?;
    Ok(config)
}

fn ollama_client(config: &Config) -> Result<Arc<OllamaClient>> {
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    Ok(Arc::new(client))
}

/// Timeout for one collaborator call, covering the client's own retries
fn call_timeout(config: &Config) -> Duration {
    config.ollama.timeout() * config.ollama.retry_attempts
}

fn build_indexer(config: &Config, client: Arc<OllamaClient>) -> Result<Indexer> {
    Ok(
        Indexer::new(Arc::new(FileExtractor::new()), client, config.chunking)?
            .with_batch_size(config.ollama.batch_size as usize)
            .with_timeout(call_timeout(config)),
    )
}

fn query_pipeline(config: &Config, client: Arc<OllamaClient>) -> QueryPipeline {
    QueryPipeline::new(
        Arc::clone(&client) as Arc<dyn Embedder>,
        client,
        QuerySettings::from_config(config),
    )
    .with_timeout(call_timeout(config))
}

fn open_index(config: &Config, collection: &str) -> Result<VectorIndex> {
    let index = VectorIndex::load(config.collections_dir(), collection)
        .with_context(|| format!("Failed to open collection '{}'", collection))?;
    with_configured_dimension(config, index)
}

fn with_configured_dimension(config: &Config, index: VectorIndex) -> Result<VectorIndex> {
    match config.ollama.embedding_dimension {
        Some(dimension) => Ok(index.with_dimension(dimension as usize)?),
        None => Ok(index),
    }
}

fn print_ingestion_report(collection: &str, report: &IngestionReport) {
    if report.reused_existing {
        println!(
            "Collection '{}' is already populated; reusing it. Pass --rebuild to re-ingest.",
            collection
        );
        return;
    }

    println!("Ingestion into '{}' completed!", collection);
    println!("  Documents found: {}", report.documents_found);
    println!("  Documents indexed: {}", report.documents_indexed);
    println!("  Documents skipped: {}", report.documents_skipped);
    println!("  Segments created: {}", report.segments_created);
    println!("  Records added: {}", report.records_added);
    println!("  Duration: {:.2?}", report.duration);
}

fn print_answer(answer: &Answer) {
    if !answer.segments.is_empty() {
        println!("{}", style("Retrieved context:").bold().yellow());
        for (position, segment) in answer.segments.iter().enumerate() {
            println!(
                "  {}. [{} @ {}] {}",
                position + 1,
                segment.source_id,
                segment.offset,
                preview(&segment.text, ANSWER_PREVIEW_CHARS)
            );
        }
        println!();
    }

    println!("{}", style("Answer:").bold().green());
    println!("{}", answer.text.trim());
}

fn is_exit_command(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "quit" | "exit")
}

/// First `max_chars` characters of `text` on one line
fn preview(text: &str, max_chars: usize) -> String {
    let flattened: String = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    let flattened = flattened.trim();

    let mut shortened: String = flattened.chars().take(max_chars).collect();
    if flattened.chars().count() > max_chars {
        shortened.push_str("...");
    }
    shortened
}
