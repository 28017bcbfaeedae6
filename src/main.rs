use std::path::PathBuf;

use clap::{Parser, Subcommand};
use docs_rag::Result;
use docs_rag::commands::{
    AskOptions, ask_question, ingest_documents, inspect_collection, run_chat, show_status,
};
use docs_rag::config::{Config, resolve_config_dir, run_interactive_config, show_config};
use docs_rag::query::PromptStyle;
use docs_rag::retriever::SearchMode;

#[derive(Parser)]
#[command(name = "docs-rag")]
#[command(about = "Answer questions about local documents with a retrieval-augmented pipeline")]
#[command(version)]
struct Cli {
    /// Directory holding the configuration and collections (default: ~/.docs-rag)
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and pipeline settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ingest files or directories into a collection
    Ingest {
        /// Files or directories to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Collection to ingest into
        #[arg(long)]
        collection: Option<String>,
        /// Discard the existing collection and ingest from scratch
        #[arg(long)]
        rebuild: bool,
    },
    /// Ask a single question
    Ask {
        question: String,
        /// Ingest these sources first if the collection is empty
        #[arg(long = "docs")]
        docs: Vec<PathBuf>,
        /// Collection to answer from
        #[arg(long)]
        collection: Option<String>,
        /// Retrieval mode
        #[arg(long, value_enum)]
        mode: Option<SearchMode>,
        /// Number of segments to retrieve
        #[arg(short, long)]
        k: Option<usize>,
        /// Prompt style
        #[arg(long, value_enum)]
        style: Option<PromptStyle>,
    },
    /// Ask questions interactively
    Chat {
        /// Ingest these sources first if the collection is empty
        #[arg(long = "docs")]
        docs: Vec<PathBuf>,
        /// Collection to answer from
        #[arg(long)]
        collection: Option<String>,
        /// Retrieval mode
        #[arg(long, value_enum)]
        mode: Option<SearchMode>,
        /// Number of segments to retrieve
        #[arg(short, long)]
        k: Option<usize>,
    },
    /// Show a collection's contents and run a test search
    Inspect {
        /// Collection to inspect
        #[arg(long)]
        collection: Option<String>,
        /// Test search query
        #[arg(long)]
        query: Option<String>,
        /// Number of sample segments to show
        #[arg(long, default_value_t = 3)]
        limit: usize,
    },
    /// Show Ollama health and stored collections
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = resolve_config_dir(cli.base_dir.as_deref())?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Ingest {
            paths,
            collection,
            rebuild,
        } => {
            let config = Config::load(&config_dir)?;
            ingest_documents(&config, &paths, collection.as_deref(), rebuild).await?;
        }
        Commands::Ask {
            question,
            docs,
            collection,
            mode,
            k,
            style,
        } => {
            let config = Config::load(&config_dir)?;
            let options = AskOptions {
                collection,
                mode,
                k,
                style,
                docs,
            };
            ask_question(&config, &question, &options).await?;
        }
        Commands::Chat {
            docs,
            collection,
            mode,
            k,
        } => {
            let config = Config::load(&config_dir)?;
            let options = AskOptions {
                collection,
                mode,
                k,
                style: None,
                docs,
            };
            run_chat(&config, &options).await?;
        }
        Commands::Inspect {
            collection,
            query,
            limit,
        } => {
            let config = Config::load(&config_dir)?;
            inspect_collection(&config, collection.as_deref(), query.as_deref(), limit).await?;
        }
        Commands::Status => {
            let config = Config::load(&config_dir)?;
            show_status(&config).await?;
        }
    }

    Ok(())
}
