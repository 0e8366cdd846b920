//! Command-line entry point for the document ingestion pipeline.

use clap::{Parser, Subcommand};
use docpipe::config::Config;
use docpipe::extraction::{ExtractionRequest, ExtractionService};
use docpipe::logging;
use serde_json::{Map, Value};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "docpipe", version, about = "Ingest documents into a Chroma vector store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a document, chunk it, embed it, and persist the chunks.
    Extract {
        /// Path to the source document.
        source: String,
        /// File format: pdf, spreadsheet, text, or html.
        #[arg(long, default_value = "text")]
        file_type: String,
        /// Splitting strategy: recursive, token, or character.
        #[arg(long)]
        strategy: Option<String>,
        /// Target chunk size in characters (tokens for the token strategy).
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Overlap carried between adjacent chunks.
        #[arg(long)]
        chunk_overlap: Option<usize>,
        /// Extra metadata as a JSON object, merged into every chunk.
        #[arg(long)]
        metadata: Option<String>,
        /// Skip the vector store write and only report the chunks.
        #[arg(long)]
        no_save: bool,
    },
    /// Query the collection for chunks similar to the given text.
    Search {
        /// Query text.
        query: String,
        /// Number of results to return.
        #[arg(short = 'k', long, default_value_t = 5)]
        top_k: usize,
        /// Metadata filter as a JSON object.
        #[arg(long)]
        filter: Option<String>,
    },
    /// List every chunk currently stored in the collection.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let cli = Cli::parse();
    let config = Arc::new(Config::from_env()?);
    let service = ExtractionService::new(config)?;

    match cli.command {
        Command::Extract {
            source,
            file_type,
            strategy,
            chunk_size,
            chunk_overlap,
            metadata,
            no_save,
        } => {
            let metadata = metadata
                .as_deref()
                .map(parse_metadata_object)
                .transpose()?;
            let request = ExtractionRequest {
                source,
                file_type,
                chunking_strategy: strategy,
                chunk_size,
                chunk_overlap,
                metadata,
                save_to_vector_store: !no_save,
            };
            let result = service.extract(request).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Search {
            query,
            top_k,
            filter,
        } => {
            let filter = filter
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()?;
            let results = service.search(&query, top_k, filter).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::List => {
            let chunks = service.list_chunks().await?;
            println!("{}", serde_json::to_string_pretty(&chunks)?);
        }
    }

    Ok(())
}

fn parse_metadata_object(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("metadata must be a JSON object, got: {other}"),
    }
}
