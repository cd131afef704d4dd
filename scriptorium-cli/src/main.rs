//! Scriptorium CLI - research a folder of notes from the terminal.
//!
//! # Usage
//!
//! ```bash
//! # Ask a research question over ./notes using a local OpenAI-compatible server
//! scriptorium research --docs ./notes --base-url http://localhost:11434/v1 \
//!     --chat-model llama3.1 --embedding-model nomic-embed-text "How do lifetimes work?"
//!
//! # Retrieval only, no chat model involved
//! scriptorium search --docs ./notes "borrow checker" --format text
//! ```
//!
//! Every flag can also be set through its environment variable, and a `.env`
//! file in the working directory is loaded first.

mod corpus;
mod output;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use scriptorium_rag::openai::{DEFAULT_BASE_URL, OpenAIChatEngine, OpenAIEmbeddingProvider};
use scriptorium_rag::{
    InMemoryVectorStore, KeywordCrossEncoder, KnowledgeBase, RagConfig, ResearchCopilot,
    VectorStore,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::corpus::Note;
use crate::output::Format;

/// Research assistant over a folder of markdown and text notes.
#[derive(Parser)]
#[command(name = "scriptorium", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest the notes and compile a cited research brief for a question.
    Research {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// Chat model used for planning and compiling the brief
        #[arg(long, env = "SCRIPTORIUM_CHAT_MODEL", default_value = "gpt-4o-mini")]
        chat_model: String,

        /// The research question
        question: String,
    },
    /// Ingest the notes and print the reranked passages for a query.
    Search {
        #[command(flatten)]
        corpus: CorpusArgs,

        /// The search query
        query: String,
    },
}

#[derive(Args)]
struct CorpusArgs {
    /// Folder of .md/.txt notes to ingest
    #[arg(long, env = "SCRIPTORIUM_DOCS")]
    docs: PathBuf,

    /// Workspace the notes are ingested into and searched within
    #[arg(long, env = "SCRIPTORIUM_WORKSPACE", default_value = "default")]
    workspace: String,

    /// Root of the OpenAI-compatible API
    #[arg(long, env = "SCRIPTORIUM_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// API key; optional for local servers
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Embedding model served at the same API
    #[arg(long, env = "SCRIPTORIUM_EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Embedding dimensionality requested from the model
    #[arg(
        long,
        env = "SCRIPTORIUM_DIMENSIONS",
        default_value_t = scriptorium_rag::EMBEDDING_DIMENSIONS
    )]
    dimensions: usize,

    /// PostgreSQL URL; stores chunks in pgvector instead of memory
    #[cfg(feature = "pgvector")]
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "json")]
    format: Format,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Research { corpus, chat_model, question } => {
            let kb = ingest(&corpus).await?;
            let engine = OpenAIChatEngine::new(&corpus.base_url, corpus.api_key.clone())
                .with_model(chat_model);
            let copilot = ResearchCopilot::new(Arc::new(engine), kb.retrieval());

            let outcome = copilot
                .research(&question, &corpus.workspace, &|step, detail| {
                    eprintln!("[{step}/5] {detail}");
                })
                .await
                .context("the chat engine is not available")?;
            println!("{}", output::format_outcome(&outcome, corpus.format));
        }
        Command::Search { corpus, query } => {
            let kb = ingest(&corpus).await?;
            let results =
                kb.retrieval().search_with_rerank_scoped(&query, &corpus.workspace).await;
            println!("{}", output::format_search(&query, &results, corpus.format));
        }
    }
    Ok(())
}

#[cfg(feature = "pgvector")]
async fn open_store(corpus: &CorpusArgs) -> Result<Arc<dyn VectorStore>> {
    let Some(url) = &corpus.database_url else {
        return Ok(Arc::new(InMemoryVectorStore::with_dimensions(corpus.dimensions)));
    };
    let store = scriptorium_rag::pgvector::PgVectorStore::new(url, corpus.dimensions)
        .await
        .context("failed to connect to PostgreSQL")?;
    store.migrate().await.context("failed to prepare the pgvector schema")?;
    info!("using pgvector store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "pgvector"))]
async fn open_store(corpus: &CorpusArgs) -> Result<Arc<dyn VectorStore>> {
    Ok(Arc::new(InMemoryVectorStore::with_dimensions(corpus.dimensions)))
}

/// Build the knowledge base and ingest every note under `--docs`.
async fn ingest(corpus: &CorpusArgs) -> Result<KnowledgeBase> {
    let notes = corpus::load_notes(&corpus.docs)?;
    if notes.is_empty() {
        warn!(docs = %corpus.docs.display(), "no notes found");
    }

    let config = RagConfig::builder().embedding_dimensions(corpus.dimensions).build()?;
    let embedder = OpenAIEmbeddingProvider::new(&corpus.base_url, corpus.api_key.clone())
        .with_model(&corpus.embedding_model)
        .with_dimensions(corpus.dimensions);
    let kb = KnowledgeBase::builder()
        .config(config)
        .embedding_provider(Arc::new(embedder))
        .cross_encoder(Arc::new(KeywordCrossEncoder::default()))
        .vector_store(open_store(corpus).await?)
        .build()?;

    let (stored, dropped) = ingest_notes(&kb, &notes, &corpus.workspace).await?;
    if dropped > 0 {
        warn!(dropped, "some chunks could not be embedded or stored");
    }
    info!(notes = notes.len(), chunks = stored, workspace = %corpus.workspace, "notes ingested");
    Ok(kb)
}

/// Ingest each note under its source path, replacing what an earlier run
/// stored for it, so a persistent store keeps one copy per note.
async fn ingest_notes(
    kb: &KnowledgeBase,
    notes: &[Note],
    workspace: &str,
) -> Result<(usize, usize)> {
    let (mut stored, mut dropped) = (0, 0);
    for note in notes {
        let report = kb
            .ingestion()
            .replace_document(&note.source, &note.title, &note.content, workspace)
            .await
            .with_context(|| format!("failed to ingest {}", note.path.display()))?;
        stored += report.stored;
        dropped += report.dropped;
    }
    Ok((stored, dropped))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use scriptorium_rag::EmbeddingProvider;

    use super::*;

    const DIMENSIONS: usize = 8;

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        async fn embed(&self, text: &str) -> scriptorium_rag::Result<Vec<f32>> {
            let mut vector = vec![1.0; DIMENSIONS];
            vector[0] += text.len() as f32;
            Ok(vector)
        }

        fn dimensions(&self) -> usize {
            DIMENSIONS
        }
    }

    #[tokio::test]
    async fn ingesting_twice_keeps_one_copy_of_each_note() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("moves.md"), "# Moves\n\nA move transfers ownership.")
            .unwrap();
        std::fs::write(dir.path().join("borrows.md"), "Borrows never take ownership.").unwrap();
        let notes = corpus::load_notes(dir.path()).unwrap();

        let store = Arc::new(InMemoryVectorStore::with_dimensions(DIMENSIONS));
        let config = RagConfig::builder().embedding_dimensions(DIMENSIONS).build().unwrap();
        let kb = KnowledgeBase::builder()
            .config(config)
            .embedding_provider(Arc::new(LengthEmbedder))
            .vector_store(store.clone())
            .build()
            .unwrap();

        let (first, _) = ingest_notes(&kb, &notes, "ws").await.unwrap();
        let (second, dropped) = ingest_notes(&kb, &notes, "ws").await.unwrap();
        assert_eq!(first, 2);
        assert_eq!((second, dropped), (2, 0));
        assert_eq!(store.chunk_count().await, 2);

        let hits = store.nearest(&[1.0; DIMENSIONS], Some("ws"), 10).await.unwrap();
        assert_eq!(hits.len(), 2);
    }
}
