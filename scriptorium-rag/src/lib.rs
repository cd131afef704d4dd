//! # scriptorium-rag
//!
//! Retrieval-augmented research over a personal knowledge workspace.
//!
//! ## Overview
//!
//! Documents are chunked and embedded by a background [`ComputeWorker`]
//! reached only through a correlated message [`ComputeChannel`]. Questions
//! are answered in two stages, broad vector search then cross-encoder
//! reranking, and the surviving passages are compressed to their most
//! relevant sentences. The [`ResearchCopilot`] composes this with a
//! [`ChatEngine`] into a cited [`ResearchBrief`].
//!
//! - [`KnowledgeBase`] - starts the worker and wires ingestion and retrieval
//! - [`IngestionPipeline`] - best-effort, per-chunk document ingestion
//! - [`RetrievalEngine`] - scoped and unscoped search, with or without rerank
//! - [`ResearchCopilot`] - decompose → expand → retrieve → cite → compile
//! - [`InMemoryVectorStore`] - the default store; `pgvector` for PostgreSQL
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scriptorium_rag::{InMemoryVectorStore, KnowledgeBase, RagConfig, ResearchCopilot};
//!
//! let kb = KnowledgeBase::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//! kb.ingestion().add_document_and_wait("Ownership", notes, "ws-1").await?;
//!
//! let copilot = ResearchCopilot::new(Arc::new(engine), kb.retrieval());
//! let outcome = copilot.research("What is a move?", "ws-1", &|_, _| {}).await?;
//! ```
//!
//! ## Features
//!
//! - `openai` - embeddings and chat over OpenAI-compatible HTTP APIs
//! - `pgvector` - PostgreSQL + pgvector knowledge store

pub mod brief;
pub mod channel;
pub mod chunking;
pub mod compression;
pub mod confidence;
pub mod config;
pub mod copilot;
pub mod document;
pub mod embedding;
pub mod error;
pub mod inmemory;
pub mod ingestion;
pub mod llm;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod reranker;
pub mod retrieval;
pub mod vectorstore;
pub mod worker;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "pgvector")]
pub mod pgvector;

pub use brief::{
    BibliographyEntry, Evidence, KeyFinding, ResearchBrief, ResearchTask, fallback_brief,
    parse_brief, parse_string_array,
};
pub use channel::{CHANNEL_CAPACITY, ComputeChannel};
pub use chunking::{Chunker, FixedSizeChunker, RecursiveChunker};
pub use compression::{DEFAULT_MAX_SENTENCES, compress};
pub use confidence::{RELEVANCE_THRESHOLD, confidence};
pub use config::{CopilotConfig, CopilotConfigBuilder, RagConfig, RagConfigBuilder};
pub use copilot::{ResearchCopilot, ResearchOutcome, ResearchStep, merge_results, render_sources};
pub use document::{Chunk, Citation, Document, EMBEDDING_DIMENSIONS, RetrievalResult, cite};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use inmemory::InMemoryVectorStore;
pub use ingestion::{INDEX_CONCURRENCY, IngestReport, IngestionPipeline};
pub use llm::{ChatEngine, ChatMessage, ChatOptions, ChatRole};
pub use pipeline::{KnowledgeBase, KnowledgeBaseBuilder};
pub use protocol::{RerankCandidate, ScoredCandidate, WorkerEvent, WorkerRequest};
pub use registry::{CorrelationRegistry, PendingResponse};
pub use reranker::{
    ChannelReranker, CrossEncoder, KeywordCrossEncoder, NoOpReranker, Reranker,
    SimilarityCrossEncoder,
};
pub use retrieval::RetrievalEngine;
pub use vectorstore::{StoreMatch, VectorStore};
pub use worker::ComputeWorker;
