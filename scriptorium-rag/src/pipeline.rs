//! Composition root for the knowledge workspace.
//!
//! The [`KnowledgeBase`] starts the compute worker and wires the
//! [`IngestionPipeline`] and [`RetrievalEngine`] to it and to a shared
//! [`VectorStore`].
//!
//! # Example
//!
//! ```rust,ignore
//! use scriptorium_rag::{InMemoryVectorStore, KnowledgeBase, RagConfig};
//!
//! let kb = KnowledgeBase::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! kb.ingestion().add_document_and_wait("Notes", &text, "ws-1").await?;
//! let results = kb.retrieval().search_with_rerank_scoped("query", "ws-1").await;
//! ```

use std::sync::Arc;

use tracing::info;

use crate::channel::ComputeChannel;
use crate::chunking::{Chunker, RecursiveChunker};
use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::ingestion::IngestionPipeline;
use crate::reranker::{ChannelReranker, CrossEncoder, Reranker, SimilarityCrossEncoder};
use crate::retrieval::RetrievalEngine;
use crate::vectorstore::VectorStore;
use crate::worker::ComputeWorker;

/// A running knowledge workspace: worker, store, ingestion and retrieval.
///
/// The compute worker lives as long as any handle to its channel, including
/// the ones held by [`RetrievalEngine`]s handed out by [`retrieval`](Self::retrieval).
/// Construct one via [`KnowledgeBase::builder()`].
pub struct KnowledgeBase {
    config: RagConfig,
    channel: ComputeChannel,
    vector_store: Arc<dyn VectorStore>,
    ingestion: IngestionPipeline,
    retrieval: Arc<RetrievalEngine>,
}

impl KnowledgeBase {
    /// Create a new [`KnowledgeBaseBuilder`].
    pub fn builder() -> KnowledgeBaseBuilder {
        KnowledgeBaseBuilder::default()
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The channel to the compute worker.
    pub fn channel(&self) -> &ComputeChannel {
        &self.channel
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    pub fn ingestion(&self) -> &IngestionPipeline {
        &self.ingestion
    }

    /// The retrieval engine, shareable with a research copilot.
    pub fn retrieval(&self) -> Arc<RetrievalEngine> {
        Arc::clone(&self.retrieval)
    }
}

/// Builder for constructing a [`KnowledgeBase`].
///
/// `config`, `embedding_provider` and `vector_store` are required. The
/// chunker defaults to a [`RecursiveChunker`] sized from the config, the
/// worker's cross encoder to [`SimilarityCrossEncoder`], and the reranker to
/// a [`ChannelReranker`] over the worker.
#[derive(Default)]
pub struct KnowledgeBaseBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    cross_encoder: Option<Arc<dyn CrossEncoder>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl KnowledgeBaseBuilder {
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider run inside the compute worker.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the cross encoder run inside the compute worker.
    pub fn cross_encoder(mut self, cross_encoder: Arc<dyn CrossEncoder>) -> Self {
        self.cross_encoder = Some(cross_encoder);
        self
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Replace the worker-backed reranker.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Validate the parts, spawn the compute worker and wire everything up.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required part is missing or the
    /// embedding provider's dimensionality disagrees with the config.
    pub fn build(self) -> Result<KnowledgeBase> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;

        if embedding_provider.dimensions() != config.embedding_dimensions {
            return Err(RagError::ConfigError(format!(
                "embedding provider produces {} dimensions but the config expects {}",
                embedding_provider.dimensions(),
                config.embedding_dimensions
            )));
        }

        let cross_encoder = self.cross_encoder.unwrap_or_else(|| Arc::new(SimilarityCrossEncoder));
        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap))
        });

        let (channel, _worker) = ComputeWorker::new(embedding_provider, cross_encoder)
            .spawn(config.channel_timeout);
        let reranker =
            self.reranker.unwrap_or_else(|| Arc::new(ChannelReranker::new(channel.clone())));

        let ingestion =
            IngestionPipeline::new(channel.clone(), Arc::clone(&vector_store), chunker);
        let retrieval = Arc::new(RetrievalEngine::new(
            config.clone(),
            channel.clone(),
            Arc::clone(&vector_store),
            reranker,
        ));

        info!(
            dimensions = config.embedding_dimensions,
            timeout_secs = config.channel_timeout.as_secs(),
            "knowledge base ready"
        );
        Ok(KnowledgeBase { config, channel, vector_store, ingestion, retrieval })
    }
}
