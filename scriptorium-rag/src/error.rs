//! Error types for the `scriptorium-rag` crate.

use thiserror::Error;

/// Errors that can occur in retrieval and research operations.
///
/// Most of the pipeline absorbs these and degrades to an empty or fallback
/// result. The ones a caller actually sees are configuration problems,
/// document creation failures, and an engine that cannot be made ready.
#[derive(Debug, Error)]
pub enum RagError {
    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during result reranking.
    #[error("Reranker error ({reranker}): {message}")]
    RerankerError {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// The compute channel rejected or could not deliver a request.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// The language-model engine failed or is not ready.
    #[error("Engine error ({engine}): {message}")]
    EngineError {
        /// The engine that produced the error.
        engine: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Model output could not be parsed into the expected shape.
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
