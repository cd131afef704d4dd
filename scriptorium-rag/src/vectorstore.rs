//! Vector store trait for persisting chunks and running nearest-neighbour queries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{Chunk, Document};
use crate::error::Result;

/// One row returned by a nearest-neighbour query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreMatch {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    /// `1 - distance` under the store's cosine distance.
    pub similarity: f32,
    /// Parent document title; populated by workspace-scoped queries.
    pub title: Option<String>,
}

/// A storage backend for documents and their embedded chunks.
///
/// Chunks belong to exactly one document and are removed with it.
///
/// # Example
///
/// ```rust,ignore
/// use scriptorium_rag::{Document, InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// let document = Document::new("Notes", "ws-1");
/// store.insert_document(&document).await?;
/// store.upsert_chunk(&chunk).await?;
/// let rows = store.nearest(&query_embedding, Some("ws-1"), 20).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persist a document record.
    async fn insert_document(&self, document: &Document) -> Result<()>;

    /// Delete a document and, in cascade, all of its chunks.
    async fn delete_document(&self, document_id: &str) -> Result<()>;

    /// Insert or replace a chunk. The parent document must exist and the
    /// embedding, if present, must have the store's dimensionality.
    async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()>;

    /// All chunks of a document, ordered by chunk ID.
    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Return up to `limit` embedded chunks closest to `embedding`.
    ///
    /// Rows are ordered by ascending distance (descending similarity). When
    /// `workspace_id` is set, only chunks whose parent document belongs to
    /// that workspace are considered and each row carries the parent title.
    async fn nearest(
        &self,
        embedding: &[f32],
        workspace_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoreMatch>>;
}
