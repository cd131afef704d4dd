//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by
//! `HashMap`s protected by a `tokio::sync::RwLock`. It is suitable for
//! development, testing, and single-process use.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{Chunk, Document, EMBEDDING_DIMENSIONS};
use crate::error::{RagError, Result};
use crate::vectorstore::{StoreMatch, VectorStore};

const BACKEND: &str = "InMemory";

#[derive(Debug, Default)]
struct Tables {
    documents: HashMap<String, Document>,
    chunks: HashMap<String, Chunk>,
}

/// An in-memory vector store using cosine similarity for search.
///
/// Reads (queries) take a shared lock, so any number of retrievals run
/// concurrently; only ingestion writes.
#[derive(Debug)]
pub struct InMemoryVectorStore {
    dimensions: usize,
    tables: RwLock<Tables>,
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryVectorStore {
    /// Create an empty store for [`EMBEDDING_DIMENSIONS`]-length vectors.
    pub fn new() -> Self {
        Self::with_dimensions(EMBEDDING_DIMENSIONS)
    }

    /// Create an empty store for vectors of the given length.
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions, tables: RwLock::new(Tables::default()) }
    }

    /// Number of stored chunks, embedded or not.
    pub async fn chunk_count(&self) -> usize {
        self.tables.read().await.chunks.len()
    }

    fn error(message: String) -> RagError {
        RagError::VectorStoreError { backend: BACKEND.to_string(), message }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert_document(&self, document: &Document) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.documents.remove(document_id);
        tables.chunks.retain(|_, chunk| chunk.document_id != document_id);
        Ok(())
    }

    async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()> {
        if let Some(embedding) = &chunk.embedding {
            if embedding.len() != self.dimensions {
                return Err(Self::error(format!(
                    "chunk '{}' has a {}-dimensional embedding, expected {}",
                    chunk.id,
                    embedding.len(),
                    self.dimensions
                )));
            }
        }

        let mut tables = self.tables.write().await;
        if !tables.documents.contains_key(&chunk.document_id) {
            return Err(Self::error(format!(
                "parent document '{}' of chunk '{}' does not exist",
                chunk.document_id, chunk.id
            )));
        }
        tables.chunks.insert(chunk.id.clone(), chunk.clone());
        Ok(())
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let tables = self.tables.read().await;
        let mut chunks: Vec<Chunk> = tables
            .chunks
            .values()
            .filter(|chunk| chunk.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(chunks)
    }

    async fn nearest(
        &self,
        embedding: &[f32],
        workspace_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoreMatch>> {
        if embedding.len() != self.dimensions {
            return Err(Self::error(format!(
                "query embedding has {} dimensions, expected {}",
                embedding.len(),
                self.dimensions
            )));
        }

        let tables = self.tables.read().await;
        let mut scored: Vec<StoreMatch> = tables
            .chunks
            .values()
            .filter_map(|chunk| {
                let vector = chunk.embedding.as_ref()?;
                let title = match workspace_id {
                    Some(workspace) => {
                        let parent = tables.documents.get(&chunk.document_id)?;
                        if parent.workspace_id != workspace {
                            return None;
                        }
                        Some(parent.title.clone())
                    }
                    None => None,
                };
                Some(StoreMatch {
                    chunk_id: chunk.id.clone(),
                    document_id: chunk.document_id.clone(),
                    content: chunk.content.clone(),
                    similarity: cosine_similarity(vector, embedding),
                    title,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        scored.truncate(limit);
        Ok(scored)
    }
}
