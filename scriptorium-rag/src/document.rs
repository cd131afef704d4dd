//! Data types for documents, chunks, retrieval results, and citations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Length of every stored chunk embedding.
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// A source document owned by one workspace.
///
/// The record is written before any of its chunks so that its ID is valid
/// while embeddings are still being generated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// Human-readable title, surfaced in citations.
    pub title: String,
    /// The workspace this document belongs to.
    pub workspace_id: String,
    /// When the document record was created.
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document record with a fresh ID.
    pub fn new(title: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            workspace_id: workspace_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Create a record whose ID is derived from `source` (a path, a URL) and
    /// the workspace, so re-ingesting the same source yields the same ID.
    pub fn from_source(
        title: impl Into<String>,
        workspace_id: impl Into<String>,
        source: &str,
    ) -> Self {
        let workspace_id = workspace_id.into();
        let name = format!("{workspace_id}\n{source}");
        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string(),
            title: title.into(),
            workspace_id,
            created_at: Utc::now(),
        }
    }
}

/// A contiguous slice of a [`Document`]'s text, the unit of embedding and retrieval.
///
/// `embedding` is either absent or a complete vector; stores reject vectors of
/// the wrong length rather than writing them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Unique identifier, `"{document_id}-{index}"`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// The text content of the chunk.
    pub content: String,
    /// The vector embedding, once generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    /// Build the ID of the `index`-th chunk of a document.
    pub fn chunk_id(document_id: &str, index: usize) -> String {
        format!("{document_id}-{index}")
    }
}

/// A chunk retrieved for one query. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    pub source_chunk_id: String,
    pub content: String,
    /// First-stage vector similarity in `[0, 1]`.
    pub similarity: f32,
    /// Cross-encoder relevance in `[0, 1]`, set by the reranking stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
}

impl RetrievalResult {
    /// The score used to order merged results: rerank score when present,
    /// vector similarity otherwise.
    pub fn relevance(&self) -> f32 {
        self.rerank_score.unwrap_or(self.similarity)
    }
}

/// A numbered reference to one retrieved passage in a research response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    /// 1-based position within the response.
    pub index: usize,
    pub content: String,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    pub source_title: String,
    pub source_chunk_id: String,
}

impl Citation {
    /// Title used when a result carries no parent document title.
    pub const UNTITLED: &'static str = "Untitled";

    /// Derive the citation for the result at 1-based `index`.
    pub fn from_result(index: usize, result: &RetrievalResult) -> Self {
        Self {
            index,
            content: result.content.clone(),
            similarity: result.similarity,
            rerank_score: result.rerank_score,
            source_title: result
                .source_title
                .clone()
                .unwrap_or_else(|| Self::UNTITLED.to_string()),
            source_chunk_id: result.source_chunk_id.clone(),
        }
    }
}

/// Number `results` as citations `1..=N` in their current order.
pub fn cite(results: &[RetrievalResult]) -> Vec<Citation> {
    results.iter().enumerate().map(|(i, result)| Citation::from_result(i + 1, result)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_ids_are_stable_per_workspace() {
        let first = Document::from_source("Notes", "ws-1", "rust/ownership.md");
        let again = Document::from_source("Renamed", "ws-1", "rust/ownership.md");
        assert_eq!(first.id, again.id);

        assert_ne!(first.id, Document::from_source("Notes", "ws-2", "rust/ownership.md").id);
        assert_ne!(first.id, Document::from_source("Notes", "ws-1", "rust/borrowing.md").id);
        assert_ne!(Document::new("Notes", "ws-1").id, Document::new("Notes", "ws-1").id);
    }
}
