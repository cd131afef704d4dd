//! Messages exchanged with the background compute worker.
//!
//! Both directions serialise as a flat JSON object tagged by `type`, with
//! camelCase payload fields:
//!
//! ```text
//! out  INDEX             {id, text}
//! in   INDEX_GENERATED   {id, text, embedding}
//! out  SEARCH            {query, searchId}
//! in   SEARCH_GENERATED  {embedding, searchId}
//! out  RERANK            {searchId, query, candidates: [{id, content, similarity}]}
//! in   RERANK_COMPLETE   {searchId, results}
//! in   STATUS / ERROR    {message}
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a fresh, unique correlation ID.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// A candidate passage sent for cross-encoder scoring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerankCandidate {
    pub id: String,
    pub content: String,
    pub similarity: f32,
}

/// A candidate with its cross-encoder score, as returned by the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredCandidate {
    pub id: String,
    pub content: String,
    pub similarity: f32,
    pub score: f32,
}

/// Requests sent to the compute worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerRequest {
    /// Embed one chunk of a document being ingested.
    Index { id: String, text: String },
    /// Embed a search query.
    #[serde(rename_all = "camelCase")]
    Search { query: String, search_id: String },
    /// Score `(query, candidate)` pairs with the cross encoder.
    #[serde(rename_all = "camelCase")]
    Rerank { search_id: String, query: String, candidates: Vec<RerankCandidate> },
}

impl WorkerRequest {
    /// The ID the matching response will carry.
    pub fn correlation_id(&self) -> &str {
        match self {
            Self::Index { id, .. } => id,
            Self::Search { search_id, .. } | Self::Rerank { search_id, .. } => search_id,
        }
    }
}

/// Events emitted by the compute worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerEvent {
    IndexGenerated { id: String, text: String, embedding: Vec<f32> },
    #[serde(rename_all = "camelCase")]
    SearchGenerated { embedding: Vec<f32>, search_id: String },
    #[serde(rename_all = "camelCase")]
    RerankComplete { search_id: String, results: Vec<ScoredCandidate> },
    /// Informational progress from the worker.
    Status { message: String },
    /// A worker-side failure. When `correlationId` is present the matching
    /// caller is released immediately with an empty result.
    #[serde(rename_all = "camelCase")]
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation_id: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn requests_use_wire_names() {
        let request =
            WorkerRequest::Search { query: "rust".to_string(), search_id: "s-1".to_string() };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"type": "SEARCH", "query": "rust", "searchId": "s-1"})
        );
        assert_eq!(request.correlation_id(), "s-1");
    }

    #[test]
    fn events_parse_from_wire_json() {
        let event: WorkerEvent = serde_json::from_value(json!({
            "type": "RERANK_COMPLETE",
            "searchId": "s-2",
            "results": [{"id": "c", "content": "text", "similarity": 0.4, "score": 0.9}]
        }))
        .unwrap();
        match event {
            WorkerEvent::RerankComplete { search_id, results } => {
                assert_eq!(search_id, "s-2");
                assert_eq!(results[0].score, 0.9);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let status: WorkerEvent =
            serde_json::from_value(json!({"type": "STATUS", "message": "ready"})).unwrap();
        assert_eq!(status, WorkerEvent::Status { message: "ready".to_string() });
    }

    #[test]
    fn correlation_ids_are_unique() {
        assert_ne!(new_correlation_id(), new_correlation_id());
    }
}
