//! The background compute worker.
//!
//! A single long-lived task owns the embedding provider and the cross
//! encoder and serves every `INDEX`, `SEARCH` and `RERANK` request in arrival
//! order. Callers reach it only through the [`ComputeChannel`] returned by
//! [`ComputeWorker::spawn`].
//!
//! ```text
//! ┌─────────────────┐  WorkerRequest  ┌──────────────────┐
//! │ ComputeChannel  │────────────────▶│  ComputeWorker   │
//! │ (many callers)  │◀────────────────│  (one task)      │
//! └─────────────────┘   WorkerEvent   └──────────────────┘
//! ```

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{CHANNEL_CAPACITY, ComputeChannel};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::protocol::{RerankCandidate, ScoredCandidate, WorkerEvent, WorkerRequest};
use crate::reranker::{CrossEncoder, clamp_score};

/// Owns the embedding and reranking models and answers channel requests.
pub struct ComputeWorker {
    embedder: Arc<dyn EmbeddingProvider>,
    cross_encoder: Arc<dyn CrossEncoder>,
}

impl ComputeWorker {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, cross_encoder: Arc<dyn CrossEncoder>) -> Self {
        Self { embedder, cross_encoder }
    }

    /// Start the worker on its own task and return a connected channel.
    ///
    /// Must be called from within a Tokio runtime. The worker stops once
    /// every clone of the returned channel has been dropped.
    pub fn spawn(self, timeout: Duration) -> (ComputeChannel, JoinHandle<()>) {
        let (request_tx, request_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let handle = tokio::spawn(self.run(request_rx, event_tx));
        (ComputeChannel::connect(request_tx, event_rx, timeout), handle)
    }

    /// Serve requests until the request queue closes or nobody listens.
    pub async fn run(
        self,
        mut requests: mpsc::Receiver<WorkerRequest>,
        events: mpsc::Sender<WorkerEvent>,
    ) {
        let ready = WorkerEvent::Status {
            message: format!("ready ({} dimensions)", self.embedder.dimensions()),
        };
        if events.send(ready).await.is_err() {
            return;
        }
        info!(
            embedder = self.embedder.name(),
            dimensions = self.embedder.dimensions(),
            "compute worker started"
        );

        while let Some(request) = requests.recv().await {
            let event = self.handle(request).await;
            if events.send(event).await.is_err() {
                debug!("event receiver closed, stopping compute worker");
                break;
            }
        }
        info!("compute worker stopped");
    }

    async fn handle(&self, request: WorkerRequest) -> WorkerEvent {
        let correlation_id = request.correlation_id().to_string();
        let outcome = match request {
            WorkerRequest::Index { id, text } => self
                .embed(&text)
                .await
                .map(|embedding| WorkerEvent::IndexGenerated { id, text, embedding }),
            WorkerRequest::Search { query, search_id } => self
                .embed(&query)
                .await
                .map(|embedding| WorkerEvent::SearchGenerated { embedding, search_id }),
            WorkerRequest::Rerank { search_id, query, candidates } => self
                .rerank(&query, candidates)
                .await
                .map(|results| WorkerEvent::RerankComplete { search_id, results }),
        };

        outcome.unwrap_or_else(|e| {
            warn!(correlation_id = %correlation_id, error = %e, "compute request failed");
            WorkerEvent::Error { message: e.to_string(), correlation_id: Some(correlation_id) }
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = self.embedder.embed(text).await?;
        let expected = self.embedder.dimensions();
        if embedding.len() != expected {
            return Err(RagError::EmbeddingError {
                provider: self.embedder.name().to_string(),
                message: format!("expected {expected} dimensions, got {}", embedding.len()),
            });
        }
        Ok(embedding)
    }

    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RerankCandidate>,
    ) -> Result<Vec<ScoredCandidate>> {
        let scores = self.cross_encoder.score(query, &candidates).await?;
        if scores.len() != candidates.len() {
            return Err(RagError::RerankerError {
                reranker: "worker".to_string(),
                message: format!(
                    "cross encoder returned {} scores for {} candidates",
                    scores.len(),
                    candidates.len()
                ),
            });
        }

        let mut results: Vec<ScoredCandidate> = candidates
            .into_iter()
            .zip(scores)
            .map(|(c, score)| ScoredCandidate {
                id: c.id,
                content: c.content,
                similarity: c.similarity,
                score: clamp_score(score),
            })
            .collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        Ok(results)
    }
}
