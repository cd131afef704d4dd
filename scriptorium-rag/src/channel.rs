//! Client side of the message channel to the background compute worker.
//!
//! A [`ComputeChannel`] sends [`WorkerRequest`]s and matches incoming
//! [`WorkerEvent`]s to their callers by correlation ID. Any number of
//! requests may be in flight at once; a dispatcher task owns the inbound
//! stream and resolves registry entries as responses arrive.
//!
//! Every round trip is bounded by the configured timeout. A timeout, a
//! closed worker, or a worker-side error all resolve to `None`; callers are
//! never left waiting and no listener outlives its request.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::protocol::{
    RerankCandidate, ScoredCandidate, WorkerEvent, WorkerRequest, new_correlation_id,
};
use crate::registry::{CorrelationRegistry, PendingResponse};

/// Capacity of the request and event queues between caller and worker.
pub const CHANNEL_CAPACITY: usize = 256;

type EmbeddingSlot = Option<Vec<f32>>;
type RerankSlot = Option<Vec<ScoredCandidate>>;

/// Handle for issuing embedding and rerank requests to the compute worker.
///
/// Cheap to clone; all clones share the same registries and worker.
#[derive(Debug, Clone)]
pub struct ComputeChannel {
    outbound: mpsc::Sender<WorkerRequest>,
    index: CorrelationRegistry<EmbeddingSlot>,
    search: CorrelationRegistry<EmbeddingSlot>,
    rerank: CorrelationRegistry<RerankSlot>,
    timeout: Duration,
}

impl ComputeChannel {
    /// Connect to a worker through its request sender and event receiver.
    ///
    /// Spawns the dispatcher task, so this must be called from within a
    /// Tokio runtime.
    pub fn connect(
        outbound: mpsc::Sender<WorkerRequest>,
        inbound: mpsc::Receiver<WorkerEvent>,
        timeout: Duration,
    ) -> Self {
        let channel = Self {
            outbound,
            index: CorrelationRegistry::new(),
            search: CorrelationRegistry::new(),
            rerank: CorrelationRegistry::new(),
            timeout,
        };
        tokio::spawn(dispatch(
            inbound,
            channel.index.clone(),
            channel.search.clone(),
            channel.rerank.clone(),
        ));
        channel
    }

    /// The per-request safety timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of requests awaiting a response, across all request kinds.
    pub fn pending_requests(&self) -> usize {
        self.index.len() + self.search.len() + self.rerank.len()
    }

    /// Embed a search query under a fresh correlation ID.
    pub async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        let search_id = new_correlation_id();
        let pending = register(&self.search, &search_id)?;
        let request = WorkerRequest::Search { query: query.to_string(), search_id };
        self.round_trip(request, pending).await
    }

    /// Embed one chunk. `id` is the chunk ID and doubles as correlation ID.
    pub async fn embed_chunk(&self, id: &str, text: &str) -> Option<Vec<f32>> {
        let pending = register(&self.index, id)?;
        let request = WorkerRequest::Index { id: id.to_string(), text: text.to_string() };
        self.round_trip(request, pending).await
    }

    /// Score candidates against `query` with the worker's cross encoder.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RerankCandidate>,
    ) -> Option<Vec<ScoredCandidate>> {
        let search_id = new_correlation_id();
        let pending = register(&self.rerank, &search_id)?;
        let request = WorkerRequest::Rerank { search_id, query: query.to_string(), candidates };
        self.round_trip(request, pending).await
    }

    async fn round_trip<T>(
        &self,
        request: WorkerRequest,
        pending: PendingResponse<Option<T>>,
    ) -> Option<T> {
        if let Err(e) = self.outbound.send(request).await {
            warn!(correlation_id = %pending.id(), error = %e, "compute worker is gone");
            return None;
        }
        pending.wait(self.timeout).await.flatten()
    }
}

fn register<T>(registry: &CorrelationRegistry<T>, id: &str) -> Option<PendingResponse<T>> {
    registry
        .register(id)
        .map_err(|e| warn!(correlation_id = id, error = %e, "could not register request"))
        .ok()
}

async fn dispatch(
    mut inbound: mpsc::Receiver<WorkerEvent>,
    index: CorrelationRegistry<EmbeddingSlot>,
    search: CorrelationRegistry<EmbeddingSlot>,
    rerank: CorrelationRegistry<RerankSlot>,
) {
    while let Some(event) = inbound.recv().await {
        match event {
            WorkerEvent::IndexGenerated { id, embedding, .. } => {
                if !index.resolve(&id, Some(embedding)) {
                    debug!(correlation_id = %id, "dropping unmatched INDEX_GENERATED");
                }
            }
            WorkerEvent::SearchGenerated { embedding, search_id } => {
                if !search.resolve(&search_id, Some(embedding)) {
                    debug!(correlation_id = %search_id, "dropping unmatched SEARCH_GENERATED");
                }
            }
            WorkerEvent::RerankComplete { search_id, results } => {
                if !rerank.resolve(&search_id, Some(results)) {
                    debug!(correlation_id = %search_id, "dropping unmatched RERANK_COMPLETE");
                }
            }
            WorkerEvent::Status { message } => debug!(%message, "compute worker status"),
            WorkerEvent::Error { message, correlation_id: Some(id) } => {
                warn!(correlation_id = %id, %message, "compute worker request failed");
                let released = index.resolve(&id, None)
                    || search.resolve(&id, None)
                    || rerank.resolve(&id, None);
                if !released {
                    debug!(correlation_id = %id, "error for a request no longer pending");
                }
            }
            WorkerEvent::Error { message, correlation_id: None } => {
                warn!(%message, "compute worker error");
            }
        }
    }

    debug!("compute worker event stream closed");
    index.close();
    search.close();
    rerank.close();
}
