//! Two-stage retrieval: broad vector search, then rerank and compress.
//!
//! Nothing here fails loudly. A missing query embedding, a store error, or a
//! rerank failure all degrade to a smaller (possibly empty) answer and are
//! logged instead.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::channel::ComputeChannel;
use crate::compression::compress;
use crate::config::RagConfig;
use crate::document::RetrievalResult;
use crate::reranker::Reranker;
use crate::vectorstore::{StoreMatch, VectorStore};

/// Runs semantic search over the knowledge store.
///
/// # Example
///
/// ```rust,ignore
/// let results = retrieval.search_with_rerank_scoped("what is a lifetime?", "ws-1").await;
/// assert!(results.len() <= 5);
/// ```
pub struct RetrievalEngine {
    config: RagConfig,
    channel: ComputeChannel,
    store: Arc<dyn VectorStore>,
    reranker: Arc<dyn Reranker>,
}

impl RetrievalEngine {
    pub fn new(
        config: RagConfig,
        channel: ComputeChannel,
        store: Arc<dyn VectorStore>,
        reranker: Arc<dyn Reranker>,
    ) -> Self {
        Self { config, channel, store, reranker }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Broad search across every workspace. Results carry no source title.
    pub async fn search(&self, query: &str) -> Vec<RetrievalResult> {
        self.broad_search(query, None).await
    }

    /// Broad search limited to chunks of documents in `workspace_id`.
    pub async fn search_scoped(&self, query: &str, workspace_id: &str) -> Vec<RetrievalResult> {
        self.broad_search(query, Some(workspace_id)).await
    }

    /// Rerank candidates for `query`.
    ///
    /// On failure the candidates come back unchanged, in their original order.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievalResult>,
    ) -> Vec<RetrievalResult> {
        if candidates.is_empty() {
            return candidates;
        }
        let fallback = candidates.clone();
        match self.reranker.rerank(query, candidates).await {
            Ok(reranked) => reranked,
            Err(e) => {
                warn!(error = %e, candidates = fallback.len(), "rerank failed, keeping vector order");
                fallback
            }
        }
    }

    /// Full two-stage search across every workspace.
    pub async fn search_with_rerank(&self, query: &str) -> Vec<RetrievalResult> {
        let broad = self.search(query).await;
        self.refine(query, broad).await
    }

    /// Full two-stage search within `workspace_id`: at most `rerank_top_n`
    /// results, each compressed to `max_sentences` sentences.
    pub async fn search_with_rerank_scoped(
        &self,
        query: &str,
        workspace_id: &str,
    ) -> Vec<RetrievalResult> {
        let broad = self.search_scoped(query, workspace_id).await;
        self.refine(query, broad).await
    }

    async fn broad_search(&self, query: &str, workspace_id: Option<&str>) -> Vec<RetrievalResult> {
        let Some(embedding) = self.channel.embed_query(query).await else {
            warn!(workspace_id, "no query embedding, returning no results");
            return Vec::new();
        };

        let rows = match self.store.nearest(&embedding, workspace_id, self.config.broad_top_k).await
        {
            Ok(rows) => rows,
            Err(e) => {
                error!(workspace_id, error = %e, "vector search failed");
                return Vec::new();
            }
        };

        debug!(workspace_id, result_count = rows.len(), "broad search completed");
        rows.into_iter().map(|row| to_result(row, workspace_id.is_some())).collect()
    }

    async fn refine(&self, query: &str, broad: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
        if broad.is_empty() {
            return broad;
        }

        let mut results = self.rerank(query, broad).await;
        results.truncate(self.config.rerank_top_n);
        for result in &mut results {
            result.content = compress(&result.content, query, self.config.max_sentences);
        }

        info!(result_count = results.len(), "search with rerank completed");
        results
    }
}

fn to_result(row: StoreMatch, scoped: bool) -> RetrievalResult {
    let similarity = if row.similarity.is_nan() { 0.0 } else { row.similarity.clamp(0.0, 1.0) };
    RetrievalResult {
        source_chunk_id: row.chunk_id,
        content: row.content,
        similarity,
        rerank_score: None,
        source_title: if scoped { row.title } else { None },
    }
}
