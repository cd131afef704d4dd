//! Second-stage reranking.
//!
//! Two seams live here. On the caller side, a [`Reranker`] reorders broad
//! retrieval results; [`ChannelReranker`] does so by sending the candidates
//! to the compute worker. On the worker side, a [`CrossEncoder`] produces the
//! actual `(query, candidate)` relevance scores.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::channel::ComputeChannel;
use crate::document::RetrievalResult;
use crate::error::{RagError, Result};
use crate::protocol::RerankCandidate;

/// A reranker that reorders retrieval results after the initial vector search.
///
/// The output has the same length and membership as the input.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank `candidates` for `query`, returning them best first with
    /// `rerank_score` set.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievalResult>,
    ) -> Result<Vec<RetrievalResult>>;
}

/// A no-op reranker that returns results unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(
        &self,
        _query: &str,
        candidates: Vec<RetrievalResult>,
    ) -> Result<Vec<RetrievalResult>> {
        Ok(candidates)
    }
}

/// Reranks through the compute worker's cross encoder.
///
/// Each call sends one `RERANK` message under a fresh correlation ID.
/// Empty input returns immediately without touching the channel.
#[derive(Debug, Clone)]
pub struct ChannelReranker {
    channel: ComputeChannel,
}

impl ChannelReranker {
    pub fn new(channel: ComputeChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl Reranker for ChannelReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievalResult>,
    ) -> Result<Vec<RetrievalResult>> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let request: Vec<RerankCandidate> = candidates
            .iter()
            .map(|c| RerankCandidate {
                id: c.source_chunk_id.clone(),
                content: c.content.clone(),
                similarity: c.similarity,
            })
            .collect();

        let scored = self.channel.rerank(query, request).await.ok_or_else(|| {
            RagError::RerankerError {
                reranker: "channel".to_string(),
                message: "no response from compute worker".to_string(),
            }
        })?;

        let positions: HashMap<String, usize> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (c.source_chunk_id.clone(), i))
            .collect();
        let mut slots: Vec<Option<RetrievalResult>> = candidates.into_iter().map(Some).collect();

        let mut reranked = Vec::with_capacity(slots.len());
        for item in scored {
            if let Some(result) = positions.get(&item.id).and_then(|&i| slots[i].take()) {
                reranked.push(RetrievalResult {
                    rerank_score: Some(clamp_score(item.score)),
                    ..result
                });
            }
        }
        // Candidates the worker left out keep their place at the tail.
        reranked.extend(slots.into_iter().flatten());
        Ok(reranked)
    }
}

/// Clamp a relevance score into `[0, 1]`, mapping NaN to 0.
pub(crate) fn clamp_score(score: f32) -> f32 {
    if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
}

/// Scores `(query, candidate)` pairs inside the compute worker.
///
/// Implementations return one score per candidate, in input order, where
/// higher means more relevant. Scores are clamped to `[0, 1]` by the worker.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    async fn score(&self, query: &str, candidates: &[RerankCandidate]) -> Result<Vec<f32>>;
}

/// Reuses each candidate's first-stage similarity as its relevance score.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityCrossEncoder;

#[async_trait]
impl CrossEncoder for SimilarityCrossEncoder {
    async fn score(&self, _query: &str, candidates: &[RerankCandidate]) -> Result<Vec<f32>> {
        Ok(candidates.iter().map(|c| c.similarity).collect())
    }
}

/// Blends vector similarity with the fraction of query keywords a candidate contains.
///
/// Keywords are lowercased query words longer than three characters. A query
/// without keywords scores by similarity alone.
#[derive(Debug, Clone, Copy)]
pub struct KeywordCrossEncoder {
    keyword_weight: f32,
}

impl Default for KeywordCrossEncoder {
    fn default() -> Self {
        Self { keyword_weight: 0.5 }
    }
}

impl KeywordCrossEncoder {
    /// `keyword_weight` in `[0, 1]` is the share of the score given to keyword overlap.
    pub fn new(keyword_weight: f32) -> Self {
        Self { keyword_weight: keyword_weight.clamp(0.0, 1.0) }
    }
}

#[async_trait]
impl CrossEncoder for KeywordCrossEncoder {
    async fn score(&self, query: &str, candidates: &[RerankCandidate]) -> Result<Vec<f32>> {
        let keywords: Vec<String> =
            query.split_whitespace().filter(|w| w.len() > 3).map(|w| w.to_lowercase()).collect();

        Ok(candidates
            .iter()
            .map(|candidate| {
                if keywords.is_empty() {
                    return candidate.similarity;
                }
                let text = candidate.content.to_lowercase();
                let matches = keywords.iter().filter(|kw| text.contains(kw.as_str())).count();
                let overlap = matches as f32 / keywords.len() as f32;
                (1.0 - self.keyword_weight) * candidate.similarity + self.keyword_weight * overlap
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, content: &str, similarity: f32) -> RerankCandidate {
        RerankCandidate { id: id.to_string(), content: content.to_string(), similarity }
    }

    #[tokio::test]
    async fn keyword_encoder_rewards_overlap() {
        let encoder = KeywordCrossEncoder::default();
        let scores = encoder
            .score(
                "ownership borrowing rules",
                &[
                    candidate("a", "Ownership and borrowing rules in Rust", 0.5),
                    candidate("b", "Unrelated gardening notes", 0.5),
                ],
            )
            .await
            .unwrap();
        assert!(scores[0] > scores[1]);
        assert!((scores[0] - 0.75).abs() < 1e-6);
    }

    #[tokio::test]
    async fn similarity_encoder_passes_scores_through() {
        let scores = SimilarityCrossEncoder
            .score("q", &[candidate("a", "x", 0.2), candidate("b", "y", 0.9)])
            .await
            .unwrap();
        assert_eq!(scores, vec![0.2, 0.9]);
    }

    #[test]
    fn clamps_out_of_range_scores() {
        assert_eq!(clamp_score(1.7), 1.0);
        assert_eq!(clamp_score(-0.2), 0.0);
        assert_eq!(clamp_score(f32::NAN), 0.0);
    }
}
