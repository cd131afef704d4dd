//! The embedding model seam.
//!
//! Providers run inside the [`ComputeWorker`](crate::ComputeWorker). Callers
//! never hold one directly; they send `INDEX` and `SEARCH` requests over the
//! [`ComputeChannel`](crate::ComputeChannel) instead.

use async_trait::async_trait;

use crate::error::Result;

/// Turns a chunk or a query into a fixed-length vector.
///
/// The worker serves one text per request, so there is no batch entry point.
/// Every vector must be exactly [`dimensions`](Self::dimensions) long; the
/// worker answers a mismatched one with a correlated `ERROR` event.
///
/// ```rust,ignore
/// struct Hashing;
///
/// #[async_trait]
/// impl EmbeddingProvider for Hashing {
///     async fn embed(&self, text: &str) -> Result<Vec<f32>> {
///         Ok(hash_into_buckets(text, 384))
///     }
///     fn dimensions(&self) -> usize {
///         384
///     }
/// }
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;

    /// Short label used in logs and error messages.
    fn name(&self) -> &str {
        "embedder"
    }
}
