//! Document ingestion: record → chunk → embed → store.
//!
//! The document record is written synchronously so its ID is valid right
//! away. Chunks are embedded through the compute channel and written one by
//! one; a chunk whose embedding never arrives or whose write fails is logged
//! and dropped without touching its siblings.
//!
//! At most [`INDEX_CONCURRENCY`] chunks of a document wait on the worker at
//! once. Each wait carries the channel timeout, so a large document must not
//! queue all of its chunks up front behind a single serial worker.

use std::sync::Arc;

use futures::future;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::ComputeChannel;
use crate::chunking::Chunker;
use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Chunk embeddings one document keeps in flight on the compute channel.
pub const INDEX_CONCURRENCY: usize = 4;

/// Outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub document_id: String,
    /// Chunks embedded and written to the store.
    pub stored: usize,
    /// Chunks lost to a missing embedding or a failed write.
    pub dropped: usize,
}

/// Splits documents into chunks and persists their embeddings.
#[derive(Clone)]
pub struct IngestionPipeline {
    channel: ComputeChannel,
    store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
}

impl IngestionPipeline {
    pub fn new(
        channel: ComputeChannel,
        store: Arc<dyn VectorStore>,
        chunker: Arc<dyn Chunker>,
    ) -> Self {
        Self { channel, store, chunker }
    }

    /// Create the document and embed its chunks in the background.
    ///
    /// Returns the new document ID as soon as the record is stored.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if the document record cannot be
    /// written. Chunk failures are never reported here.
    pub async fn add_document(
        &self,
        title: &str,
        content: &str,
        workspace_id: &str,
    ) -> Result<String> {
        let document = Document::new(title, workspace_id);
        let (document_id, _task) = self.start(document, content).await?;
        Ok(document_id)
    }

    /// Like [`add_document`](Self::add_document), but waits for every chunk
    /// to be stored or dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if the document record cannot be
    /// written or the background task panicked.
    pub async fn add_document_and_wait(
        &self,
        title: &str,
        content: &str,
        workspace_id: &str,
    ) -> Result<IngestReport> {
        let document = Document::new(title, workspace_id);
        self.ingest_and_wait(document, content).await
    }

    /// Ingest `content` under an ID derived from `source` and the workspace,
    /// first deleting whatever an earlier ingest of the same source stored.
    ///
    /// Ingesting the same source again therefore leaves one copy in the
    /// store, carrying the latest content. Waits like
    /// [`add_document_and_wait`](Self::add_document_and_wait).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if the old copy cannot be deleted
    /// or the new record cannot be written.
    pub async fn replace_document(
        &self,
        source: &str,
        title: &str,
        content: &str,
        workspace_id: &str,
    ) -> Result<IngestReport> {
        let document = Document::from_source(title, workspace_id, source);
        self.delete_document(&document.id).await?;
        self.ingest_and_wait(document, content).await
    }

    async fn ingest_and_wait(&self, document: Document, content: &str) -> Result<IngestReport> {
        let (document_id, task) = self.start(document, content).await?;
        let (stored, dropped) = task.await.map_err(|e| {
            error!(document.id = %document_id, error = %e, "ingestion task failed");
            RagError::PipelineError(format!("ingestion of '{document_id}' did not finish: {e}"))
        })?;
        Ok(IngestReport { document_id, stored, dropped })
    }

    /// Delete a document together with all of its chunks.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if the store rejects the delete.
    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.store.delete_document(document_id).await.map_err(|e| {
            error!(document.id = document_id, error = %e, "failed to delete document");
            RagError::PipelineError(format!("failed to delete document '{document_id}': {e}"))
        })?;
        info!(document.id = document_id, "deleted document");
        Ok(())
    }

    async fn start(
        &self,
        document: Document,
        content: &str,
    ) -> Result<(String, JoinHandle<(usize, usize)>)> {
        self.store.insert_document(&document).await.map_err(|e| {
            error!(document.id = %document.id, error = %e, "failed to create document");
            RagError::PipelineError(format!("failed to create document '{}': {e}", document.title))
        })?;

        let chunks = self.chunker.chunk(&document.id, content);
        info!(
            document.id = %document.id,
            workspace_id = %document.workspace_id,
            chunk_count = chunks.len(),
            "created document, embedding chunks"
        );

        let task = tokio::spawn(embed_and_store(
            self.channel.clone(),
            Arc::clone(&self.store),
            document.id.clone(),
            chunks,
        ));
        Ok((document.id, task))
    }
}

async fn embed_and_store(
    channel: ComputeChannel,
    store: Arc<dyn VectorStore>,
    document_id: String,
    chunks: Vec<Chunk>,
) -> (usize, usize) {
    let total = chunks.len();
    let stored = stream::iter(chunks)
        .map(|chunk| {
            let channel = &channel;
            let store = &store;
            async move {
                let Some(embedding) = channel.embed_chunk(&chunk.id, &chunk.content).await else {
                    warn!(chunk.id = %chunk.id, "no embedding for chunk, dropping it");
                    return false;
                };
                let chunk = Chunk { embedding: Some(embedding), ..chunk };
                match store.upsert_chunk(&chunk).await {
                    Ok(()) => {
                        debug!(chunk.id = %chunk.id, "stored chunk");
                        true
                    }
                    Err(e) => {
                        error!(
                            chunk.id = %chunk.id,
                            error = %e,
                            "failed to store chunk, dropping it"
                        );
                        false
                    }
                }
            }
        })
        .buffer_unordered(INDEX_CONCURRENCY)
        .fold(0, |stored, ok| future::ready(stored + usize::from(ok)))
        .await;

    let dropped = total - stored;
    info!(document.id = %document_id, stored, dropped, "ingested document");
    (stored, dropped)
}
