//! Fakes shared by the integration tests: a bag-of-words embedder, a scripted
//! chat engine, and stores/encoders that fail or count on demand.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use scriptorium_rag::{
    ChatEngine, ChatMessage, ChatOptions, Chunk, CrossEncoder, Document, EmbeddingProvider,
    InMemoryVectorStore, KnowledgeBase, RagConfig, RagError, RerankCandidate, Result, StoreMatch,
    VectorStore,
};

pub const DIMENSIONS: usize = 64;

/// Embedder that hashes lowercased words into a normalized count vector, so
/// texts sharing words are similar. Texts containing `POISON` fail.
pub struct BagOfWordsEmbedder;

fn bucket(word: &str) -> usize {
    let mut hash: u32 = 2166136261;
    for byte in word.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16777619);
    }
    hash as usize % DIMENSIONS
}

#[async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains("POISON") {
            return Err(RagError::EmbeddingError {
                provider: "bag-of-words".to_string(),
                message: "poisoned input".to_string(),
            });
        }
        let mut vector = vec![0.0f32; DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
        {
            vector[bucket(&word)] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

/// Bag-of-words embedder that takes `delay` per call, like a model on a slow
/// machine.
pub struct SlowEmbedder {
    pub delay: std::time::Duration,
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        tokio::time::sleep(self.delay).await;
        BagOfWordsEmbedder.embed(text).await
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

/// Cross encoder that counts calls and scores by similarity, or always fails.
#[derive(Default)]
pub struct CountingEncoder {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl CountingEncoder {
    pub fn failing() -> Self {
        Self { calls: AtomicUsize::new(0), fail: true }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CrossEncoder for CountingEncoder {
    async fn score(&self, _query: &str, candidates: &[RerankCandidate]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RagError::RerankerError {
                reranker: "counting".to_string(),
                message: "model unavailable".to_string(),
            });
        }
        // Reverse the vector order so reranking is observable.
        Ok(candidates.iter().map(|c| 1.0 - c.similarity).collect())
    }
}

/// Store that refuses chunk writes for IDs ending in `-1`.
pub struct FlakyStore {
    pub inner: InMemoryVectorStore,
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn insert_document(&self, document: &Document) -> Result<()> {
        self.inner.insert_document(document).await
    }

    async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.inner.delete_document(document_id).await
    }

    async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()> {
        if chunk.id.ends_with("-1") {
            return Err(RagError::VectorStoreError {
                backend: "flaky".to_string(),
                message: "disk full".to_string(),
            });
        }
        self.inner.upsert_chunk(chunk).await
    }

    async fn chunks_for_document(&self, document_id: &str) -> Result<Vec<Chunk>> {
        self.inner.chunks_for_document(document_id).await
    }

    async fn nearest(
        &self,
        embedding: &[f32],
        workspace_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoreMatch>> {
        self.inner.nearest(embedding, workspace_id, limit).await
    }
}

/// Store whose queries always fail.
pub struct BrokenStore;

#[async_trait]
impl VectorStore for BrokenStore {
    async fn insert_document(&self, _document: &Document) -> Result<()> {
        Ok(())
    }

    async fn delete_document(&self, _document_id: &str) -> Result<()> {
        Ok(())
    }

    async fn upsert_chunk(&self, _chunk: &Chunk) -> Result<()> {
        Ok(())
    }

    async fn chunks_for_document(&self, _document_id: &str) -> Result<Vec<Chunk>> {
        Ok(Vec::new())
    }

    async fn nearest(
        &self,
        _embedding: &[f32],
        _workspace_id: Option<&str>,
        _limit: usize,
    ) -> Result<Vec<StoreMatch>> {
        Err(RagError::VectorStoreError {
            backend: "broken".to_string(),
            message: "connection reset".to_string(),
        })
    }
}

/// What the scripted engine answers for one kind of prompt.
#[derive(Clone)]
pub enum Reply {
    Text(String),
    Fail,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    fn into_result(self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Fail => Err(RagError::EngineError {
                engine: "scripted".to_string(),
                message: "generation failed".to_string(),
            }),
        }
    }
}

/// Chat engine that answers by stage, recognised from the system prompt.
pub struct ScriptedEngine {
    pub ready: bool,
    pub decompose: Reply,
    pub expand: Reply,
    pub compile: Reply,
    pub calls: Mutex<Vec<(String, ChatOptions)>>,
}

impl ScriptedEngine {
    pub fn new(decompose: Reply, expand: Reply, compile: Reply) -> Self {
        Self { ready: true, decompose, expand, compile, calls: Mutex::new(Vec::new()) }
    }

    pub fn not_ready() -> Self {
        Self { ready: false, ..Self::new(Reply::Fail, Reply::Fail, Reply::Fail) }
    }

    pub fn stages(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(stage, _)| stage.clone()).collect()
    }

    pub fn options_for(&self, stage: &str) -> Vec<ChatOptions> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == stage)
            .map(|(_, options)| *options)
            .collect()
    }
}

#[async_trait]
impl ChatEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn ensure_ready(&self) -> Result<()> {
        if self.ready {
            Ok(())
        } else {
            Err(RagError::EngineError {
                engine: "scripted".to_string(),
                message: "model weights not loaded".to_string(),
            })
        }
    }

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        let system = messages.first().map(|m| m.content.as_str()).unwrap_or_default();
        let (stage, reply) = if system.contains("research planner") {
            ("decompose", self.decompose.clone())
        } else if system.contains("rewrite search queries") {
            ("expand", self.expand.clone())
        } else {
            ("compile", self.compile.clone())
        };
        self.calls.lock().unwrap().push((stage.to_string(), *options));
        reply.into_result()
    }
}

pub fn test_config() -> RagConfig {
    RagConfig::builder()
        .embedding_dimensions(DIMENSIONS)
        .chunk_size(200)
        .chunk_overlap(20)
        .build()
        .unwrap()
}

pub fn knowledge_base(store: Arc<dyn VectorStore>, encoder: Arc<CountingEncoder>) -> KnowledgeBase {
    KnowledgeBase::builder()
        .config(test_config())
        .embedding_provider(Arc::new(BagOfWordsEmbedder))
        .cross_encoder(encoder)
        .vector_store(store)
        .build()
        .unwrap()
}

/// Paragraphs about Rust memory management, each under 200 characters.
pub fn rust_notes() -> String {
    [
        "Ownership means every value in Rust has a single owner. When the owner goes out of scope the value is dropped.",
        "Borrowing lets code use a value without taking ownership. References are either shared or mutable, never both.",
        "Lifetimes describe how long references stay valid. The borrow checker compares lifetimes at compile time.",
        "A move transfers ownership to a new binding. After a move the old binding can no longer be used.",
        "Smart pointers like Box and Rc manage heap memory. Rc counts references so shared ownership is possible.",
        "Interior mutability with RefCell moves borrow checks to runtime. Misuse panics instead of failing to compile.",
    ]
    .join("\n\n")
}

pub fn garden_notes() -> String {
    [
        "Tomatoes need full sun and steady watering. Mulch keeps the soil moist during hot weeks.",
        "Compost improves soil structure. Turn the pile every two weeks so it breaks down evenly.",
    ]
    .join("\n\n")
}
