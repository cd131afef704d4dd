//! Backends for OpenAI-compatible HTTP APIs.
//!
//! Works against api.openai.com as well as local servers that speak the same
//! `/embeddings` and `/chat/completions` routes (llama.cpp, Ollama, vLLM).
//!
//! This module is only available when the `openai` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::llm::{ChatEngine, ChatMessage, ChatOptions};

/// The default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Dimensionality requested by default, matching the knowledge store.
const DEFAULT_DIMENSIONS: usize = crate::document::EMBEDDING_DIMENSIONS;

/// Connection settings shared by the embedding provider and the chat engine.
#[derive(Debug, Clone)]
struct Endpoint {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl Endpoint {
    fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key: api_key.filter(|key| !key.is_empty()),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, format!("{}/{path}", self.base_url));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

/// Turn a non-2xx response into the API's error message, if it sent one.
async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail =
        serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

// ── API request/response types ─────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible `/embeddings` route.
///
/// Requests 384-dimensional vectors by default so the output fits the
/// knowledge store without reconfiguration.
///
/// # Example
///
/// ```rust,ignore
/// use scriptorium_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("http://localhost:11434/v1", None)
///     .with_model("nomic-embed-text");
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    endpoint: Endpoint,
    model: String,
    dimensions: usize,
}

impl OpenAIEmbeddingProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: Endpoint::new(base_url, api_key),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
        }
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensions sent to the API and reported by
    /// [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self
    }

    fn failure(message: String) -> RagError {
        RagError::EmbeddingError { provider: "OpenAI".into(), message }
    }
}

impl OpenAIEmbeddingProvider {
    /// Embed several texts in one request, preserving input order.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = "OpenAI", batch_size = texts.len(), model = %self.model, "embedding batch");

        let body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: Some(self.dimensions),
        };
        let response = self
            .endpoint
            .request(reqwest::Method::POST, "embeddings")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "OpenAI", error = %e, "embedding request failed");
                Self::failure(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(provider = "OpenAI", %detail, "embedding API error");
            return Err(Self::failure(detail));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = "OpenAI", error = %e, "failed to parse embedding response");
            Self::failure(format!("failed to parse response: {e}"))
        })?;
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| Self::failure("API returned empty response".into()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}

// ── Chat ───────────────────────────────────────────────────────────

/// A [`ChatEngine`] backed by an OpenAI-compatible `/chat/completions` route.
///
/// [`ensure_ready`](ChatEngine::ensure_ready) probes `/models` once and
/// remembers a successful answer.
pub struct OpenAIChatEngine {
    endpoint: Endpoint,
    model: String,
    ready: OnceCell<()>,
}

impl OpenAIChatEngine {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: Endpoint::new(base_url, api_key),
            model: DEFAULT_CHAT_MODEL.into(),
            ready: OnceCell::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn failure(message: String) -> RagError {
        RagError::EngineError { engine: "OpenAI".into(), message }
    }

    async fn probe(&self) -> Result<()> {
        let response = self
            .endpoint
            .request(reqwest::Method::GET, "models")
            .send()
            .await
            .map_err(|e| Self::failure(format!("engine unreachable at {}: {e}", self.endpoint.base_url)))?;
        if !response.status().is_success() {
            return Err(Self::failure(error_detail(response).await));
        }
        info!(engine = "OpenAI", model = %self.model, base_url = %self.endpoint.base_url, "chat engine ready");
        Ok(())
    }
}

#[async_trait]
impl ChatEngine for OpenAIChatEngine {
    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn ensure_ready(&self) -> Result<()> {
        self.ready.get_or_try_init(|| self.probe()).await.map(|_| ())
    }

    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        debug!(
            engine = "OpenAI",
            model = %self.model,
            message_count = messages.len(),
            json_mode = options.json_mode,
            "chat request"
        );

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: options.json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };
        let response = self
            .endpoint
            .request(reqwest::Method::POST, "chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(engine = "OpenAI", error = %e, "chat request failed");
                Self::failure(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let detail = error_detail(response).await;
            error!(engine = "OpenAI", %detail, "chat API error");
            return Err(Self::failure(detail));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            error!(engine = "OpenAI", error = %e, "failed to parse chat response");
            Self::failure(format!("failed to parse response: {e}"))
        })?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Self::failure("response had no message content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_sets_json_response_format_only_in_json_mode() {
        let messages = [ChatMessage::user("hi")];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            temperature: 0.2,
            max_tokens: 16,
            response_format: Some(ResponseFormat { kind: "json_object" }),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][0]["role"], "user");

        let plain = ChatRequest { response_format: None, ..body };
        let value = serde_json::to_value(&plain).unwrap();
        assert!(value.get("response_format").is_none());
    }

    #[test]
    fn endpoint_trims_trailing_slash_and_ignores_empty_key() {
        let endpoint = Endpoint::new("http://localhost:8080/v1/", Some(String::new()));
        assert_eq!(endpoint.base_url, "http://localhost:8080/v1");
        assert!(endpoint.api_key.is_none());
    }

    #[test]
    fn embedding_provider_defaults_to_store_dimensions() {
        let provider = OpenAIEmbeddingProvider::new(DEFAULT_BASE_URL, None);
        assert_eq!(provider.dimensions(), 384);
        assert_eq!(provider.with_dimensions(768).dimensions(), 768);
    }
}
