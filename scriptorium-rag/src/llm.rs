//! Language-model engine contract consumed by the research copilot.
//!
//! The engine handle is passed in explicitly by whoever owns it. Callers must
//! treat every reply as possibly invalid JSON and keep a fallback path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One message in a chat exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// Sampling options for one chat call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: usize,
    /// Ask the engine to constrain output to a JSON object.
    pub json_mode: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self { temperature: 0.7, max_tokens: 1024, json_mode: false }
    }
}

impl ChatOptions {
    pub fn new(temperature: f32, max_tokens: usize) -> Self {
        Self { temperature, max_tokens, json_mode: false }
    }

    /// Enable JSON mode.
    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// A chat-completion engine.
///
/// # Example
///
/// ```rust,ignore
/// use scriptorium_rag::{ChatEngine, ChatMessage, ChatOptions};
///
/// engine.ensure_ready().await?;
/// let reply = engine
///     .chat(&[ChatMessage::user("Say hi")], &ChatOptions::default())
///     .await?;
/// ```
#[async_trait]
pub trait ChatEngine: Send + Sync {
    /// Identifies the engine in logs and errors.
    fn name(&self) -> &str;

    /// Make sure the engine can serve requests, starting it if needed.
    ///
    /// This is the one failure the research copilot propagates.
    async fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    /// Run one chat completion and return the reply text.
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String>;
}
