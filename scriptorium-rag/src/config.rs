//! Configuration for retrieval and the research copilot.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::document::EMBEDDING_DIMENSIONS;
use crate::error::{RagError, Result};

/// Configuration parameters for ingestion and two-stage retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Number of overlapping characters between consecutive chunks.
    pub chunk_overlap: usize,
    /// Nearest-neighbour limit for the broad first-stage search.
    pub broad_top_k: usize,
    /// Number of results kept after reranking.
    pub rerank_top_n: usize,
    /// Sentence budget for contextual compression.
    pub max_sentences: usize,
    /// Safety timeout for every round trip to the compute worker.
    pub channel_timeout: Duration,
    /// Length every stored embedding must have.
    pub embedding_dimensions: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 100,
            broad_top_k: 20,
            rerank_top_n: 5,
            max_sentences: 3,
            channel_timeout: Duration::from_secs(60),
            embedding_dimensions: EMBEDDING_DIMENSIONS,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the nearest-neighbour limit for broad search.
    pub fn broad_top_k(mut self, k: usize) -> Self {
        self.config.broad_top_k = k;
        self
    }

    /// Set how many reranked results survive into compression.
    pub fn rerank_top_n(mut self, n: usize) -> Self {
        self.config.rerank_top_n = n;
        self
    }

    /// Set the compression sentence budget.
    pub fn max_sentences(mut self, max: usize) -> Self {
        self.config.max_sentences = max;
        self
    }

    /// Set the compute channel safety timeout.
    pub fn channel_timeout(mut self, timeout: Duration) -> Self {
        self.config.channel_timeout = timeout;
        self
    }

    /// Set the expected embedding length.
    pub fn embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.config.embedding_dimensions = dimensions;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_overlap >= chunk_size`
    /// - any of `broad_top_k`, `rerank_top_n`, `max_sentences`,
    ///   `embedding_dimensions` is zero
    /// - `channel_timeout` is zero
    pub fn build(self) -> Result<RagConfig> {
        let config = self.config;
        if config.chunk_overlap >= config.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                config.chunk_overlap, config.chunk_size
            )));
        }
        for (name, value) in [
            ("broad_top_k", config.broad_top_k),
            ("rerank_top_n", config.rerank_top_n),
            ("max_sentences", config.max_sentences),
            ("embedding_dimensions", config.embedding_dimensions),
        ] {
            if value == 0 {
                return Err(RagError::ConfigError(format!("{name} must be greater than zero")));
            }
        }
        if config.channel_timeout.is_zero() {
            return Err(RagError::ConfigError("channel_timeout must be non-zero".to_string()));
        }
        Ok(config)
    }
}

/// Tuning for the research copilot's decompose/expand/compile stages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CopilotConfig {
    /// Upper bound on sub-questions produced by decomposition.
    pub max_sub_questions: usize,
    /// Upper bound on related queries generated per sub-question.
    pub max_expansions: usize,
    /// Number of merged results turned into citations.
    pub max_citations: usize,
    /// Length of the content prefix used to deduplicate merged results.
    pub dedup_prefix_chars: usize,
    /// Sampling temperature for decomposition and expansion.
    pub planning_temperature: f32,
    /// Sampling temperature for brief compilation.
    pub compile_temperature: f32,
    /// Token budget for decomposition and expansion replies.
    pub planning_max_tokens: usize,
    /// Token budget for the compiled brief.
    pub compile_max_tokens: usize,
}

impl Default for CopilotConfig {
    fn default() -> Self {
        Self {
            max_sub_questions: 3,
            max_expansions: 2,
            max_citations: 10,
            dedup_prefix_chars: 80,
            planning_temperature: 0.3,
            compile_temperature: 0.2,
            planning_max_tokens: 256,
            compile_max_tokens: 2048,
        }
    }
}

impl CopilotConfig {
    /// Create a new builder for constructing a [`CopilotConfig`].
    pub fn builder() -> CopilotConfigBuilder {
        CopilotConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`CopilotConfig`].
#[derive(Debug, Clone, Default)]
pub struct CopilotConfigBuilder {
    config: CopilotConfig,
}

impl CopilotConfigBuilder {
    pub fn max_sub_questions(mut self, max: usize) -> Self {
        self.config.max_sub_questions = max;
        self
    }

    pub fn max_expansions(mut self, max: usize) -> Self {
        self.config.max_expansions = max;
        self
    }

    pub fn max_citations(mut self, max: usize) -> Self {
        self.config.max_citations = max;
        self
    }

    pub fn dedup_prefix_chars(mut self, chars: usize) -> Self {
        self.config.dedup_prefix_chars = chars;
        self
    }

    pub fn planning_temperature(mut self, temperature: f32) -> Self {
        self.config.planning_temperature = temperature;
        self
    }

    /// Set the token limit for the decompose and expand replies.
    pub fn planning_max_tokens(mut self, tokens: usize) -> Self {
        self.config.planning_max_tokens = tokens;
        self
    }

    pub fn compile_temperature(mut self, temperature: f32) -> Self {
        self.config.compile_temperature = temperature;
        self
    }

    pub fn compile_max_tokens(mut self, tokens: usize) -> Self {
        self.config.compile_max_tokens = tokens;
        self
    }

    /// Build the [`CopilotConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `max_sub_questions`,
    /// `max_citations`, `dedup_prefix_chars` or a token limit is zero, or a
    /// temperature is outside `0.0..=2.0`.
    pub fn build(self) -> Result<CopilotConfig> {
        let config = self.config;
        for (name, value) in [
            ("max_sub_questions", config.max_sub_questions),
            ("max_citations", config.max_citations),
            ("dedup_prefix_chars", config.dedup_prefix_chars),
            ("planning_max_tokens", config.planning_max_tokens),
            ("compile_max_tokens", config.compile_max_tokens),
        ] {
            if value == 0 {
                return Err(RagError::ConfigError(format!("{name} must be greater than zero")));
            }
        }
        for (name, value) in [
            ("planning_temperature", config.planning_temperature),
            ("compile_temperature", config.compile_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(RagError::ConfigError(format!(
                    "{name} ({value}) must be between 0.0 and 2.0"
                )));
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_limits() {
        let config = RagConfig::default();
        assert_eq!(config.broad_top_k, 20);
        assert_eq!(config.rerank_top_n, 5);
        assert_eq!(config.max_sentences, 3);
        assert_eq!(config.channel_timeout, Duration::from_secs(60));
        assert_eq!(config.embedding_dimensions, 384);

        let copilot = CopilotConfig::default();
        assert_eq!(copilot.max_sub_questions, 3);
        assert_eq!(copilot.max_expansions, 2);
        assert_eq!(copilot.max_citations, 10);
        assert_eq!(copilot.dedup_prefix_chars, 80);
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let err = RagConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(_)));
    }

    #[test]
    fn rejects_zero_limits_and_timeout() {
        assert!(RagConfig::builder().rerank_top_n(0).build().is_err());
        assert!(RagConfig::builder().channel_timeout(Duration::ZERO).build().is_err());
        assert!(CopilotConfig::builder().max_citations(0).build().is_err());
        assert!(CopilotConfig::builder().compile_temperature(3.5).build().is_err());
    }

    #[test]
    fn planning_token_limit_is_tunable() {
        let config = CopilotConfig::builder().planning_max_tokens(64).build().unwrap();
        assert_eq!(config.planning_max_tokens, 64);
        assert!(CopilotConfig::builder().planning_max_tokens(0).build().is_err());
    }

    #[test]
    fn zero_expansions_is_allowed() {
        let config = CopilotConfig::builder().max_expansions(0).build().unwrap();
        assert_eq!(config.max_expansions, 0);
    }
}
