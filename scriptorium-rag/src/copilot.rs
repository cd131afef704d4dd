//! The research copilot: decompose → expand → retrieve → cite → compile.
//!
//! Once the engine reports ready, every stage degrades instead of failing:
//! an unusable decomposition falls back to the original question, failed
//! expansions are skipped, empty retrievals just contribute nothing, and an
//! unparseable brief is replaced by [`fallback_brief`].

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::brief::{ResearchBrief, fallback_brief, parse_brief, parse_string_array};
use crate::config::CopilotConfig;
use crate::confidence::confidence;
use crate::document::{Citation, RetrievalResult, cite};
use crate::error::Result;
use crate::llm::{ChatEngine, ChatMessage, ChatOptions};
use crate::retrieval::RetrievalEngine;

const DECOMPOSE_PROMPT: &str = "You are a research planner. Break the user's question into at \
most {max} focused sub-questions that together answer it. Reply with a JSON array of strings \
and nothing else.";

const EXPAND_PROMPT: &str = "You rewrite search queries. Give up to {max} alternative phrasings \
or closely related queries for the user's question, useful for searching personal notes. Reply \
with a JSON array of strings and nothing else.";

const COMPILE_PROMPT: &str = r#"You are a research assistant writing a brief from the numbered sources provided. Use only those sources and cite them by their label, e.g. "[2]".
Reply with a single JSON object and nothing else, matching exactly:
{
  "title": string,
  "summary": string,
  "keyFindings": [{"point": string, "source": "[n]"}],
  "evidence": [{"sourceId": string, "quote": string, "similarity": number}],
  "annotatedBibliography": [{"label": "[n]", "title": string, "sourceId": string, "score": number}],
  "tasks": [{"task": string, "priority": "high" | "medium" | "low"}],
  "confidenceScore": number
}
If the sources do not answer the question, say so in the summary and leave keyFindings empty."#;

/// The stages of one research run, numbered as reported to progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResearchStep {
    Decompose = 1,
    Expand = 2,
    Retrieve = 3,
    Cite = 4,
    Compile = 5,
}

impl ResearchStep {
    pub fn number(self) -> u8 {
        self as u8
    }
}

/// Everything one research run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchOutcome {
    pub brief: ResearchBrief,
    pub citations: Vec<Citation>,
    /// The compile stage's reply verbatim; empty if the engine failed.
    pub raw_output: String,
}

/// Turns a research question into a cited [`ResearchBrief`].
///
/// # Example
///
/// ```rust,ignore
/// let copilot = ResearchCopilot::new(engine, Arc::new(retrieval));
/// let outcome = copilot
///     .research("How do lifetimes work?", "ws-1", &|step, detail| {
///         eprintln!("[{step}/5] {detail}");
///     })
///     .await?;
/// println!("{}", outcome.brief.summary);
/// ```
pub struct ResearchCopilot {
    engine: Arc<dyn ChatEngine>,
    retrieval: Arc<RetrievalEngine>,
    config: CopilotConfig,
}

impl ResearchCopilot {
    pub fn new(engine: Arc<dyn ChatEngine>, retrieval: Arc<RetrievalEngine>) -> Self {
        Self::with_config(engine, retrieval, CopilotConfig::default())
    }

    pub fn with_config(
        engine: Arc<dyn ChatEngine>,
        retrieval: Arc<RetrievalEngine>,
        config: CopilotConfig,
    ) -> Self {
        Self { engine, retrieval, config }
    }

    pub fn config(&self) -> &CopilotConfig {
        &self.config
    }

    /// Research `query` within `workspace_id`.
    ///
    /// `progress` is called once per stage, in order, with the stage number
    /// and a short description.
    ///
    /// # Errors
    ///
    /// Only fails when the engine cannot be made ready. After that a brief
    /// is always returned, possibly the fallback with zero confidence.
    pub async fn research(
        &self,
        query: &str,
        workspace_id: &str,
        progress: &(dyn Fn(u8, &str) + Send + Sync),
    ) -> Result<ResearchOutcome> {
        self.engine.ensure_ready().await?;

        let report = |step: ResearchStep, detail: &str| {
            info!(step = step.number(), workspace_id, detail, "research progress");
            progress(step.number(), detail);
        };

        report(ResearchStep::Decompose, "Breaking the question into sub-questions");
        let sub_questions = self.decompose(query).await;

        report(ResearchStep::Expand, &format!("Expanding {} sub-question(s)", sub_questions.len()));
        let queries = self.expand(sub_questions).await;

        report(ResearchStep::Retrieve, &format!("Searching with {} queries", queries.len()));
        let retrieved = join_all(
            queries.iter().map(|q| self.retrieval.search_with_rerank_scoped(q, workspace_id)),
        )
        .await;
        let results = merge_results(retrieved, &self.config);

        report(ResearchStep::Cite, &format!("Scoring {} source(s)", results.len()));
        let citations = cite(&results);
        let confidence_score = confidence(&results);
        let sources = render_sources(&citations);

        report(ResearchStep::Compile, "Compiling the research brief");
        let raw_output = self.compile(query, &sources).await;
        let brief = match parse_brief(&raw_output) {
            Ok(brief) => ResearchBrief { confidence_score, ..brief },
            Err(e) => {
                warn!(error = %e, "unusable brief from engine, building fallback");
                fallback_brief(query, &results, &citations, confidence_score)
            }
        };

        info!(
            workspace_id,
            citation_count = citations.len(),
            confidence = confidence_score,
            "research completed"
        );
        Ok(ResearchOutcome { brief, citations, raw_output })
    }

    async fn decompose(&self, query: &str) -> Vec<String> {
        let max = self.config.max_sub_questions;
        let system = DECOMPOSE_PROMPT.replace("{max}", &max.to_string());
        match self.ask_for_list(&system, query).await {
            Some(mut questions) if !questions.is_empty() => {
                questions.truncate(max);
                questions
            }
            _ => vec![query.to_string()],
        }
    }

    async fn expand(&self, sub_questions: Vec<String>) -> Vec<String> {
        let max = self.config.max_expansions;
        let mut queries = Vec::with_capacity(sub_questions.len() * (max + 1));
        for question in sub_questions {
            let expansions = if max == 0 {
                Vec::new()
            } else {
                let system = EXPAND_PROMPT.replace("{max}", &max.to_string());
                self.ask_for_list(&system, &question).await.unwrap_or_default()
            };
            queries.push(question);
            queries.extend(expansions.into_iter().take(max));
        }
        queries
    }

    async fn ask_for_list(&self, system: &str, user: &str) -> Option<Vec<String>> {
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        let options =
            ChatOptions::new(self.config.planning_temperature, self.config.planning_max_tokens);
        let reply = self
            .engine
            .chat(&messages, &options)
            .await
            .map_err(|e| warn!(engine = self.engine.name(), error = %e, "planning call failed"))
            .ok()?;
        parse_string_array(&reply)
            .map_err(|e| warn!(error = %e, "planning reply was not a JSON array"))
            .ok()
    }

    async fn compile(&self, query: &str, sources: &str) -> String {
        let messages = [
            ChatMessage::system(COMPILE_PROMPT),
            ChatMessage::user(format!("Question: {query}\n\nSources:\n{sources}")),
        ];
        let options =
            ChatOptions::new(self.config.compile_temperature, self.config.compile_max_tokens)
                .json();
        self.engine.chat(&messages, &options).await.unwrap_or_else(|e| {
            warn!(engine = self.engine.name(), error = %e, "compile call failed");
            String::new()
        })
    }
}

/// Flatten per-query results, drop repeated passages and keep the best.
///
/// A result is a repeat when the first `dedup_prefix_chars` characters of its
/// content were already seen earlier in query order. Survivors are sorted by
/// [`RetrievalResult::relevance`], highest first, and cut to `max_citations`.
pub fn merge_results(
    per_query: Vec<Vec<RetrievalResult>>,
    config: &CopilotConfig,
) -> Vec<RetrievalResult> {
    let mut seen = HashSet::new();
    let mut merged: Vec<RetrievalResult> = per_query
        .into_iter()
        .flatten()
        .filter(|result| {
            let prefix: String = result.content.chars().take(config.dedup_prefix_chars).collect();
            seen.insert(prefix)
        })
        .collect();
    merged.sort_by(|a, b| b.relevance().total_cmp(&a.relevance()));
    merged.truncate(config.max_citations);
    merged
}

/// Render citations as the numbered sources block given to the engine.
pub fn render_sources(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return "(no sources found)".to_string();
    }
    citations
        .iter()
        .map(|c| {
            format!(
                "[{}] ({}, {}, {:.2}) {}",
                c.index, c.source_chunk_id, c.source_title, c.similarity, c.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn result(content: &str, similarity: f32, rerank_score: Option<f32>) -> RetrievalResult {
        RetrievalResult {
            source_chunk_id: format!("id-{content}"),
            content: content.to_string(),
            similarity,
            rerank_score,
            source_title: Some("Notes".to_string()),
        }
    }

    #[test]
    fn merge_prefers_rerank_score_and_keeps_first_duplicate() {
        let config = CopilotConfig::default();
        let merged = merge_results(
            vec![
                vec![result("alpha", 0.9, Some(0.2)), result("beta", 0.1, Some(0.8))],
                vec![result("alpha", 0.99, Some(0.99)), result("gamma", 0.5, None)],
            ],
            &config,
        );
        let contents: Vec<_> = merged.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, ["beta", "gamma", "alpha"]);
        assert_eq!(merged[2].rerank_score, Some(0.2));
    }

    #[test]
    fn merge_dedups_on_prefix_only() {
        let config = CopilotConfig::builder().dedup_prefix_chars(5).build().unwrap();
        let merged = merge_results(
            vec![vec![result("same start one", 0.4, None), result("same start two", 0.5, None)]],
            &config,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].content, "same start one");
    }

    #[test]
    fn sources_block_lists_each_citation() {
        let results = vec![result("first passage", 0.456, None)];
        let rendered = render_sources(&cite(&results));
        assert_eq!(rendered, "[1] (id-first passage, Notes, 0.46) first passage");
        assert_eq!(render_sources(&[]), "(no sources found)");
    }

    #[test]
    fn step_numbers_run_one_to_five() {
        let steps = [
            ResearchStep::Decompose,
            ResearchStep::Expand,
            ResearchStep::Retrieve,
            ResearchStep::Cite,
            ResearchStep::Compile,
        ];
        let numbers: Vec<u8> = steps.iter().map(|s| s.number()).collect();
        assert_eq!(numbers, [1, 2, 3, 4, 5]);
    }

    proptest! {
        #[test]
        fn merged_prefixes_are_unique_and_bounded(
            batches in proptest::collection::vec(
                proptest::collection::vec(("[ab]{1,6}", 0.0f32..1.0), 0..8),
                0..5,
            ),
        ) {
            let config = CopilotConfig::builder().dedup_prefix_chars(3).build().unwrap();
            let per_query: Vec<Vec<RetrievalResult>> = batches
                .into_iter()
                .map(|batch| batch.into_iter().map(|(c, s)| result(&c, s, None)).collect())
                .collect();
            let merged = merge_results(per_query, &config);

            prop_assert!(merged.len() <= config.max_citations);
            let mut prefixes = HashSet::new();
            for r in &merged {
                let prefix: String = r.content.chars().take(3).collect();
                prop_assert!(prefixes.insert(prefix));
            }
            let indices: Vec<usize> = cite(&merged).iter().map(|c| c.index).collect();
            prop_assert_eq!(indices, (1..=merged.len()).collect::<Vec<_>>());
        }
    }
}
