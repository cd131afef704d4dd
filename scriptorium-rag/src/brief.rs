//! Research brief types, model-output parsing, and the deterministic fallback.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::document::{Citation, RetrievalResult};
use crate::error::{RagError, Result};

const FINDING_CHARS: usize = 240;
const QUOTE_CHARS: usize = 320;
const FALLBACK_FINDINGS: usize = 3;

/// A structured, cited answer to one research question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchBrief {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<KeyFinding>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default)]
    pub annotated_bibliography: Vec<BibliographyEntry>,
    #[serde(default)]
    pub tasks: Vec<ResearchTask>,
    /// Always the retrieval-derived confidence, never the model's.
    #[serde(default)]
    pub confidence_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFinding {
    pub point: String,
    /// Citation label such as `[2]`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    #[serde(default, deserialize_with = "lenient_string")]
    pub source_id: String,
    pub quote: String,
    #[serde(default)]
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BibliographyEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub label: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub source_id: String,
    #[serde(default)]
    pub score: f32,
}

/// A follow-up action suggested by the brief.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchTask {
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

/// Accept strings, numbers and null where a label or ID is expected; models
/// often emit `"source": 2` instead of `"source": "[2]"`.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Slice out the outermost `open`…`close` span, skipping code fences or
/// prose the model wrapped around it.
fn extract_json(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a model reply into a [`ResearchBrief`].
///
/// # Errors
///
/// Returns [`RagError::ParseError`] when no JSON object can be found or it
/// does not match the brief's shape.
pub fn parse_brief(text: &str) -> Result<ResearchBrief> {
    let json = extract_json(text, '{', '}')
        .ok_or_else(|| RagError::ParseError("no JSON object in model output".to_string()))?;
    serde_json::from_str(json)
        .map_err(|e| RagError::ParseError(format!("model output is not a research brief: {e}")))
}

/// Parse a model reply that should contain a JSON array of strings.
///
/// Non-string items and blank strings are skipped.
///
/// # Errors
///
/// Returns [`RagError::ParseError`] when no JSON array can be parsed.
pub fn parse_string_array(text: &str) -> Result<Vec<String>> {
    let json = extract_json(text, '[', ']')
        .ok_or_else(|| RagError::ParseError("no JSON array in model output".to_string()))?;
    let items: Vec<Value> = serde_json::from_str(json)
        .map_err(|e| RagError::ParseError(format!("model output is not a JSON array: {e}")))?;
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .collect())
}

fn truncate_chars(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push_str("...");
    cut
}

/// Build a brief straight from retrieval data when the model's reply is unusable.
///
/// `results` and `citations` must be in the same order; finding labels refer
/// to citation indices.
pub fn fallback_brief(
    query: &str,
    results: &[RetrievalResult],
    citations: &[Citation],
    confidence_score: f32,
) -> ResearchBrief {
    let summary = if results.is_empty() {
        format!("No relevant sources were found in this workspace for \"{query}\".")
    } else {
        format!(
            "Compiled directly from {} retrieved source(s); the findings below quote the \
             strongest matches.",
            results.len()
        )
    };

    let key_findings = results
        .iter()
        .take(FALLBACK_FINDINGS)
        .enumerate()
        .map(|(i, result)| KeyFinding {
            point: truncate_chars(&result.content, FINDING_CHARS),
            source: format!("[{}]", i + 1),
        })
        .collect();

    let evidence = results
        .iter()
        .map(|result| Evidence {
            source_id: result.source_chunk_id.clone(),
            quote: truncate_chars(&result.content, QUOTE_CHARS),
            similarity: result.similarity,
        })
        .collect();

    let annotated_bibliography = citations
        .iter()
        .map(|citation| BibliographyEntry {
            label: format!("[{}]", citation.index),
            title: citation.source_title.clone(),
            source_id: citation.source_chunk_id.clone(),
            score: citation.rerank_score.unwrap_or(citation.similarity),
        })
        .collect();

    ResearchBrief {
        title: format!("Research: {query}"),
        summary,
        key_findings,
        evidence,
        annotated_bibliography,
        tasks: Vec::new(),
        confidence_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::cite;

    fn result(id: &str, content: &str, similarity: f32) -> RetrievalResult {
        RetrievalResult {
            source_chunk_id: id.to_string(),
            content: content.to_string(),
            similarity,
            rerank_score: None,
            source_title: Some(format!("Doc {id}")),
        }
    }

    #[test]
    fn parses_fenced_brief_with_numeric_sources() {
        let reply = r#"Here you go:
```json
{
  "title": "Ownership",
  "summary": "Rust tracks ownership.",
  "keyFindings": [{"point": "Moves transfer ownership", "source": 1}],
  "evidence": [{"sourceId": "doc-0", "quote": "a move", "similarity": 0.8}],
  "annotatedBibliography": [],
  "tasks": [{"task": "Read the book", "priority": "high"}],
  "confidenceScore": 0.99
}
```"#;
        let brief = parse_brief(reply).unwrap();
        assert_eq!(brief.title, "Ownership");
        assert_eq!(brief.key_findings[0].source, "1");
        assert_eq!(brief.tasks[0].priority.as_deref(), Some("high"));
        assert_eq!(brief.confidence_score, 0.99);
    }

    #[test]
    fn rejects_non_json_reply() {
        assert!(matches!(parse_brief("I cannot help with that."), Err(RagError::ParseError(_))));
        assert!(matches!(parse_brief("{ not json }"), Err(RagError::ParseError(_))));
    }

    #[test]
    fn string_array_skips_blanks_and_non_strings() {
        let parsed = parse_string_array(r#"Sure: ["a?", "  ", 3, "b?"]"#).unwrap();
        assert_eq!(parsed, vec!["a?".to_string(), "b?".to_string()]);
        assert!(parse_string_array("no list here").is_err());
    }

    #[test]
    fn fallback_uses_top_three_findings_and_all_evidence() {
        let results: Vec<_> =
            (0..5).map(|i| result(&format!("c{i}"), &format!("content {i}"), 0.5)).collect();
        let citations = cite(&results);
        let brief = fallback_brief("rust", &results, &citations, 0.42);

        assert_eq!(brief.title, "Research: rust");
        assert_eq!(brief.key_findings.len(), 3);
        assert_eq!(brief.key_findings[2].source, "[3]");
        assert_eq!(brief.evidence.len(), 5);
        assert_eq!(brief.annotated_bibliography.len(), 5);
        assert_eq!(brief.annotated_bibliography[0].title, "Doc c0");
        assert!(brief.tasks.is_empty());
        assert_eq!(brief.confidence_score, 0.42);
    }

    #[test]
    fn fallback_without_sources_says_so() {
        let brief = fallback_brief("quantum", &[], &[], 0.0);
        assert!(brief.summary.contains("No relevant sources"));
        assert!(brief.key_findings.is_empty());
        assert_eq!(brief.confidence_score, 0.0);
    }
}
