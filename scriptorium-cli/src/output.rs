//! Rendering research briefs and search results for the terminal.

use std::fmt::Write;

use scriptorium_rag::{ResearchOutcome, RetrievalResult};
use serde::Serialize;

const SNIPPET_MAX_LEN: usize = 200;

/// How results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    Json,
    Text,
}

#[derive(Serialize)]
struct JsonSearch<'a> {
    query: &'a str,
    results: &'a [RetrievalResult],
}

pub fn format_outcome(outcome: &ResearchOutcome, format: Format) -> String {
    match format {
        Format::Json => {
            serde_json::to_string_pretty(&outcome.brief).unwrap_or_else(|_| "{}".to_string())
        }
        Format::Text => format_outcome_text(outcome),
    }
}

pub fn format_search(query: &str, results: &[RetrievalResult], format: Format) -> String {
    match format {
        Format::Json => serde_json::to_string_pretty(&JsonSearch { query, results })
            .unwrap_or_else(|_| "{}".to_string()),
        Format::Text => format_search_text(query, results),
    }
}

fn format_outcome_text(outcome: &ResearchOutcome) -> String {
    let brief = &outcome.brief;
    let mut out = String::new();
    let _ = writeln!(out, "{}", brief.title);
    let _ = writeln!(out, "{}", "=".repeat(brief.title.chars().count()));
    let _ = writeln!(out, "Confidence: {:.0}%\n", brief.confidence_score * 100.0);
    let _ = writeln!(out, "{}\n", brief.summary);

    if !brief.key_findings.is_empty() {
        let _ = writeln!(out, "Key findings:");
        for finding in &brief.key_findings {
            let _ = writeln!(out, "  - {} {}", finding.point, finding.source);
        }
        out.push('\n');
    }

    if !brief.tasks.is_empty() {
        let _ = writeln!(out, "Next steps:");
        for task in &brief.tasks {
            match &task.priority {
                Some(priority) => {
                    let _ = writeln!(out, "  - [{priority}] {}", task.task);
                }
                None => {
                    let _ = writeln!(out, "  - {}", task.task);
                }
            }
        }
        out.push('\n');
    }

    if outcome.citations.is_empty() {
        let _ = writeln!(out, "No sources.");
    } else {
        let _ = writeln!(out, "Sources:");
        for citation in &outcome.citations {
            let _ = writeln!(
                out,
                "  [{}] {} ({:.2})\n      {}",
                citation.index,
                citation.source_title,
                citation.rerank_score.unwrap_or(citation.similarity),
                truncate_text(&citation.content, SNIPPET_MAX_LEN)
            );
        }
    }
    out.trim_end().to_string()
}

fn format_search_text(query: &str, results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return format!("No results for \"{query}\".");
    }
    let mut out = format!("Results for \"{query}\":\n");
    for (i, result) in results.iter().enumerate() {
        let title = result.source_title.as_deref().unwrap_or("Untitled");
        let _ = write!(
            out,
            "\n{}. {title} (similarity {:.2}",
            i + 1,
            result.similarity
        );
        if let Some(score) = result.rerank_score {
            let _ = write!(out, ", rerank {score:.2}");
        }
        let _ = writeln!(out, ")\n   {}", truncate_text(&result.content, SNIPPET_MAX_LEN));
    }
    out.trim_end().to_string()
}

fn truncate_text(text: &str, max_len: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_len {
        collapsed
    } else {
        let cut: String = collapsed.chars().take(max_len).collect();
        format!("{cut}...")
    }
}
