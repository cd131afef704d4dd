//! Extractive contextual compression.
//!
//! Shortens a retrieved passage to the sentences that share the most words
//! with the query. Pure and deterministic.

use std::collections::HashSet;

/// Default sentence budget for [`compress`].
pub const DEFAULT_MAX_SENTENCES: usize = 3;

/// Keep the `max_sentences` sentences of `content` most relevant to `query`.
///
/// Sentences are split on `.`, `!` and `?`. Content with at most
/// `max_sentences` sentences is returned unchanged. Otherwise each sentence
/// scores one point per lowercased word longer than two characters that also
/// appears among the query's whitespace-separated words; the highest scoring
/// sentences win, ties keep document order, and the winners are joined with
/// `". "` and a closing period.
///
/// # Example
///
/// ```rust
/// use scriptorium_rag::compress;
///
/// let text = "Cats sleep. Rust has traits. Dogs bark. Traits enable generics.";
/// assert_eq!(compress(text, "rust traits", 1), "Rust has traits.");
/// ```
pub fn compress(content: &str, query: &str, max_sentences: usize) -> String {
    let sentences: Vec<&str> =
        content.split(['.', '!', '?']).map(str::trim).filter(|s| !s.is_empty()).collect();

    if sentences.len() <= max_sentences {
        return content.to_string();
    }

    let query = query.to_lowercase();
    let query_words: HashSet<&str> = query.split_whitespace().collect();

    let mut scored: Vec<(usize, &str)> =
        sentences.into_iter().map(|s| (sentence_score(s, &query_words), s)).collect();
    // `sort_by` is stable, so equal scores keep their original order.
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let selected: Vec<&str> = scored.into_iter().take(max_sentences).map(|(_, s)| s).collect();
    format!("{}.", selected.join(". "))
}

fn sentence_score(sentence: &str, query_words: &HashSet<&str>) -> usize {
    let lowered = sentence.to_lowercase();
    lowered
        .split_whitespace()
        .filter(|word| word.chars().count() > 2 && query_words.contains(word))
        .count()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn short_content_is_returned_verbatim() {
        let content = "  One sentence!  Two?  ";
        assert_eq!(compress(content, "anything", 3), content);
    }

    #[test]
    fn keeps_top_sentences_by_query_overlap() {
        let content = "The borrow checker enforces rules. Cats are nice. \
                       Lifetimes help the borrow checker. Weather is mild. Soup is hot.";
        let compressed = compress(content, "borrow checker lifetimes", 2);
        assert_eq!(
            compressed,
            "Lifetimes help the borrow checker. The borrow checker enforces rules."
        );
    }

    #[test]
    fn ties_preserve_document_order() {
        let content = "Alpha one. Beta two. Gamma three. Delta four.";
        assert_eq!(compress(content, "nothing matches", 2), "Alpha one. Beta two.");
    }

    #[test]
    fn short_words_do_not_score() {
        let content = "An ox is. The cat sat. A dog ran. Big ox.";
        // "ox" has two characters and never counts; "cat" does.
        assert_eq!(compress(content, "ox cat", 1), "The cat sat.");
    }

    proptest! {
        #[test]
        fn idempotent_when_within_budget(
            sentences in proptest::collection::vec("[a-z ]{1,20}", 0..4),
            query in "[a-z ]{0,20}",
        ) {
            let content = sentences.join(". ");
            prop_assert_eq!(compress(&content, &query, 3), content);
        }

        #[test]
        fn never_exceeds_sentence_budget(
            sentences in proptest::collection::vec("[a-z]{1,8}( [a-z]{1,8}){0,4}", 4..12),
            query in "[a-z ]{0,30}",
            budget in 1usize..4,
        ) {
            let content = sentences.join(". ");
            let compressed = compress(&content, &query, budget);
            let count = compressed.split('.').filter(|s| !s.trim().is_empty()).count();
            prop_assert!(count <= budget);
        }
    }
}
