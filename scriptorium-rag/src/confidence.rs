//! Confidence scoring over retrieval signals.
//!
//! This is the only place a research confidence is computed. A model's own
//! self-reported confidence is always overwritten with this value.

use crate::document::RetrievalResult;

/// Similarity above which a result counts toward citation density.
pub const RELEVANCE_THRESHOLD: f32 = 0.3;

const SIMILARITY_WEIGHT: f32 = 0.3;
const RERANK_WEIGHT: f32 = 0.4;
const DENSITY_WEIGHT: f32 = 0.3;

/// Score how well `results` support an answer, in `[0, 1]`.
///
/// `0.3 · mean similarity + 0.4 · mean rerank score + 0.3 · citation density`,
/// where the rerank mean covers only results that have a rerank score (and
/// falls back to the similarity mean when none do) and citation density is
/// the share of results with similarity above [`RELEVANCE_THRESHOLD`].
/// Empty input scores 0.
pub fn confidence(results: &[RetrievalResult]) -> f32 {
    if results.is_empty() {
        return 0.0;
    }

    let count = results.len() as f32;
    let avg_similarity = results.iter().map(|r| r.similarity).sum::<f32>() / count;

    let rerank_scores: Vec<f32> = results.iter().filter_map(|r| r.rerank_score).collect();
    let avg_rerank = if rerank_scores.is_empty() {
        avg_similarity
    } else {
        rerank_scores.iter().sum::<f32>() / rerank_scores.len() as f32
    };

    let relevant = results.iter().filter(|r| r.similarity > RELEVANCE_THRESHOLD).count();
    let citation_density = relevant as f32 / count;

    let score = SIMILARITY_WEIGHT * avg_similarity
        + RERANK_WEIGHT * avg_rerank
        + DENSITY_WEIGHT * citation_density;
    if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn result(similarity: f32, rerank_score: Option<f32>) -> RetrievalResult {
        RetrievalResult {
            source_chunk_id: "c".to_string(),
            content: "text".to_string(),
            similarity,
            rerank_score,
            source_title: None,
        }
    }

    #[test]
    fn empty_results_score_zero() {
        assert_eq!(confidence(&[]), 0.0);
    }

    #[test]
    fn twenty_strong_results_score_point_seven_two() {
        let results: Vec<_> = (0..20).map(|_| result(0.6, Some(0.6))).collect();
        let score = confidence(&results);
        assert!((score - 0.72).abs() < 1e-5, "got {score}");
    }

    #[test]
    fn rerank_mean_falls_back_to_similarity() {
        let results = vec![result(0.5, None), result(0.1, None)];
        // avg 0.3, density 0.5
        let expected = 0.3 * 0.3 + 0.4 * 0.3 + 0.3 * 0.5;
        assert!((confidence(&results) - expected).abs() < 1e-6);
    }

    #[test]
    fn rerank_mean_ignores_unscored_results() {
        let results = vec![result(0.2, Some(1.0)), result(0.2, None)];
        // avg similarity 0.2, avg rerank 1.0, density 0
        let expected = 0.3 * 0.2 + 0.4 * 1.0;
        assert!((confidence(&results) - expected).abs() < 1e-6);
    }

    #[test]
    fn threshold_is_strict() {
        let results = vec![result(0.3, None)];
        let expected = 0.3 * 0.3 + 0.4 * 0.3;
        assert!((confidence(&results) - expected).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn always_within_unit_interval(
            signals in proptest::collection::vec(
                (-1.0f32..2.0, proptest::option::of(-1.0f32..2.0)),
                0..30,
            ),
        ) {
            let results: Vec<_> = signals.into_iter().map(|(s, r)| result(s, r)).collect();
            let score = confidence(&results);
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }
}
