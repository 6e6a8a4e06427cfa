//! Token-overlap similarity metrics
//!
//! Two complementary measures over tokenized text:
//! - Cosine similarity over term-frequency vectors (rewards repeated shared terms)
//! - Jaccard similarity over distinct token sets (rewards any shared vocabulary)
//!
//! The combined score takes the larger of the two, so a page counts as related
//! if it matches under either notion. Short pages, where term frequency is
//! noisy, are judged mostly by Jaccard.


use std::collections::{HashMap, HashSet};

use crate::tokenizer::tokenize;

/// Token -> occurrence count for one token sequence
pub type TermVector<'a> = HashMap<&'a str, u32>;

/// Build a term-frequency vector from a token sequence
#[must_use]
pub fn term_vector<S: AsRef<str>>(tokens: &[S]) -> TermVector<'_> {
    let mut vector = TermVector::new();
    for token in tokens {
        *vector.entry(token.as_ref()).or_insert(0) += 1;
    }
    vector
}

/// Cosine similarity between the term-frequency vectors of two token sequences.
///
/// Returns 0.0 when either side is empty or has zero magnitude.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cosine_similarity<S: AsRef<str>>(tokens_a: &[S], tokens_b: &[S]) -> f64 {
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let vec_a = term_vector(tokens_a);
    let vec_b = term_vector(tokens_b);

    // Terms missing from either side contribute nothing to the dot product
    let dot_product: u64 = vec_a
        .iter()
        .filter_map(|(term, count_a)| {
            vec_b
                .get(term)
                .map(|count_b| u64::from(*count_a) * u64::from(*count_b))
        })
        .sum();

    let mag_a = magnitude(&vec_a);
    let mag_b = magnitude(&vec_b);

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    (dot_product as f64 / (mag_a * mag_b)).clamp(0.0, 1.0)
}

#[allow(clippy::cast_precision_loss)]
fn magnitude(vector: &TermVector<'_>) -> f64 {
    let sum_sq: u64 = vector
        .values()
        .map(|count| u64::from(*count) * u64::from(*count))
        .sum();
    (sum_sq as f64).sqrt()
}

/// Jaccard similarity (intersection over union) of the distinct tokens of two sequences.
///
/// Counts are ignored. Returns 0.0 when either side is empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn jaccard_similarity<S: AsRef<str>>(tokens_a: &[S], tokens_b: &[S]) -> f64 {
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<&str> = tokens_a.iter().map(AsRef::as_ref).collect();
    let set_b: HashSet<&str> = tokens_b.iter().map(AsRef::as_ref).collect();

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();

    intersection as f64 / union as f64
}

/// Similarity of a page's text to a goal, as the larger of cosine and Jaccard
#[must_use]
pub fn calculate_similarity(goal: &str, page_text: &str) -> f64 {
    let goal_tokens = tokenize(goal);
    let page_tokens = tokenize(page_text);

    let cosine = cosine_similarity(&goal_tokens, &page_tokens);
    let jaccard = jaccard_similarity(&goal_tokens, &page_tokens);

    log::trace!("similarity cosine={cosine:.3} jaccard={jaccard:.3}");

    cosine.max(jaccard)
}
