use serde::{Deserialize, Serialize};

use crate::similarity::calculate_similarity;

/// Threshold applied when a session does not specify one
pub const DEFAULT_THRESHOLD: f64 = 0.3;

/// Outcome of judging one page against a goal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceVerdict {
    pub score: f64,
    pub on_topic: bool,
}

/// Build the text a page is scored on: its title followed by its URL
#[must_use]
pub fn page_text(title: &str, url: &str) -> String {
    format!("{title} {url}")
}

/// Judge whether a page (title + URL) is related to the goal.
///
/// The URL takes part in scoring because domains and path segments often carry
/// topic words the title lacks. A score exactly at the threshold counts as on-topic.
#[must_use]
pub fn is_on_topic(goal: &str, page_title: &str, page_url: &str, threshold: f64) -> RelevanceVerdict {
    let score = calculate_similarity(goal, &page_text(page_title, page_url));
    RelevanceVerdict {
        score,
        on_topic: score >= threshold,
    }
}
