use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Minimum token length (exclusive): tokens of 1-2 characters carry no topic signal
const MIN_TOKEN_LEN: usize = 2;

/// English function words plus URL/domain noise that shows up in every page address
pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
    "will", "would", "should", "can", "could", "may", "might", "must", "shall", "www", "com",
    "http", "https", "html", "php", "asp", "aspx", "net", "org", "edu", "gov",
];

static DEFAULT_TOKENIZER: Lazy<Tokenizer> = Lazy::new(Tokenizer::new);

/// Normalizes free text (titles, URLs, goals) into comparable word tokens
pub struct Tokenizer {
    non_word: Regex,
    stop_words: HashSet<&'static str>,
}

impl Tokenizer {
    /// Create a tokenizer with the built-in stop-word list
    ///
    /// # Panics
    ///
    /// Panics if the punctuation pattern fails to compile
    #[must_use]
    pub fn new() -> Self {
        Self {
            // ASCII word characters only; anything else (punctuation, URL separators,
            // non-Latin script) becomes a word boundary
            non_word: Regex::new(r"[^A-Za-z0-9_\s]").unwrap(),
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }

    /// Split text into lowercase tokens, dropping short words and stop words.
    ///
    /// Duplicates are preserved so callers can weight by term frequency.
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let cleaned = self.non_word.replace_all(&lowered, " ");

        cleaned
            .split_whitespace()
            .filter(|word| word.len() > MIN_TOKEN_LEN)
            .filter(|word| !self.is_stop_word(word))
            .map(str::to_string)
            .collect()
    }

    /// Check whether a word is filtered as a stop word
    #[must_use]
    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Tokenize with the shared default tokenizer
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    DEFAULT_TOKENIZER.tokenize(text)
}
