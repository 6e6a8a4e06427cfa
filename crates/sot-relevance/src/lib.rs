pub mod relevance;
pub mod similarity;
pub mod tokenizer;

pub use relevance::{is_on_topic, page_text, RelevanceVerdict, DEFAULT_THRESHOLD};
pub use similarity::{calculate_similarity, cosine_similarity, jaccard_similarity, term_vector};
pub use tokenizer::{tokenize, Tokenizer};
