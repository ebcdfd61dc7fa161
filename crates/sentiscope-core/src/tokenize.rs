//! Review text normalization
//!
//! The tokenizer runs before the encoder and must match the preprocessing
//! the artifacts were trained with. It is a pure function of its input.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashSet;

/// Turns raw text into an ordered sequence of normalized tokens
pub trait Tokenizer: Send + Sync {
    /// Tokenize the given text
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// English stop words. Negations are deliberately absent: they carry sentiment.
const STOP_WORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by",
    "for", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
    "how", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such",
    "only", "own", "same", "so", "than", "too", "very", "s", "t", "can", "will", "just",
    "should", "now", "d", "ll", "m", "o", "re", "ve", "y",
];

/// Default tokenizer for restaurant/product reviews
///
/// Steps: non-letters become spaces, lowercase, whitespace split, stop word
/// removal, then a light suffix stemmer.
pub struct ReviewTokenizer {
    non_letters: Regex,
    stop_words: HashSet<&'static str>,
}

impl ReviewTokenizer {
    /// Create a new review tokenizer
    pub fn new() -> Result<Self> {
        Ok(Self {
            non_letters: Regex::new(r"[^a-zA-Z]+")
                .map_err(|e| Error::internal(format!("Failed to compile tokenizer regex: {}", e)))?,
            stop_words: STOP_WORDS.iter().copied().collect(),
        })
    }
}

impl Default for ReviewTokenizer {
    fn default() -> Self {
        Self::new().expect("Failed to create review tokenizer")
    }
}

impl Tokenizer for ReviewTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let cleaned = self.non_letters.replace_all(text, " ").to_lowercase();

        cleaned
            .split_whitespace()
            .filter(|word| !self.stop_words.contains(word))
            .map(stem)
            .collect()
    }
}

/// Strip one common English suffix. Short words are left alone.
fn stem(word: &str) -> String {
    let len = word.len();

    if len > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..len - 3]);
    }
    if word.ends_with("sses") {
        return word[..len - 2].to_string();
    }
    if len > 5 && word.ends_with("ing") {
        return word[..len - 3].to_string();
    }
    if len > 4 && word.ends_with("ed") {
        return word[..len - 2].to_string();
    }
    if len > 4 && word.ends_with("ly") {
        return word[..len - 2].to_string();
    }
    if len > 3
        && word.ends_with('s')
        && !word.ends_with("ss")
        && !word.ends_with("us")
        && !word.ends_with("is")
    {
        return word[..len - 1].to_string();
    }

    word.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_text_has_no_tokens() {
        let tokenizer = ReviewTokenizer::new().unwrap();
        assert!(tokenizer.tokenize("").is_empty());
        assert!(tokenizer.tokenize("  !!! 42 ...").is_empty());
    }

    #[test]
    fn test_normalizes_and_drops_stop_words() {
        let tokenizer = ReviewTokenizer::new().unwrap();
        let tokens = tokenizer.tokenize("The Food was GREAT, and the waiters were friendly!");
        assert_eq!(tokens, vec!["food", "great", "waiter", "friend"]);
    }

    #[test]
    fn test_keeps_negations() {
        let tokenizer = ReviewTokenizer::new().unwrap();
        let tokens = tokenizer.tokenize("Not good, no flavor");
        assert_eq!(tokens, vec!["not", "good", "no", "flavor"]);
    }

    #[test]
    fn test_stemmer_rules() {
        assert_eq!(stem("tasties"), "tasty");
        assert_eq!(stem("loving"), "lov");
        assert_eq!(stem("loved"), "lov");
        assert_eq!(stem("quickly"), "quick");
        assert_eq!(stem("dishes"), "dishe");
        assert_eq!(stem("glass"), "glass");
        assert_eq!(stem("bus"), "bus");
        assert_eq!(stem("bad"), "bad");
    }

    proptest! {
        #[test]
        fn prop_tokens_are_lowercase_letters(text in ".{0,200}") {
            let tokenizer = ReviewTokenizer::new().unwrap();
            for token in tokenizer.tokenize(&text) {
                prop_assert!(!token.is_empty());
                prop_assert!(token.chars().all(|c| c.is_ascii_lowercase()));
            }
        }

        #[test]
        fn prop_tokenize_is_deterministic(text in ".{0,200}") {
            let tokenizer = ReviewTokenizer::new().unwrap();
            prop_assert_eq!(tokenizer.tokenize(&text), tokenizer.tokenize(&text));
        }
    }
}
