//! Query normalization

use std::collections::HashSet;

use derivative::Derivative;
use serde::{Deserialize, Serialize};

/// Turns a free text into index terms
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

#[derive(Derivative, Clone, Debug, Serialize, Deserialize)]
#[derivative(Default)]
#[serde(default)]
pub struct SimpleTokenizer {
    /// Shorter words are dropped
    #[derivative(Default(value = "3"))]
    pub min_length: usize,

    /// Longer words are dropped
    #[derivative(Default(value = "24"))]
    pub max_length: usize,

    /// Digits are kept as word characters
    pub keep_digits: bool,

    pub stopwords: HashSet<String>,
}

impl SimpleTokenizer {
    pub fn with_stopwords<I, S>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stopwords: stopwords.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    fn is_word_char(&self, c: char) -> bool {
        c.is_ascii_lowercase() || (self.keep_digits && c.is_ascii_digit())
    }
}

impl Tokenizer for SimpleTokenizer {
    /// Lowercases the text, replaces everything but `a-z` (and digits
    /// if kept) by spaces, and drops too short or too long words and
    /// stopwords
    fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        lowered
            .split(|c: char| !self.is_word_char(c))
            .filter(|word| (self.min_length..=self.max_length).contains(&word.len()))
            .filter(|word| !self.stopwords.contains(*word))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_tokenization() {
        let tokenizer = SimpleTokenizer::default();
        assert_eq!(
            tokenizer.tokenize("The CAT ran, to the cat-flap!"),
            vec!["the", "cat", "ran", "the", "cat", "flap"]
        );
        assert!(tokenizer.tokenize("a b 42 ?!").is_empty());

        let long = "x".repeat(25);
        assert!(tokenizer.tokenize(&long).is_empty());
        assert_eq!(tokenizer.tokenize(&long[..24]).len(), 1);
    }

    #[test]
    fn digits_and_stopwords() {
        let mut tokenizer = SimpleTokenizer::with_stopwords(["the"]);
        assert_eq!(tokenizer.tokenize("the cat 2024"), vec!["cat"]);

        tokenizer.keep_digits = true;
        assert_eq!(tokenizer.tokenize("the cat 2024"), vec!["cat", "2024"]);
    }
}
