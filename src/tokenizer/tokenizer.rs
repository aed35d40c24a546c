use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use std::fmt;
use stop_words::{get, LANGUAGE};
use unicode_segmentation::UnicodeSegmentation;

use super::analyzer::{Analyzer, Token};
use crate::config::TokenizerConfig;

/// Unicode word tokenizer with optional lowercasing, stop words and stemming
pub struct Tokenizer {
    config: TokenizerConfig,
    stemmer: Option<Stemmer>,
    stopwords: HashSet<String>,
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("config", &self.config)
            .field("stopwords", &self.stopwords.len())
            .finish()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(&TokenizerConfig::default())
    }
}

impl Tokenizer {
    /// Create a new tokenizer from configuration
    pub fn new(config: &TokenizerConfig) -> Self {
        let stemmer = if config.stem {
            Some(Stemmer::create(stemmer_algorithm(&config.language)))
        } else {
            None
        };

        let stopwords = if config.remove_stopwords {
            get(LANGUAGE::English)
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect()
        } else {
            HashSet::new()
        };

        Self {
            config: config.clone(),
            stemmer,
            stopwords,
        }
    }

    pub fn config(&self) -> &TokenizerConfig {
        &self.config
    }

    /// Split `text` into positioned terms.
    ///
    /// Every word consumes a position, so a filtered stop word still leaves a
    /// gap that phrase queries respect.
    pub fn analyze(&self, text: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        for (position, word) in text.unicode_words().enumerate() {
            let term = if self.config.lowercase {
                word.to_lowercase()
            } else {
                word.to_string()
            };
            let len = term.chars().count();
            if len < self.config.min_token_length
                || len > self.config.max_token_length
                || self.stopwords.contains(&term)
            {
                continue;
            }
            let term = match &self.stemmer {
                Some(stemmer) => stemmer.stem(&term).into_owned(),
                None => term,
            };
            tokens.push(Token::new(term, position as u32));
        }
        tokens
    }

    /// Normalize a single query word the same way indexing would,
    /// without dropping it for length or stop word reasons
    pub fn normalize(&self, word: &str) -> String {
        if self.config.lowercase {
            word.to_lowercase()
        } else {
            word.to_string()
        }
    }
}

impl Analyzer for Tokenizer {
    fn tokenize(&self, _field: &str, text: &str) -> Vec<Token> {
        self.analyze(text)
    }

    fn normalize(&self, _field: &str, word: &str) -> String {
        Tokenizer::normalize(self, word)
    }
}

fn stemmer_algorithm(language: &str) -> Algorithm {
    match language.to_ascii_lowercase().as_str() {
        "french" => Algorithm::French,
        "german" => Algorithm::German,
        "spanish" => Algorithm::Spanish,
        "italian" => Algorithm::Italian,
        "portuguese" => Algorithm::Portuguese,
        "dutch" => Algorithm::Dutch,
        "russian" => Algorithm::Russian,
        _ => Algorithm::English,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(tokenizer: &Tokenizer, text: &str) -> Vec<String> {
        tokenizer.analyze(text).into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_positions_follow_words() {
        let tokenizer = Tokenizer::default();
        assert_eq!(
            tokenizer.analyze("Red fox, blue FOX"),
            vec![
                Token::new("red", 0),
                Token::new("fox", 1),
                Token::new("blue", 2),
                Token::new("fox", 3),
            ]
        );
    }

    #[test]
    fn test_english_drops_stop_words_and_stems() {
        let tokenizer = Tokenizer::new(&TokenizerConfig::english());
        let tokens = tokenizer.analyze("the runner is running");

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].position, 1);
        assert_eq!(tokens[1].position, 3);
        assert!(tokens.iter().all(|t| t.text.starts_with("run")));
    }

    #[test]
    fn test_length_bounds_count_chars() {
        let config = TokenizerConfig {
            min_token_length: 3,
            max_token_length: 4,
            ..TokenizerConfig::default()
        };
        let tokenizer = Tokenizer::new(&config);
        assert_eq!(terms(&tokenizer, "ab abc ébcd abcde"), vec!["abc", "ébcd"]);
    }

    #[test]
    fn test_case_kept_when_not_lowercasing() {
        let config = TokenizerConfig {
            lowercase: false,
            ..TokenizerConfig::default()
        };
        let tokenizer = Tokenizer::new(&config);
        assert_eq!(terms(&tokenizer, "Segment MERGE"), vec!["Segment", "MERGE"]);
        assert_eq!(Analyzer::normalize(&tokenizer, "f", "AbC"), "AbC");
    }

    #[test]
    fn test_stemmer_language_fallback() {
        assert!(matches!(stemmer_algorithm("German"), Algorithm::German));
        assert!(matches!(stemmer_algorithm("klingon"), Algorithm::English));
    }
}
