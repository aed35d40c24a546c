use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// A token produced by analysis
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub position: u32,
}

impl Token {
    pub fn new(text: impl Into<String>, position: u32) -> Self {
        Self {
            text: text.into(),
            position,
        }
    }
}

/// Turns field text into positioned tokens. Tokens are opaque to the index.
pub trait Analyzer: Send + Sync + Debug {
    fn tokenize(&self, field: &str, text: &str) -> Vec<Token>;

    /// Normalization applied to query words that bypass full analysis
    /// (wildcards, prefixes, range bounds)
    fn normalize(&self, _field: &str, word: &str) -> String {
        word.to_string()
    }
}

/// Emits the whole value as a single token
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordAnalyzer;

impl Analyzer for KeywordAnalyzer {
    fn tokenize(&self, _field: &str, text: &str) -> Vec<Token> {
        if text.is_empty() {
            Vec::new()
        } else {
            vec![Token::new(text, 0)]
        }
    }
}

/// Dispatches to a per-field analyzer, falling back to a default
#[derive(Clone, Debug)]
pub struct PerFieldAnalyzer {
    default: Arc<dyn Analyzer>,
    fields: HashMap<String, Arc<dyn Analyzer>>,
}

impl PerFieldAnalyzer {
    pub fn new(default: Arc<dyn Analyzer>) -> Self {
        Self {
            default,
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>, analyzer: Arc<dyn Analyzer>) -> Self {
        self.fields.insert(field.into(), analyzer);
        self
    }

    fn analyzer_for(&self, field: &str) -> &dyn Analyzer {
        self.fields
            .get(field)
            .map(|a| a.as_ref())
            .unwrap_or(self.default.as_ref())
    }
}

impl Analyzer for PerFieldAnalyzer {
    fn tokenize(&self, field: &str, text: &str) -> Vec<Token> {
        self.analyzer_for(field).tokenize(field, text)
    }

    fn normalize(&self, field: &str, word: &str) -> String {
        self.analyzer_for(field).normalize(field, word)
    }
}
