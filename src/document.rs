//! Documents, fields and terms
//!
//! A [`Document`] only exists while it is being indexed or after it has been
//! loaded back from a segment's stored fields. Only fields flagged `stored`
//! survive the round trip.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Per-field indexing flags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFlags {
    pub stored: bool,
    pub indexed: bool,
    /// Run the value through the analyzer; otherwise the whole value is one token
    pub tokenized: bool,
    pub term_vectors: bool,
}

impl FieldFlags {
    pub const TEXT: FieldFlags = FieldFlags {
        stored: true,
        indexed: true,
        tokenized: true,
        term_vectors: false,
    };

    pub const KEYWORD: FieldFlags = FieldFlags {
        stored: true,
        indexed: true,
        tokenized: false,
        term_vectors: false,
    };

    pub const STORED_ONLY: FieldFlags = FieldFlags {
        stored: true,
        indexed: false,
        tokenized: false,
        term_vectors: false,
    };

    pub const UNSTORED: FieldFlags = FieldFlags {
        stored: false,
        indexed: true,
        tokenized: true,
        term_vectors: false,
    };

    /// Union of two flag sets, used when the same field name is seen with
    /// different flags in one segment
    pub fn union(self, other: FieldFlags) -> FieldFlags {
        FieldFlags {
            stored: self.stored || other.stored,
            indexed: self.indexed || other.indexed,
            tokenized: self.tokenized || other.tokenized,
            term_vectors: self.term_vectors || other.term_vectors,
        }
    }
}

/// A named value inside a document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: String,
    pub flags: FieldFlags,
    pub boost: f32,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>, flags: FieldFlags) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            flags,
            boost: 1.0,
        }
    }

    /// Stored, indexed and tokenized
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value, FieldFlags::TEXT)
    }

    /// Stored and indexed as a single untokenized term
    pub fn keyword(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value, FieldFlags::KEYWORD)
    }

    pub fn stored_only(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value, FieldFlags::STORED_ONLY)
    }

    pub fn unstored(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, value, FieldFlags::UNSTORED)
    }

    pub fn with_term_vectors(mut self) -> Self {
        self.flags.term_vectors = true;
        self
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }
}

/// An ordered bag of fields
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub fields: Vec<Field>,
    pub boost: f32,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            boost: 1.0,
        }
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// First value of the named field
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.name == name)
            .map(|f| f.value.as_str())
            .collect()
    }

    /// Distinct field names in first-seen order
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for field in &self.fields {
            if !names.contains(&field.name.as_str()) {
                names.push(&field.name);
            }
        }
        names
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The unit of indexing: a field name and the token text
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term {
    pub field: String,
    pub text: String,
}

impl Term {
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            text: text.into(),
        }
    }

    /// Dictionary key: field bytes, a zero byte, then the term bytes.
    /// Byte order of keys matches (field, text) order.
    pub fn to_key(&self) -> Vec<u8> {
        encode_term_key(&self.field, &self.text)
    }

    pub fn from_key(key: &[u8]) -> Option<Term> {
        let (field, text) = decode_term_key(key)?;
        Some(Term::new(field, text))
    }
}

impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        self.field
            .as_bytes()
            .cmp(other.field.as_bytes())
            .then_with(|| self.text.as_bytes().cmp(other.text.as_bytes()))
    }
}

impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}

pub(crate) fn encode_term_key(field: &str, text: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(field.len() + 1 + text.len());
    key.extend_from_slice(field.as_bytes());
    key.push(0);
    key.extend_from_slice(text.as_bytes());
    key
}

pub(crate) fn decode_term_key(key: &[u8]) -> Option<(&str, &str)> {
    let sep = key.iter().position(|&b| b == 0)?;
    let field = std::str::from_utf8(&key[..sep]).ok()?;
    let text = std::str::from_utf8(&key[sep + 1..]).ok()?;
    Some((field, text))
}

/// Exclusive upper bound key covering every term of `field`
pub(crate) fn field_key_end(field: &str) -> Vec<u8> {
    let mut key = field.as_bytes().to_vec();
    key.push(1);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_key_order_matches_term_order() {
        let mut terms = vec![
            Term::new("title", "fox"),
            Term::new("body", "zebra"),
            Term::new("title", "car"),
            Term::new("ti", "zzz"),
            Term::new("title", ""),
        ];
        let mut keys: Vec<Vec<u8>> = terms.iter().map(Term::to_key).collect();
        terms.sort();
        keys.sort();
        let decoded: Vec<Term> = keys.iter().map(|k| Term::from_key(k).unwrap()).collect();
        assert_eq!(decoded, terms);
    }

    #[test]
    fn test_field_bounds() {
        let start = encode_term_key("title", "");
        let end = field_key_end("title");
        let key = Term::new("title", "\u{10FFFF}").to_key();
        assert!(key >= start && key < end);
        assert!(Term::new("titles", "a").to_key() >= end);
    }

    #[test]
    fn test_document_accessors() {
        let doc = Document::new()
            .add_field(Field::text("title", "red fox"))
            .add_field(Field::keyword("tag", "a"))
            .add_field(Field::keyword("tag", "b"));
        assert_eq!(doc.get("title"), Some("red fox"));
        assert_eq!(doc.get_all("tag"), vec!["a", "b"]);
        assert_eq!(doc.field_names(), vec!["title", "tag"]);
        assert_eq!(doc.get("missing"), None);
    }
}
