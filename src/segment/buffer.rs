//! In-memory segment builder for recently added documents
//!
//! Documents are analyzed as they arrive; postings accumulate per term key
//! and stored fields, term vectors and norms are encoded right away, so a
//! flush only has to sort the term keys and write the sub-files.

use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::field_infos::FieldInfos;
use super::norms::NormsWriter;
use super::stored::StoredFieldsWriter;
use super::term_vectors::{TermVector, TermVectorsWriter};
use super::types::{DocId, Posting};
use crate::document::{encode_term_key, Document};
use crate::error::Result;
use crate::search::Similarity;
use crate::tokenizer::{Analyzer, Token};

/// Per-field state while one document is inverted
#[derive(Default)]
struct FieldInversion {
    positions: BTreeMap<String, Vec<u32>>,
    length: u32,
    next_position: u32,
    boost: f32,
    term_vectors: bool,
}

/// Buffered documents of the segment being built
#[derive(Debug, Default)]
pub struct SegmentBuffer {
    postings: HashMap<Vec<u8>, Vec<Posting>>,
    field_infos: FieldInfos,
    stored: StoredFieldsWriter,
    vectors: TermVectorsWriter,
    norms: NormsWriter,
    doc_count: u32,
    size_bytes: usize,
}

impl SegmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze and buffer a document, returning its segment-local id
    pub fn add_document(
        &mut self,
        doc: &Document,
        analyzer: &dyn Analyzer,
        similarity: &dyn Similarity,
        max_field_length: usize,
    ) -> Result<DocId> {
        let doc_id = self.doc_count;
        let mut inverted: BTreeMap<&str, FieldInversion> = BTreeMap::new();

        for field in &doc.fields {
            self.field_infos.add(&field.name, field.flags);
            if !field.flags.indexed {
                continue;
            }
            let state = inverted.entry(field.name.as_str()).or_insert_with(|| {
                FieldInversion {
                    boost: 1.0,
                    ..Default::default()
                }
            });
            state.boost *= field.boost;
            state.term_vectors |= field.flags.term_vectors;

            let tokens = if field.flags.tokenized {
                analyzer.tokenize(&field.name, &field.value)
            } else if field.value.is_empty() {
                Vec::new()
            } else {
                vec![Token::new(field.value.clone(), 0)]
            };

            let base = state.next_position;
            for token in tokens {
                if state.length as usize >= max_field_length {
                    debug!(field = %field.name, max_field_length, "field truncated");
                    break;
                }
                let position = base + token.position;
                state.length += 1;
                state.next_position = state.next_position.max(position + 1);
                state
                    .positions
                    .entry(token.text)
                    .or_default()
                    .push(position);
            }
        }

        let mut vectors = Vec::new();
        for (name, state) in inverted {
            let norm = doc.boost * state.boost * similarity.length_norm(name, state.length);
            self.norms.set(name, doc_id, norm);

            if state.term_vectors {
                vectors.push(TermVector::from_positions(name, &state.positions));
            }
            for (text, mut positions) in state.positions {
                positions.sort_unstable();
                self.size_bytes += text.len() + name.len() + positions.len() * 4 + 16;
                self.postings
                    .entry(encode_term_key(name, &text))
                    .or_default()
                    .push(Posting::new(doc_id, positions));
            }
        }

        self.stored.add_document(doc)?;
        self.vectors.add_document(vectors)?;
        self.size_bytes += doc.fields.iter().map(|f| f.value.len()).sum::<usize>();
        self.doc_count += 1;
        Ok(doc_id)
    }

    pub fn doc_count(&self) -> u32 {
        self.doc_count
    }

    pub fn is_empty(&self) -> bool {
        self.doc_count == 0
    }

    /// Approximate memory held by buffered postings and field values
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// Buffered postings for one encoded term key
    pub fn postings(&self, key: &[u8]) -> Option<&[Posting]> {
        self.postings.get(key).map(|p| p.as_slice())
    }

    /// Take the buffered state apart for writing, leaving the buffer empty
    pub fn take(&mut self) -> BufferedSegment {
        let taken = std::mem::take(self);
        let mut postings: Vec<(Vec<u8>, Vec<Posting>)> = taken.postings.into_iter().collect();
        postings.sort_by(|a, b| a.0.cmp(&b.0));
        BufferedSegment {
            postings,
            field_infos: taken.field_infos,
            stored: taken.stored,
            vectors: taken.vectors,
            norms: taken.norms,
            doc_count: taken.doc_count,
        }
    }
}

/// Buffered contents in write order: postings sorted by term key
#[derive(Debug)]
pub struct BufferedSegment {
    pub postings: Vec<(Vec<u8>, Vec<Posting>)>,
    pub field_infos: FieldInfos,
    pub stored: StoredFieldsWriter,
    pub vectors: TermVectorsWriter,
    pub norms: NormsWriter,
    pub doc_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Field;
    use crate::search::DefaultSimilarity;
    use crate::tokenizer::Tokenizer;

    fn add(buffer: &mut SegmentBuffer, doc: Document) -> DocId {
        buffer
            .add_document(&doc, &Tokenizer::default(), &DefaultSimilarity, 10_000)
            .unwrap()
    }

    #[test]
    fn test_add_documents() {
        let mut buffer = SegmentBuffer::new();
        assert!(buffer.is_empty());
        let first = add(
            &mut buffer,
            Document::new().add_field(Field::text("title", "Red fox red")),
        );
        let second = add(
            &mut buffer,
            Document::new().add_field(Field::text("title", "blue fox")),
        );
        assert_eq!((first, second), (0, 1));
        assert_eq!(buffer.doc_count(), 2);
        assert_eq!(buffer.term_count(), 3);

        let red = buffer.postings(&encode_term_key("title", "red")).unwrap();
        assert_eq!(red, &[Posting::new(0, vec![0, 2])]);
        let fox = buffer.postings(&encode_term_key("title", "fox")).unwrap();
        assert_eq!(fox.len(), 2);
        assert_eq!(fox[1], Posting::new(1, vec![1]));
    }

    #[test]
    fn test_keyword_and_stored_only_fields() {
        let mut buffer = SegmentBuffer::new();
        add(
            &mut buffer,
            Document::new()
                .add_field(Field::keyword("id", "AB-12 X"))
                .add_field(Field::stored_only("raw", "not indexed")),
        );
        assert!(buffer.postings(&encode_term_key("id", "AB-12 X")).is_some());
        assert!(buffer.postings(&encode_term_key("raw", "indexed")).is_none());
        assert_eq!(buffer.term_count(), 1);
    }

    #[test]
    fn test_repeated_field_positions_continue() {
        let mut buffer = SegmentBuffer::new();
        add(
            &mut buffer,
            Document::new()
                .add_field(Field::text("tag", "alpha beta"))
                .add_field(Field::text("tag", "alpha")),
        );
        let alpha = buffer.postings(&encode_term_key("tag", "alpha")).unwrap();
        assert_eq!(alpha[0].positions, vec![0, 2]);
    }

    #[test]
    fn test_max_field_length() {
        let mut buffer = SegmentBuffer::new();
        let doc = Document::new().add_field(Field::text("body", "a b c d e"));
        buffer
            .add_document(&doc, &Tokenizer::default(), &DefaultSimilarity, 3)
            .unwrap();
        assert!(buffer.postings(&encode_term_key("body", "c")).is_some());
        assert!(buffer.postings(&encode_term_key("body", "d")).is_none());
    }

    #[test]
    fn test_take_sorts_and_resets() {
        let mut buffer = SegmentBuffer::new();
        add(
            &mut buffer,
            Document::new()
                .add_field(Field::text("b", "zeta alpha"))
                .add_field(Field::text("a", "omega")),
        );
        let taken = buffer.take();
        let keys: Vec<_> = taken.postings.iter().map(|(k, _)| k.clone()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(taken.doc_count, 1);
        assert!(buffer.is_empty());
        assert_eq!(buffer.size_bytes(), 0);
    }
}
