//! K-way segment merger
//!
//! Term dictionaries of the inputs are merged through a priority queue keyed
//! by (term key, segment index), so equal terms from several segments become
//! one posting list and contributions arrive in segment order. Surviving
//! documents are renumbered densely: segment 0's survivors first, then
//! segment 1's, and so on. Stored fields, term vectors and norms are copied
//! in the same order.

use tracing::{debug, info};

use super::manifest::SegmentInfo;
use super::norms::NormsWriter;
use super::reader::SegmentReader;
use super::stored::StoredFieldsWriter;
use super::term_vectors::TermVectorsWriter;
use super::types::{DocId, Posting, TermInfo, TERMINATED};
use super::writer::{merge_field_infos, InvertedWriter, SegmentFiles};
use crate::error::Result;
use crate::store::Directory;
use crate::util::PriorityQueue;

/// Old-to-new document ids of one merge input; deleted docs map to `TERMINATED`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocMap {
    map: Vec<DocId>,
    live: u32,
}

impl DocMap {
    /// Number survivors from `base`
    pub fn build(reader: &SegmentReader, base: DocId) -> Self {
        let mut map = Vec::with_capacity(reader.max_doc() as usize);
        let mut next = base;
        for doc in 0..reader.max_doc() {
            if reader.is_deleted(doc) {
                map.push(TERMINATED);
            } else {
                map.push(next);
                next += 1;
            }
        }
        Self {
            map,
            live: next - base,
        }
    }

    pub fn get(&self, doc: DocId) -> Option<DocId> {
        match self.map.get(doc as usize) {
            Some(&TERMINATED) | None => None,
            Some(&new) => Some(new),
        }
    }

    pub fn live(&self) -> u32 {
        self.live
    }
}

/// Cursor over one input's term entries
struct TermCursor {
    entries: Vec<(Vec<u8>, TermInfo)>,
    pos: usize,
}

impl TermCursor {
    fn key(&self) -> Option<&[u8]> {
        self.entries.get(self.pos).map(|(k, _)| k.as_slice())
    }
}

/// Merges several segments into a new one
pub struct SegmentMerger<'a> {
    directory: &'a dyn Directory,
    name: String,
    readers: Vec<SegmentReader>,
}

impl<'a> SegmentMerger<'a> {
    pub fn new(directory: &'a dyn Directory, name: impl Into<String>) -> Self {
        Self {
            directory,
            name: name.into(),
            readers: Vec::new(),
        }
    }

    pub fn add(&mut self, reader: SegmentReader) {
        self.readers.push(reader);
    }

    /// Write the merged segment. Returns `None` when no document survives,
    /// in which case nothing is written.
    pub fn merge(self) -> Result<Option<SegmentInfo>> {
        let readers: Vec<SegmentReader> = self
            .readers
            .into_iter()
            .filter(|r| r.max_doc() > 0)
            .collect();

        let mut doc_maps = Vec::with_capacity(readers.len());
        let mut base = 0;
        for reader in &readers {
            let map = DocMap::build(reader, base);
            base += map.live();
            doc_maps.push(map);
        }
        let doc_count = base;
        if doc_count == 0 {
            debug!(segment = %self.name, "merge has no surviving documents");
            return Ok(None);
        }

        let field_infos = merge_field_infos(readers.iter().map(|r| r.field_infos()));
        let mut parts = SegmentFiles {
            field_infos: field_infos.to_bytes()?,
            ..Default::default()
        };

        let term_count = merge_terms(&readers, &doc_maps, &mut parts)?;
        parts.norms = merge_norms(&readers, &doc_maps, &field_infos.names(), doc_count)?;

        let mut stored = StoredFieldsWriter::new();
        let mut vectors = TermVectorsWriter::new();
        for (reader, map) in readers.iter().zip(&doc_maps) {
            for doc in 0..reader.max_doc() {
                if map.get(doc).is_some() {
                    stored.add_raw(&reader.raw_document(doc)?);
                    vectors.add_raw(&reader.raw_term_vectors(doc)?);
                }
            }
        }
        (parts.stored_index, parts.stored_data) = stored.finish();
        (parts.vectors_index, parts.vectors_data) = vectors.finish();

        let size_bytes = parts.write(self.directory, &self.name)?;
        info!(
            segment = %self.name,
            inputs = readers.len(),
            doc_count,
            term_count,
            size_bytes,
            "merged segments"
        );
        Ok(Some(SegmentInfo::new(self.name, doc_count, size_bytes)))
    }
}

fn merge_terms(
    readers: &[SegmentReader],
    doc_maps: &[DocMap],
    parts: &mut SegmentFiles,
) -> Result<usize> {
    let mut cursors = Vec::with_capacity(readers.len());
    for reader in readers {
        cursors.push(TermCursor {
            entries: reader.term_entries()?,
            pos: 0,
        });
    }

    let mut queue = PriorityQueue::new(readers.len(), |a: &(Vec<u8>, usize), b| a < b);
    for (idx, cursor) in cursors.iter().enumerate() {
        if let Some(key) = cursor.key() {
            queue.insert((key.to_vec(), idx));
        }
    }

    let mut inverted = InvertedWriter::new();
    let mut contributors = Vec::with_capacity(readers.len());
    while let Some((key, first)) = queue.pop() {
        contributors.clear();
        contributors.push(first);
        while queue.top().is_some_and(|(k, _)| *k == key) {
            if let Some((_, idx)) = queue.pop() {
                contributors.push(idx);
            }
        }

        let mut merged = Vec::new();
        for &idx in &contributors {
            let cursor = &cursors[idx];
            let info = cursor.entries[cursor.pos].1;
            let mut iter = readers[idx].raw_postings(&info)?;
            while iter.doc() != TERMINATED {
                if let Some(new_doc) = doc_maps[idx].get(iter.doc()) {
                    merged.push(Posting::new(new_doc, iter.positions().to_vec()));
                }
                iter.advance()?;
            }
        }
        inverted.add_term(&key, merged)?;

        for &idx in &contributors {
            let cursor = &mut cursors[idx];
            cursor.pos += 1;
            if let Some(next) = cursor.key() {
                queue.insert((next.to_vec(), idx));
            }
        }
    }

    let term_count = inverted.term_count();
    inverted.finish_into(parts)?;
    Ok(term_count)
}

fn merge_norms(
    readers: &[SegmentReader],
    doc_maps: &[DocMap],
    fields: &[String],
    doc_count: u32,
) -> Result<Vec<u8>> {
    let mut norms = NormsWriter::new();
    for field in fields {
        for (reader, map) in readers.iter().zip(doc_maps) {
            let Some(values) = reader.norms(field) else {
                continue;
            };
            for (doc, &norm) in values.iter().enumerate() {
                if let Some(new_doc) = map.get(doc as DocId) {
                    norms.set(field, new_doc, norm);
                }
            }
        }
    }
    norms.finish(doc_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Field, Term};
    use crate::search::DefaultSimilarity;
    use crate::segment::{write_deletions, SegmentBuffer, SegmentWriter};
    use crate::store::RamDirectory;
    use crate::tokenizer::Tokenizer;
    use crate::util::BitVector;

    fn write_segment(dir: &RamDirectory, name: &str, titles: &[&str]) -> SegmentReader {
        let mut buffer = SegmentBuffer::new();
        for title in titles {
            let doc = Document::new()
                .add_field(Field::text("title", *title).with_term_vectors())
                .add_field(Field::keyword("id", *title));
            buffer
                .add_document(&doc, &Tokenizer::default(), &DefaultSimilarity, 100)
                .unwrap();
        }
        let info = SegmentWriter::new(dir, name)
            .write_buffered(buffer.take())
            .unwrap();
        SegmentReader::open(dir, &info).unwrap()
    }

    fn live_ids(reader: &SegmentReader, term: &Term) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(mut p) = reader.postings(term).unwrap() {
            while p.doc() != TERMINATED {
                let doc = reader.document(p.doc()).unwrap();
                out.push(doc.get("id").unwrap().to_string());
                p.advance().unwrap();
            }
        }
        out
    }

    #[test]
    fn test_merge_two_segments() {
        let dir = RamDirectory::new();
        let a = write_segment(&dir, "_0", &["red fox", "blue fox"]);
        let b = write_segment(&dir, "_1", &["red car", "green fox"]);

        let mut merger = SegmentMerger::new(&dir, "_2");
        merger.add(a);
        merger.add(b);
        let info = merger.merge().unwrap().unwrap();
        assert_eq!(info.doc_count, 4);

        let merged = SegmentReader::open(&dir, &info).unwrap();
        assert_eq!(
            live_ids(&merged, &Term::new("title", "fox")),
            vec!["red fox", "blue fox", "green fox"]
        );
        assert_eq!(
            live_ids(&merged, &Term::new("title", "red")),
            vec!["red fox", "red car"]
        );
        assert_eq!(merged.document(2).unwrap().get("title"), Some("red car"));
        assert!(merged.term_vector(3, "title").unwrap().is_some());
        assert!((merged.norm("title", 3) - 1.0 / 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_merge_drops_deleted_docs_and_empty_terms() {
        let dir = RamDirectory::new();
        let a = write_segment(&dir, "_0", &["red fox", "blue fox"]);
        let b = write_segment(&dir, "_1", &["red car"]);

        let mut bits = BitVector::new(2);
        bits.set(1);
        write_deletions(&dir, "_0", 1, &bits).unwrap();
        let a = a.with_deletions(bits, 1);

        let mut merger = SegmentMerger::new(&dir, "_2");
        merger.add(a);
        merger.add(b);
        let info = merger.merge().unwrap().unwrap();
        assert_eq!(info.doc_count, 2);

        let merged = SegmentReader::open(&dir, &info).unwrap();
        assert_eq!(merged.doc_freq(&Term::new("title", "blue")).unwrap(), 0);
        assert!(merged.term_info(&Term::new("title", "blue")).unwrap().is_none());
        assert_eq!(live_ids(&merged, &Term::new("title", "fox")), vec!["red fox"]);
        assert_eq!(merged.document(1).unwrap().get("id"), Some("red car"));
    }

    #[test]
    fn test_merge_with_no_survivors() {
        let dir = RamDirectory::new();
        let a = write_segment(&dir, "_0", &["red fox"]);
        let a = a.with_deletions(BitVector::full(1), 1);
        let mut merger = SegmentMerger::new(&dir, "_1");
        merger.add(a);
        assert!(merger.merge().unwrap().is_none());
        assert!(!dir.exists("_1.cfs"));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let dir = RamDirectory::new();
        let a = write_segment(&dir, "_0", &["b a", "c"]);
        let b = write_segment(&dir, "_1", &["a d"]);

        let mut first = SegmentMerger::new(&dir, "_2");
        first.add(a.clone());
        first.add(b.clone());
        let first = SegmentReader::open(&dir, &first.merge().unwrap().unwrap()).unwrap();
        let mut second = SegmentMerger::new(&dir, "_3");
        second.add(a);
        second.add(b);
        let second = SegmentReader::open(&dir, &second.merge().unwrap().unwrap()).unwrap();

        assert_eq!(first.term_entries().unwrap(), second.term_entries().unwrap());
    }

    #[test]
    fn test_doc_map() {
        let dir = RamDirectory::new();
        let a = write_segment(&dir, "_0", &["a", "b", "c"]);
        let mut bits = BitVector::new(3);
        bits.set(1);
        let map = DocMap::build(&a.with_deletions(bits, 1), 10);
        assert_eq!(map.live(), 2);
        assert_eq!(map.get(0), Some(10));
        assert_eq!(map.get(1), None);
        assert_eq!(map.get(2), Some(11));
    }
}
