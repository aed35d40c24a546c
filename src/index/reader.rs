//! Point-in-time view over all segments of a commit
//!
//! Segment `i` owns global document ids `[starts[i], starts[i] + max_doc_i)`.
//! The snapshot never changes after open: later adds, deletes and merges
//! become visible only through [`IndexReader::reopen`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use super::file_deleter::FileDeleter;
use crate::document::{Document, Term};
use crate::error::{Result, SegdexError};
use crate::segment::{
    read_deletions, DocId, SegmentInfos, SegmentPostings, SegmentReader, TermVector, TERMINATED,
};
use crate::store::Directory;

/// How often opening retries when a newer commit removes files under it
const OPEN_ATTEMPTS: usize = 3;

#[derive(Debug)]
pub struct IndexReader {
    directory: Option<Arc<dyn Directory>>,
    deleter: Option<Arc<FileDeleter>>,
    infos: SegmentInfos,
    segments: Vec<SegmentReader>,
    starts: Vec<u32>,
    max_doc: u32,
    num_docs: u32,
    /// Files this snapshot holds references on
    files: Vec<String>,
}

impl IndexReader {
    /// Open the latest commit in `directory`
    pub fn open(directory: Arc<dyn Directory>, deleter: Option<Arc<FileDeleter>>) -> Result<Self> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let infos = SegmentInfos::read_latest(directory.as_ref())?.ok_or_else(|| {
                SegdexError::IndexNotFound(format!("no segments file in {:?}", directory))
            })?;
            match Self::open_infos(Arc::clone(&directory), deleter.clone(), infos, None) {
                Ok(reader) => return Ok(reader),
                Err(SegdexError::Io(e)) if attempt < OPEN_ATTEMPTS => {
                    debug!(error = %e, attempt, "commit changed while opening, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Open a snapshot of `infos`, reusing the decoded segments of
    /// `previous` where the segment is unchanged
    pub(crate) fn open_infos(
        directory: Arc<dyn Directory>,
        deleter: Option<Arc<FileDeleter>>,
        infos: SegmentInfos,
        previous: Option<&IndexReader>,
    ) -> Result<Self> {
        let files = infos.files();
        if let Some(deleter) = &deleter {
            deleter.inc_ref(&files);
        }
        let segments = match Self::open_segments(directory.as_ref(), &infos, previous) {
            Ok(segments) => segments,
            Err(e) => {
                if let Some(deleter) = &deleter {
                    deleter.dec_ref(&files);
                }
                return Err(e);
            }
        };

        let mut reader = Self::from_segments(segments);
        reader.directory = Some(directory);
        reader.deleter = deleter;
        reader.infos = infos;
        reader.files = files;
        info!(
            generation = reader.infos.generation,
            segments = reader.segments.len(),
            max_doc = reader.max_doc,
            "opened index reader"
        );
        Ok(reader)
    }

    fn open_segments(
        directory: &dyn Directory,
        infos: &SegmentInfos,
        previous: Option<&IndexReader>,
    ) -> Result<Vec<SegmentReader>> {
        let mut segments = Vec::with_capacity(infos.len());
        for info in infos.iter() {
            let prior = previous.and_then(|p| p.segments.iter().find(|s| s.name() == info.name));
            let reader = match prior {
                Some(prior) if prior.del_gen() == info.del_gen => prior.clone(),
                Some(prior) if info.del_gen > 0 => {
                    let bits = read_deletions(directory, &info.name, info.del_gen, info.doc_count)?;
                    prior.with_deletions(bits, info.del_gen)
                }
                _ => SegmentReader::open(directory, info)?,
            };
            segments.push(reader);
        }
        Ok(segments)
    }

    /// Unmanaged snapshot over already open segments
    pub fn from_segments(segments: Vec<SegmentReader>) -> Self {
        let mut starts = Vec::with_capacity(segments.len());
        let mut max_doc = 0u32;
        let mut num_docs = 0u32;
        for segment in &segments {
            starts.push(max_doc);
            max_doc += segment.max_doc();
            num_docs += segment.num_docs();
        }
        Self {
            directory: None,
            deleter: None,
            infos: SegmentInfos::new(),
            segments,
            starts,
            max_doc,
            num_docs,
            files: Vec::new(),
        }
    }

    /// A reader over the latest commit, or this one when nothing changed
    pub fn reopen(self: &Arc<Self>) -> Result<Arc<IndexReader>> {
        let Some(directory) = &self.directory else {
            return Ok(Arc::clone(self));
        };
        let Some(infos) = SegmentInfos::read_latest(directory.as_ref())? else {
            return Ok(Arc::clone(self));
        };
        if infos.generation == self.infos.generation {
            return Ok(Arc::clone(self));
        }
        let reader = Self::open_infos(
            Arc::clone(directory),
            self.deleter.clone(),
            infos,
            Some(self.as_ref()),
        )?;
        debug!(
            from = self.infos.generation,
            to = reader.infos.generation,
            "reopened index reader"
        );
        Ok(Arc::new(reader))
    }

    /// Release the snapshot's file references
    pub fn close(self) {}

    pub fn segments(&self) -> &[SegmentReader] {
        &self.segments
    }

    /// Global id of each segment's first document
    pub fn starts(&self) -> &[u32] {
        &self.starts
    }

    /// Generation of the commit this snapshot reads, 0 when unmanaged
    pub fn generation(&self) -> u64 {
        self.infos.generation
    }

    pub fn segment_infos(&self) -> &SegmentInfos {
        &self.infos
    }

    /// Documents including deleted ones
    pub fn max_doc(&self) -> u32 {
        self.max_doc
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn has_deletions(&self) -> bool {
        self.num_docs < self.max_doc
    }

    /// Segment index and local id of a global document
    pub fn segment_for(&self, doc: u32) -> Result<(usize, DocId)> {
        if doc >= self.max_doc {
            return Err(SegdexError::DocumentOutOfRange {
                doc,
                max_doc: self.max_doc,
            });
        }
        // last start <= doc; empty segments share a start with their successor
        let idx = self.starts.partition_point(|&start| start <= doc) - 1;
        Ok((idx, doc - self.starts[idx]))
    }

    /// Stored fields of a document, `None` if it is deleted
    pub fn document(&self, doc: u32) -> Result<Option<Document>> {
        let (idx, local) = self.segment_for(doc)?;
        let segment = &self.segments[idx];
        if segment.is_deleted(local) {
            return Ok(None);
        }
        segment.document(local).map(Some)
    }

    pub fn is_deleted(&self, doc: u32) -> bool {
        match self.segment_for(doc) {
            Ok((idx, local)) => self.segments[idx].is_deleted(local),
            Err(_) => false,
        }
    }

    /// Documents containing `term`, deleted ones included
    pub fn doc_freq(&self, term: &Term) -> Result<u32> {
        let mut total = 0;
        for segment in &self.segments {
            total += segment.doc_freq(term)?;
        }
        Ok(total)
    }

    /// Live documents containing `term` with their frequencies
    pub fn term_docs(&self, term: &Term) -> TermDocs {
        TermDocs::new(self, term.clone(), false)
    }

    /// Like [`IndexReader::term_docs`], with positions
    pub fn term_positions(&self, term: &Term) -> TermDocs {
        TermDocs::new(self, term.clone(), true)
    }

    /// Terms of a field with their collection-wide doc frequencies
    pub fn terms(&self, field: &str) -> Result<Vec<(String, u32)>> {
        let mut merged: BTreeMap<String, u32> = BTreeMap::new();
        for segment in &self.segments {
            for (text, freq) in segment.terms(field)? {
                *merged.entry(text).or_insert(0) += freq;
            }
        }
        Ok(merged.into_iter().collect())
    }

    pub fn term_vector(&self, doc: u32, field: &str) -> Result<Option<TermVector>> {
        let (idx, local) = self.segment_for(doc)?;
        self.segments[idx].term_vector(local, field)
    }

    pub fn term_vectors(&self, doc: u32) -> Result<Vec<TermVector>> {
        let (idx, local) = self.segment_for(doc)?;
        self.segments[idx].term_vectors(local)
    }

    pub fn field_names(&self) -> BTreeSet<String> {
        self.segments
            .iter()
            .flat_map(|s| s.field_infos().names())
            .collect()
    }
}

impl Drop for IndexReader {
    fn drop(&mut self) {
        if let Some(deleter) = &self.deleter {
            deleter.dec_ref(&self.files);
        }
    }
}

/// One posting of a [`TermDocs`] walk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermDoc {
    pub doc: u32,
    pub freq: u32,
    /// Empty unless the walk was opened with positions
    pub positions: Vec<u32>,
}

/// Walks a term's live postings across segments in ascending global id
/// order. Segments are visited one after another; their id ranges are
/// disjoint and ordered.
pub struct TermDocs {
    term: Term,
    segments: Vec<(u32, SegmentReader)>,
    next_segment: usize,
    current: Option<(u32, SegmentPostings)>,
    with_positions: bool,
    /// Set after the first read from `current`
    started: bool,
}

impl TermDocs {
    fn new(reader: &IndexReader, term: Term, with_positions: bool) -> Self {
        let segments = reader
            .starts
            .iter()
            .copied()
            .zip(reader.segments.iter().cloned())
            .collect();
        Self {
            term,
            segments,
            next_segment: 0,
            current: None,
            with_positions,
            started: false,
        }
    }

    /// Postings of the next segment containing the term
    fn open_next_segment(&mut self) -> Result<bool> {
        while self.next_segment < self.segments.len() {
            let (base, segment) = &self.segments[self.next_segment];
            self.next_segment += 1;
            if let Some(postings) = segment.postings(&self.term)? {
                if postings.doc() != TERMINATED {
                    self.current = Some((*base, postings));
                    self.started = false;
                    return Ok(true);
                }
            }
        }
        self.current = None;
        Ok(false)
    }

    fn entry(&self) -> Option<TermDoc> {
        let (base, postings) = self.current.as_ref()?;
        let doc = postings.doc();
        if doc == TERMINATED {
            return None;
        }
        Some(TermDoc {
            doc: base + doc,
            freq: postings.freq(),
            positions: if self.with_positions {
                postings.positions().to_vec()
            } else {
                Vec::new()
            },
        })
    }

    fn next_doc(&mut self) -> Result<Option<TermDoc>> {
        loop {
            if self.current.is_none() && !self.open_next_segment()? {
                return Ok(None);
            }
            if let Some((_, postings)) = self.current.as_mut() {
                if self.started {
                    postings.advance()?;
                }
            }
            self.started = true;
            match self.entry() {
                Some(entry) => return Ok(Some(entry)),
                None => self.current = None,
            }
        }
    }

    /// First posting with global doc >= `target`
    pub fn skip_to(&mut self, target: u32) -> Result<Option<TermDoc>> {
        loop {
            if self.current.is_none() && !self.open_next_segment()? {
                return Ok(None);
            }
            let (base, segment) = &self.segments[self.next_segment - 1];
            if target >= *base + segment.max_doc() {
                self.current = None;
                continue;
            }
            if let Some((base, postings)) = self.current.as_mut() {
                let local = target.saturating_sub(*base);
                if self.started && postings.doc() >= local {
                    postings.advance()?;
                }
                postings.seek(local)?;
            }
            self.started = true;
            match self.entry() {
                Some(entry) => return Ok(Some(entry)),
                None => self.current = None,
            }
        }
    }
}

impl Iterator for TermDocs {
    type Item = Result<TermDoc>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_doc().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Field;
    use crate::search::DefaultSimilarity;
    use crate::segment::{SegmentBuffer, SegmentInfo, SegmentWriter};
    use crate::store::RamDirectory;
    use crate::tokenizer::Tokenizer;

    fn segment(dir: &RamDirectory, name: &str, titles: &[&str]) -> SegmentReader {
        let mut buffer = SegmentBuffer::new();
        for title in titles {
            let doc = Document::new().add_field(Field::text("title", *title));
            buffer
                .add_document(&doc, &Tokenizer::default(), &DefaultSimilarity, 10_000)
                .unwrap();
        }
        let info: SegmentInfo = SegmentWriter::new(dir, name)
            .write_buffered(buffer.take())
            .unwrap();
        SegmentReader::open(dir, &info).unwrap()
    }

    fn reader() -> IndexReader {
        let dir = RamDirectory::new();
        IndexReader::from_segments(vec![
            segment(&dir, "_0", &["red fox", "blue fox"]),
            segment(&dir, "_1", &["red car"]),
            segment(&dir, "_2", &["grey fox", "fox fox"]),
        ])
    }

    #[test]
    fn test_segment_for() {
        let reader = reader();
        assert_eq!(reader.max_doc(), 5);
        assert_eq!(reader.starts(), &[0, 2, 3]);
        assert_eq!(reader.segment_for(0).unwrap(), (0, 0));
        assert_eq!(reader.segment_for(2).unwrap(), (1, 0));
        assert_eq!(reader.segment_for(4).unwrap(), (2, 1));
        assert!(matches!(
            reader.segment_for(5),
            Err(SegdexError::DocumentOutOfRange { doc: 5, max_doc: 5 })
        ));
    }

    #[test]
    fn test_document_lookup() {
        let reader = reader();
        let doc = reader.document(2).unwrap().unwrap();
        assert_eq!(doc.get("title"), Some("red car"));
    }

    #[test]
    fn test_term_docs_concatenates_segments() {
        let reader = reader();
        let docs: Vec<TermDoc> = reader
            .term_docs(&Term::new("title", "fox"))
            .collect::<Result<_>>()
            .unwrap();
        let ids: Vec<u32> = docs.iter().map(|d| d.doc).collect();
        assert_eq!(ids, vec![0, 1, 3, 4]);
        assert_eq!(docs[3].freq, 2);
        assert!(docs[0].positions.is_empty());

        let positions: Vec<TermDoc> = reader
            .term_positions(&Term::new("title", "fox"))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(positions[3].positions, vec![0, 1]);
    }

    #[test]
    fn test_skip_to() {
        let reader = reader();
        let mut docs = reader.term_docs(&Term::new("title", "fox"));
        assert_eq!(docs.skip_to(2).unwrap().map(|d| d.doc), Some(3));
        assert_eq!(docs.next().transpose().unwrap().map(|d| d.doc), Some(4));
        assert_eq!(docs.skip_to(9).unwrap(), None);
    }

    #[test]
    fn test_terms_and_doc_freq() {
        let reader = reader();
        assert_eq!(reader.doc_freq(&Term::new("title", "fox")).unwrap(), 4);
        assert_eq!(reader.doc_freq(&Term::new("body", "fox")).unwrap(), 0);
        let terms = reader.terms("title").unwrap();
        assert!(terms.contains(&("red".to_string(), 2)));
        assert_eq!(reader.field_names().into_iter().collect::<Vec<_>>(), vec!["title"]);
    }
}
