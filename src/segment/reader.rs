//! Immutable segment reader over a compound file
//!
//! The decoded segment core (dictionary, postings, norms, stored fields,
//! term vectors) is shared behind an `Arc`. Deletions are a separate
//! `Arc<BitVector>` snapshot: applying deletes produces a new reader that
//! shares the core, so readers holding the old snapshot are unaffected.

use std::sync::Arc;

use super::field_infos::FieldInfos;
use super::manifest::SegmentInfo;
use super::norms::Norms;
use super::postings::{PostingIterator, PostingsReader};
use super::stored::StoredFieldsReader;
use super::term_dict::TermDictionary;
use super::term_vectors::{TermVector, TermVectorsReader};
use super::types::{compound_file_name, deletes_file_name, files, DocId, TermInfo, TERMINATED};
use crate::document::{Document, Term};
use crate::error::{Result, SegdexError};
use crate::store::{CompoundFileReader, Directory, FileSlice};
use crate::util::BitVector;

#[derive(Debug)]
struct SegmentCore {
    name: String,
    doc_count: u32,
    size_bytes: u64,
    field_infos: FieldInfos,
    terms: TermDictionary,
    postings: PostingsReader,
    norms: Norms,
    stored: StoredFieldsReader,
    vectors: TermVectorsReader,
}

/// Read-only view of one segment plus a deletion snapshot
#[derive(Clone, Debug)]
pub struct SegmentReader {
    core: Arc<SegmentCore>,
    deletions: Option<Arc<BitVector>>,
    del_gen: u64,
}

impl SegmentReader {
    /// Open the segment described by `info`, including its deletion file
    pub fn open(directory: &dyn Directory, info: &SegmentInfo) -> Result<Self> {
        let cfs = CompoundFileReader::open(directory, &compound_file_name(&info.name))?;
        let doc_count = info.doc_count;

        let field_infos = FieldInfos::from_bytes(&cfs.require(files::FIELD_INFOS)?)?;
        let terms = TermDictionary::open(
            cfs.require(files::TERM_INDEX)?,
            &cfs.require(files::TERM_INFOS)?,
        )?;
        let postings = PostingsReader::new(cfs.require(files::POSTINGS)?);
        let norms = Norms::from_bytes(&cfs.require(files::NORMS)?, doc_count)?;
        let stored = StoredFieldsReader::open(
            cfs.require(files::STORED_INDEX)?,
            cfs.require(files::STORED_DATA)?,
            doc_count,
        )?;
        let vectors = TermVectorsReader::open(
            cfs.require(files::VECTORS_INDEX)?,
            cfs.require(files::VECTORS_DATA)?,
            doc_count,
        )?;

        let deletions = if info.del_gen > 0 {
            let bits = read_deletions(directory, &info.name, info.del_gen, doc_count)?;
            Some(Arc::new(bits))
        } else {
            None
        };

        Ok(Self {
            core: Arc::new(SegmentCore {
                name: info.name.clone(),
                doc_count,
                size_bytes: cfs.size(),
                field_infos,
                terms,
                postings,
                norms,
                stored,
                vectors,
            }),
            deletions,
            del_gen: info.del_gen,
        })
    }

    /// Same segment data with a new deletion snapshot
    pub fn with_deletions(&self, deletions: BitVector, del_gen: u64) -> Self {
        Self {
            core: Arc::clone(&self.core),
            deletions: (deletions.count() > 0).then(|| Arc::new(deletions)),
            del_gen,
        }
    }

    /// True when both readers decode the same segment files
    pub fn shares_core(&self, other: &SegmentReader) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Documents including deleted ones
    pub fn max_doc(&self) -> u32 {
        self.core.doc_count
    }

    pub fn num_docs(&self) -> u32 {
        self.core.doc_count - self.deleted_count()
    }

    pub fn deleted_count(&self) -> u32 {
        self.deletions.as_ref().map(|d| d.count()).unwrap_or(0)
    }

    pub fn del_gen(&self) -> u64 {
        self.del_gen
    }

    pub fn size_bytes(&self) -> u64 {
        self.core.size_bytes
    }

    pub fn has_deletions(&self) -> bool {
        self.deleted_count() > 0
    }

    pub fn is_deleted(&self, doc: DocId) -> bool {
        self.deletions.as_ref().is_some_and(|d| d.get(doc))
    }

    pub fn deletions(&self) -> Option<&Arc<BitVector>> {
        self.deletions.as_ref()
    }

    /// Files this reader keeps alive
    pub fn files(&self) -> Vec<String> {
        let mut out = vec![compound_file_name(&self.core.name)];
        if self.del_gen > 0 {
            out.push(deletes_file_name(&self.core.name, self.del_gen));
        }
        out
    }

    pub fn field_infos(&self) -> &FieldInfos {
        &self.core.field_infos
    }

    pub fn term_info(&self, term: &Term) -> Result<Option<TermInfo>> {
        self.core.terms.get(term)
    }

    /// Documents containing the term, deleted ones included
    pub fn doc_freq(&self, term: &Term) -> Result<u32> {
        Ok(self.term_info(term)?.map(|i| i.doc_freq).unwrap_or(0))
    }

    pub fn term_count(&self) -> usize {
        self.core.terms.len()
    }

    /// Postings of live documents; `None` when the term is absent
    pub fn postings(&self, term: &Term) -> Result<Option<SegmentPostings>> {
        match self.term_info(term)? {
            Some(info) => {
                let iter = self.core.postings.postings(&info)?;
                Ok(Some(SegmentPostings::new(iter, self.deletions.clone())?))
            }
            None => Ok(None),
        }
    }

    /// Postings including deleted documents
    pub fn raw_postings(&self, info: &TermInfo) -> Result<PostingIterator> {
        self.core.postings.postings(info)
    }

    /// Visit the terms of `field` from `from` (inclusive) in order until the
    /// visitor returns false
    pub fn visit_terms<F>(&self, field: &str, from: &str, visit: F) -> Result<()>
    where
        F: FnMut(&str, &TermInfo) -> bool,
    {
        self.core.terms.visit_field_terms(field, from, visit)
    }

    /// Terms of a field with their doc frequencies
    pub fn terms(&self, field: &str) -> Result<Vec<(String, u32)>> {
        let mut out = Vec::new();
        self.visit_terms(field, "", |text, info| {
            out.push((text.to_string(), info.doc_freq));
            true
        })?;
        Ok(out)
    }

    /// Every encoded term key in order, for merging
    pub fn term_entries(&self) -> Result<Vec<(Vec<u8>, TermInfo)>> {
        self.core.terms.entries()
    }

    pub fn norms(&self, field: &str) -> Option<Arc<Vec<f32>>> {
        self.core.norms.field(field)
    }

    pub fn norm(&self, field: &str, doc: DocId) -> f32 {
        self.core.norms.get(field, doc)
    }

    pub fn has_norms(&self, field: &str) -> bool {
        self.core.norms.has_field(field)
    }

    /// Stored fields of a document, deleted or not
    pub fn document(&self, doc: DocId) -> Result<Document> {
        self.core.stored.document(doc)
    }

    pub fn raw_document(&self, doc: DocId) -> Result<FileSlice> {
        self.core.stored.raw(doc)
    }

    pub fn term_vector(&self, doc: DocId, field: &str) -> Result<Option<TermVector>> {
        self.core.vectors.vector(doc, field)
    }

    pub fn term_vectors(&self, doc: DocId) -> Result<Vec<TermVector>> {
        self.core.vectors.vectors(doc)
    }

    pub fn raw_term_vectors(&self, doc: DocId) -> Result<FileSlice> {
        self.core.vectors.raw(doc)
    }
}

/// Cursor over the live postings of one term in one segment
#[derive(Clone, Debug)]
pub struct SegmentPostings {
    inner: PostingIterator,
    deletions: Option<Arc<BitVector>>,
}

impl SegmentPostings {
    pub fn new(inner: PostingIterator, deletions: Option<Arc<BitVector>>) -> Result<Self> {
        let mut postings = Self { inner, deletions };
        postings.skip_deleted()?;
        Ok(postings)
    }

    pub fn doc(&self) -> DocId {
        self.inner.doc()
    }

    pub fn freq(&self) -> u32 {
        self.inner.freq()
    }

    pub fn positions(&self) -> &[u32] {
        self.inner.positions()
    }

    /// Documents in the list, deleted ones included
    pub fn doc_freq(&self) -> u32 {
        self.inner.doc_freq()
    }

    pub fn advance(&mut self) -> Result<DocId> {
        self.inner.advance()?;
        self.skip_deleted()
    }

    pub fn seek(&mut self, target: DocId) -> Result<DocId> {
        self.inner.seek(target)?;
        self.skip_deleted()
    }

    fn skip_deleted(&mut self) -> Result<DocId> {
        if let Some(deletions) = &self.deletions {
            while self.inner.doc() != TERMINATED && deletions.get(self.inner.doc()) {
                self.inner.advance()?;
            }
        }
        Ok(self.inner.doc())
    }
}

/// Read a deletion file, checking it covers the segment
pub fn read_deletions(
    directory: &dyn Directory,
    segment: &str,
    del_gen: u64,
    doc_count: u32,
) -> Result<BitVector> {
    let bytes = directory.open_file(&deletes_file_name(segment, del_gen))?;
    let bits = BitVector::from_bytes(&bytes)?;
    if bits.size() != doc_count {
        return Err(SegdexError::corrupt(format!(
            "deletions of {} cover {} docs, segment has {}",
            segment,
            bits.size(),
            doc_count
        )));
    }
    Ok(bits)
}

/// Write a deletion file, returning its name
pub fn write_deletions(
    directory: &dyn Directory,
    segment: &str,
    del_gen: u64,
    deletions: &BitVector,
) -> Result<String> {
    let name = deletes_file_name(segment, del_gen);
    directory.write_file(&name, &deletions.to_bytes()?)?;
    Ok(name)
}
