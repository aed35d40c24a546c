//! Searching one index snapshot
//!
//! [`Searchable`] is the seam between query compilation and execution:
//! weights are built from its collection statistics and executed by its
//! `search_weight`. [`IndexSearcher`] implements it over an [`IndexReader`];
//! [`MultiSearcher`](super::MultiSearcher) implements it over several
//! searchers.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

use tracing::debug;

use super::collector::{FieldSortedCollector, SearchOptions, TopDocs, TopDocsCollector};
use super::filter::Filter;
use super::query::Query;
use super::similarity::{DefaultSimilarity, Similarity};
use super::sort::{SegmentSortValues, Sort};
use super::weight::{Scorer, Weight};
use crate::document::{Document, Term};
use crate::error::Result;
use crate::index::IndexReader;
use crate::segment::TERMINATED;

pub const DEFAULT_MAX_CLAUSE_COUNT: usize = 1_024;

/// Collection statistics and weight execution over some document space
pub trait Searchable: Send + Sync + Debug {
    fn max_doc(&self) -> u32;

    /// Documents containing `term`, deleted ones included
    fn doc_freq(&self, term: &Term) -> Result<u32>;

    fn similarity(&self) -> Arc<dyn Similarity>;

    /// Bound on boolean clauses, including those produced by term expansion
    fn max_clause_count(&self) -> usize {
        DEFAULT_MAX_CLAUSE_COUNT
    }

    /// Distinct terms of `field` from `from` onwards, in order, stopping at
    /// the first term `accept` rejects
    fn collect_terms(
        &self,
        field: &str,
        from: &str,
        accept: &dyn Fn(&str) -> bool,
    ) -> Result<BTreeSet<String>>;

    /// Stored fields of a document, `None` once deleted
    fn document(&self, doc: u32) -> Result<Option<Document>>;

    /// Run a normalized weight and keep the best `limit` hits
    fn search_weight(
        &self,
        weight: &dyn Weight,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<TopDocs>;

    /// Run a normalized weight and keep the first `limit` hits in `sort`
    /// order, reporting each hit's sort keys
    fn search_weight_sorted(
        &self,
        weight: &dyn Weight,
        filter: Option<&Filter>,
        limit: usize,
        sort: &Sort,
    ) -> Result<TopDocs>;
}

/// Run `query` against any searchable with paging and filtering
pub fn search(searcher: &dyn Searchable, query: &Query, options: &SearchOptions) -> Result<TopDocs> {
    let weight = query.weight(searcher)?;
    let wanted = options.offset.saturating_add(options.limit);
    let filter = options.filter.as_ref();
    let top = match options.field_sort() {
        Some(sort) => searcher.search_weight_sorted(weight.as_ref(), filter, wanted, sort)?,
        None => searcher.search_weight(weight.as_ref(), filter, wanted)?,
    };
    debug!(
        query = %query,
        total_hits = top.total_hits,
        offset = options.offset,
        limit = options.limit,
        "search complete"
    );
    Ok(top.skip(options.offset))
}

/// Searches an [`IndexReader`] snapshot
#[derive(Clone, Debug)]
pub struct IndexSearcher {
    reader: Arc<IndexReader>,
    similarity: Arc<dyn Similarity>,
    max_clause_count: usize,
}

impl IndexSearcher {
    pub fn new(reader: Arc<IndexReader>) -> Self {
        Self {
            reader,
            similarity: Arc::new(DefaultSimilarity),
            max_clause_count: DEFAULT_MAX_CLAUSE_COUNT,
        }
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_max_clause_count(mut self, max: usize) -> Self {
        self.max_clause_count = max;
        self
    }

    pub fn reader(&self) -> &Arc<IndexReader> {
        &self.reader
    }

    pub fn search(&self, query: &Query, options: &SearchOptions) -> Result<TopDocs> {
        search(self, query, options)
    }

    /// Top `limit` hits without filter or offset
    pub fn top(&self, query: &Query, limit: usize) -> Result<TopDocs> {
        search(self, query, &SearchOptions::new().with_limit(limit))
    }

    /// Every matching document in ascending id order, unscored
    pub fn matching_docs(&self, query: &Query) -> Result<Vec<u32>> {
        let weight = query.weight(self)?;
        let mut docs = Vec::new();
        for (segment, &base) in self.reader.segments().iter().zip(self.reader.starts()) {
            if let Some(mut scorer) = weight.scorer(segment)? {
                let mut doc = scorer.doc();
                while doc != TERMINATED {
                    if !segment.is_deleted(doc) {
                        docs.push(base + doc);
                    }
                    doc = scorer.advance()?;
                }
            }
        }
        Ok(docs)
    }

    pub fn doc(&self, doc: u32) -> Result<Option<Document>> {
        self.reader.document(doc)
    }
}

impl Searchable for IndexSearcher {
    fn max_doc(&self) -> u32 {
        self.reader.max_doc()
    }

    fn doc_freq(&self, term: &Term) -> Result<u32> {
        self.reader.doc_freq(term)
    }

    fn similarity(&self) -> Arc<dyn Similarity> {
        Arc::clone(&self.similarity)
    }

    fn max_clause_count(&self) -> usize {
        self.max_clause_count
    }

    fn collect_terms(
        &self,
        field: &str,
        from: &str,
        accept: &dyn Fn(&str) -> bool,
    ) -> Result<BTreeSet<String>> {
        let mut terms = BTreeSet::new();
        for segment in self.reader.segments() {
            segment.visit_terms(field, from, |text, _| {
                if !accept(text) {
                    return false;
                }
                terms.insert(text.to_string());
                true
            })?;
        }
        Ok(terms)
    }

    fn document(&self, doc: u32) -> Result<Option<Document>> {
        self.reader.document(doc)
    }

    fn search_weight(
        &self,
        weight: &dyn Weight,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<TopDocs> {
        let mut collector = TopDocsCollector::new(limit);
        self.visit_hits(weight, filter, |_, _, global, scorer| {
            collector.collect(global, scorer.score());
            Ok(())
        })?;
        Ok(collector.into_top_docs())
    }

    fn search_weight_sorted(
        &self,
        weight: &dyn Weight,
        filter: Option<&Filter>,
        limit: usize,
        sort: &Sort,
    ) -> Result<TopDocs> {
        let mut collector = FieldSortedCollector::new(limit, sort);
        let segments = self.reader.segments();
        // loaded on the first hit of each segment
        let mut loaded: Option<(usize, SegmentSortValues)> = None;
        self.visit_hits(weight, filter, |idx, doc, global, scorer| {
            if loaded.as_ref().map_or(true, |(current, _)| *current != idx) {
                loaded = Some((idx, SegmentSortValues::load(sort, &segments[idx])?));
            }
            let score = scorer.score();
            if let Some((_, values)) = &loaded {
                collector.collect(global, score, values.values(doc, global, score));
            }
            Ok(())
        })?;
        Ok(collector.into_top_docs())
    }
}

impl IndexSearcher {
    /// Feed every visible hit to `visit` as (segment index, local doc,
    /// global doc, scorer positioned on it)
    fn visit_hits<F>(
        &self,
        weight: &dyn Weight,
        filter: Option<&Filter>,
        mut visit: F,
    ) -> Result<()>
    where
        F: FnMut(usize, u32, u32, &mut dyn Scorer) -> Result<()>,
    {
        let prepared = filter.map(|f| f.prepare(self)).transpose()?;
        let segments = self.reader.segments().iter().zip(self.reader.starts());
        for (idx, (segment, &base)) in segments.enumerate() {
            let Some(mut scorer) = weight.scorer(segment)? else {
                continue;
            };
            let allowed = match &prepared {
                Some(filter) => Some(filter.bits(segment)?),
                None => None,
            };
            let mut doc = scorer.doc();
            while doc != TERMINATED {
                let visible = match &allowed {
                    Some(bits) => bits.get(doc),
                    None => !segment.is_deleted(doc),
                };
                if visible {
                    visit(idx, doc, base + doc, scorer.as_mut())?;
                }
                doc = scorer.advance()?;
            }
        }
        Ok(())
    }
}
