//! Searching several independent searchers as one document space
//!
//! Sub-searcher `i` owns global ids `[starts[i], starts[i + 1])`. Statistics
//! are summed over all subs so a weight built here scores every sub
//! consistently.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::collector::{FieldSortedCollector, SearchOptions, TopDocs, TopDocsCollector};
use super::filter::Filter;
use super::query::Query;
use super::searcher::{search, Searchable, DEFAULT_MAX_CLAUSE_COUNT};
use super::similarity::{DefaultSimilarity, Similarity};
use super::sort::Sort;
use super::weight::Weight;
use crate::document::{Document, Term};
use crate::error::{Result, SegdexError};

#[derive(Debug)]
pub struct MultiSearcher {
    searchers: Vec<Arc<dyn Searchable>>,
    starts: Vec<u32>,
    max_doc: u32,
}

impl MultiSearcher {
    pub fn new(searchers: Vec<Arc<dyn Searchable>>) -> Self {
        let mut starts = Vec::with_capacity(searchers.len());
        let mut max_doc = 0u32;
        for searcher in &searchers {
            starts.push(max_doc);
            max_doc += searcher.max_doc();
        }
        Self {
            searchers,
            starts,
            max_doc,
        }
    }

    pub fn searchers(&self) -> &[Arc<dyn Searchable>] {
        &self.searchers
    }

    pub fn starts(&self) -> &[u32] {
        &self.starts
    }

    /// Sub-searcher owning `doc` and the doc's id inside it
    pub fn sub_searcher(&self, doc: u32) -> Result<(usize, u32)> {
        if doc >= self.max_doc {
            return Err(SegdexError::DocumentOutOfRange {
                doc,
                max_doc: self.max_doc,
            });
        }
        // last start <= doc; empty subs share a start with their successor
        let idx = self.starts.partition_point(|&start| start <= doc) - 1;
        Ok((idx, doc - self.starts[idx]))
    }

    pub fn search(&self, query: &Query, options: &SearchOptions) -> Result<TopDocs> {
        search(self, query, options)
    }
}

impl Searchable for MultiSearcher {
    fn max_doc(&self) -> u32 {
        self.max_doc
    }

    fn doc_freq(&self, term: &Term) -> Result<u32> {
        let mut total = 0;
        for searcher in &self.searchers {
            total += searcher.doc_freq(term)?;
        }
        Ok(total)
    }

    fn similarity(&self) -> Arc<dyn Similarity> {
        match self.searchers.first() {
            Some(first) => first.similarity(),
            None => Arc::new(DefaultSimilarity),
        }
    }

    fn max_clause_count(&self) -> usize {
        self.searchers
            .iter()
            .map(|s| s.max_clause_count())
            .min()
            .unwrap_or(DEFAULT_MAX_CLAUSE_COUNT)
    }

    fn collect_terms(
        &self,
        field: &str,
        from: &str,
        accept: &dyn Fn(&str) -> bool,
    ) -> Result<BTreeSet<String>> {
        let mut terms = BTreeSet::new();
        for searcher in &self.searchers {
            terms.extend(searcher.collect_terms(field, from, accept)?);
        }
        Ok(terms)
    }

    fn document(&self, doc: u32) -> Result<Option<Document>> {
        let (idx, local) = self.sub_searcher(doc)?;
        self.searchers[idx].document(local)
    }

    fn search_weight(
        &self,
        weight: &dyn Weight,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<TopDocs> {
        let mut collector = TopDocsCollector::new(limit);
        let mut total_hits = 0;
        let mut max_score: Option<f32> = None;
        for (searcher, &start) in self.searchers.iter().zip(&self.starts) {
            let top = searcher.search_weight(weight, filter, limit)?;
            if top.total_hits > 0 {
                total_hits += top.total_hits;
                max_score = Some(max_score.map_or(top.max_score, |m| m.max(top.max_score)));
            }
            for hit in top.score_docs {
                collector.collect(start + hit.doc, hit.score);
            }
        }
        let merged = collector.into_top_docs();
        Ok(TopDocs {
            total_hits,
            max_score: max_score.unwrap_or(0.0),
            ..merged
        })
    }

    fn search_weight_sorted(
        &self,
        weight: &dyn Weight,
        filter: Option<&Filter>,
        limit: usize,
        sort: &Sort,
    ) -> Result<TopDocs> {
        let mut collector = FieldSortedCollector::new(limit, sort);
        let mut total_hits = 0;
        let mut max_score: Option<f32> = None;
        for (searcher, &start) in self.searchers.iter().zip(&self.starts) {
            let top = searcher.search_weight_sorted(weight, filter, limit, sort)?;
            if top.total_hits > 0 {
                total_hits += top.total_hits;
                max_score = Some(max_score.map_or(top.max_score, |m| m.max(top.max_score)));
            }
            for (hit, values) in top.score_docs.into_iter().zip(top.sort_values) {
                let values = values.into_iter().map(|v| v.rebase(start)).collect();
                collector.collect(start + hit.doc, hit.score, values);
            }
        }
        let merged = collector.into_top_docs();
        Ok(TopDocs {
            total_hits,
            max_score: max_score.unwrap_or(0.0),
            ..merged
        })
    }
}
