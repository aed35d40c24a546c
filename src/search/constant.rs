//! Filter-driven queries: constant score, filtered and match-all

use super::filter::{Filter, PreparedFilter};
use super::query::{boost_suffix, format_float, Query};
use super::searcher::Searchable;
use super::weight::{Scorer, Weight};
use crate::error::Result;
use crate::segment::{DocId, SegmentReader, TERMINATED};
use crate::util::BitVector;

/// Every document the filter allows, scored with the normalized boost
#[derive(Clone, Debug)]
pub struct ConstantScoreQuery {
    pub filter: Filter,
    pub boost: f32,
}

impl ConstantScoreQuery {
    pub fn new(filter: Filter) -> Self {
        Self { filter, boost: 1.0 }
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub(crate) fn create_weight(&self, searcher: &dyn Searchable) -> Result<Box<dyn Weight>> {
        Ok(Box::new(ConstantWeight {
            filter: self.filter.prepare(searcher)?,
            boost: self.boost,
            query_weight: self.boost,
        }))
    }

    pub fn to_query_string(&self, _default_field: &str) -> String {
        format!("ConstantScore({}){}", self.filter, boost_suffix(self.boost))
    }
}

#[derive(Debug)]
struct ConstantWeight {
    filter: PreparedFilter,
    boost: f32,
    query_weight: f32,
}

impl Weight for ConstantWeight {
    fn value(&self) -> f32 {
        self.query_weight
    }

    fn sum_of_squared_weights(&self) -> f32 {
        self.boost * self.boost
    }

    fn normalize(&mut self, norm: f32) {
        self.query_weight = self.boost * norm;
    }

    fn scorer(&self, reader: &SegmentReader) -> Result<Option<Box<dyn Scorer>>> {
        let bits = self.filter.bits(reader)?;
        if bits.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(BitSetScorer::new(bits, self.query_weight))))
    }
}

/// A query restricted to the documents a filter allows
#[derive(Clone, Debug)]
pub struct FilteredQuery {
    pub query: Box<Query>,
    pub filter: Filter,
    pub boost: f32,
}

impl FilteredQuery {
    pub fn new(query: impl Into<Query>, filter: Filter) -> Self {
        Self {
            query: Box::new(query.into()),
            filter,
            boost: 1.0,
        }
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub(crate) fn create_weight(&self, searcher: &dyn Searchable) -> Result<Box<dyn Weight>> {
        Ok(Box::new(FilteredWeight {
            inner: self.query.create_weight(searcher)?,
            filter: self.filter.prepare(searcher)?,
            boost: self.boost,
        }))
    }

    pub fn to_query_string(&self, default_field: &str) -> String {
        format!(
            "FilteredQuery(query: {}, filter: {}){}",
            self.query.to_query_string(default_field),
            self.filter,
            boost_suffix(self.boost)
        )
    }
}

#[derive(Debug)]
struct FilteredWeight {
    inner: Box<dyn Weight>,
    filter: PreparedFilter,
    boost: f32,
}

impl Weight for FilteredWeight {
    fn value(&self) -> f32 {
        self.inner.value() * self.boost
    }

    fn sum_of_squared_weights(&self) -> f32 {
        self.inner.sum_of_squared_weights() * self.boost * self.boost
    }

    fn normalize(&mut self, norm: f32) {
        self.inner.normalize(norm * self.boost);
    }

    fn scorer(&self, reader: &SegmentReader) -> Result<Option<Box<dyn Scorer>>> {
        let bits = self.filter.bits(reader)?;
        if bits.is_empty() {
            return Ok(None);
        }
        let Some(inner) = self.inner.scorer(reader)? else {
            return Ok(None);
        };
        let mut scorer = FilteredScorer { inner, bits };
        scorer.skip_filtered()?;
        Ok(Some(Box::new(scorer)))
    }
}

struct FilteredScorer {
    inner: Box<dyn Scorer>,
    bits: BitVector,
}

impl FilteredScorer {
    /// Move forward until the inner scorer rests on an allowed document
    fn skip_filtered(&mut self) -> Result<DocId> {
        loop {
            let doc = self.inner.doc();
            if doc == TERMINATED || self.bits.get(doc) {
                return Ok(doc);
            }
            let Some(next) = self.bits.next_set_bit(doc + 1) else {
                return self.inner.seek(TERMINATED);
            };
            self.inner.seek(next)?;
        }
    }
}

impl Scorer for FilteredScorer {
    fn doc(&self) -> DocId {
        self.inner.doc()
    }

    fn score(&mut self) -> f32 {
        self.inner.score()
    }

    fn advance(&mut self) -> Result<DocId> {
        self.inner.advance()?;
        self.skip_filtered()
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        self.inner.seek(target)?;
        self.skip_filtered()
    }
}

/// Every live document
#[derive(Clone, Debug)]
pub struct MatchAllQuery {
    pub boost: f32,
}

impl Default for MatchAllQuery {
    fn default() -> Self {
        Self { boost: 1.0 }
    }
}

impl MatchAllQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub(crate) fn create_weight(&self, _searcher: &dyn Searchable) -> Result<Box<dyn Weight>> {
        Ok(Box::new(MatchAllWeight {
            boost: self.boost,
            query_weight: self.boost,
        }))
    }

    pub fn to_query_string(&self, _default_field: &str) -> String {
        if self.boost == 1.0 {
            "*".to_string()
        } else {
            format!("*^{}", format_float(self.boost))
        }
    }
}

#[derive(Debug)]
struct MatchAllWeight {
    boost: f32,
    query_weight: f32,
}

impl Weight for MatchAllWeight {
    fn value(&self) -> f32 {
        self.query_weight
    }

    fn sum_of_squared_weights(&self) -> f32 {
        self.boost * self.boost
    }

    fn normalize(&mut self, norm: f32) {
        self.query_weight = self.boost * norm;
    }

    fn scorer(&self, reader: &SegmentReader) -> Result<Option<Box<dyn Scorer>>> {
        let mut live = BitVector::full(reader.max_doc());
        if let Some(deletions) = reader.deletions() {
            live = live.and_not(deletions);
        }
        if live.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(BitSetScorer::new(live, self.query_weight))))
    }
}

/// Walks the set bits of a vector, giving each the same score
pub struct BitSetScorer {
    bits: BitVector,
    score: f32,
    doc: DocId,
}

impl BitSetScorer {
    pub fn new(bits: BitVector, score: f32) -> Self {
        let doc = bits.next_set_bit(0).unwrap_or(TERMINATED);
        Self { bits, score, doc }
    }
}

impl Scorer for BitSetScorer {
    fn doc(&self) -> DocId {
        self.doc
    }

    fn score(&mut self) -> f32 {
        self.score
    }

    fn advance(&mut self) -> Result<DocId> {
        if self.doc != TERMINATED {
            self.doc = self.bits.next_set_bit(self.doc + 1).unwrap_or(TERMINATED);
        }
        Ok(self.doc)
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if self.doc >= target {
            return Ok(self.doc);
        }
        self.doc = self.bits.next_set_bit(target).unwrap_or(TERMINATED);
        Ok(self.doc)
    }
}
