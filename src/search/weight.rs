//! Two-phase query execution
//!
//! A [`Weight`] is built once per search from collection-wide statistics.
//! It then hands out one [`Scorer`] per segment. Scorers walk matching
//! documents in ascending local id order and are positioned on their first
//! match when created.

use std::fmt::Debug;

use crate::error::Result;
use crate::segment::{DocId, SegmentReader, TERMINATED};

/// Per-search compiled form of a query
pub trait Weight: Send + Sync + Debug {
    /// Value folded into every score this weight produces
    fn value(&self) -> f32;

    fn sum_of_squared_weights(&self) -> f32;

    /// Apply the query normalization factor
    fn normalize(&mut self, norm: f32);

    /// Scorer over one segment, or `None` when nothing in it can match
    fn scorer(&self, reader: &SegmentReader) -> Result<Option<Box<dyn Scorer>>>;
}

/// Iterator over the matches of one segment
pub trait Scorer: Send {
    /// Current document, [`TERMINATED`] once exhausted
    fn doc(&self) -> DocId;

    /// Score of the current document
    fn score(&mut self) -> f32;

    fn advance(&mut self) -> Result<DocId>;

    /// Move to the first match with doc >= target. Never moves backwards.
    fn seek(&mut self, target: DocId) -> Result<DocId>;
}

/// Drain a scorer into its matching documents
pub fn matching_docs(scorer: &mut dyn Scorer) -> Result<Vec<DocId>> {
    let mut docs = Vec::new();
    let mut doc = scorer.doc();
    while doc != TERMINATED {
        docs.push(doc);
        doc = scorer.advance()?;
    }
    Ok(docs)
}

/// The idf-based weighting shared by term, phrase and span queries
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct IdfWeight {
    pub idf: f32,
    pub query_weight: f32,
    pub value: f32,
}

impl IdfWeight {
    pub fn new(idf: f32, boost: f32) -> Self {
        let query_weight = idf * boost;
        Self {
            idf,
            query_weight,
            value: query_weight * idf,
        }
    }

    pub fn sum_of_squared_weights(&self) -> f32 {
        self.query_weight * self.query_weight
    }

    pub fn normalize(&mut self, norm: f32) {
        self.query_weight *= norm;
        self.value = self.query_weight * self.idf;
    }
}

/// Scorer that never matches
#[derive(Debug, Default)]
pub struct EmptyScorer;

impl Scorer for EmptyScorer {
    fn doc(&self) -> DocId {
        TERMINATED
    }

    fn score(&mut self) -> f32 {
        0.0
    }

    fn advance(&mut self) -> Result<DocId> {
        Ok(TERMINATED)
    }

    fn seek(&mut self, _target: DocId) -> Result<DocId> {
        Ok(TERMINATED)
    }
}
