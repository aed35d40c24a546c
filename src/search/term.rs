//! Single term queries

use std::sync::Arc;

use super::query::{boost_suffix, field_prefix};
use super::searcher::Searchable;
use super::similarity::Similarity;
use super::weight::{IdfWeight, Scorer, Weight};
use crate::document::Term;
use crate::error::Result;
use crate::segment::{DocId, SegmentPostings, SegmentReader};

/// Matches documents containing a term
#[derive(Clone, Debug, PartialEq)]
pub struct TermQuery {
    pub term: Term,
    pub boost: f32,
}

impl TermQuery {
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            term: Term::new(field, text),
            boost: 1.0,
        }
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub(crate) fn create_weight(&self, searcher: &dyn Searchable) -> Result<Box<dyn Weight>> {
        let similarity = searcher.similarity();
        let idf = similarity.idf(searcher.doc_freq(&self.term)?, searcher.max_doc());
        Ok(Box::new(TermWeight {
            term: self.term.clone(),
            weight: IdfWeight::new(idf, self.boost),
            similarity,
        }))
    }

    pub fn to_query_string(&self, default_field: &str) -> String {
        format!(
            "{}{}{}",
            field_prefix(&self.term.field, default_field),
            self.term.text,
            boost_suffix(self.boost)
        )
    }
}

#[derive(Debug)]
struct TermWeight {
    term: Term,
    weight: IdfWeight,
    similarity: Arc<dyn Similarity>,
}

impl Weight for TermWeight {
    fn value(&self) -> f32 {
        self.weight.value
    }

    fn sum_of_squared_weights(&self) -> f32 {
        self.weight.sum_of_squared_weights()
    }

    fn normalize(&mut self, norm: f32) {
        self.weight.normalize(norm);
    }

    fn scorer(&self, reader: &SegmentReader) -> Result<Option<Box<dyn Scorer>>> {
        let Some(postings) = reader.postings(&self.term)? else {
            return Ok(None);
        };
        Ok(Some(Box::new(TermScorer {
            postings,
            value: self.weight.value,
            norms: reader.norms(&self.term.field),
            similarity: Arc::clone(&self.similarity),
        })))
    }
}

/// Scores `tf(freq) * weight * norm` over one posting list
pub struct TermScorer {
    postings: SegmentPostings,
    value: f32,
    norms: Option<Arc<Vec<f32>>>,
    similarity: Arc<dyn Similarity>,
}

impl Scorer for TermScorer {
    fn doc(&self) -> DocId {
        self.postings.doc()
    }

    fn score(&mut self) -> f32 {
        let norm = field_norm(self.norms.as_deref(), self.postings.doc());
        self.similarity.tf(self.postings.freq() as f32) * self.value * norm
    }

    fn advance(&mut self) -> Result<DocId> {
        self.postings.advance()
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        self.postings.seek(target)
    }
}

/// Norm of `doc`; fields indexed without norms score as 1.0
pub(crate) fn field_norm(norms: Option<&Vec<f32>>, doc: DocId) -> f32 {
    match norms {
        Some(norms) => norms.get(doc as usize).copied().unwrap_or(0.0),
        None => 1.0,
    }
}
