//! Boolean combinations of queries
//!
//! Required clauses are intersected by seeking every required scorer to the
//! same document. Without required clauses the candidate is the lowest
//! document any optional scorer sits on. Prohibited scorers veto candidates,
//! and the summed score is scaled by the coordination factor for the number
//! of clauses that matched.

use std::sync::Arc;

use super::query::{boost_suffix, Query};
use super::searcher::Searchable;
use super::similarity::Similarity;
use super::weight::{Scorer, Weight};
use crate::error::{Result, SegdexError};
use crate::segment::{DocId, SegmentReader, TERMINATED};

/// How a clause takes part in matching
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

#[derive(Clone, Debug)]
pub struct BooleanClause {
    pub query: Query,
    pub occur: Occur,
}

impl BooleanClause {
    pub fn new(query: Query, occur: Occur) -> Self {
        Self { query, occur }
    }

    pub fn is_required(&self) -> bool {
        self.occur == Occur::Must
    }

    pub fn is_prohibited(&self) -> bool {
        self.occur == Occur::MustNot
    }
}

#[derive(Clone, Debug)]
pub struct BooleanQuery {
    pub clauses: Vec<BooleanClause>,
    /// Optional clauses a document must match
    pub min_should_match: usize,
    /// Skip coordination scaling, used for term expansions
    pub coord_disabled: bool,
    pub boost: f32,
}

impl Default for BooleanQuery {
    fn default() -> Self {
        Self {
            clauses: Vec::new(),
            min_should_match: 0,
            coord_disabled: false,
            boost: 1.0,
        }
    }
}

impl BooleanQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coord_disabled(mut self) -> Self {
        self.coord_disabled = true;
        self
    }

    pub fn add(mut self, query: impl Into<Query>, occur: Occur) -> Self {
        self.push(query, occur);
        self
    }

    pub fn must(self, query: impl Into<Query>) -> Self {
        self.add(query, Occur::Must)
    }

    pub fn should(self, query: impl Into<Query>) -> Self {
        self.add(query, Occur::Should)
    }

    pub fn must_not(self, query: impl Into<Query>) -> Self {
        self.add(query, Occur::MustNot)
    }

    pub fn push(&mut self, query: impl Into<Query>, occur: Occur) {
        self.clauses.push(BooleanClause::new(query.into(), occur));
    }

    pub fn with_min_should_match(mut self, n: usize) -> Self {
        self.min_should_match = n;
        self
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub(crate) fn rewrite(&self, searcher: &dyn Searchable) -> Result<Query> {
        if self.min_should_match == 0 && self.clauses.len() == 1 {
            let clause = &self.clauses[0];
            if !clause.is_prohibited() {
                let query = clause.query.rewrite(searcher)?;
                if self.boost == 1.0 {
                    return Ok(query);
                }
                let boost = query.boost() * self.boost;
                return Ok(query.with_boost(boost));
            }
        }
        let mut rewritten = BooleanQuery {
            clauses: Vec::with_capacity(self.clauses.len()),
            ..self.clone()
        };
        for clause in &self.clauses {
            rewritten.push(clause.query.rewrite(searcher)?, clause.occur);
        }
        Ok(Query::Boolean(rewritten))
    }

    pub(crate) fn create_weight(&self, searcher: &dyn Searchable) -> Result<Box<dyn Weight>> {
        let max_clauses = searcher.max_clause_count();
        if self.clauses.len() > max_clauses {
            return Err(SegdexError::TooManyClauses(max_clauses));
        }
        let mut clauses = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            clauses.push((clause.occur, clause.query.create_weight(searcher)?));
        }
        Ok(Box::new(BooleanWeight {
            clauses,
            boost: self.boost,
            min_should_match: self.min_should_match,
            coord_disabled: self.coord_disabled,
            similarity: searcher.similarity(),
        }))
    }

    pub fn to_query_string(&self, default_field: &str) -> String {
        let mut out = String::new();
        if self.boost != 1.0 {
            out.push('(');
        }
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            match clause.occur {
                Occur::Must => out.push('+'),
                Occur::MustNot => out.push('-'),
                Occur::Should => {}
            }
            let rendered = clause.query.to_query_string(default_field);
            if matches!(clause.query, Query::Boolean(_)) {
                out.push('(');
                out.push_str(&rendered);
                out.push(')');
            } else {
                out.push_str(&rendered);
            }
        }
        if self.boost != 1.0 {
            out.push(')');
            out.push_str(&boost_suffix(self.boost));
        }
        out
    }
}

#[derive(Debug)]
struct BooleanWeight {
    clauses: Vec<(Occur, Box<dyn Weight>)>,
    boost: f32,
    min_should_match: usize,
    coord_disabled: bool,
    similarity: Arc<dyn Similarity>,
}

impl Weight for BooleanWeight {
    fn value(&self) -> f32 {
        self.boost
    }

    fn sum_of_squared_weights(&self) -> f32 {
        let sum: f32 = self
            .clauses
            .iter()
            .filter(|(occur, _)| *occur != Occur::MustNot)
            .map(|(_, w)| w.sum_of_squared_weights())
            .sum();
        sum * self.boost * self.boost
    }

    fn normalize(&mut self, norm: f32) {
        let norm = norm * self.boost;
        for (_, weight) in &mut self.clauses {
            weight.normalize(norm);
        }
    }

    fn scorer(&self, reader: &SegmentReader) -> Result<Option<Box<dyn Scorer>>> {
        let mut required = Vec::new();
        let mut optional = Vec::new();
        let mut prohibited = Vec::new();
        let mut max_coord = 0;

        for (occur, weight) in &self.clauses {
            let scorer = weight.scorer(reader)?;
            match occur {
                Occur::Must => {
                    max_coord += 1;
                    match scorer {
                        Some(s) => required.push(s),
                        None => return Ok(None),
                    }
                }
                Occur::Should => {
                    max_coord += 1;
                    optional.extend(scorer);
                }
                Occur::MustNot => prohibited.extend(scorer),
            }
        }

        if required.is_empty() && optional.is_empty() {
            return Ok(None);
        }
        if optional.len() < self.min_should_match {
            return Ok(None);
        }
        let min_optional = if required.is_empty() {
            self.min_should_match.max(1)
        } else {
            self.min_should_match
        };
        let coords = (0..=max_coord)
            .map(|overlap| {
                if self.coord_disabled {
                    1.0
                } else {
                    self.similarity.coord(overlap, max_coord)
                }
            })
            .collect();

        let scorer = BooleanScorer::new(required, optional, prohibited, min_optional, coords)?;
        Ok(Some(Box::new(scorer)))
    }
}

pub struct BooleanScorer {
    required: Vec<Box<dyn Scorer>>,
    optional: Vec<Box<dyn Scorer>>,
    prohibited: Vec<Box<dyn Scorer>>,
    min_optional: usize,
    /// Coordination factor by number of matching clauses
    coords: Vec<f32>,
    doc: DocId,
    score: f32,
}

impl BooleanScorer {
    pub fn new(
        required: Vec<Box<dyn Scorer>>,
        optional: Vec<Box<dyn Scorer>>,
        prohibited: Vec<Box<dyn Scorer>>,
        min_optional: usize,
        coords: Vec<f32>,
    ) -> Result<Self> {
        let mut scorer = Self {
            required,
            optional,
            prohibited,
            min_optional,
            coords,
            doc: 0,
            score: 0.0,
        };
        scorer.find_from(0)?;
        Ok(scorer)
    }

    fn find_from(&mut self, mut target: DocId) -> Result<DocId> {
        loop {
            if target == TERMINATED {
                return Ok(self.terminate());
            }
            let candidate = if self.required.is_empty() {
                self.lowest_optional(target)?
            } else {
                self.align_required(target)?
            };
            if candidate == TERMINATED {
                return Ok(self.terminate());
            }
            if self.is_prohibited(candidate)? {
                target = candidate + 1;
                continue;
            }

            let mut score = 0.0;
            for scorer in &mut self.required {
                score += scorer.score();
            }
            let mut matched = 0;
            for scorer in &mut self.optional {
                let doc = seek_to(scorer.as_mut(), candidate)?;
                if doc == candidate {
                    matched += 1;
                    score += scorer.score();
                }
            }
            if matched < self.min_optional {
                target = candidate + 1;
                continue;
            }

            let overlap = self.required.len() + matched;
            self.doc = candidate;
            self.score = score * self.coords.get(overlap).copied().unwrap_or(1.0);
            return Ok(candidate);
        }
    }

    /// Seek every required scorer until they agree on a document
    fn align_required(&mut self, target: DocId) -> Result<DocId> {
        let mut doc = target;
        loop {
            let mut agreed = true;
            for scorer in &mut self.required {
                let current = seek_to(scorer.as_mut(), doc)?;
                if current == TERMINATED {
                    return Ok(TERMINATED);
                }
                if current > doc {
                    doc = current;
                    agreed = false;
                }
            }
            if agreed {
                return Ok(doc);
            }
        }
    }

    fn lowest_optional(&mut self, target: DocId) -> Result<DocId> {
        let mut lowest = TERMINATED;
        for scorer in &mut self.optional {
            lowest = lowest.min(seek_to(scorer.as_mut(), target)?);
        }
        Ok(lowest)
    }

    fn is_prohibited(&mut self, doc: DocId) -> Result<bool> {
        for scorer in &mut self.prohibited {
            if seek_to(scorer.as_mut(), doc)? == doc {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn terminate(&mut self) -> DocId {
        self.doc = TERMINATED;
        self.score = 0.0;
        TERMINATED
    }
}

fn seek_to(scorer: &mut dyn Scorer, target: DocId) -> Result<DocId> {
    if scorer.doc() < target {
        scorer.seek(target)
    } else {
        Ok(scorer.doc())
    }
}

impl Scorer for BooleanScorer {
    fn doc(&self) -> DocId {
        self.doc
    }

    fn score(&mut self) -> f32 {
        self.score
    }

    fn advance(&mut self) -> Result<DocId> {
        if self.doc == TERMINATED {
            return Ok(TERMINATED);
        }
        self.find_from(self.doc + 1)
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if self.doc >= target {
            return Ok(self.doc);
        }
        self.find_from(target)
    }
}
