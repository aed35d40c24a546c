//! Phrase queries: terms at fixed relative positions
//!
//! Each phrase slot holds one or more alternative terms and a position.
//! Gaps between slot positions must be matched exactly unless a slop is
//! given, in which case matches within `slop` moves count with a weight of
//! `sloppy_freq(distance)`.

use std::sync::Arc;

use super::query::{boost_suffix, field_prefix};
use super::searcher::Searchable;
use super::similarity::Similarity;
use super::term::field_norm;
use super::weight::{IdfWeight, Scorer, Weight};
use crate::document::Term;
use crate::error::Result;
use crate::segment::{DocId, SegmentPostings, SegmentReader, TERMINATED};
use crate::util::PriorityQueue;

/// One position of a phrase and the terms accepted there
#[derive(Clone, Debug, PartialEq)]
pub struct PhrasePosition {
    pub position: u32,
    pub terms: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PhraseQuery {
    pub field: String,
    /// Slots ordered by position
    pub positions: Vec<PhrasePosition>,
    pub slop: u32,
    pub boost: f32,
}

impl PhraseQuery {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            positions: Vec::new(),
            slop: 0,
            boost: 1.0,
        }
    }

    /// Phrase of consecutive terms
    pub fn from_terms<I, S>(field: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        terms
            .into_iter()
            .fold(Self::new(field), |phrase, term| phrase.add_term(term))
    }

    /// Add a term one position after the last slot
    pub fn add_term(self, text: impl Into<String>) -> Self {
        let position = self.next_position();
        self.add_term_at(text, position)
    }

    pub fn add_term_at(mut self, text: impl Into<String>, position: u32) -> Self {
        self.push_at(vec![text.into()], position);
        self
    }

    /// Add alternative terms one position after the last slot
    pub fn add_alternatives(mut self, terms: Vec<String>) -> Self {
        let position = self.next_position();
        self.push_at(terms, position);
        self
    }

    /// Add terms at `position`, joining any slot already there
    pub fn push_at(&mut self, terms: Vec<String>, position: u32) {
        match self
            .positions
            .binary_search_by_key(&position, |slot| slot.position)
        {
            Ok(i) => {
                for term in terms {
                    if !self.positions[i].terms.contains(&term) {
                        self.positions[i].terms.push(term);
                    }
                }
            }
            Err(i) => self.positions.insert(i, PhrasePosition { position, terms }),
        }
    }

    pub fn next_position(&self) -> u32 {
        self.positions.last().map(|p| p.position + 1).unwrap_or(0)
    }

    pub fn with_slop(mut self, slop: u32) -> Self {
        self.slop = slop;
        self
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn terms(&self) -> Vec<Term> {
        self.positions
            .iter()
            .flat_map(|slot| slot.terms.iter().map(|t| Term::new(self.field.clone(), t.clone())))
            .collect()
    }

    pub(crate) fn create_weight(&self, searcher: &dyn Searchable) -> Result<Box<dyn Weight>> {
        let similarity = searcher.similarity();
        let mut doc_freqs = Vec::new();
        for term in self.terms() {
            doc_freqs.push(searcher.doc_freq(&term)?);
        }
        let idf = similarity.idf_terms(&doc_freqs, searcher.max_doc());
        Ok(Box::new(PhraseWeight {
            query: self.clone(),
            weight: IdfWeight::new(idf, self.boost),
            similarity,
        }))
    }

    pub fn to_query_string(&self, default_field: &str) -> String {
        let mut out = field_prefix(&self.field, default_field);
        out.push('"');
        let mut last: Option<u32> = None;
        for slot in &self.positions {
            if let Some(last) = last {
                out.push(' ');
                for _ in last + 1..slot.position {
                    out.push_str("<> ");
                }
            }
            out.push_str(&slot.terms.join("|"));
            last = Some(slot.position);
        }
        out.push('"');
        if self.slop != 0 {
            out.push_str(&format!("~{}", self.slop));
        }
        out.push_str(&boost_suffix(self.boost));
        out
    }
}

#[derive(Debug)]
struct PhraseWeight {
    query: PhraseQuery,
    weight: IdfWeight,
    similarity: Arc<dyn Similarity>,
}

impl Weight for PhraseWeight {
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
        if self.query.positions.is_empty() {
            return Ok(None);
        }
        let mut slots = Vec::with_capacity(self.query.positions.len());
        for slot in &self.query.positions {
            let mut lists = Vec::with_capacity(slot.terms.len());
            for text in &slot.terms {
                let term = Term::new(self.query.field.clone(), text.clone());
                if let Some(postings) = reader.postings(&term)? {
                    lists.push(postings);
                }
            }
            if lists.is_empty() {
                return Ok(None);
            }
            slots.push(SlotPostings {
                lists,
                offset: slot.position,
            });
        }

        let mut scorer = PhraseScorer {
            slots,
            slop: self.query.slop,
            value: self.weight.value,
            norms: reader.norms(&self.query.field),
            similarity: Arc::clone(&self.similarity),
            doc: 0,
            freq: 0.0,
        };
        scorer.find_from(0)?;
        Ok(Some(Box::new(scorer)))
    }
}

/// Union of the postings of a slot's alternative terms
struct SlotPostings {
    lists: Vec<SegmentPostings>,
    offset: u32,
}

impl SlotPostings {
    fn doc(&self) -> DocId {
        self.lists.iter().map(|l| l.doc()).min().unwrap_or(TERMINATED)
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        for list in &mut self.lists {
            if list.doc() < target {
                list.seek(target)?;
            }
        }
        Ok(self.doc())
    }

    /// Positions in `doc` shifted by the slot offset, ascending and distinct
    fn adjusted_positions(&self, doc: DocId) -> Vec<i64> {
        let mut out: Vec<i64> = self
            .lists
            .iter()
            .filter(|l| l.doc() == doc)
            .flat_map(|l| l.positions().iter().map(|&p| p as i64 - self.offset as i64))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

struct PhraseScorer {
    slots: Vec<SlotPostings>,
    slop: u32,
    value: f32,
    norms: Option<Arc<Vec<f32>>>,
    similarity: Arc<dyn Similarity>,
    doc: DocId,
    freq: f32,
}

impl PhraseScorer {
    fn find_from(&mut self, mut target: DocId) -> Result<DocId> {
        loop {
            let doc = self.align(target)?;
            if doc == TERMINATED {
                self.doc = TERMINATED;
                self.freq = 0.0;
                return Ok(TERMINATED);
            }
            let lists: Vec<Vec<i64>> = self.slots.iter().map(|s| s.adjusted_positions(doc)).collect();
            let freq = if self.slop == 0 {
                exact_phrase_freq(&lists) as f32
            } else {
                sloppy_phrase_freq(&lists, self.slop, self.similarity.as_ref())
            };
            if freq > 0.0 {
                self.doc = doc;
                self.freq = freq;
                return Ok(doc);
            }
            target = doc + 1;
        }
    }

    fn align(&mut self, target: DocId) -> Result<DocId> {
        let mut doc = target;
        loop {
            let mut agreed = true;
            for slot in &mut self.slots {
                let current = slot.seek(doc)?;
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
}

impl Scorer for PhraseScorer {
    fn doc(&self) -> DocId {
        self.doc
    }

    fn score(&mut self) -> f32 {
        let norm = field_norm(self.norms.as_deref(), self.doc);
        self.similarity.tf(self.freq) * self.value * norm
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

/// Number of start positions where every slot lines up exactly
pub(crate) fn exact_phrase_freq(lists: &[Vec<i64>]) -> u32 {
    let Some((first, rest)) = lists.split_first() else {
        return 0;
    };
    first
        .iter()
        .filter(|p| rest.iter().all(|list| list.binary_search(p).is_ok()))
        .count() as u32
}

/// Sum of `sloppy_freq(distance)` over the sloppy matches of one document.
///
/// Repeatedly takes the slot with the lowest adjusted position and advances
/// it as long as it stays lowest; the spread between that position and the
/// highest current position is the match distance.
pub(crate) fn sloppy_phrase_freq(lists: &[Vec<i64>], slop: u32, similarity: &dyn Similarity) -> f32 {
    if lists.is_empty() || lists.iter().any(|l| l.is_empty()) {
        return 0.0;
    }
    if lists.len() == 1 {
        return lists[0].len() as f32 * similarity.sloppy_freq(0);
    }

    let mut cursors = vec![0usize; lists.len()];
    let mut queue = PriorityQueue::new(lists.len(), |a: &(i64, usize), b: &(i64, usize)| a < b);
    let mut end = i64::MIN;
    for (i, list) in lists.iter().enumerate() {
        end = end.max(list[0]);
        queue.insert((list[0], i));
    }

    let mut freq = 0.0;
    while let Some((first, slot)) = queue.pop() {
        let next = queue.top().map(|t| t.0).unwrap_or(first);
        let mut start = first;
        let mut current = first;
        let mut exhausted = false;
        while current <= next {
            start = current;
            cursors[slot] += 1;
            match lists[slot].get(cursors[slot]) {
                Some(&p) => current = p,
                None => {
                    exhausted = true;
                    break;
                }
            }
        }

        let distance = (end - start).max(0);
        if distance <= slop as i64 {
            freq += similarity.sloppy_freq(distance as u32);
        }
        if exhausted {
            break;
        }
        end = end.max(current);
        queue.insert((current, slot));
    }
    freq
}
