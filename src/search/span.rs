//! Span queries: position-constrained matches that nest
//!
//! Every span clause enumerates, per document, the `[start, end)` position
//! ranges where it matches. Combinators filter or join the spans of their
//! children. A document scores by the summed sloppy frequency of its spans.

use std::sync::Arc;

use super::query::{boost_suffix, field_prefix};
use super::searcher::Searchable;
use super::similarity::Similarity;
use super::term::field_norm;
use super::weight::{IdfWeight, Scorer, Weight};
use crate::document::Term;
use crate::error::{Result, SegdexError};
use crate::segment::{DocId, SegmentPostings, SegmentReader, TERMINATED};

/// A matched position range, end exclusive
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SpanClause {
    Term(Term),
    /// Spans of the inner clause ending at or before `end`
    First { clause: Box<SpanClause>, end: u32 },
    /// All clauses within `slop` positions of each other
    Near {
        clauses: Vec<SpanClause>,
        slop: u32,
        in_order: bool,
    },
    Or(Vec<SpanClause>),
    /// Spans of `include` that overlap no span of `exclude`
    Not {
        include: Box<SpanClause>,
        exclude: Box<SpanClause>,
    },
    /// Spans of `little` lying inside a span of `big`
    Within {
        big: Box<SpanClause>,
        little: Box<SpanClause>,
    },
}

impl SpanClause {
    pub fn term(field: impl Into<String>, text: impl Into<String>) -> Self {
        SpanClause::Term(Term::new(field, text))
    }

    pub fn first(clause: SpanClause, end: u32) -> Self {
        SpanClause::First {
            clause: Box::new(clause),
            end,
        }
    }

    pub fn near(clauses: Vec<SpanClause>, slop: u32, in_order: bool) -> Self {
        SpanClause::Near {
            clauses,
            slop,
            in_order,
        }
    }

    pub fn not(include: SpanClause, exclude: SpanClause) -> Self {
        SpanClause::Not {
            include: Box::new(include),
            exclude: Box::new(exclude),
        }
    }

    pub fn within(big: SpanClause, little: SpanClause) -> Self {
        SpanClause::Within {
            big: Box::new(big),
            little: Box::new(little),
        }
    }

    /// Field of the first term; span clauses match within one field
    pub fn field(&self) -> Option<&str> {
        match self {
            SpanClause::Term(term) => Some(&term.field),
            SpanClause::First { clause, .. } => clause.field(),
            SpanClause::Near { clauses, .. } | SpanClause::Or(clauses) => {
                clauses.iter().find_map(|c| c.field())
            }
            SpanClause::Not { include, .. } => include.field(),
            SpanClause::Within { little, .. } => little.field(),
        }
    }

    /// Terms that contribute to matching; excluded terms are left out
    pub fn terms(&self) -> Vec<Term> {
        let mut out = Vec::new();
        self.collect_terms(&mut out);
        out
    }

    fn collect_terms(&self, out: &mut Vec<Term>) {
        match self {
            SpanClause::Term(term) => out.push(term.clone()),
            SpanClause::First { clause, .. } => clause.collect_terms(out),
            SpanClause::Near { clauses, .. } | SpanClause::Or(clauses) => {
                for clause in clauses {
                    clause.collect_terms(out);
                }
            }
            SpanClause::Not { include, .. } => include.collect_terms(out),
            SpanClause::Within { big, little } => {
                big.collect_terms(out);
                little.collect_terms(out);
            }
        }
    }

    fn all_terms(&self, out: &mut Vec<Term>) {
        match self {
            SpanClause::Not { include, exclude } => {
                include.all_terms(out);
                exclude.all_terms(out);
            }
            SpanClause::Term(term) => out.push(term.clone()),
            SpanClause::First { clause, .. } => clause.all_terms(out),
            SpanClause::Near { clauses, .. } | SpanClause::Or(clauses) => {
                for clause in clauses {
                    clause.all_terms(out);
                }
            }
            SpanClause::Within { big, little } => {
                big.all_terms(out);
                little.all_terms(out);
            }
        }
    }

    /// Positioned span enumerator for one segment, `None` when the clause
    /// cannot match there
    fn spans(&self, reader: &SegmentReader) -> Result<Option<Box<dyn Spans>>> {
        let spans: Box<dyn Spans> = match self {
            SpanClause::Term(term) => match reader.postings(term)? {
                Some(postings) => Box::new(TermSpans::new(postings)),
                None => return Ok(None),
            },
            SpanClause::First { clause, end } => match clause.spans(reader)? {
                Some(inner) => Box::new(FirstSpans::new(inner, *end)?),
                None => return Ok(None),
            },
            SpanClause::Near {
                clauses,
                slop,
                in_order,
            } => {
                if clauses.is_empty() {
                    return Ok(None);
                }
                let mut subs = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    match clause.spans(reader)? {
                        Some(s) => subs.push(s),
                        None => return Ok(None),
                    }
                }
                Box::new(NearSpans::new(subs, *slop, *in_order)?)
            }
            SpanClause::Or(clauses) => {
                let mut subs = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    subs.extend(clause.spans(reader)?);
                }
                if subs.is_empty() {
                    return Ok(None);
                }
                Box::new(OrSpans::new(subs))
            }
            SpanClause::Not { include, exclude } => {
                let Some(include) = include.spans(reader)? else {
                    return Ok(None);
                };
                match exclude.spans(reader)? {
                    Some(exclude) => Box::new(NotSpans::new(include, exclude)?),
                    None => include,
                }
            }
            SpanClause::Within { big, little } => {
                let (Some(big), Some(little)) = (big.spans(reader)?, little.spans(reader)?) else {
                    return Ok(None);
                };
                Box::new(WithinSpans::new(big, little)?)
            }
        };
        Ok(Some(spans))
    }

    pub fn to_query_string(&self, default_field: &str) -> String {
        let list = |clauses: &[SpanClause]| {
            clauses
                .iter()
                .map(|c| c.to_query_string(default_field))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            SpanClause::Term(term) => {
                format!("{}{}", field_prefix(&term.field, default_field), term.text)
            }
            SpanClause::First { clause, end } => {
                format!("span_first({}, {})", clause.to_query_string(default_field), end)
            }
            SpanClause::Near {
                clauses,
                slop,
                in_order,
            } => format!("span_near([{}], {}, {})", list(clauses), slop, in_order),
            SpanClause::Or(clauses) => format!("span_or([{}])", list(clauses)),
            SpanClause::Not { include, exclude } => format!(
                "span_not(inc: {}, exc: {})",
                include.to_query_string(default_field),
                exclude.to_query_string(default_field)
            ),
            SpanClause::Within { big, little } => format!(
                "span_within(big: {}, little: {})",
                big.to_query_string(default_field),
                little.to_query_string(default_field)
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpanQuery {
    pub clause: SpanClause,
    pub boost: f32,
}

impl SpanQuery {
    pub fn new(clause: SpanClause) -> Self {
        Self { clause, boost: 1.0 }
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub(crate) fn create_weight(&self, searcher: &dyn Searchable) -> Result<Box<dyn Weight>> {
        let field = self
            .clause
            .field()
            .ok_or_else(|| SegdexError::InvalidRequest("span query without terms".to_string()))?
            .to_string();
        let mut all = Vec::new();
        self.clause.all_terms(&mut all);
        if let Some(other) = all.iter().find(|t| t.field != field) {
            return Err(SegdexError::InvalidRequest(format!(
                "span clauses must share one field, found {} and {}",
                field, other.field
            )));
        }

        let similarity = searcher.similarity();
        let mut doc_freqs = Vec::new();
        for term in self.clause.terms() {
            doc_freqs.push(searcher.doc_freq(&term)?);
        }
        let idf = similarity.idf_terms(&doc_freqs, searcher.max_doc());
        Ok(Box::new(SpanWeight {
            clause: self.clause.clone(),
            field,
            weight: IdfWeight::new(idf, self.boost),
            similarity,
        }))
    }

    pub fn to_query_string(&self, default_field: &str) -> String {
        format!(
            "{}{}",
            self.clause.to_query_string(default_field),
            boost_suffix(self.boost)
        )
    }
}

#[derive(Debug)]
struct SpanWeight {
    clause: SpanClause,
    field: String,
    weight: IdfWeight,
    similarity: Arc<dyn Similarity>,
}

impl Weight for SpanWeight {
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
        let Some(spans) = self.clause.spans(reader)? else {
            return Ok(None);
        };
        Ok(Some(Box::new(SpanScorer {
            spans,
            value: self.weight.value,
            norms: reader.norms(&self.field),
            similarity: Arc::clone(&self.similarity),
        })))
    }
}

struct SpanScorer {
    spans: Box<dyn Spans>,
    value: f32,
    norms: Option<Arc<Vec<f32>>>,
    similarity: Arc<dyn Similarity>,
}

impl Scorer for SpanScorer {
    fn doc(&self) -> DocId {
        self.spans.doc()
    }

    fn score(&mut self) -> f32 {
        let freq: f32 = self
            .spans
            .spans()
            .iter()
            .map(|s| self.similarity.sloppy_freq(s.len()))
            .sum();
        let norm = field_norm(self.norms.as_deref(), self.spans.doc());
        self.similarity.tf(freq) * self.value * norm
    }

    fn advance(&mut self) -> Result<DocId> {
        let doc = self.spans.doc();
        if doc == TERMINATED {
            return Ok(TERMINATED);
        }
        self.spans.seek(doc + 1)
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        self.spans.seek(target)
    }
}

/// Per-document span enumeration, positioned on a document with at least
/// one span
trait Spans: Send {
    fn doc(&self) -> DocId;

    /// Spans of the current document ordered by (start, end)
    fn spans(&self) -> &[Span];

    /// Move to the first document >= target that has spans
    fn seek(&mut self, target: DocId) -> Result<DocId>;
}

fn seek_child(child: &mut dyn Spans, target: DocId) -> Result<DocId> {
    if child.doc() < target {
        child.seek(target)
    } else {
        Ok(child.doc())
    }
}

/// Seek all children to a document they share
fn align(children: &mut [Box<dyn Spans>], target: DocId) -> Result<DocId> {
    let mut doc = target;
    loop {
        let mut agreed = true;
        for child in children.iter_mut() {
            let current = seek_child(child.as_mut(), doc)?;
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

struct TermSpans {
    postings: SegmentPostings,
    current: Vec<Span>,
}

impl TermSpans {
    fn new(postings: SegmentPostings) -> Self {
        let mut spans = Self {
            postings,
            current: Vec::new(),
        };
        spans.load();
        spans
    }

    fn load(&mut self) {
        self.current = self
            .postings
            .positions()
            .iter()
            .map(|&p| Span::new(p, p + 1))
            .collect();
    }
}

impl Spans for TermSpans {
    fn doc(&self) -> DocId {
        self.postings.doc()
    }

    fn spans(&self) -> &[Span] {
        &self.current
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if self.postings.doc() < target {
            self.postings.seek(target)?;
            self.load();
        }
        Ok(self.postings.doc())
    }
}

struct FirstSpans {
    inner: Box<dyn Spans>,
    end: u32,
    doc: DocId,
    current: Vec<Span>,
}

impl FirstSpans {
    fn new(inner: Box<dyn Spans>, end: u32) -> Result<Self> {
        let mut spans = Self {
            inner,
            end,
            doc: 0,
            current: Vec::new(),
        };
        spans.find(0)?;
        Ok(spans)
    }

    fn find(&mut self, mut target: DocId) -> Result<DocId> {
        loop {
            let doc = seek_child(self.inner.as_mut(), target)?;
            self.doc = doc;
            self.current.clear();
            if doc == TERMINATED {
                return Ok(doc);
            }
            let end = self.end;
            self.current
                .extend(self.inner.spans().iter().filter(|s| s.end <= end));
            if !self.current.is_empty() {
                return Ok(doc);
            }
            target = doc + 1;
        }
    }
}

impl Spans for FirstSpans {
    fn doc(&self) -> DocId {
        self.doc
    }

    fn spans(&self) -> &[Span] {
        &self.current
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if self.doc >= target {
            return Ok(self.doc);
        }
        self.find(target)
    }
}

struct NearSpans {
    subs: Vec<Box<dyn Spans>>,
    slop: u32,
    in_order: bool,
    doc: DocId,
    current: Vec<Span>,
}

impl NearSpans {
    fn new(subs: Vec<Box<dyn Spans>>, slop: u32, in_order: bool) -> Result<Self> {
        let mut spans = Self {
            subs,
            slop,
            in_order,
            doc: 0,
            current: Vec::new(),
        };
        spans.find(0)?;
        Ok(spans)
    }

    fn find(&mut self, mut target: DocId) -> Result<DocId> {
        loop {
            let doc = align(&mut self.subs, target)?;
            self.doc = doc;
            self.current.clear();
            if doc == TERMINATED {
                return Ok(doc);
            }
            let lists: Vec<&[Span]> = self.subs.iter().map(|s| s.spans()).collect();
            self.current = if self.in_order {
                ordered_matches(&lists, self.slop)
            } else {
                unordered_matches(&lists, self.slop)
            };
            if !self.current.is_empty() {
                return Ok(doc);
            }
            target = doc + 1;
        }
    }
}

impl Spans for NearSpans {
    fn doc(&self) -> DocId {
        self.doc
    }

    fn spans(&self) -> &[Span] {
        &self.current
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if self.doc >= target {
            return Ok(self.doc);
        }
        self.find(target)
    }
}

/// Matches where each list contributes one span, in list order and without
/// overlap, with at most `slop` unmatched positions in between
fn ordered_matches(lists: &[&[Span]], slop: u32) -> Vec<Span> {
    let Some((first, rest)) = lists.split_first() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    'starts: for head in first.iter() {
        let mut prev_end = head.end;
        let mut matched_len = head.len() as i64;
        for list in rest {
            let next = list
                .iter()
                .filter(|s| s.start >= prev_end)
                .min_by_key(|s| (s.end, s.start));
            match next {
                Some(span) => {
                    prev_end = span.end;
                    matched_len += span.len() as i64;
                }
                None => continue 'starts,
            }
        }
        let width = (prev_end - head.start) as i64;
        if width - matched_len <= slop as i64 {
            out.push(Span::new(head.start, prev_end));
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}

/// Matches where each list contributes one span in any order, the window
/// covering them leaving at most `slop` unmatched positions
fn unordered_matches(lists: &[&[Span]], slop: u32) -> Vec<Span> {
    if lists.is_empty() || lists.iter().any(|l| l.is_empty()) {
        return Vec::new();
    }
    let mut cursors = vec![0usize; lists.len()];
    let mut out = Vec::new();
    loop {
        let spans: Vec<Span> = cursors.iter().zip(lists).map(|(&c, l)| l[c]).collect();
        let start = spans.iter().map(|s| s.start).min().unwrap_or(0);
        let end = spans.iter().map(|s| s.end).max().unwrap_or(0);
        let matched_len: i64 = spans.iter().map(|s| s.len() as i64).sum();
        if (end - start) as i64 - matched_len <= slop as i64 {
            out.push(Span::new(start, end));
        }

        // advance the list holding the earliest span
        let Some(lowest) = (0..lists.len()).min_by_key(|&i| (spans[i].start, spans[i].end)) else {
            break;
        };
        cursors[lowest] += 1;
        if cursors[lowest] >= lists[lowest].len() {
            break;
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}

struct OrSpans {
    subs: Vec<Box<dyn Spans>>,
    doc: DocId,
    current: Vec<Span>,
}

impl OrSpans {
    fn new(subs: Vec<Box<dyn Spans>>) -> Self {
        let mut spans = Self {
            subs,
            doc: 0,
            current: Vec::new(),
        };
        spans.load();
        spans
    }

    fn load(&mut self) {
        self.doc = self.subs.iter().map(|s| s.doc()).min().unwrap_or(TERMINATED);
        self.current.clear();
        if self.doc == TERMINATED {
            return;
        }
        for sub in &self.subs {
            if sub.doc() == self.doc {
                self.current.extend_from_slice(sub.spans());
            }
        }
        self.current.sort_unstable();
        self.current.dedup();
    }
}

impl Spans for OrSpans {
    fn doc(&self) -> DocId {
        self.doc
    }

    fn spans(&self) -> &[Span] {
        &self.current
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if self.doc >= target {
            return Ok(self.doc);
        }
        for sub in &mut self.subs {
            seek_child(sub.as_mut(), target)?;
        }
        self.load();
        Ok(self.doc)
    }
}

struct NotSpans {
    include: Box<dyn Spans>,
    exclude: Box<dyn Spans>,
    doc: DocId,
    current: Vec<Span>,
}

impl NotSpans {
    fn new(include: Box<dyn Spans>, exclude: Box<dyn Spans>) -> Result<Self> {
        let mut spans = Self {
            include,
            exclude,
            doc: 0,
            current: Vec::new(),
        };
        spans.find(0)?;
        Ok(spans)
    }

    fn find(&mut self, mut target: DocId) -> Result<DocId> {
        loop {
            let doc = seek_child(self.include.as_mut(), target)?;
            self.doc = doc;
            self.current.clear();
            if doc == TERMINATED {
                return Ok(doc);
            }
            let excluded: &[Span] = if seek_child(self.exclude.as_mut(), doc)? == doc {
                self.exclude.spans()
            } else {
                &[]
            };
            self.current.extend(
                self.include
                    .spans()
                    .iter()
                    .filter(|s| !excluded.iter().any(|e| s.overlaps(e))),
            );
            if !self.current.is_empty() {
                return Ok(doc);
            }
            target = doc + 1;
        }
    }
}

impl Spans for NotSpans {
    fn doc(&self) -> DocId {
        self.doc
    }

    fn spans(&self) -> &[Span] {
        &self.current
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if self.doc >= target {
            return Ok(self.doc);
        }
        self.find(target)
    }
}

struct WithinSpans {
    children: Vec<Box<dyn Spans>>,
    doc: DocId,
    current: Vec<Span>,
}

impl WithinSpans {
    fn new(big: Box<dyn Spans>, little: Box<dyn Spans>) -> Result<Self> {
        let mut spans = Self {
            children: vec![big, little],
            doc: 0,
            current: Vec::new(),
        };
        spans.find(0)?;
        Ok(spans)
    }

    fn find(&mut self, mut target: DocId) -> Result<DocId> {
        loop {
            let doc = align(&mut self.children, target)?;
            self.doc = doc;
            self.current.clear();
            if doc == TERMINATED {
                return Ok(doc);
            }
            let big = self.children[0].spans();
            self.current.extend(
                self.children[1]
                    .spans()
                    .iter()
                    .filter(|l| big.iter().any(|b| b.contains(l))),
            );
            if !self.current.is_empty() {
                return Ok(doc);
            }
            target = doc + 1;
        }
    }
}

impl Spans for WithinSpans {
    fn doc(&self) -> DocId {
        self.doc
    }

    fn spans(&self) -> &[Span] {
        &self.current
    }

    fn seek(&mut self, target: DocId) -> Result<DocId> {
        if self.doc >= target {
            return Ok(self.doc);
        }
        self.find(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(positions: &[u32]) -> Vec<Span> {
        positions.iter().map(|&p| Span::new(p, p + 1)).collect()
    }

    #[test]
    fn test_ordered_matches() {
        let quick = spans(&[1, 8]);
        let fox = spans(&[3, 6]);
        let early = spans(&[2]);
        // quick@1 .. fox@3 leaves one position unmatched
        assert_eq!(
            ordered_matches(&[quick.as_slice(), fox.as_slice()], 1),
            vec![Span::new(1, 4)]
        );
        assert!(ordered_matches(&[quick.as_slice(), fox.as_slice()], 0).is_empty());
        // fox before an earlier term never matches in order
        assert!(ordered_matches(&[fox.as_slice(), early.as_slice()], 5).is_empty());
    }

    #[test]
    fn test_unordered_matches() {
        let a = spans(&[5]);
        let b = spans(&[3]);
        assert_eq!(
            unordered_matches(&[a.as_slice(), b.as_slice()], 1),
            vec![Span::new(3, 6)]
        );
        assert!(unordered_matches(&[a.as_slice(), b.as_slice()], 0).is_empty());
        assert!(unordered_matches(&[a.as_slice(), &[]], 3).is_empty());
    }

    #[test]
    fn test_span_helpers() {
        let outer = Span::new(2, 8);
        assert!(outer.contains(&Span::new(3, 4)));
        assert!(!outer.contains(&Span::new(7, 9)));
        assert!(outer.overlaps(&Span::new(7, 9)));
        assert!(!outer.overlaps(&Span::new(8, 9)));
        assert_eq!(outer.len(), 6);
    }

    #[test]
    fn test_to_query_string() {
        let clause = SpanClause::near(
            vec![SpanClause::term("f", "quick"), SpanClause::term("g", "fox")],
            2,
            true,
        );
        assert_eq!(
            SpanQuery::new(SpanClause::first(clause, 5)).to_query_string("f"),
            "span_first(span_near([quick, g:fox], 2, true), 5)"
        );
    }
}
