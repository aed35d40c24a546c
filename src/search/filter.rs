//! Document filters: per-segment bit sets of allowed documents

use std::collections::BTreeSet;
use std::fmt;

use super::query::Query;
use super::searcher::Searchable;
use super::weight::Weight;
use crate::document::Term;
use crate::error::{Result, SegdexError};
use crate::segment::{SegmentReader, TERMINATED};
use crate::util::BitVector;

/// A lexicographic range over the terms of one field
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermRange {
    pub field: String,
    pub lower: Option<String>,
    pub upper: Option<String>,
    pub include_lower: bool,
    pub include_upper: bool,
}

impl TermRange {
    pub fn new(
        field: impl Into<String>,
        lower: Option<String>,
        upper: Option<String>,
        include_lower: bool,
        include_upper: bool,
    ) -> Result<Self> {
        let field = field.into();
        match (&lower, &upper) {
            (None, None) => {
                return Err(SegdexError::InvalidRequest(format!(
                    "range on {} needs at least one bound",
                    field
                )))
            }
            (Some(l), Some(u)) if l > u => {
                return Err(SegdexError::InvalidRequest(format!(
                    "range on {}: lower bound {} is greater than upper bound {}",
                    field, l, u
                )))
            }
            _ => {}
        }
        let include_lower = include_lower && lower.is_some();
        let include_upper = include_upper && upper.is_some();
        Ok(Self {
            field,
            lower,
            upper,
            include_lower,
            include_upper,
        })
    }

    /// Terms >= `lower` (or > when exclusive), unbounded above
    pub fn greater_than(field: impl Into<String>, lower: impl Into<String>, inclusive: bool) -> Result<Self> {
        Self::new(field, Some(lower.into()), None, inclusive, false)
    }

    /// Terms <= `upper` (or < when exclusive), unbounded below
    pub fn less_than(field: impl Into<String>, upper: impl Into<String>, inclusive: bool) -> Result<Self> {
        Self::new(field, None, Some(upper.into()), false, inclusive)
    }

    pub fn contains(&self, text: &str) -> bool {
        let above = match &self.lower {
            Some(lower) if self.include_lower => text >= lower.as_str(),
            Some(lower) => text > lower.as_str(),
            None => true,
        };
        above && !self.is_past_end(text)
    }

    fn is_past_end(&self, text: &str) -> bool {
        match &self.upper {
            Some(upper) if self.include_upper => text > upper.as_str(),
            Some(upper) => text >= upper.as_str(),
            None => false,
        }
    }

    fn start(&self) -> &str {
        self.lower.as_deref().unwrap_or("")
    }

    /// Visit the in-range terms of one segment in order
    pub(crate) fn visit_segment<F>(&self, reader: &SegmentReader, mut visit: F) -> Result<()>
    where
        F: FnMut(&str),
    {
        reader.visit_terms(&self.field, self.start(), |text, _| {
            if self.is_past_end(text) {
                return false;
            }
            if self.contains(text) {
                visit(text);
            }
            true
        })
    }

    /// Distinct in-range terms across the whole searchable
    pub(crate) fn collect_terms(&self, searcher: &dyn Searchable) -> Result<BTreeSet<String>> {
        let accept = |text: &str| !self.is_past_end(text);
        let mut terms = searcher.collect_terms(&self.field, self.start(), &accept)?;
        terms.retain(|t| self.contains(t));
        Ok(terms)
    }

    /// Bounds in query syntax: `[a b]`, `{a b}`, `<b]`, `[a>`
    pub fn bounds_string(&self) -> String {
        let mut out = String::new();
        match &self.lower {
            Some(lower) => {
                out.push(if self.include_lower { '[' } else { '{' });
                out.push_str(lower);
            }
            None => out.push('<'),
        }
        match &self.upper {
            Some(upper) => {
                if self.lower.is_some() {
                    out.push(' ');
                }
                out.push_str(upper);
                out.push(if self.include_upper { ']' } else { '}' });
            }
            None => out.push('>'),
        }
        out
    }
}

/// Restricts a search to a subset of documents without affecting scores
#[derive(Clone, Debug)]
pub enum Filter {
    /// Documents containing a term
    Term(Term),
    /// Documents with some term of a field inside a range
    Range(TermRange),
    /// Documents matching a query
    Query(Box<Query>),
}

impl Filter {
    pub fn term(field: impl Into<String>, text: impl Into<String>) -> Self {
        Filter::Term(Term::new(field, text))
    }

    pub fn query(query: impl Into<Query>) -> Self {
        Filter::Query(Box::new(query.into()))
    }

    /// Resolve collection-wide state once per search
    pub fn prepare(&self, searcher: &dyn Searchable) -> Result<PreparedFilter> {
        Ok(match self {
            Filter::Term(term) => PreparedFilter::Term(term.clone()),
            Filter::Range(range) => PreparedFilter::Range(range.clone()),
            Filter::Query(query) => PreparedFilter::Query(query.weight(searcher)?),
        })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Term(term) => write!(f, "{}:{}", term.field, term.text),
            Filter::Range(range) => write!(f, "{}:{}", range.field, range.bounds_string()),
            Filter::Query(query) => write!(f, "QueryFilter< {} >", query),
        }
    }
}

impl From<TermRange> for Filter {
    fn from(range: TermRange) -> Self {
        Filter::Range(range)
    }
}

#[derive(Debug)]
pub enum PreparedFilter {
    Term(Term),
    Range(TermRange),
    Query(Box<dyn Weight>),
}

impl PreparedFilter {
    /// Allowed live documents of one segment
    pub fn bits(&self, reader: &SegmentReader) -> Result<BitVector> {
        let mut bits = BitVector::new(reader.max_doc());
        match self {
            PreparedFilter::Term(term) => set_term_docs(reader, term, &mut bits)?,
            PreparedFilter::Range(range) => {
                let mut texts = Vec::new();
                range.visit_segment(reader, |text| texts.push(text.to_string()))?;
                for text in texts {
                    set_term_docs(reader, &Term::new(range.field.clone(), text), &mut bits)?;
                }
            }
            PreparedFilter::Query(weight) => {
                if let Some(mut scorer) = weight.scorer(reader)? {
                    let mut doc = scorer.doc();
                    while doc != TERMINATED {
                        bits.set(doc);
                        doc = scorer.advance()?;
                    }
                }
            }
        }
        if let Some(deletions) = reader.deletions() {
            bits = bits.and_not(deletions);
        }
        Ok(bits)
    }
}

fn set_term_docs(reader: &SegmentReader, term: &Term, bits: &mut BitVector) -> Result<()> {
    if let Some(mut postings) = reader.postings(term)? {
        let mut doc = postings.doc();
        while doc != TERMINATED {
            bits.set(doc);
            doc = postings.advance()?;
        }
    }
    Ok(())
}
