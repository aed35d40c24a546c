//! The closed set of query variants
//!
//! Every variant knows how to rewrite itself into primitive queries, how to
//! compile into a [`Weight`] against a [`Searchable`], and how to render
//! itself back into query string syntax. Extensions go through
//! [`Query::Custom`].

use std::fmt;
use std::sync::Arc;

use super::boolean::{BooleanQuery, Occur};
use super::constant::{ConstantScoreQuery, FilteredQuery, MatchAllQuery};
use super::multi_term::{FuzzyQuery, PrefixQuery, RangeQuery, WildcardQuery};
use super::phrase::PhraseQuery;
use super::searcher::Searchable;
use super::span::SpanQuery;
use super::term::TermQuery;
use super::weight::Weight;
use crate::error::Result;

/// Extension point for query types outside the built-in set
pub trait CustomQuery: Send + Sync + fmt::Debug {
    /// Replace this query with a simpler one, if possible
    fn rewrite(&self, _searcher: &dyn Searchable) -> Result<Option<Query>> {
        Ok(None)
    }

    fn create_weight(&self, searcher: &dyn Searchable) -> Result<Box<dyn Weight>>;

    fn to_query_string(&self, default_field: &str) -> String;
}

#[derive(Clone, Debug)]
pub enum Query {
    Term(TermQuery),
    Boolean(BooleanQuery),
    Phrase(PhraseQuery),
    Span(SpanQuery),
    Fuzzy(FuzzyQuery),
    Prefix(PrefixQuery),
    Wildcard(WildcardQuery),
    Range(RangeQuery),
    Filtered(FilteredQuery),
    ConstantScore(ConstantScoreQuery),
    MatchAll(MatchAllQuery),
    Custom(Arc<dyn CustomQuery>),
}

impl Query {
    pub fn term(field: impl Into<String>, text: impl Into<String>) -> Query {
        Query::Term(TermQuery::new(field, text))
    }

    pub fn match_all() -> Query {
        Query::MatchAll(MatchAllQuery::new())
    }

    /// Boost of this query; custom queries report 1.0
    pub fn boost(&self) -> f32 {
        match self {
            Query::Term(q) => q.boost,
            Query::Boolean(q) => q.boost,
            Query::Phrase(q) => q.boost,
            Query::Span(q) => q.boost,
            Query::Fuzzy(q) => q.boost,
            Query::Prefix(q) => q.boost,
            Query::Wildcard(q) => q.boost,
            Query::Range(q) => q.boost,
            Query::Filtered(q) => q.boost,
            Query::ConstantScore(q) => q.boost,
            Query::MatchAll(q) => q.boost,
            Query::Custom(_) => 1.0,
        }
    }

    /// Replace the boost. Custom queries carry their own and are unchanged.
    pub fn with_boost(mut self, boost: f32) -> Query {
        match &mut self {
            Query::Term(q) => q.boost = boost,
            Query::Boolean(q) => q.boost = boost,
            Query::Phrase(q) => q.boost = boost,
            Query::Span(q) => q.boost = boost,
            Query::Fuzzy(q) => q.boost = boost,
            Query::Prefix(q) => q.boost = boost,
            Query::Wildcard(q) => q.boost = boost,
            Query::Range(q) => q.boost = boost,
            Query::Filtered(q) => q.boost = boost,
            Query::ConstantScore(q) => q.boost = boost,
            Query::MatchAll(q) => q.boost = boost,
            Query::Custom(_) => {}
        }
        self
    }

    /// Rewrite into primitive queries: multi-term queries expand into term
    /// disjunctions and single-clause booleans collapse into their clause
    pub fn rewrite(&self, searcher: &dyn Searchable) -> Result<Query> {
        match self {
            Query::Boolean(q) => q.rewrite(searcher),
            Query::Fuzzy(q) => q.rewrite(searcher),
            Query::Prefix(q) => q.rewrite(searcher),
            Query::Wildcard(q) => q.rewrite(searcher),
            Query::Range(q) => q.rewrite(searcher),
            Query::Filtered(q) => Ok(Query::Filtered(FilteredQuery {
                query: Box::new(q.query.rewrite(searcher)?),
                filter: q.filter.clone(),
                boost: q.boost,
            })),
            Query::Custom(q) => match q.rewrite(searcher)? {
                Some(rewritten) => rewritten.rewrite(searcher),
                None => Ok(self.clone()),
            },
            _ => Ok(self.clone()),
        }
    }

    /// Compile against the searcher's statistics without normalizing
    pub fn create_weight(&self, searcher: &dyn Searchable) -> Result<Box<dyn Weight>> {
        match self {
            Query::Term(q) => q.create_weight(searcher),
            Query::Boolean(q) => q.create_weight(searcher),
            Query::Phrase(q) => q.create_weight(searcher),
            Query::Span(q) => q.create_weight(searcher),
            Query::Fuzzy(_) | Query::Prefix(_) | Query::Wildcard(_) | Query::Range(_) => {
                self.rewrite(searcher)?.create_weight(searcher)
            }
            Query::Filtered(q) => q.create_weight(searcher),
            Query::ConstantScore(q) => q.create_weight(searcher),
            Query::MatchAll(q) => q.create_weight(searcher),
            Query::Custom(q) => q.create_weight(searcher),
        }
    }

    /// Rewrite, compile and normalize: the weight a search runs with
    pub fn weight(&self, searcher: &dyn Searchable) -> Result<Box<dyn Weight>> {
        let rewritten = self.rewrite(searcher)?;
        let mut weight = rewritten.create_weight(searcher)?;
        let sum = weight.sum_of_squared_weights();
        let norm = searcher.similarity().query_norm(sum);
        weight.normalize(norm);
        Ok(weight)
    }

    /// Render in query string syntax. Terms in `default_field` are written
    /// without a field prefix.
    pub fn to_query_string(&self, default_field: &str) -> String {
        match self {
            Query::Term(q) => q.to_query_string(default_field),
            Query::Boolean(q) => q.to_query_string(default_field),
            Query::Phrase(q) => q.to_query_string(default_field),
            Query::Span(q) => q.to_query_string(default_field),
            Query::Fuzzy(q) => q.to_query_string(default_field),
            Query::Prefix(q) => q.to_query_string(default_field),
            Query::Wildcard(q) => q.to_query_string(default_field),
            Query::Range(q) => q.to_query_string(default_field),
            Query::Filtered(q) => q.to_query_string(default_field),
            Query::ConstantScore(q) => q.to_query_string(default_field),
            Query::MatchAll(q) => q.to_query_string(default_field),
            Query::Custom(q) => q.to_query_string(default_field),
        }
    }

    /// Wrap into a boolean clause
    pub fn occur(self, occur: Occur) -> super::boolean::BooleanClause {
        super::boolean::BooleanClause::new(self, occur)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string(""))
    }
}

macro_rules! impl_from_query {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Query {
                fn from(q: $ty) -> Query {
                    Query::$variant(q)
                }
            }
        )*
    };
}

impl_from_query!(
    Term(TermQuery),
    Boolean(BooleanQuery),
    Phrase(PhraseQuery),
    Span(SpanQuery),
    Fuzzy(FuzzyQuery),
    Prefix(PrefixQuery),
    Wildcard(WildcardQuery),
    Range(RangeQuery),
    Filtered(FilteredQuery),
    ConstantScore(ConstantScoreQuery),
    MatchAll(MatchAllQuery),
);

/// Float formatting of the query syntax: whole numbers keep one decimal
pub(crate) fn format_float(value: f32) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// `^boost` suffix, empty for the neutral boost
pub(crate) fn boost_suffix(boost: f32) -> String {
    if boost == 1.0 {
        String::new()
    } else {
        format!("^{}", format_float(boost))
    }
}

/// `field:` prefix, empty for the default field
pub(crate) fn field_prefix(field: &str, default_field: &str) -> String {
    if field == default_field {
        String::new()
    } else {
        format!("{}:", field)
    }
}
