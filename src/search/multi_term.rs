//! Queries that expand into many terms: fuzzy, prefix, wildcard and range
//!
//! Each rewrites against the searcher's term dictionary into a boolean
//! disjunction of term queries with coordination disabled.

use std::collections::BTreeSet;

use regex::Regex;

use super::boolean::{BooleanQuery, Occur};
use super::filter::TermRange;
use super::query::{boost_suffix, field_prefix, format_float, Query};
use super::searcher::Searchable;
use super::term::TermQuery;
use crate::document::Term;
use crate::error::{Result, SegdexError};
use crate::util::PriorityQueue;

pub const DEFAULT_MIN_SIMILARITY: f32 = 0.5;
pub const DEFAULT_PREFIX_LENGTH: usize = 0;
pub const DEFAULT_MAX_EXPANSIONS: usize = 256;

/// Disjunction of `terms`, each boosted by `boost`
fn expand(field: &str, terms: BTreeSet<String>, boost: f32, searcher: &dyn Searchable) -> Result<Query> {
    let max = searcher.max_clause_count();
    if terms.len() > max {
        return Err(SegdexError::TooManyClauses(max));
    }
    let mut query = BooleanQuery::new().with_coord_disabled();
    for text in terms {
        query.push(TermQuery::new(field, text).with_boost(boost), Occur::Should);
    }
    Ok(Query::Boolean(query))
}

/// Terms within an edit-distance similarity of a target term
#[derive(Clone, Debug, PartialEq)]
pub struct FuzzyQuery {
    pub term: Term,
    /// Matches need a similarity strictly above this, in [0, 1)
    pub min_similarity: f32,
    /// Leading characters that must match exactly
    pub prefix_length: usize,
    pub max_expansions: usize,
    pub boost: f32,
}

impl FuzzyQuery {
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            term: Term::new(field, text),
            min_similarity: DEFAULT_MIN_SIMILARITY,
            prefix_length: DEFAULT_PREFIX_LENGTH,
            max_expansions: DEFAULT_MAX_EXPANSIONS,
            boost: 1.0,
        }
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    pub fn with_prefix_length(mut self, prefix_length: usize) -> Self {
        self.prefix_length = prefix_length;
        self
    }

    pub fn with_max_expansions(mut self, max_expansions: usize) -> Self {
        self.max_expansions = max_expansions;
        self
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub(crate) fn rewrite(&self, searcher: &dyn Searchable) -> Result<Query> {
        if !(0.0..1.0).contains(&self.min_similarity) {
            return Err(SegdexError::InvalidRequest(format!(
                "fuzzy min_similarity must be in [0, 1), got {}",
                self.min_similarity
            )));
        }
        let prefix: String = self.term.text.chars().take(self.prefix_length).collect();
        let prefix_chars = prefix.chars().count();
        let target: Vec<char> = self.term.text.chars().skip(prefix_chars).collect();

        let accept = |text: &str| text.starts_with(prefix.as_str());
        let candidates = searcher.collect_terms(&self.term.field, &prefix, &accept)?;

        let mut best = PriorityQueue::new(self.max_expansions, |a: &(f32, String), b: &(f32, String)| {
            a.0 < b.0 || (a.0 == b.0 && a.1 > b.1)
        });
        for text in candidates {
            let suffix: Vec<char> = text[prefix.len()..].chars().collect();
            let sim = similarity(&target, &suffix, prefix_chars, self.min_similarity);
            if sim > self.min_similarity {
                best.insert((sim, text));
            }
        }

        let scale = 1.0 / (1.0 - self.min_similarity);
        let mut query = BooleanQuery::new().with_coord_disabled();
        for (sim, text) in best.into_sorted_vec() {
            let boost = self.boost * (sim - self.min_similarity) * scale;
            query.push(
                TermQuery::new(self.term.field.clone(), text).with_boost(boost),
                Occur::Should,
            );
        }
        Ok(Query::Boolean(query))
    }

    pub fn to_query_string(&self, default_field: &str) -> String {
        format!(
            "{}{}~{}{}",
            field_prefix(&self.term.field, default_field),
            self.term.text,
            format_float(self.min_similarity),
            boost_suffix(self.boost)
        )
    }
}

/// `1 - distance / (prefix + min(len))`, or 0.0 once the distance can no
/// longer beat `min_similarity`
fn similarity(target: &[char], candidate: &[char], prefix_len: usize, min_similarity: f32) -> f32 {
    let n = target.len();
    let m = candidate.len();
    if n == 0 || m == 0 {
        if prefix_len == 0 {
            return 0.0;
        }
        return 1.0 - (n.max(m) as f32 / prefix_len as f32);
    }
    let shortest = n.min(m);
    let max_distance = ((1.0 - min_similarity) * (shortest + prefix_len) as f32) as usize;
    if max_distance < n.abs_diff(m) {
        return 0.0;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0; n + 1];
    for j in 1..=m {
        curr[0] = j;
        let mut row_min = j;
        for i in 1..=n {
            let cost = usize::from(target[i - 1] != candidate[j - 1]);
            curr[i] = (curr[i - 1] + 1).min(prev[i] + 1).min(prev[i - 1] + cost);
            row_min = row_min.min(curr[i]);
        }
        if j > max_distance && row_min > max_distance {
            return 0.0;
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    1.0 - (prev[n] as f32 / (prefix_len + shortest) as f32)
}

/// Terms starting with a prefix
#[derive(Clone, Debug, PartialEq)]
pub struct PrefixQuery {
    pub field: String,
    pub prefix: String,
    pub boost: f32,
}

impl PrefixQuery {
    pub fn new(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            prefix: prefix.into(),
            boost: 1.0,
        }
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub(crate) fn rewrite(&self, searcher: &dyn Searchable) -> Result<Query> {
        let accept = |text: &str| text.starts_with(self.prefix.as_str());
        let terms = searcher.collect_terms(&self.field, &self.prefix, &accept)?;
        expand(&self.field, terms, self.boost, searcher)
    }

    pub fn to_query_string(&self, default_field: &str) -> String {
        format!(
            "{}{}*{}",
            field_prefix(&self.field, default_field),
            self.prefix,
            boost_suffix(self.boost)
        )
    }
}

/// Terms matching a glob pattern: `*` any run of characters, `?` exactly one
#[derive(Clone, Debug, PartialEq)]
pub struct WildcardQuery {
    pub field: String,
    pub pattern: String,
    pub boost: f32,
}

impl WildcardQuery {
    pub fn new(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            pattern: pattern.into(),
            boost: 1.0,
        }
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn has_wildcards(&self) -> bool {
        self.pattern.contains(['*', '?'])
    }

    /// Literal text before the first wildcard
    fn literal_prefix(&self) -> &str {
        match self.pattern.find(['*', '?']) {
            Some(idx) => &self.pattern[..idx],
            None => &self.pattern,
        }
    }

    fn pattern_to_regex(&self) -> Result<Regex> {
        let mut regex_pattern = String::from("^");
        for ch in self.pattern.chars() {
            match ch {
                '*' => regex_pattern.push_str(".*"),
                '?' => regex_pattern.push('.'),
                _ => regex_pattern.push_str(&regex::escape(ch.encode_utf8(&mut [0; 4]))),
            }
        }
        regex_pattern.push('$');
        Regex::new(&regex_pattern).map_err(|e| {
            SegdexError::InvalidRequest(format!("invalid wildcard pattern {}: {}", self.pattern, e))
        })
    }

    pub(crate) fn rewrite(&self, searcher: &dyn Searchable) -> Result<Query> {
        if !self.has_wildcards() {
            return Ok(Query::Term(
                TermQuery::new(self.field.clone(), self.pattern.clone()).with_boost(self.boost),
            ));
        }
        let regex = self.pattern_to_regex()?;
        let prefix = self.literal_prefix();
        let accept = |text: &str| text.starts_with(prefix);
        let mut terms = searcher.collect_terms(&self.field, prefix, &accept)?;
        terms.retain(|t| regex.is_match(t));
        expand(&self.field, terms, self.boost, searcher)
    }

    pub fn to_query_string(&self, default_field: &str) -> String {
        format!(
            "{}{}{}",
            field_prefix(&self.field, default_field),
            self.pattern,
            boost_suffix(self.boost)
        )
    }
}

/// Terms inside a lexicographic range
#[derive(Clone, Debug, PartialEq)]
pub struct RangeQuery {
    pub range: TermRange,
    pub boost: f32,
}

impl RangeQuery {
    pub fn new(range: TermRange) -> Self {
        Self { range, boost: 1.0 }
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub(crate) fn rewrite(&self, searcher: &dyn Searchable) -> Result<Query> {
        let terms = self.range.collect_terms(searcher)?;
        expand(&self.range.field, terms, self.boost, searcher)
    }

    pub fn to_query_string(&self, default_field: &str) -> String {
        format!(
            "{}{}{}",
            field_prefix(&self.range.field, default_field),
            self.range.bounds_string(),
            boost_suffix(self.boost)
        )
    }
}
