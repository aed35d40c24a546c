//! Hit collection and search options

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::filter::Filter;
use super::sort::{Sort, SortValue};
use crate::util::PriorityQueue;

/// A scored hit, `doc` being a global document number
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreDoc {
    pub doc: u32,
    pub score: f32,
}

/// Ranked hits of one search
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TopDocs {
    /// All matching documents, not just the returned page
    pub total_hits: u64,
    pub max_score: f32,
    /// Descending score, ties broken by ascending doc, unless sorted
    pub score_docs: Vec<ScoreDoc>,
    /// Sort keys of each hit, parallel to `score_docs`; empty for relevance order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort_values: Vec<Vec<SortValue>>,
}

impl TopDocs {
    pub fn len(&self) -> usize {
        self.score_docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.score_docs.is_empty()
    }

    pub fn docs(&self) -> Vec<u32> {
        self.score_docs.iter().map(|sd| sd.doc).collect()
    }

    /// Drop the first `offset` hits
    pub(crate) fn skip(mut self, offset: usize) -> Self {
        if offset >= self.score_docs.len() {
            self.score_docs.clear();
            self.sort_values.clear();
        } else {
            self.score_docs.drain(..offset);
            if !self.sort_values.is_empty() {
                self.sort_values.drain(..offset);
            }
        }
        self
    }
}

fn ranks_lower(a: &ScoreDoc, b: &ScoreDoc) -> bool {
    a.score < b.score || (a.score == b.score && a.doc > b.doc)
}

/// Keeps the best `capacity` hits seen
pub struct TopDocsCollector {
    queue: PriorityQueue<ScoreDoc, fn(&ScoreDoc, &ScoreDoc) -> bool>,
    total_hits: u64,
    max_score: f32,
}

impl TopDocsCollector {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: PriorityQueue::new(capacity, ranks_lower as fn(&ScoreDoc, &ScoreDoc) -> bool),
            total_hits: 0,
            max_score: 0.0,
        }
    }

    pub fn collect(&mut self, doc: u32, score: f32) {
        self.total_hits += 1;
        if self.total_hits == 1 || score > self.max_score {
            self.max_score = score;
        }
        self.queue.insert(ScoreDoc { doc, score });
    }

    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    pub fn into_top_docs(self) -> TopDocs {
        TopDocs {
            total_hits: self.total_hits,
            max_score: self.max_score,
            score_docs: self.queue.into_sorted_vec(),
            sort_values: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct SortedHit {
    doc: u32,
    score: f32,
    values: Vec<SortValue>,
}

type HitOrder = Box<dyn Fn(&SortedHit, &SortedHit) -> bool + Send>;

/// Keeps the first `capacity` hits in field sort order
pub struct FieldSortedCollector {
    queue: PriorityQueue<SortedHit, HitOrder>,
    total_hits: u64,
    max_score: f32,
}

impl FieldSortedCollector {
    pub fn new(capacity: usize, sort: &Sort) -> Self {
        let sort = sort.clone();
        let ranks_lower: HitOrder = Box::new(move |a: &SortedHit, b: &SortedHit| {
            sort.compare_hits(&a.values, a.doc, &b.values, b.doc) == Ordering::Greater
        });
        Self {
            queue: PriorityQueue::new(capacity, ranks_lower),
            total_hits: 0,
            max_score: 0.0,
        }
    }

    pub fn collect(&mut self, doc: u32, score: f32, values: Vec<SortValue>) {
        self.total_hits += 1;
        if self.total_hits == 1 || score > self.max_score {
            self.max_score = score;
        }
        self.queue.insert(SortedHit { doc, score, values });
    }

    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    pub fn into_top_docs(self) -> TopDocs {
        let hits = self.queue.into_sorted_vec();
        let mut score_docs = Vec::with_capacity(hits.len());
        let mut sort_values = Vec::with_capacity(hits.len());
        for hit in hits {
            score_docs.push(ScoreDoc {
                doc: hit.doc,
                score: hit.score,
            });
            sort_values.push(hit.values);
        }
        TopDocs {
            total_hits: self.total_hits,
            max_score: self.max_score,
            score_docs,
            sort_values,
        }
    }
}

/// Paging and filtering of a search
#[derive(Clone, Debug)]
pub struct SearchOptions {
    pub limit: usize,
    pub offset: usize,
    pub filter: Option<Filter>,
    /// Hit order; relevance when unset
    pub sort: Option<Sort>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            offset: 0,
            filter: None,
            sort: None,
        }
    }
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    /// The sort to run with, `None` when relevance order applies
    pub(crate) fn field_sort(&self) -> Option<&Sort> {
        self.sort.as_ref().filter(|sort| !sort.is_relevance())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SortField;

    #[test]
    fn test_collector_orders_by_score_then_doc() {
        let mut collector = TopDocsCollector::new(3);
        collector.collect(0, 0.5);
        collector.collect(1, 2.0);
        collector.collect(2, 0.5);
        collector.collect(3, 1.0);
        collector.collect(4, 0.5);
        let top = collector.into_top_docs();
        assert_eq!(top.total_hits, 5);
        assert_eq!(top.max_score, 2.0);
        assert_eq!(top.docs(), vec![1, 3, 0]);
    }

    #[test]
    fn test_zero_capacity_counts_hits() {
        let mut collector = TopDocsCollector::new(0);
        collector.collect(7, 1.0);
        let top = collector.into_top_docs();
        assert_eq!(top.total_hits, 1);
        assert!(top.is_empty());
    }

    #[test]
    fn test_skip() {
        let top = TopDocs {
            total_hits: 3,
            max_score: 1.0,
            score_docs: vec![
                ScoreDoc { doc: 0, score: 1.0 },
                ScoreDoc { doc: 1, score: 0.5 },
                ScoreDoc { doc: 2, score: 0.2 },
            ],
            sort_values: Vec::new(),
        };
        assert_eq!(top.clone().skip(1).docs(), vec![1, 2]);
        assert!(top.skip(5).is_empty());
    }

    #[test]
    fn test_field_sorted_collector() {
        let sort = Sort::new([SortField::string("name")]);
        let mut collector = FieldSortedCollector::new(3, &sort);
        let name = |s: &str| vec![SortValue::Str(Some(s.to_string()))];
        collector.collect(0, 3.0, name("pear"));
        collector.collect(1, 1.0, name("apple"));
        collector.collect(2, 2.0, vec![SortValue::Str(None)]);
        collector.collect(3, 0.5, name("apple"));
        collector.collect(4, 9.0, name("zucchini"));
        let top = collector.into_top_docs();
        assert_eq!(top.total_hits, 5);
        assert_eq!(top.max_score, 9.0);
        // missing first, equal keys by doc
        assert_eq!(top.docs(), vec![2, 1, 3]);
        assert_eq!(top.sort_values[1], name("apple"));

        let paged = top.skip(1);
        assert_eq!(paged.docs(), vec![1, 3]);
        assert_eq!(paged.sort_values.len(), 2);
    }

    #[test]
    fn test_relevance_sort_uses_plain_collector() {
        let options = SearchOptions::new().with_sort(Sort::relevance());
        assert!(options.field_sort().is_none());
        let options = SearchOptions::new().with_sort(Sort::by_field("name"));
        assert!(options.field_sort().is_some());
    }
}
