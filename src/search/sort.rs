//! Sorting hits by field values instead of relevance
//!
//! Sort keys come from the indexed terms of a field, so the field should be
//! untokenized and hold one term per document. A document with several
//! terms sorts by its smallest; a document with none sorts as a missing
//! string, or as zero for numeric sorts.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::document::Term;
use crate::error::{Result, SegdexError};
use crate::segment::{DocId, SegmentReader, TERMINATED};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortType {
    /// Relevance, best first
    Score,
    /// Document number, ascending
    Doc,
    /// Term text, lexicographic
    String,
    /// Term text parsed as `i64`
    Integer,
    /// Term text parsed as `f64`
    Float,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SortField {
    /// Field whose terms give the sort key; `None` for score and doc
    pub field: Option<String>,
    pub sort_type: SortType,
    pub reverse: bool,
}

impl SortField {
    pub fn score() -> Self {
        Self {
            field: None,
            sort_type: SortType::Score,
            reverse: false,
        }
    }

    pub fn doc() -> Self {
        Self {
            field: None,
            sort_type: SortType::Doc,
            reverse: false,
        }
    }

    pub fn string(field: impl Into<String>) -> Self {
        Self::on_field(field, SortType::String)
    }

    pub fn integer(field: impl Into<String>) -> Self {
        Self::on_field(field, SortType::Integer)
    }

    pub fn float(field: impl Into<String>) -> Self {
        Self::on_field(field, SortType::Float)
    }

    fn on_field(field: impl Into<String>, sort_type: SortType) -> Self {
        Self {
            field: Some(field.into()),
            sort_type,
            reverse: false,
        }
    }

    /// Flip the natural order
    pub fn reversed(mut self) -> Self {
        self.reverse = !self.reverse;
        self
    }

    pub fn compare(&self, a: &SortValue, b: &SortValue) -> Ordering {
        let natural = a.natural_cmp(b);
        if self.reverse {
            natural.reverse()
        } else {
            natural
        }
    }
}

/// Ordered sort fields; ties left after the last one go to the lower doc
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub fields: Vec<SortField>,
}

impl Sort {
    pub fn new(fields: impl IntoIterator<Item = SortField>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// Best score first, the default order of a search
    pub fn relevance() -> Self {
        Self::new([SortField::score()])
    }

    /// Ascending by the string terms of `field`
    pub fn by_field(field: impl Into<String>) -> Self {
        Self::new([SortField::string(field)])
    }

    /// Whether this order is the one the relevance collector already produces
    pub fn is_relevance(&self) -> bool {
        let mut rest = self.fields.as_slice();
        if let [first, tail @ ..] = rest {
            if first.sort_type == SortType::Score && !first.reverse {
                rest = tail;
            }
        }
        rest.iter().all(|f| f.sort_type == SortType::Doc && !f.reverse)
    }

    /// Order of two hits: the sort fields, then ascending doc
    pub fn compare_hits(
        &self,
        a: &[SortValue],
        a_doc: u32,
        b: &[SortValue],
        b_doc: u32,
    ) -> Ordering {
        self.fields
            .iter()
            .zip(a.iter().zip(b))
            .map(|(field, (x, y))| field.compare(x, y))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a_doc.cmp(&b_doc))
    }
}

/// Sort key of one hit for one sort field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SortValue {
    Score(f32),
    Doc(u32),
    Str(Option<String>),
    Int(i64),
    Float(f64),
}

impl SortValue {
    /// Score descending, everything else ascending, missing strings first
    fn natural_cmp(&self, other: &SortValue) -> Ordering {
        match (self, other) {
            (SortValue::Score(a), SortValue::Score(b)) => b.total_cmp(a),
            (SortValue::Doc(a), SortValue::Doc(b)) => a.cmp(b),
            (SortValue::Str(a), SortValue::Str(b)) => a.cmp(b),
            (SortValue::Int(a), SortValue::Int(b)) => a.cmp(b),
            (SortValue::Float(a), SortValue::Float(b)) => a.total_cmp(b),
            _ => Ordering::Equal,
        }
    }

    /// Move a doc key from a sub-searcher's id space into the merged one
    pub(crate) fn rebase(self, base: u32) -> SortValue {
        match self {
            SortValue::Doc(doc) => SortValue::Doc(base + doc),
            other => other,
        }
    }
}

#[derive(Debug)]
enum FieldValues {
    Score,
    Doc,
    Str(Vec<Option<String>>),
    Int(Vec<i64>),
    Float(Vec<f64>),
}

/// Sort keys of every document of one segment
#[derive(Debug)]
pub struct SegmentSortValues {
    columns: Vec<FieldValues>,
}

impl SegmentSortValues {
    pub fn load(sort: &Sort, reader: &SegmentReader) -> Result<Self> {
        let columns = sort
            .fields
            .iter()
            .map(|field| load_column(field, reader))
            .collect::<Result<_>>()?;
        Ok(Self { columns })
    }

    /// Keys of segment-local `doc`, reported with the global id `global`
    pub fn values(&self, doc: DocId, global: u32, score: f32) -> Vec<SortValue> {
        let i = doc as usize;
        self.columns
            .iter()
            .map(|column| match column {
                FieldValues::Score => SortValue::Score(score),
                FieldValues::Doc => SortValue::Doc(global),
                FieldValues::Str(values) => SortValue::Str(values.get(i).cloned().flatten()),
                FieldValues::Int(values) => SortValue::Int(values.get(i).copied().unwrap_or(0)),
                FieldValues::Float(values) => {
                    SortValue::Float(values.get(i).copied().unwrap_or(0.0))
                }
            })
            .collect()
    }
}

fn load_column(field: &SortField, reader: &SegmentReader) -> Result<FieldValues> {
    let name = match (&field.sort_type, &field.field) {
        (SortType::Score, _) => return Ok(FieldValues::Score),
        (SortType::Doc, _) => return Ok(FieldValues::Doc),
        (_, Some(name)) => name,
        (sort_type, None) => {
            return Err(SegdexError::InvalidRequest(format!(
                "{:?} sort needs a field",
                sort_type
            )))
        }
    };

    let mut texts = Vec::new();
    reader.visit_terms(name, "", |text, _| {
        texts.push(text.to_string());
        true
    })?;

    // terms arrive in ascending order, so the first one set for a doc is its smallest
    let max_doc = reader.max_doc() as usize;
    let mut first_term: Vec<Option<usize>> = vec![None; max_doc];
    for (ord, text) in texts.iter().enumerate() {
        let Some(mut postings) = reader.postings(&Term::new(name.clone(), text.clone()))? else {
            continue;
        };
        let mut doc = postings.doc();
        while doc != TERMINATED {
            if let Some(slot) = first_term.get_mut(doc as usize) {
                slot.get_or_insert(ord);
            }
            doc = postings.advance()?;
        }
    }

    Ok(match field.sort_type {
        SortType::Integer => FieldValues::Int(
            first_term
                .iter()
                .map(|ord| ord.map_or(Ok(0), |ord| parse_number(name, &texts[ord])))
                .collect::<Result<_>>()?,
        ),
        SortType::Float => FieldValues::Float(
            first_term
                .iter()
                .map(|ord| ord.map_or(Ok(0.0), |ord| parse_number(name, &texts[ord])))
                .collect::<Result<_>>()?,
        ),
        _ => FieldValues::Str(
            first_term
                .iter()
                .map(|ord| ord.map(|ord| texts[ord].clone()))
                .collect(),
        ),
    })
}

fn parse_number<T: std::str::FromStr>(field: &str, text: &str) -> Result<T> {
    text.parse().map_err(|_| {
        SegdexError::InvalidRequest(format!(
            "field {} holds non-numeric term {:?}",
            field, text
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_orders() {
        let score = SortField::score();
        assert_eq!(
            score.compare(&SortValue::Score(2.0), &SortValue::Score(1.0)),
            Ordering::Less
        );
        let name = SortField::string("name");
        assert_eq!(
            name.compare(&SortValue::Str(None), &SortValue::Str(Some("a".into()))),
            Ordering::Less
        );
        let price = SortField::float("price").reversed();
        assert_eq!(
            price.compare(&SortValue::Float(1.5), &SortValue::Float(9.0)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_compare_hits_falls_back_to_doc() {
        let sort = Sort::new([SortField::integer("year").reversed()]);
        let newer = [SortValue::Int(2005)];
        let older = [SortValue::Int(1999)];
        assert_eq!(sort.compare_hits(&newer, 9, &older, 1), Ordering::Less);
        assert_eq!(sort.compare_hits(&older, 1, &older, 4), Ordering::Less);
        assert_eq!(sort.compare_hits(&older, 4, &older, 1), Ordering::Greater);
    }

    #[test]
    fn test_is_relevance() {
        assert!(Sort::default().is_relevance());
        assert!(Sort::relevance().is_relevance());
        assert!(Sort::new([SortField::score(), SortField::doc()]).is_relevance());
        assert!(!Sort::new([SortField::score().reversed()]).is_relevance());
        assert!(!Sort::by_field("name").is_relevance());
        assert!(!Sort::new([SortField::doc().reversed()]).is_relevance());
    }

    #[test]
    fn test_rebase_only_moves_doc_keys() {
        assert_eq!(SortValue::Doc(3).rebase(10), SortValue::Doc(13));
        assert_eq!(SortValue::Int(3).rebase(10), SortValue::Int(3));
    }
}
