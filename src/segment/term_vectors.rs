//! Term vectors: per-document term frequencies and positions for a field

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::stored::{RecordReader, RecordWriter};
use super::types::DocId;
use crate::error::Result;
use crate::store::FileSlice;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermVectorEntry {
    pub text: String,
    pub freq: u32,
    pub positions: Vec<u32>,
}

/// Terms of one field of one document, sorted by text
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermVector {
    pub field: String,
    pub terms: Vec<TermVectorEntry>,
}

impl TermVector {
    /// Build from the per-term positions collected during analysis
    pub fn from_positions(field: &str, positions: &BTreeMap<String, Vec<u32>>) -> Self {
        let terms = positions
            .iter()
            .map(|(text, pos)| TermVectorEntry {
                text: text.clone(),
                freq: pos.len() as u32,
                positions: pos.clone(),
            })
            .collect();
        Self {
            field: field.to_string(),
            terms,
        }
    }

    pub fn get(&self, text: &str) -> Option<&TermVectorEntry> {
        self.terms
            .binary_search_by(|e| e.text.as_str().cmp(text))
            .ok()
            .map(|i| &self.terms[i])
    }
}

#[derive(Debug, Default)]
pub struct TermVectorsWriter {
    records: RecordWriter,
}

impl TermVectorsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vectors of one document, one per vectorized field, sorted by field
    pub fn add_document(&mut self, mut vectors: Vec<TermVector>) -> Result<()> {
        vectors.sort_by(|a, b| a.field.cmp(&b.field));
        self.records.add(&vectors)
    }

    pub fn add_raw(&mut self, raw: &[u8]) {
        self.records.add_raw(raw);
    }

    pub fn finish(self) -> (Vec<u8>, Vec<u8>) {
        self.records.finish()
    }
}

#[derive(Clone, Debug)]
pub struct TermVectorsReader {
    records: RecordReader,
}

impl TermVectorsReader {
    pub fn open(index: FileSlice, data: FileSlice, doc_count: u32) -> Result<Self> {
        Ok(Self {
            records: RecordReader::open(index, data, doc_count)?,
        })
    }

    pub fn vectors(&self, doc: DocId) -> Result<Vec<TermVector>> {
        self.records.get(doc, "term vectors")
    }

    pub fn vector(&self, doc: DocId, field: &str) -> Result<Option<TermVector>> {
        Ok(self.vectors(doc)?.into_iter().find(|v| v.field == field))
    }

    pub fn raw(&self, doc: DocId) -> Result<FileSlice> {
        self.records.raw(doc)
    }
}
