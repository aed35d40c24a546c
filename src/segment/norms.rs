//! Per-document, per-field scoring norms
//!
//! A norm folds document boost, field boost and length normalization into
//! one scalar computed at index time. Documents without a field get 0.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::codec::{decode_record, encode_record};
use super::types::DocId;
use crate::error::{Result, SegdexError};

/// Collects norms while a segment is built
#[derive(Clone, Debug, Default)]
pub struct NormsWriter {
    fields: BTreeMap<String, Vec<f32>>,
    doc_count: u32,
}

impl NormsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the norm of `field` for `doc`
    pub fn set(&mut self, field: &str, doc: DocId, norm: f32) {
        let values = self.fields.entry(field.to_string()).or_default();
        if values.len() <= doc as usize {
            values.resize(doc as usize + 1, 0.0);
        }
        values[doc as usize] = norm;
        self.doc_count = self.doc_count.max(doc + 1);
    }

    /// Declare the segment's final doc count so trailing docs get 0
    pub fn finish(self, doc_count: u32) -> Result<Vec<u8>> {
        let doc_count = self.doc_count.max(doc_count) as usize;
        let fields: Vec<(String, Vec<f32>)> = self
            .fields
            .into_iter()
            .map(|(name, mut values)| {
                values.resize(doc_count, 0.0);
                (name, values)
            })
            .collect();
        encode_record(&fields)
    }
}

/// Norms of one segment
#[derive(Clone, Debug, Default)]
pub struct Norms {
    fields: HashMap<String, Arc<Vec<f32>>>,
}

impl Norms {
    pub fn from_bytes(bytes: &[u8], doc_count: u32) -> Result<Self> {
        let fields: Vec<(String, Vec<f32>)> = decode_record(bytes, "norms")?;
        let mut map = HashMap::with_capacity(fields.len());
        for (name, values) in fields {
            if values.len() != doc_count as usize {
                return Err(SegdexError::corrupt(format!(
                    "norms for {} cover {} docs, segment has {}",
                    name,
                    values.len(),
                    doc_count
                )));
            }
            map.insert(name, Arc::new(values));
        }
        Ok(Self { fields: map })
    }

    /// Norms of every document for one field
    pub fn field(&self, field: &str) -> Option<Arc<Vec<f32>>> {
        self.fields.get(field).cloned()
    }

    pub fn get(&self, field: &str, doc: DocId) -> f32 {
        self.fields
            .get(field)
            .and_then(|v| v.get(doc as usize).copied())
            .unwrap_or(0.0)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norms_roundtrip() {
        let mut writer = NormsWriter::new();
        writer.set("title", 0, 0.5);
        writer.set("title", 2, 0.25);
        writer.set("body", 1, 1.0);
        let bytes = writer.finish(4).unwrap();

        let norms = Norms::from_bytes(&bytes, 4).unwrap();
        assert_eq!(norms.get("title", 0), 0.5);
        assert_eq!(norms.get("title", 1), 0.0);
        assert_eq!(norms.get("title", 3), 0.0);
        assert_eq!(norms.get("body", 1), 1.0);
        assert_eq!(norms.get("missing", 0), 0.0);
        assert_eq!(norms.field("title").unwrap().len(), 4);
    }

    #[test]
    fn test_doc_count_mismatch_is_corruption() {
        let mut writer = NormsWriter::new();
        writer.set("title", 0, 0.5);
        let bytes = writer.finish(2).unwrap();
        assert!(Norms::from_bytes(&bytes, 3).unwrap_err().is_corruption());
    }
}
