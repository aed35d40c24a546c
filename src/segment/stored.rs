//! Per-document record stores: stored fields and (via term_vectors) vectors.
//!
//! Each store is an index sub-file of `doc_count + 1` little-endian u64
//! offsets plus a data sub-file of concatenated bincode records.

use serde::{Deserialize, Serialize};

use super::codec::{decode_offset, decode_record, encode_offsets, encode_record};
use super::types::DocId;
use crate::document::{Document, Field, FieldFlags};
use crate::error::{Result, SegdexError};
use crate::store::FileSlice;

/// Appends one opaque record per document
#[derive(Debug)]
pub struct RecordWriter {
    offsets: Vec<u64>,
    data: Vec<u8>,
}

impl Default for RecordWriter {
    fn default() -> Self {
        Self {
            offsets: vec![0],
            data: Vec::new(),
        }
    }
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_raw(&mut self, record: &[u8]) {
        self.data.extend_from_slice(record);
        self.offsets.push(self.data.len() as u64);
    }

    pub fn add<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let bytes = encode_record(record)?;
        self.add_raw(&bytes);
        Ok(())
    }

    pub fn doc_count(&self) -> u32 {
        (self.offsets.len() - 1) as u32
    }

    /// Index bytes and data bytes
    pub fn finish(self) -> (Vec<u8>, Vec<u8>) {
        (encode_offsets(&self.offsets), self.data)
    }
}

/// Random access to the records of a store
#[derive(Clone, Debug)]
pub struct RecordReader {
    index: FileSlice,
    data: FileSlice,
    doc_count: u32,
}

impl RecordReader {
    pub fn open(index: FileSlice, data: FileSlice, doc_count: u32) -> Result<Self> {
        if index.len() != (doc_count as usize + 1) * 8 {
            return Err(SegdexError::corrupt(format!(
                "record index covers {} bytes, expected {} docs",
                index.len(),
                doc_count
            )));
        }
        let last = decode_offset(&index, doc_count as usize)?;
        if last != data.len() as u64 {
            return Err(SegdexError::corrupt("record index does not match data length"));
        }
        Ok(Self {
            index,
            data,
            doc_count,
        })
    }

    pub fn doc_count(&self) -> u32 {
        self.doc_count
    }

    /// Raw bytes of a record
    pub fn raw(&self, doc: DocId) -> Result<FileSlice> {
        if doc >= self.doc_count {
            return Err(SegdexError::DocumentOutOfRange {
                doc,
                max_doc: self.doc_count,
            });
        }
        let start = decode_offset(&self.index, doc as usize)?;
        let end = decode_offset(&self.index, doc as usize + 1)?;
        if start > end {
            return Err(SegdexError::corrupt("record offsets decrease"));
        }
        self.data
            .slice(start as usize..end as usize)
            .ok_or_else(|| SegdexError::corrupt("record extends beyond data"))
    }

    pub fn get<T: serde::de::DeserializeOwned>(&self, doc: DocId, what: &str) -> Result<T> {
        let raw = self.raw(doc)?;
        decode_record(&raw, what)
    }
}

/// Persisted form of one stored field
#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredField {
    name: String,
    value: String,
    flags: FieldFlags,
}

/// Writes the stored fields of each document in doc order
#[derive(Debug, Default)]
pub struct StoredFieldsWriter {
    records: RecordWriter,
}

impl StoredFieldsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the fields flagged `stored`, in document order
    pub fn add_document(&mut self, doc: &Document) -> Result<()> {
        let fields: Vec<StoredField> = doc
            .fields
            .iter()
            .filter(|f| f.flags.stored)
            .map(|f| StoredField {
                name: f.name.clone(),
                value: f.value.clone(),
                flags: f.flags,
            })
            .collect();
        self.records.add(&fields)
    }

    /// Copy an already-encoded record (used by merges)
    pub fn add_raw(&mut self, raw: &[u8]) {
        self.records.add_raw(raw);
    }

    pub fn doc_count(&self) -> u32 {
        self.records.doc_count()
    }

    pub fn finish(self) -> (Vec<u8>, Vec<u8>) {
        self.records.finish()
    }
}

#[derive(Clone, Debug)]
pub struct StoredFieldsReader {
    records: RecordReader,
}

impl StoredFieldsReader {
    pub fn open(index: FileSlice, data: FileSlice, doc_count: u32) -> Result<Self> {
        Ok(Self {
            records: RecordReader::open(index, data, doc_count)?,
        })
    }

    pub fn document(&self, doc: DocId) -> Result<Document> {
        let fields: Vec<StoredField> = self.records.get(doc, "stored fields")?;
        let mut out = Document::new();
        for f in fields {
            out.push(Field::new(f.name, f.value, f.flags));
        }
        Ok(out)
    }

    pub fn raw(&self, doc: DocId) -> Result<FileSlice> {
        self.records.raw(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_fields_roundtrip() {
        let docs = vec![
            Document::new()
                .add_field(Field::text("title", "red fox"))
                .add_field(Field::unstored("body", "not kept")),
            Document::new(),
            Document::new().add_field(Field::keyword("id", "3")),
        ];
        let mut writer = StoredFieldsWriter::new();
        for doc in &docs {
            writer.add_document(doc).unwrap();
        }
        assert_eq!(writer.doc_count(), 3);
        let (index, data) = writer.finish();

        let reader =
            StoredFieldsReader::open(FileSlice::new(index), FileSlice::new(data), 3).unwrap();
        let first = reader.document(0).unwrap();
        assert_eq!(first.get("title"), Some("red fox"));
        assert_eq!(first.get("body"), None);
        assert!(reader.document(1).unwrap().is_empty());
        assert_eq!(reader.document(2).unwrap().fields, docs[2].fields);
        assert!(matches!(
            reader.document(3),
            Err(SegdexError::DocumentOutOfRange { doc: 3, max_doc: 3 })
        ));
    }

    #[test]
    fn test_raw_copy() {
        let mut writer = StoredFieldsWriter::new();
        writer
            .add_document(&Document::new().add_field(Field::text("a", "b")))
            .unwrap();
        let (index, data) = writer.finish();
        let reader =
            StoredFieldsReader::open(FileSlice::new(index), FileSlice::new(data), 1).unwrap();

        let mut copy = StoredFieldsWriter::new();
        copy.add_raw(&reader.raw(0).unwrap());
        let (index, data) = copy.finish();
        let copied =
            StoredFieldsReader::open(FileSlice::new(index), FileSlice::new(data), 1).unwrap();
        assert_eq!(copied.document(0).unwrap().get("a"), Some("b"));
    }

    #[test]
    fn test_index_mismatch_is_corruption() {
        let mut writer = RecordWriter::new();
        writer.add_raw(b"abc");
        let (index, data) = writer.finish();
        let err = RecordReader::open(FileSlice::new(index.clone()), FileSlice::new(data), 2)
            .unwrap_err();
        assert!(err.is_corruption());
        let err = RecordReader::open(FileSlice::new(index), FileSlice::new(b"ab".to_vec()), 1)
            .unwrap_err();
        assert!(err.is_corruption());
    }
}
