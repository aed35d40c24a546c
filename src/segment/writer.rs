//! Segment writer: turns buffered or merged data into a compound file
//!
//! A flushed or merged segment is written as one `_N.cfs` holding:
//! - field infos, term dictionary (fst + term infos), postings
//! - norms, stored fields and term vectors

use tracing::debug;

use super::buffer::BufferedSegment;
use super::field_infos::FieldInfos;
use super::manifest::SegmentInfo;
use super::postings::PostingsWriter;
use super::term_dict::TermDictionaryBuilder;
use super::types::{compound_file_name, files};
use crate::error::Result;
use crate::store::{CompoundFileWriter, Directory};

/// Encoded sub-files of one segment, ready to be packed
#[derive(Debug, Default)]
pub struct SegmentFiles {
    pub field_infos: Vec<u8>,
    pub term_index: Vec<u8>,
    pub term_infos: Vec<u8>,
    pub postings: Vec<u8>,
    pub norms: Vec<u8>,
    pub stored_index: Vec<u8>,
    pub stored_data: Vec<u8>,
    pub vectors_index: Vec<u8>,
    pub vectors_data: Vec<u8>,
}

impl SegmentFiles {
    /// Pack into `<name>.cfs`, returning the container size
    pub fn write(self, directory: &dyn Directory, name: &str) -> Result<u64> {
        let mut cfs = CompoundFileWriter::new();
        cfs.add_file(files::FIELD_INFOS, self.field_infos)?;
        cfs.add_file(files::TERM_INDEX, self.term_index)?;
        cfs.add_file(files::TERM_INFOS, self.term_infos)?;
        cfs.add_file(files::POSTINGS, self.postings)?;
        cfs.add_file(files::NORMS, self.norms)?;
        cfs.add_file(files::STORED_INDEX, self.stored_index)?;
        cfs.add_file(files::STORED_DATA, self.stored_data)?;
        cfs.add_file(files::VECTORS_INDEX, self.vectors_index)?;
        cfs.add_file(files::VECTORS_DATA, self.vectors_data)?;
        cfs.write(directory, &compound_file_name(name))
    }
}

/// Term dictionary and postings built in key order
#[derive(Default)]
pub struct InvertedWriter {
    postings: PostingsWriter,
    dict: TermDictionaryBuilder,
}

impl InvertedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one term's postings; terms must arrive in ascending key order.
    /// Returns false when the term had no postings and was dropped.
    pub fn add_term<I>(&mut self, key: &[u8], postings: I) -> Result<bool>
    where
        I: IntoIterator<Item = super::types::Posting>,
    {
        self.postings.start_term();
        for posting in postings {
            self.postings.add_posting(posting)?;
        }
        match self.postings.finish_term() {
            Some(info) => {
                self.dict.add(key, info)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn term_count(&self) -> usize {
        self.dict.len()
    }

    /// Fill the dictionary and postings parts of `files`
    pub fn finish_into(self, files: &mut SegmentFiles) -> Result<()> {
        let (term_index, term_infos) = self.dict.finish()?;
        files.term_index = term_index;
        files.term_infos = term_infos;
        files.postings = self.postings.into_data();
        Ok(())
    }
}

/// Writes a new segment from the in-memory buffer
pub struct SegmentWriter<'a> {
    directory: &'a dyn Directory,
    name: String,
}

impl<'a> SegmentWriter<'a> {
    pub fn new(directory: &'a dyn Directory, name: impl Into<String>) -> Self {
        Self {
            directory,
            name: name.into(),
        }
    }

    pub fn write_buffered(self, buffered: BufferedSegment) -> Result<SegmentInfo> {
        let doc_count = buffered.doc_count;
        let mut inverted = InvertedWriter::new();
        for (key, postings) in buffered.postings {
            inverted.add_term(&key, postings)?;
        }
        let term_count = inverted.term_count();

        let mut parts = SegmentFiles {
            field_infos: buffered.field_infos.to_bytes()?,
            norms: buffered.norms.finish(doc_count)?,
            ..Default::default()
        };
        inverted.finish_into(&mut parts)?;
        (parts.stored_index, parts.stored_data) = buffered.stored.finish();
        (parts.vectors_index, parts.vectors_data) = buffered.vectors.finish();

        let size_bytes = parts.write(self.directory, &self.name)?;
        debug!(
            segment = %self.name,
            doc_count,
            term_count,
            size_bytes,
            "wrote segment"
        );
        Ok(SegmentInfo::new(self.name, doc_count, size_bytes))
    }
}

/// Field infos union over several segments, used by merges
pub fn merge_field_infos<'b, I>(inputs: I) -> FieldInfos
where
    I: IntoIterator<Item = &'b FieldInfos>,
{
    let mut merged = FieldInfos::new();
    for infos in inputs {
        for info in infos.iter() {
            merged.add(&info.name, info.flags);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, Field};
    use crate::search::DefaultSimilarity;
    use crate::segment::SegmentBuffer;
    use crate::store::{CompoundFileReader, RamDirectory};
    use crate::tokenizer::Tokenizer;

    #[test]
    fn test_write_buffered() {
        let dir = RamDirectory::new();
        let mut buffer = SegmentBuffer::new();
        for title in ["red fox", "blue fox", "red car"] {
            let doc = Document::new().add_field(Field::text("title", title));
            buffer
                .add_document(&doc, &Tokenizer::default(), &DefaultSimilarity, 100)
                .unwrap();
        }

        let info = SegmentWriter::new(&dir, "_0")
            .write_buffered(buffer.take())
            .unwrap();
        assert_eq!(info.name, "_0");
        assert_eq!(info.doc_count, 3);
        assert_eq!(info.del_gen, 0);
        assert_eq!(info.size_bytes, dir.file_len("_0.cfs").unwrap());

        let cfs = CompoundFileReader::open(&dir, "_0.cfs").unwrap();
        assert_eq!(
            cfs.file_names(),
            vec!["fdt", "fdx", "fnm", "nrm", "pst", "tim", "tis", "tvd", "tvx"]
        );
    }

    #[test]
    fn test_empty_terms_dropped() {
        let mut inverted = InvertedWriter::new();
        assert!(!inverted.add_term(b"f\0a", Vec::new()).unwrap());
        assert!(inverted
            .add_term(b"f\0b", vec![crate::segment::Posting::new(0, vec![0])])
            .unwrap());
        assert_eq!(inverted.term_count(), 1);
    }

    #[test]
    fn test_merge_field_infos() {
        use crate::document::FieldFlags;
        let mut a = FieldInfos::new();
        a.add("title", FieldFlags::TEXT);
        let mut b = FieldInfos::new();
        b.add("id", FieldFlags::KEYWORD);
        b.add("title", FieldFlags::TEXT);
        let merged = merge_field_infos([&a, &b]);
        assert_eq!(merged.names(), vec!["title", "id"]);
    }
}
