//! Core types for the segment format

use serde::{Deserialize, Serialize};

/// Document id local to one segment, dense in `[0, doc_count)`
pub type DocId = u32;

/// Sentinel returned by exhausted iterators
pub const TERMINATED: DocId = u32::MAX;

/// Number of postings per compressed block
pub const BLOCK_SIZE: usize = 128;

/// A single posting entry within a posting list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc: DocId,
    /// Ascending token positions of the term in this document
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn new(doc: DocId, positions: Vec<u32>) -> Self {
        Self { doc, positions }
    }

    /// Term frequency in this document
    pub fn freq(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// Dictionary entry for one term: statistics plus the location of its postings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermInfo {
    /// Documents containing the term, deleted ones included
    pub doc_freq: u32,
    pub total_term_freq: u64,
    /// Byte offset of the posting list within the postings sub-file
    pub offset: u64,
    pub length: u64,
}

/// Sub-file names inside a segment's compound file
pub mod files {
    pub const FIELD_INFOS: &str = "fnm";
    pub const TERM_INDEX: &str = "tis";
    pub const TERM_INFOS: &str = "tim";
    pub const POSTINGS: &str = "pst";
    pub const NORMS: &str = "nrm";
    pub const STORED_INDEX: &str = "fdx";
    pub const STORED_DATA: &str = "fdt";
    pub const VECTORS_INDEX: &str = "tvx";
    pub const VECTORS_DATA: &str = "tvd";
}

/// Extension of a segment's compound file
pub const COMPOUND_EXTENSION: &str = "cfs";
/// Extension of a segment's deletion file
pub const DELETES_EXTENSION: &str = "del";

/// Segment name for a counter value: `_` followed by base 36 digits
pub fn segment_name(counter: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut n = counter;
    let mut buf = Vec::new();
    loop {
        buf.push(DIGITS[(n % 36) as usize]);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    buf.push(b'_');
    buf.reverse();
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn compound_file_name(segment: &str) -> String {
    format!("{}.{}", segment, COMPOUND_EXTENSION)
}

pub fn deletes_file_name(segment: &str, del_gen: u64) -> String {
    format!("{}_{}.{}", segment, del_gen, DELETES_EXTENSION)
}

/// Segment name owning an index file, if the name looks like one
pub fn segment_of_file(file: &str) -> Option<&str> {
    if !file.starts_with('_') {
        return None;
    }
    let stem = file.split('.').next()?;
    match stem[1..].find('_') {
        Some(i) => Some(&stem[..i + 1]),
        None => Some(stem),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_names() {
        assert_eq!(segment_name(0), "_0");
        assert_eq!(segment_name(10), "_a");
        assert_eq!(segment_name(36), "_10");
        assert_eq!(compound_file_name("_a"), "_a.cfs");
        assert_eq!(deletes_file_name("_a", 3), "_a_3.del");
    }

    #[test]
    fn test_segment_of_file() {
        assert_eq!(segment_of_file("_a.cfs"), Some("_a"));
        assert_eq!(segment_of_file("_a_3.del"), Some("_a"));
        assert_eq!(segment_of_file("segments_4"), None);
        assert_eq!(segment_of_file("write.lock"), None);
    }

    #[test]
    fn test_posting_freq() {
        assert_eq!(Posting::new(3, vec![1, 4, 9]).freq(), 3);
    }
}
