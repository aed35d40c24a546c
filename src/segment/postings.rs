//! Postings format with block-based compression
//!
//! A posting list is laid out as:
//!
//! ```text
//! [block_count vbyte]
//! [skip entries: (max_doc vbyte, block_offset vbyte) * block_count]
//! [blocks]
//! ```
//!
//! and each block of up to [`BLOCK_SIZE`] postings as:
//!
//! ```text
//! [count vbyte][bitpacked doc deltas][bitpacked freqs]
//! [positions_len vbyte][per doc: freq position deltas as vbyte]
//! ```
//!
//! Doc deltas are relative to the last doc of the previous block, so any
//! block can be decoded on its own after a skip.

use super::codec::{bitpack_decode, bitpack_encode, decode_vbyte, decode_vbyte64, encode_vbyte, encode_vbyte64};
use super::types::{DocId, Posting, TermInfo, BLOCK_SIZE, TERMINATED};
use crate::error::{Result, SegdexError};
use crate::store::FileSlice;

/// Skip data for jumping over whole blocks
#[derive(Clone, Copy, Debug, Default)]
struct SkipEntry {
    max_doc: DocId,
    /// Offset of the block relative to the start of the block area
    block_offset: u64,
}

/// Writer for posting lists
#[derive(Debug, Default)]
pub struct PostingsWriter {
    data: Vec<u8>,
    block_data: Vec<u8>,
    skip_entries: Vec<SkipEntry>,
    pending: Vec<Posting>,
    last_block_doc: Option<DocId>,
    doc_freq: u32,
    total_term_freq: u64,
}

impl PostingsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start writing a new posting list
    pub fn start_term(&mut self) {
        self.block_data.clear();
        self.skip_entries.clear();
        self.pending.clear();
        self.last_block_doc = None;
        self.doc_freq = 0;
        self.total_term_freq = 0;
    }

    /// Append a posting; docs must arrive in strictly increasing order
    pub fn add_posting(&mut self, posting: Posting) -> Result<()> {
        let prev = self
            .pending
            .last()
            .map(|p| p.doc)
            .or(self.last_block_doc);
        if let Some(prev) = prev {
            if posting.doc <= prev {
                return Err(SegdexError::Internal(format!(
                    "postings out of order: {} after {}",
                    posting.doc, prev
                )));
            }
        }
        if posting.positions.is_empty() {
            return Err(SegdexError::Internal("posting without positions".to_string()));
        }
        self.doc_freq += 1;
        self.total_term_freq += posting.freq() as u64;
        self.pending.push(posting);

        if self.pending.len() == BLOCK_SIZE {
            self.flush_block();
        }
        Ok(())
    }

    /// Finish the current posting list. Returns None when it is empty, in
    /// which case nothing was written and the term must be left out.
    pub fn finish_term(&mut self) -> Option<TermInfo> {
        self.flush_block();
        if self.doc_freq == 0 {
            return None;
        }

        let offset = self.data.len() as u64;
        encode_vbyte(self.skip_entries.len() as u32, &mut self.data);
        for skip in &self.skip_entries {
            encode_vbyte(skip.max_doc, &mut self.data);
            encode_vbyte64(skip.block_offset, &mut self.data);
        }
        self.data.extend_from_slice(&self.block_data);

        Some(TermInfo {
            doc_freq: self.doc_freq,
            total_term_freq: self.total_term_freq,
            offset,
            length: self.data.len() as u64 - offset,
        })
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    fn flush_block(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let block_start = self.block_data.len() as u64;
        let mut prev = self.last_block_doc.unwrap_or(0);
        let mut deltas = Vec::with_capacity(self.pending.len());
        let mut freqs = Vec::with_capacity(self.pending.len());
        let mut positions = Vec::new();

        for posting in &self.pending {
            deltas.push(posting.doc - prev);
            prev = posting.doc;
            freqs.push(posting.freq());
            let mut last_pos = 0u32;
            for &pos in &posting.positions {
                encode_vbyte(pos - last_pos, &mut positions);
                last_pos = pos;
            }
        }

        encode_vbyte(self.pending.len() as u32, &mut self.block_data);
        bitpack_encode(&deltas, &mut self.block_data);
        bitpack_encode(&freqs, &mut self.block_data);
        encode_vbyte(positions.len() as u32, &mut self.block_data);
        self.block_data.extend_from_slice(&positions);

        self.skip_entries.push(SkipEntry {
            max_doc: prev,
            block_offset: block_start,
        });
        self.last_block_doc = Some(prev);
        self.pending.clear();
    }
}

/// Reader over a postings sub-file
#[derive(Clone, Debug, Default)]
pub struct PostingsReader {
    data: FileSlice,
}

impl PostingsReader {
    pub fn new(data: FileSlice) -> Self {
        Self { data }
    }

    /// Open an iterator positioned on the first posting of a term
    pub fn postings(&self, info: &TermInfo) -> Result<PostingIterator> {
        let start = info.offset as usize;
        let end = info
            .offset
            .checked_add(info.length)
            .ok_or_else(|| SegdexError::corrupt("posting list bounds overflow"))? as usize;
        let slice = self
            .data
            .slice(start..end)
            .ok_or_else(|| SegdexError::corrupt("posting list extends beyond data"))?;
        PostingIterator::new(slice, info.doc_freq)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Cursor over one posting list in ascending doc order.
///
/// Starts positioned on the first posting; [`PostingIterator::doc`] returns
/// [`TERMINATED`] once exhausted.
#[derive(Clone, Debug)]
pub struct PostingIterator {
    data: FileSlice,
    blocks_start: usize,
    skip_entries: Vec<SkipEntry>,
    doc_freq: u32,
    /// Index of the next block to decode
    next_block: usize,
    docs: Vec<DocId>,
    freqs: Vec<u32>,
    position_starts: Vec<usize>,
    positions: Vec<u32>,
    cursor: usize,
    current: DocId,
}

impl PostingIterator {
    pub fn new(data: FileSlice, doc_freq: u32) -> Result<Self> {
        let bytes = data.as_slice();
        let mut pos = 0;
        let block_count = decode_vbyte(bytes, &mut pos)? as usize;
        let expected_blocks = (doc_freq as usize).div_ceil(BLOCK_SIZE);
        if block_count != expected_blocks {
            return Err(SegdexError::corrupt(format!(
                "posting list has {} blocks, expected {}",
                block_count, expected_blocks
            )));
        }

        let mut skip_entries = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            let max_doc = decode_vbyte(bytes, &mut pos)?;
            let block_offset = decode_vbyte64(bytes, &mut pos)?;
            skip_entries.push(SkipEntry {
                max_doc,
                block_offset,
            });
        }

        let mut iter = Self {
            data,
            blocks_start: pos,
            skip_entries,
            doc_freq,
            next_block: 0,
            docs: Vec::new(),
            freqs: Vec::new(),
            position_starts: Vec::new(),
            positions: Vec::new(),
            cursor: 0,
            current: TERMINATED,
        };
        iter.load_next_block()?;
        Ok(iter)
    }

    /// Documents in the list, deleted ones included
    pub fn doc_freq(&self) -> u32 {
        self.doc_freq
    }

    pub fn doc(&self) -> DocId {
        self.current
    }

    /// Frequency in the current document
    pub fn freq(&self) -> u32 {
        if self.current == TERMINATED {
            return 0;
        }
        self.freqs[self.cursor]
    }

    /// Positions in the current document
    pub fn positions(&self) -> &[u32] {
        if self.current == TERMINATED {
            return &[];
        }
        let start = self.position_starts[self.cursor];
        let end = start + self.freqs[self.cursor] as usize;
        &self.positions[start..end]
    }

    /// Move to the next posting
    pub fn advance(&mut self) -> Result<DocId> {
        if self.current == TERMINATED {
            return Ok(TERMINATED);
        }
        self.cursor += 1;
        if self.cursor < self.docs.len() {
            self.current = self.docs[self.cursor];
        } else {
            self.load_next_block()?;
        }
        Ok(self.current)
    }

    /// Move to the first posting with doc >= target
    pub fn seek(&mut self, target: DocId) -> Result<DocId> {
        if self.current >= target {
            return Ok(self.current);
        }
        // The current block ends before target: skip whole blocks
        if self.docs.last().is_some_and(|&last| last < target) {
            while self.next_block < self.skip_entries.len()
                && self.skip_entries[self.next_block].max_doc < target
            {
                self.next_block += 1;
            }
            self.load_next_block()?;
        }
        while self.current < target {
            self.advance()?;
        }
        Ok(self.current)
    }

    /// Drain the remaining postings
    pub fn collect_remaining(&mut self) -> Result<Vec<Posting>> {
        let mut out = Vec::new();
        while self.current != TERMINATED {
            out.push(Posting::new(self.current, self.positions().to_vec()));
            self.advance()?;
        }
        Ok(out)
    }

    fn load_next_block(&mut self) -> Result<()> {
        self.docs.clear();
        self.freqs.clear();
        self.position_starts.clear();
        self.positions.clear();
        self.cursor = 0;

        if self.next_block >= self.skip_entries.len() {
            self.current = TERMINATED;
            return Ok(());
        }

        let block_idx = self.next_block;
        self.next_block += 1;
        let skip = self.skip_entries[block_idx];
        let bytes = self.data.as_slice();
        let mut pos = self
            .blocks_start
            .checked_add(skip.block_offset as usize)
            .filter(|&p| p < bytes.len())
            .ok_or_else(|| SegdexError::corrupt("block offset out of bounds"))?;

        let count = decode_vbyte(bytes, &mut pos)? as usize;
        if count == 0 || count > BLOCK_SIZE {
            return Err(SegdexError::corrupt(format!("bad block length {}", count)));
        }
        let deltas = bitpack_decode(bytes, &mut pos, count)?;
        let freqs = bitpack_decode(bytes, &mut pos, count)?;
        let positions_len = decode_vbyte(bytes, &mut pos)? as usize;
        let positions_end = pos
            .checked_add(positions_len)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| SegdexError::corrupt("positions extend beyond block"))?;

        let mut prev = if block_idx == 0 {
            None
        } else {
            Some(self.skip_entries[block_idx - 1].max_doc)
        };
        for (&delta, &freq) in deltas.iter().zip(freqs.iter()) {
            let doc = match prev {
                None => delta,
                Some(p) => {
                    if delta == 0 {
                        return Err(SegdexError::corrupt("non-increasing doc ids"));
                    }
                    p.checked_add(delta)
                        .ok_or_else(|| SegdexError::corrupt("doc id overflow"))?
                }
            };
            if freq == 0 {
                return Err(SegdexError::corrupt("zero term frequency"));
            }
            self.position_starts.push(self.positions.len());
            let mut last_pos = 0u32;
            for _ in 0..freq {
                if pos >= positions_end {
                    return Err(SegdexError::corrupt("positions shorter than frequency"));
                }
                last_pos = last_pos
                    .checked_add(decode_vbyte(bytes, &mut pos)?)
                    .ok_or_else(|| SegdexError::corrupt("position overflow"))?;
                self.positions.push(last_pos);
            }
            self.docs.push(doc);
            prev = Some(doc);
        }
        if self.docs.last() != Some(&skip.max_doc) {
            return Err(SegdexError::corrupt("block does not end at its skip entry"));
        }
        self.freqs = freqs;
        self.current = self.docs[0];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_list(postings: &[Posting]) -> (FileSlice, TermInfo) {
        let mut writer = PostingsWriter::new();
        writer.start_term();
        for p in postings {
            writer.add_posting(p.clone()).unwrap();
        }
        let info = writer.finish_term().unwrap();
        (FileSlice::new(writer.into_data()), info)
    }

    fn sample(n: u32) -> Vec<Posting> {
        (0..n)
            .map(|i| {
                let freq = 1 + i % 3;
                Posting::new(i * 3, (0..freq).map(|p| p * 2 + i % 5).collect())
            })
            .collect()
    }

    #[test]
    fn test_iterate_across_blocks() {
        let postings = sample(300);
        let (data, info) = write_list(&postings);
        assert_eq!(info.doc_freq, 300);

        let reader = PostingsReader::new(data);
        let mut iter = reader.postings(&info).unwrap();
        let decoded = iter.collect_remaining().unwrap();
        assert_eq!(decoded, postings);
        assert_eq!(iter.doc(), TERMINATED);
        assert_eq!(iter.advance().unwrap(), TERMINATED);
    }

    #[test]
    fn test_seek() {
        let postings = sample(400);
        let (data, info) = write_list(&postings);
        let reader = PostingsReader::new(data);

        let mut iter = reader.postings(&info).unwrap();
        assert_eq!(iter.seek(0).unwrap(), 0);
        assert_eq!(iter.seek(10).unwrap(), 12);
        assert_eq!(iter.seek(12).unwrap(), 12);
        assert_eq!(iter.seek(699).unwrap(), 699);
        assert_eq!(iter.positions(), postings[233].positions.as_slice());
        assert_eq!(iter.seek(700).unwrap(), 702);
        assert_eq!(iter.seek(1_196).unwrap(), 1_197);
        assert_eq!(iter.seek(1_198).unwrap(), TERMINATED);
    }

    #[test]
    fn test_empty_term_is_dropped() {
        let mut writer = PostingsWriter::new();
        writer.start_term();
        assert!(writer.finish_term().is_none());
        assert!(writer.is_empty());
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut writer = PostingsWriter::new();
        writer.start_term();
        writer.add_posting(Posting::new(5, vec![0])).unwrap();
        assert!(writer.add_posting(Posting::new(5, vec![1])).is_err());
    }

    #[test]
    fn test_multiple_terms_share_file() {
        let mut writer = PostingsWriter::new();
        writer.start_term();
        writer.add_posting(Posting::new(1, vec![0])).unwrap();
        let a = writer.finish_term().unwrap();
        writer.start_term();
        writer.add_posting(Posting::new(0, vec![3, 7])).unwrap();
        writer.add_posting(Posting::new(9, vec![1])).unwrap();
        let b = writer.finish_term().unwrap();
        assert_eq!(b.total_term_freq, 3);

        let reader = PostingsReader::new(FileSlice::new(writer.into_data()));
        let mut it = reader.postings(&a).unwrap();
        assert_eq!(it.doc(), 1);
        let mut it_b = reader.postings(&b).unwrap();
        assert_eq!(it_b.positions(), &[3, 7]);
        assert_eq!(it_b.advance().unwrap(), 9);
        assert_eq!(it.advance().unwrap(), TERMINATED);
    }

    #[test]
    fn test_corrupt_list_detected() {
        let (data, info) = write_list(&sample(10));
        let mut bytes = data.to_vec();
        bytes.truncate(bytes.len() - 4);
        let reader = PostingsReader::new(FileSlice::new(bytes));
        assert!(reader.postings(&info).unwrap_err().is_corruption());

        let bad_info = TermInfo {
            doc_freq: 500,
            ..info
        };
        let reader = PostingsReader::new(data);
        assert!(reader.postings(&bad_info).unwrap_err().is_corruption());
    }
}
